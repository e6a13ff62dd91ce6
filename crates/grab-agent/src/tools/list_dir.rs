use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;

use super::{LIST_DIR_TOOL, RegisteredTool, ToolOutput, optional_string_argument};

pub(super) fn list_dir_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: LIST_DIR_TOOL.to_string(),
            description: "List the entries of a directory".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "The directory to list; the workspace root when omitted"
                    }
                },
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|args, context| {
            Box::pin(async move {
                let path = optional_string_argument(&args, "path")?.unwrap_or_default();
                let entries = context
                    .workspace
                    .list_dir(&path)
                    .await
                    .map_err(|error| {
                        crate::ToolError::Execution(format!("Error listing directory: {error}"))
                    })?;
                let listing = entries
                    .iter()
                    .map(|entry| {
                        let kind = if entry.is_dir { "dir" } else { "file" };
                        format!("{} ({kind})", entry.name)
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(ToolOutput::text(listing))
            })
        }),
    }
}
