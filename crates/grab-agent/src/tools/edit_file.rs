use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;

use super::{EDIT_FILE_TOOL, RegisteredTool, ToolOutput, display_name, required_string_argument};

pub(super) fn edit_file_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: EDIT_FILE_TOOL.to_string(),
            description: "Edit a file by replacing its whole content. The file is created if it does not exist.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["file_path", "new_content"],
                "properties": {
                    "file_path": { "type": "string", "description": "The path to the file to edit" },
                    "new_content": { "type": "string", "description": "The new content of the file" }
                },
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|args, context| {
            Box::pin(async move {
                let file_path = required_string_argument(&args, "file_path")?;
                let new_content = required_string_argument(&args, "new_content")?;

                let existed = context.workspace.file_exists(&file_path).await?;
                let written = context.workspace.write_file(&file_path, &new_content).await?;
                let verb = if existed { "Edited" } else { "Created" };
                context
                    .sink
                    .markdown(&format!("{verb} `{}`\n", display_name(&written)));
                Ok(ToolOutput::text(format!(
                    "{verb}: {} ({} chars)",
                    written.display(),
                    new_content.chars().count()
                )))
            })
        }),
    }
}
