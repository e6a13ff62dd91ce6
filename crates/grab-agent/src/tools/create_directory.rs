use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;

use super::{CREATE_DIRECTORY_TOOL, RegisteredTool, ToolOutput, required_string_argument};

pub(super) fn create_directory_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: CREATE_DIRECTORY_TOOL.to_string(),
            description: "Create a directory, including missing parents".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["dir_path"],
                "properties": {
                    "dir_path": { "type": "string", "description": "The directory to create" }
                },
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|args, context| {
            Box::pin(async move {
                let dir_path = required_string_argument(&args, "dir_path")?;
                let created = context.workspace.create_dir(&dir_path).await?;
                Ok(ToolOutput::text(format!("Created directory: {}", created.display())))
            })
        }),
    }
}
