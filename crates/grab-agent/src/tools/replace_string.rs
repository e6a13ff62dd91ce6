use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;

use super::{REPLACE_STRING_TOOL, RegisteredTool, ToolOutput, display_name, required_string_argument};
use crate::edit::replace_unique;

pub(super) fn replace_string_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: REPLACE_STRING_TOOL.to_string(),
            description: "Replace one unique occurrence of a string in a file. Whitespace differences are tolerated when no exact match exists.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["file_path", "old_string", "new_string"],
                "properties": {
                    "file_path": { "type": "string", "description": "The path to the file" },
                    "old_string": { "type": "string", "description": "The exact string to replace" },
                    "new_string": { "type": "string", "description": "The new string" }
                },
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|args, context| {
            Box::pin(async move {
                let file_path = required_string_argument(&args, "file_path")?;
                let old_string = required_string_argument(&args, "old_string")?;
                let new_string = required_string_argument(&args, "new_string")?;

                let content = context.workspace.read_file(&file_path).await?;
                let replacement = replace_unique(&content, &file_path, &old_string, &new_string)?;
                let written = context
                    .workspace
                    .write_file(&file_path, &replacement.content)
                    .await?;

                context.sink.markdown(&format!(
                    "Edited `{}` at line {}\n",
                    display_name(&written),
                    replacement.line
                ));
                Ok(ToolOutput::text(format!("Successfully replaced string in {file_path}")))
            })
        }),
    }
}
