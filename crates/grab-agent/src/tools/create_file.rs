use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;

use super::{CREATE_FILE_TOOL, RegisteredTool, ToolOutput, display_name, required_string_argument};

pub(super) fn create_file_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: CREATE_FILE_TOOL.to_string(),
            description: "Create a new file with the given content, creating parent directories as needed. Overwrites an existing file.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["file_path", "content"],
                "properties": {
                    "file_path": { "type": "string", "description": "The path of the file to create" },
                    "content": { "type": "string", "description": "The full file content" }
                },
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|args, context| {
            Box::pin(async move {
                let file_path = required_string_argument(&args, "file_path")?;
                let content = required_string_argument(&args, "content")?;
                let written = context.workspace.write_file(&file_path, &content).await?;
                context
                    .sink
                    .markdown(&format!("Created `{}`\n", display_name(&written)));
                Ok(ToolOutput::text(format!(
                    "Created file: {} ({} chars)",
                    written.display(),
                    content.chars().count()
                )))
            })
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::context;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test(flavor = "current_thread")]
    async fn creates_file_under_new_directories() {
        let dir = tempdir().expect("tempdir");
        let (context, _sink) = context(dir.path());

        let output = (create_file_tool().executor)(
            json!({ "file_path": "src/ui/Card.tsx", "content": "export {}" }),
            context,
        )
        .await
        .expect("create should succeed");

        let path = dir.path().join("src/ui/Card.tsx");
        assert_eq!(output.text, format!("Created file: {} (9 chars)", path.display()));
        assert_eq!(std::fs::read_to_string(path).expect("read back"), "export {}");
    }
}
