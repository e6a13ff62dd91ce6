use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;

use super::{READ_FILE_TOOL, RegisteredTool, ToolOutput, display_name, required_string_argument};

pub(super) fn read_file_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: READ_FILE_TOOL.to_string(),
            description: "Read the contents of a file".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["file_path"],
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "The absolute or workspace-relative path to the file to read"
                    }
                },
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|args, context| {
            Box::pin(async move {
                let file_path = required_string_argument(&args, "file_path")?;
                let resolved = context.workspace.resolve_path(&file_path);
                let content = context.workspace.read_file(&file_path).await?;
                context
                    .sink
                    .markdown(&format!("Read `{}`\n", display_name(&resolved)));

                if content.trim().is_empty() {
                    return Ok(ToolOutput::text(format!(
                        "File exists but is empty: {}",
                        resolved.display()
                    )));
                }
                Ok(ToolOutput::text(format!(
                    "File: {}\nContent ({} characters):\n\n{content}",
                    resolved.display(),
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
    async fn reads_content_and_reports_empty_files() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.ts"), "let a = 1;").expect("write a.ts");
        std::fs::write(dir.path().join("empty.ts"), "  \n").expect("write empty.ts");
        let (context, sink) = context(dir.path());
        let tool = read_file_tool();

        let output = (tool.executor)(json!({ "file_path": "/a.ts" }), context.clone())
            .await
            .expect("read should succeed");
        assert_eq!(
            output.text,
            format!("File: {}\nContent (10 characters):\n\nlet a = 1;", dir.path().join("a.ts").display())
        );
        assert_eq!(sink.markdown_text(), "Read `a.ts`\n");

        let empty = (tool.executor)(json!({ "file_path": "empty.ts" }), context)
            .await
            .expect("read should succeed");
        assert!(empty.text.starts_with("File exists but is empty: "));
    }
}
