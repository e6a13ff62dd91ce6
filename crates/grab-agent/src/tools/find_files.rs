use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;

use super::{FIND_FILES_TOOL, RegisteredTool, ToolOutput, optional_usize_argument, required_string_argument};

const DEFAULT_MAX_RESULTS: usize = 50;

pub(super) fn find_files_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: FIND_FILES_TOOL.to_string(),
            description: "Find files by glob pattern. Patterns without a directory match at any depth.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["pattern"],
                "properties": {
                    "pattern": { "type": "string", "description": "Glob pattern, e.g. \"*.tsx\" or \"src/**/*.css\"" },
                    "max_results": { "type": "number", "description": "Maximum number of files (default: 50)" }
                },
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|args, context| {
            Box::pin(async move {
                let pattern = required_string_argument(&args, "pattern")?;
                let max_results =
                    optional_usize_argument(&args, "max_results")?.unwrap_or(DEFAULT_MAX_RESULTS);
                let found = context.workspace.find_files(&pattern, max_results).await?;
                if found.is_empty() {
                    return Ok(ToolOutput::text(format!(
                        "No files found matching pattern: {pattern}"
                    )));
                }
                let listing = found
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(ToolOutput::text(format!(
                    "Found {} file(s):\n{listing}",
                    found.len()
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
    async fn reports_matches_and_misses() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        std::fs::write(dir.path().join("src/App.tsx"), "").expect("write");
        let (context, _sink) = context(dir.path());
        let tool = find_files_tool();

        let found = (tool.executor)(json!({ "pattern": "*.tsx" }), context.clone())
            .await
            .expect("find should succeed");
        assert!(found.text.starts_with("Found 1 file(s):\n"));
        assert!(found.text.ends_with("App.tsx"));

        let none = (tool.executor)(json!({ "pattern": "*.vue" }), context)
            .await
            .expect("find should succeed");
        assert_eq!(none.text, "No files found matching pattern: *.vue");
    }
}
