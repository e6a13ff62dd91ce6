use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use super::{
    APPLY_PATCH_TOOL, RegisteredTool, ToolContext, ToolOutput, display_name,
    optional_string_argument, required_string_argument,
};
use crate::ToolError;
use crate::patch::{self, FilePatch};

pub(super) fn apply_patch_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: APPLY_PATCH_TOOL.to_string(),
            description: "Apply a unified diff patch to one or more files. The patch should be in standard unified diff format (output of git diff, diff -u, etc.)".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["patch"],
                "properties": {
                    "patch": {
                        "type": "string",
                        "description": "The unified diff to apply, with ---/+++ headers, @@ hunk headers and +/- prefixed lines"
                    },
                    "base_path": {
                        "type": "string",
                        "description": "Directory the paths in the patch are relative to; the workspace root by default"
                    }
                },
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|args, context| {
            Box::pin(async move {
                let patch_text = required_string_argument(&args, "patch")?;
                let base_path = optional_string_argument(&args, "base_path")?;
                let files = patch::parse_unified_diff(&patch_text)?;

                let mut results = Vec::with_capacity(files.len());
                let mut failed = 0usize;
                for file in &files {
                    let target = target_path(file, base_path.as_deref());
                    match apply_file(file, &target, &context).await {
                        Ok(result) => results.push(result),
                        Err(error) => {
                            failed += 1;
                            warn!(path = %target, %error, "patch section failed");
                            let message = format!("Failed to patch {target}: {error}");
                            context.sink.markdown(&format!("{message}\n"));
                            results.push(message);
                        }
                    }
                }

                Ok(ToolOutput::text(format!(
                    "Applied patch: {} file(s) succeeded, {failed} file(s) failed\n{}",
                    files.len() - failed,
                    results.join("\n")
                )))
            })
        }),
    }
}

fn target_path(file: &FilePatch, base_path: Option<&str>) -> String {
    let path = file
        .new_path
        .as_deref()
        .or(file.old_path.as_deref())
        .unwrap_or_default();
    match base_path {
        Some(base) => format!("{}/{path}", base.trim_end_matches('/')),
        None => path.to_string(),
    }
}

async fn apply_file(file: &FilePatch, target: &str, context: &ToolContext) -> Result<String, ToolError> {
    if file.new_path.is_none() {
        return Err(ToolError::Execution("deleting files is not supported".to_string()));
    }

    let (verb, updated) = if file.old_path.is_none() {
        if context.workspace.file_exists(target).await? {
            return Err(ToolError::Execution("file already exists".to_string()));
        }
        ("Created", patch::apply_hunks("", &file.hunks)? + "\n")
    } else {
        let original = context.workspace.read_file(target).await?;
        ("Edited", patch::apply_hunks(&original, &file.hunks)?)
    };

    let written = context.workspace.write_file(target, &updated).await?;
    context.sink.markdown(&format!(
        "`{}` +{} -{}\n",
        display_name(&written),
        file.added_lines(),
        file.removed_lines()
    ));
    Ok(format!("{verb}: {}", written.display()))
}
