use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;

use super::{RegisteredTool, SCM_CHANGES_TOOL, ToolOutput};
use crate::ExecResult;

const DIFF_COMMAND: &str = "git diff HEAD";

pub(super) fn scm_changes_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: SCM_CHANGES_TOOL.to_string(),
            description: "Get git diffs of changed files".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|_args, context| {
            Box::pin(async move {
                let result = context
                    .workspace
                    .exec_command(DIFF_COMMAND, context.config.default_command_timeout_ms)
                    .await?;
                Ok(ToolOutput::text(describe_diff(&result)))
            })
        }),
    }
}

/// Git failures (no repository, no commits yet) are reported to the model as
/// text rather than failing the call.
fn describe_diff(result: &ExecResult) -> String {
    if result.timed_out {
        return format!("Error getting changes: `{DIFF_COMMAND}` timed out");
    }
    if result.exit_code != 0 {
        return format!(
            "Error getting changes: exit code {}\n{}",
            result.exit_code, result.stderr
        );
    }
    if result.stdout.trim().is_empty() {
        return "No changes found.".to_string();
    }
    result.stdout.clone()
}
