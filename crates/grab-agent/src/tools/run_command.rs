use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;

use super::{RUN_COMMAND_TOOL, RegisteredTool, ToolOutput, optional_u64_argument, required_string_argument};
use crate::{SessionConfig, ToolError};

pub(super) fn run_command_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: RUN_COMMAND_TOOL.to_string(),
            description: "Run a shell command in the workspace root and return its output".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["command"],
                "properties": {
                    "command": { "type": "string", "description": "The command to execute" },
                    "timeout_ms": { "type": "number", "description": "Optional timeout in milliseconds" }
                },
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|args, context| {
            Box::pin(async move {
                let command = required_string_argument(&args, "command")?;
                let timeout_ms = effective_timeout_ms(
                    optional_u64_argument(&args, "timeout_ms")?,
                    &context.config,
                );

                context.sink.markdown(&format!("Running: `{command}`\n"));
                let result = context.workspace.exec_command(&command, timeout_ms).await?;

                if result.timed_out {
                    context.sink.markdown("**Command timed out**\n");
                    return Err(ToolError::Execution(format!(
                        "Command failed: timed out after {timeout_ms} ms\nStderr: {}",
                        result.stderr
                    )));
                }
                if result.exit_code != 0 {
                    context.sink.markdown("**Command failed**\n");
                    return Err(ToolError::Execution(format!(
                        "Command failed: exit code {}\nStderr: {}",
                        result.exit_code, result.stderr
                    )));
                }
                context.sink.markdown("**Command completed**\n");
                Ok(ToolOutput::text(result.stdout))
            })
        }),
    }
}

/// Requested timeout clamped to the configured maximum.
fn effective_timeout_ms(requested: Option<u64>, config: &SessionConfig) -> u64 {
    let default_timeout_ms = if config.default_command_timeout_ms == 0 {
        10_000
    } else {
        config.default_command_timeout_ms
    };
    let max_timeout_ms = config.max_command_timeout_ms.max(default_timeout_ms);
    requested
        .filter(|timeout| *timeout > 0)
        .unwrap_or(default_timeout_ms)
        .min(max_timeout_ms)
}
