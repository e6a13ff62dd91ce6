use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::{RegisteredTool, TASK_COMPLETED_TOOL, ToolOutput, optional_string_argument};
use crate::{Completion, ToolError};

pub(super) fn task_completed_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: TASK_COMPLETED_TOOL.to_string(),
            description: "Signal that the task for the current request is completed".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "request_id": { "type": "string", "description": "The ID of the request that is completed; defaults to the current request" }
                },
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|args, context| {
            Box::pin(async move {
                let requested = optional_string_argument(&args, "request_id")?;
                let request_id = owned_request_id(requested, context.request_id.as_deref())?;
                let delivered = context.bus.complete(&request_id, Completion::Done);
                info!(request_id, delivered, "task marked as completed by the model");
                Ok(ToolOutput::text("Task marked as completed."))
            })
        }),
    }
}

/// A session may only complete the request it was opened for.
fn owned_request_id(requested: Option<String>, own: Option<&str>) -> Result<String, ToolError> {
    match (requested, own) {
        (None, Some(own)) => Ok(own.to_string()),
        (Some(requested), Some(own)) if requested == own => Ok(requested),
        (Some(requested), Some(_)) => Err(ToolError::Validation(format!(
            "request_id '{requested}' does not belong to this session"
        ))),
        (_, None) => Err(ToolError::Execution(
            "this session is not tied to a request; nothing to complete".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::context;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test(flavor = "current_thread")]
    async fn completes_own_request_once() {
        let dir = tempdir().expect("tempdir");
        let (context, _sink) = context(dir.path());
        let waiter = context.bus.register_completion("req-1");

        let output = (task_completed_tool().executor)(json!({}), context.clone())
            .await
            .expect("tool should succeed");
        assert_eq!(output.text, "Task marked as completed.");
        assert_eq!(waiter.await, Some(Completion::Done));
        assert!(!context.bus.complete("req-1", Completion::Done));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn refuses_to_complete_another_request() {
        let dir = tempdir().expect("tempdir");
        let (context, _sink) = context(dir.path());
        let _foreign = context.bus.register_completion("req-9");

        let error = (task_completed_tool().executor)(json!({ "request_id": "req-9" }), context.clone())
            .await
            .expect_err("foreign id should be rejected");
        assert_eq!(error.to_string(), "request_id 'req-9' does not belong to this session");
        assert!(context.bus.completions().is_registered("req-9"));
    }

    #[test]
    fn sessions_without_a_request_have_nothing_to_complete() {
        assert!(owned_request_id(Some("req-1".to_string()), None).is_err());
        assert_eq!(
            owned_request_id(Some("req-1".to_string()), Some("req-1")).expect("own id"),
            "req-1"
        );
    }
}
