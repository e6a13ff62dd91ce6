use super::*;
use crate::{
    BufferedSink, LocalWorkspace, RegisteredTool, StatusSubscription, ToolOutput,
    build_default_registry,
};
use async_trait::async_trait;
use grab_llm::{ImageAttachment, ModelCapabilities, ModelInfo, Role, fragment_stream};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use tempfile::{TempDir, tempdir};

enum Step {
    Reply(Vec<StreamFragment>),
    Fail(String),
    Hang,
}

struct SequenceProvider {
    info: ModelInfo,
    capabilities: ModelCapabilities,
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl SequenceProvider {
    fn new(capabilities: ModelCapabilities, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            info: ModelInfo {
                id: "test-model".to_string(),
                name: "Test Model".to_string(),
                provider: "test".to_string(),
            },
            capabilities,
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().expect("requests mutex").clone()
    }
}

#[async_trait]
impl ModelProvider for SequenceProvider {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn capabilities(&self) -> ModelCapabilities {
        self.capabilities
    }

    async fn send_turn(&self, request: TurnRequest, cancel: CancellationToken) -> Result<FragmentStream, SDKError> {
        self.requests.lock().expect("requests mutex").push(request);
        let step = self.steps.lock().expect("steps mutex").pop_front();
        match step {
            Some(Step::Reply(fragments)) => Ok(fragment_stream(fragments.into_iter().map(Ok))),
            Some(Step::Fail(message)) => Err(SDKError::provider(Some(500), message)),
            Some(Step::Hang) => {
                cancel.cancelled().await;
                Err(SDKError::Cancelled)
            }
            None => Ok(fragment_stream([Ok(StreamFragment::Text("done".to_string()))])),
        }
    }
}

fn text(value: &str) -> StreamFragment {
    StreamFragment::Text(value.to_string())
}

fn call(id: &str, name: &str, input: serde_json::Value) -> StreamFragment {
    StreamFragment::ToolCall(ToolCall::new(id, name, input))
}

fn tools_and_vision() -> ModelCapabilities {
    ModelCapabilities {
        supports_vision: true,
        supports_tools: true,
        max_images_per_turn: Some(1),
    }
}

struct Harness {
    _dir: TempDir,
    sink: BufferedSink,
    bus: Arc<EventBus>,
    status: StatusSubscription,
    setup: SessionSetup,
}

fn harness(provider: Arc<SequenceProvider>, config: SessionConfig) -> Harness {
    let dir = tempdir().expect("tempdir");
    let sink = BufferedSink::default();
    let bus = EventBus::new();
    let status = bus.subscribe_status("req-1");
    let capabilities = provider.capabilities();
    let setup = SessionSetup {
        provider,
        tools: build_default_registry(),
        negotiator: CapabilityNegotiator::new("Test Model", capabilities, true),
        sink: Arc::new(sink.clone()),
        bus: Arc::clone(&bus),
        workspace: Arc::new(LocalWorkspace::new(dir.path())),
        config: Arc::new(config),
        request_id: Some("req-1".to_string()),
        messages: vec![Message::system("rules"), Message::user("make it blue")],
    };
    Harness {
        _dir: dir,
        sink,
        bus,
        status,
        setup,
    }
}

#[tokio::test(flavor = "current_thread")]
async fn text_only_turn_completes_without_tool_status() {
    let provider = SequenceProvider::new(
        tools_and_vision(),
        vec![Step::Reply(vec![text("All "), text("done.")])],
    );
    let mut harness = harness(Arc::clone(&provider), SessionConfig::default());
    let waiter = harness.bus.register_completion("req-1");

    let outcome = SessionLoop::new(harness.setup).run(CancellationToken::new()).await;

    assert_eq!(outcome.exit, LoopExit::Completed);
    assert_eq!(outcome.turns, 1);
    assert_eq!(harness.sink.markdown_text(), "All done.");
    assert_eq!(waiter.await, Some(Completion::Done));
    assert_eq!(harness.status.drain_ready(), vec![StatusEvent::thinking("All done.")]);
    assert_eq!(harness.bus.status().subscriber_count("req-1"), 0);

    let last = outcome.messages.last().expect("assistant message");
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.text(), "All done.");
    assert_eq!(provider.requests()[0].tools.len(), build_default_registry().len());
}

#[tokio::test(flavor = "current_thread")]
async fn tool_failures_become_results_and_loop_continues() {
    let provider = SequenceProvider::new(
        tools_and_vision(),
        vec![
            Step::Reply(vec![
                text("Checking."),
                call("c1", "read_file", json!({ "file_path": "missing.ts" })),
                call("c2", "nope", json!({})),
            ]),
            Step::Reply(vec![text("Fixed.")]),
        ],
    );
    let mut harness = harness(Arc::clone(&provider), SessionConfig::default());

    let outcome = SessionLoop::new(harness.setup).run(CancellationToken::new()).await;

    assert_eq!(outcome.exit, LoopExit::Completed);
    assert_eq!(outcome.turns, 2);

    let results_message = &outcome.messages[3];
    assert_eq!(results_message.role, Role::User);
    let results: Vec<&ToolResult> = results_message
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::ToolResult { result } => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].call_id, "c1");
    assert!(results[0].text_content().starts_with("Error executing tool: "));
    assert_eq!(results[1].call_id, "c2");
    assert_eq!(results[1].text_content(), "Tool not found");

    let sink_text = harness.sink.markdown_text();
    assert!(sink_text.contains("Checking.\n\nUsing **read_file**\n\nUsing **nope**\n"));

    let statuses: Vec<String> = harness
        .status
        .drain_ready()
        .iter()
        .map(StatusEvent::status_line)
        .collect();
    assert_eq!(
        statuses,
        vec!["Checking.", "use tool read_file", "use tool nope", "Fixed."]
    );

    let second_request = &provider.requests()[1];
    assert_eq!(second_request.messages.len(), 4);
}

#[tokio::test(flavor = "current_thread")]
async fn provider_error_fails_session_and_reports_to_sink() {
    let provider = SequenceProvider::new(tools_and_vision(), vec![Step::Fail("quota exceeded".to_string())]);
    let harness = harness(provider, SessionConfig::default());
    let waiter = harness.bus.register_completion("req-1");

    let outcome = SessionLoop::new(harness.setup).run(CancellationToken::new()).await;

    let LoopExit::Failed(message) = &outcome.exit else {
        panic!("expected failure, got {:?}", outcome.exit);
    };
    assert!(message.contains("quota exceeded"));
    assert!(harness
        .sink
        .markdown_text()
        .contains("**Error:** Error in chat loop: provider error (500): quota exceeded"));
    assert!(matches!(waiter.await, Some(Completion::Failed { .. })));
}

#[tokio::test(flavor = "current_thread")]
async fn turn_limit_stops_tool_loop() {
    let provider = SequenceProvider::new(
        tools_and_vision(),
        vec![Step::Reply(vec![call("c1", "list_dir", json!({}))])],
    );
    let config = SessionConfig {
        max_tool_rounds: 1,
        ..SessionConfig::default()
    };
    let harness = harness(provider, config);

    let outcome = SessionLoop::new(harness.setup).run(CancellationToken::new()).await;

    assert_eq!(outcome.exit, LoopExit::TurnLimit);
    assert_eq!(outcome.turns, 1);
    assert!(harness.sink.markdown_text().contains("Stopped after 1 model turns"));
}

#[tokio::test(flavor = "current_thread")]
async fn cancellation_aborts_pending_provider_call() {
    let provider = SequenceProvider::new(tools_and_vision(), vec![Step::Hang]);
    let harness = harness(provider, SessionConfig::default());
    let waiter = harness.bus.register_completion("req-1");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let outcome = SessionLoop::new(harness.setup).run(cancel).await;

    assert_eq!(outcome.exit, LoopExit::Cancelled);
    assert_eq!(waiter.await, Some(Completion::Done));
}

#[tokio::test(flavor = "current_thread")]
async fn task_completed_resolves_waiter_before_session_ends() {
    let provider = SequenceProvider::new(
        tools_and_vision(),
        vec![
            Step::Reply(vec![call("c1", "task_completed", json!({ "request_id": "req-1" }))]),
            Step::Reply(vec![text("Finished.")]),
        ],
    );
    let harness = harness(provider, SessionConfig::default());
    let waiter = harness.bus.register_completion("req-1");

    let outcome = SessionLoop::new(harness.setup).run(CancellationToken::new()).await;

    assert_eq!(outcome.exit, LoopExit::Completed);
    assert_eq!(waiter.await, Some(Completion::Done));
    assert!(!harness.bus.completions().is_registered("req-1"));
}

fn image_tool() -> RegisteredTool {
    RegisteredTool {
        definition: grab_llm::ToolDefinition {
            name: "snap".to_string(),
            description: "returns an image".to_string(),
            parameters: json!({ "type": "object" }),
        },
        executor: Arc::new(|_args, _context| {
            Box::pin(async move {
                Ok(ToolOutput::with_image(
                    "snapped",
                    ImageAttachment::new("image/jpg", "AAAA", None),
                ))
            })
        }),
    }
}

async fn tool_result_parts(capabilities: ModelCapabilities) -> Vec<ContentPart> {
    let provider = SequenceProvider::new(
        capabilities,
        vec![
            Step::Reply(vec![call("c1", "snap", json!({}))]),
            Step::Reply(vec![text("ok")]),
        ],
    );
    let mut harness = harness(provider, SessionConfig::default());
    harness.setup.tools = ToolRegistry::default().with_tool(image_tool());
    harness.setup.negotiator = CapabilityNegotiator::new("m", capabilities, true);

    let outcome = SessionLoop::new(harness.setup).run(CancellationToken::new()).await;
    let ContentPart::ToolResult { result } = &outcome.messages[3].content[0] else {
        panic!("expected tool result");
    };
    result.content.clone()
}

#[tokio::test(flavor = "current_thread")]
async fn tool_images_are_embedded_only_with_vision() {
    let with_vision = tool_result_parts(tools_and_vision()).await;
    assert_eq!(with_vision.len(), 2);
    let ContentPart::Image { image } = &with_vision[1] else {
        panic!("expected embedded image");
    };
    assert_eq!(image.mime_type, "image/jpeg");

    let without_vision = tool_result_parts(ModelCapabilities {
        supports_vision: false,
        ..tools_and_vision()
    })
    .await;
    assert_eq!(without_vision, vec![ContentPart::text("snapped")]);
}

#[test]
fn loop_state_names_are_stable() {
    assert_eq!(LoopState::ToolExecution.to_string(), "tool_execution");
    assert_eq!(LoopState::Ready.as_str(), "ready");
}
