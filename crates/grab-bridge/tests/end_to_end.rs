mod support;

use async_trait::async_trait;
use grab_agent::{
    BufferedSink, ChatParticipant, EventBus, LocalHost, LocalWorkspace, RequestAttachments,
    SessionConfig,
};
use grab_bridge::{BridgeConfig, TransportBridge, router};
use grab_llm::{
    Client, FragmentStream, ModelCapabilities, ModelInfo, ModelProvider, SDKError,
    StreamFragment, ToolCall, TurnRequest, fragment_stream,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{call, event_pairs, post_agent};
use tokio_util::sync::CancellationToken;

struct ReplayProvider {
    info: ModelInfo,
    turns: Mutex<VecDeque<Result<Vec<StreamFragment>, String>>>,
}

#[async_trait]
impl ModelProvider for ReplayProvider {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities {
            supports_vision: true,
            supports_tools: true,
            max_images_per_turn: Some(1),
        }
    }

    async fn send_turn(
        &self,
        _request: TurnRequest,
        _cancel: CancellationToken,
    ) -> Result<FragmentStream, SDKError> {
        match self.turns.lock().expect("turns mutex").pop_front() {
            Some(Ok(fragments)) => Ok(fragment_stream(fragments.into_iter().map(Ok))),
            Some(Err(message)) => Err(SDKError::provider(Some(429), message)),
            None => Ok(fragment_stream([Ok(StreamFragment::Text("Done.".to_string()))])),
        }
    }
}

fn client(turns: Vec<Result<Vec<StreamFragment>, String>>) -> Arc<Client> {
    let provider = ReplayProvider {
        info: ModelInfo {
            id: "replay".to_string(),
            name: "Replay".to_string(),
            provider: "test".to_string(),
        },
        turns: Mutex::new(turns.into()),
    };
    Arc::new(Client::new(vec![Arc::new(provider)], None))
}

struct Stack {
    workspace: tempfile::TempDir,
    host: Arc<LocalHost>,
    bridge: Arc<TransportBridge>,
}

fn stack(client: Arc<Client>) -> Stack {
    let workspace = tempfile::tempdir().expect("workspace tempdir");
    std::fs::write(workspace.path().join("index.html"), "<h1>Hello</h1>\n").expect("seed file");
    let bus = EventBus::new();
    let attachments = RequestAttachments::new();
    let workspace_handle = Arc::new(LocalWorkspace::new(workspace.path()));
    let participant = ChatParticipant::new(
        client,
        Arc::clone(&bus),
        Arc::clone(&attachments),
        workspace_handle.clone(),
        SessionConfig {
            screenshot_dir: Some(workspace.path().join(".screens")),
            ..SessionConfig::default()
        },
    );
    let host = Arc::new(LocalHost::new(
        Arc::new(participant),
        Arc::new(BufferedSink::default()),
    ));
    let bridge = TransportBridge::new(
        host.clone(),
        bus,
        attachments,
        workspace_handle,
        BridgeConfig {
            completion_timeout: Duration::from_secs(5),
            ..BridgeConfig::default()
        },
    );
    Stack {
        workspace,
        host,
        bridge: Arc::new(bridge),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn agent_request_runs_a_full_tool_session() {
    let stack = stack(client(vec![
        Ok(vec![
            StreamFragment::Text("Updating the heading.".to_string()),
            StreamFragment::ToolCall(ToolCall::new(
                "c1",
                "replace_string",
                json!({
                    "file_path": "index.html",
                    "old_string": "<h1>Hello</h1>",
                    "new_string": "<h1>Hi</h1>"
                }),
            )),
        ]),
        Ok(vec![StreamFragment::Text("Changed.".to_string())]),
    ]));

    let (_, body, _) = call(
        router(Arc::clone(&stack.bridge)),
        post_agent(r#"{"prompt": "Say hi instead"}"#),
    )
    .await;

    assert_eq!(
        event_pairs(&body),
        vec![
            ("status".to_string(), "Updating the heading.".to_string()),
            ("status".to_string(), "use tool replace_string".to_string()),
            ("status".to_string(), "Changed.".to_string()),
            ("done".to_string(), String::new()),
        ]
    );
    let html = std::fs::read_to_string(stack.workspace.path().join("index.html")).expect("html");
    assert_eq!(html, "<h1>Hi</h1>\n");

    stack.host.shutdown();
    stack.host.wait().await;
}

#[tokio::test(flavor = "current_thread")]
async fn provider_failure_reaches_the_caller_as_error() {
    let stack = stack(client(vec![Err("rate limited".to_string())]));

    let (_, body, _) = call(
        router(Arc::clone(&stack.bridge)),
        post_agent(r#"{"prompt": "Anything"}"#),
    )
    .await;

    let events = event_pairs(&body);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "error");
    assert!(events[0].1.contains("rate limited"));
    assert!(stack.bridge.attachments().is_empty());
    assert!(stack.bridge.bus().completions().is_empty());
}
