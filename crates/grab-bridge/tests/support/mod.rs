#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use grab_agent::{
    Completion, EventBus, HostError, HostSurface, LocalWorkspace, RequestAttachments, StatusEvent,
    TurnOptions, extract_request_id,
};
use grab_bridge::{BridgeConfig, TransportBridge, router};
use grab_llm::utils::sse::{SseEvent, SseParser};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// What the host does with each opened turn.
#[derive(Clone)]
pub enum HostScript {
    /// Publishes the statuses, then the completion, after `delay`.
    Complete {
        statuses: Vec<StatusEvent>,
        completion: Completion,
        delay: Duration,
    },
    /// Accepts the turn and never calls back.
    Silent,
    Refuse(String),
}

impl HostScript {
    pub fn done() -> Self {
        Self::Complete {
            statuses: Vec::new(),
            completion: Completion::Done,
            delay: Duration::ZERO,
        }
    }
}

pub struct ScriptedHost {
    bus: Arc<EventBus>,
    script: HostScript,
    pub opened: Mutex<Vec<(String, TurnOptions)>>,
    active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
}

impl ScriptedHost {
    pub fn new(bus: Arc<EventBus>, script: HostScript) -> Arc<Self> {
        Arc::new(Self {
            bus,
            script,
            opened: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn opened(&self) -> Vec<(String, TurnOptions)> {
        self.opened.lock().expect("opened mutex").clone()
    }
}

#[async_trait]
impl HostSurface for ScriptedHost {
    async fn open_turn(&self, prompt: String, options: TurnOptions) -> Result<(), HostError> {
        self.opened
            .lock()
            .expect("opened mutex")
            .push((prompt.clone(), options));

        let (statuses, completion, delay) = match &self.script {
            HostScript::Refuse(reason) => return Err(HostError::Rejected(reason.clone())),
            HostScript::Silent => return Ok(()),
            HostScript::Complete {
                statuses,
                completion,
                delay,
            } => (statuses.clone(), completion.clone(), *delay),
        };
        let Some(request_id) = extract_request_id(&prompt) else {
            return Ok(());
        };

        let bus = Arc::clone(&self.bus);
        let active = Arc::clone(&self.active);
        let max_active = Arc::clone(&self.max_active);
        let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
        max_active.fetch_max(now_active, Ordering::SeqCst);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for status in statuses {
                bus.publish_status(&request_id, status);
            }
            active.fetch_sub(1, Ordering::SeqCst);
            bus.complete(&request_id, completion);
        });
        Ok(())
    }
}

pub struct TestBridge {
    pub bridge: Arc<TransportBridge>,
    pub bus: Arc<EventBus>,
    pub attachments: Arc<RequestAttachments>,
    pub workspace: TempDir,
}

impl TestBridge {
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.bridge))
    }
}

pub fn bridge_with_host(
    bus: Arc<EventBus>,
    host: Arc<dyn HostSurface>,
    config: BridgeConfig,
) -> TestBridge {
    let workspace = tempfile::tempdir().expect("workspace tempdir");
    let attachments = RequestAttachments::new();
    let bridge = TransportBridge::new(
        host,
        Arc::clone(&bus),
        Arc::clone(&attachments),
        Arc::new(LocalWorkspace::new(workspace.path())),
        config,
    );
    TestBridge {
        bridge: Arc::new(bridge),
        bus,
        attachments,
        workspace,
    }
}

pub fn post_agent(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/agent")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

/// Sends one request and returns status plus the full response body.
pub async fn call(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>, Option<String>) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, body.to_vec(), content_type)
}

pub fn sse_events(body: &[u8]) -> Vec<SseEvent> {
    let mut parser = SseParser::new();
    let mut events = parser.push(std::str::from_utf8(body).expect("utf8 body"));
    events.extend(parser.finish());
    events
}

/// `(event name, data)` pairs of a streamed response.
pub fn event_pairs(body: &[u8]) -> Vec<(String, String)> {
    sse_events(body)
        .into_iter()
        .map(|event| (event.name().to_string(), event.data))
        .collect()
}

/// 1x1 transparent PNG.
pub const PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";
