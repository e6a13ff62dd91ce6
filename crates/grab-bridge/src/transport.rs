//! Request handling between the HTTP surface and the chat host.

use grab_agent::{
    Completion, CompletionWaiter, EnrichQueryOptions, EventBus, HostSurface, RequestAttachments,
    RequestQueue, ScreenshotInfo, StatusSubscription, TurnOptions, Workspace, build_enriched_query,
};
use grab_llm::ImageAttachment;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{AgentRequest, AgentRequestBody, BridgeConfig, BridgeError, BridgeEvent, RequestMode};

pub type EventReceiver = mpsc::UnboundedReceiver<BridgeEvent>;
type EventSender = mpsc::UnboundedSender<BridgeEvent>;

pub const DIRECT_STARTED_STATUS: &str = "started";

/// How a correlated turn ended, from the bridge's point of view.
#[derive(Clone, Debug, PartialEq, Eq)]
enum TurnResult {
    Completed,
    TimedOut,
    Failed(String),
}

pub struct TransportBridge {
    host: Arc<dyn HostSurface>,
    bus: Arc<EventBus>,
    attachments: Arc<RequestAttachments>,
    workspace: Arc<dyn Workspace>,
    queue: RequestQueue,
    config: BridgeConfig,
    custom_system_prompt: Option<String>,
}

impl TransportBridge {
    pub fn new(
        host: Arc<dyn HostSurface>,
        bus: Arc<EventBus>,
        attachments: Arc<RequestAttachments>,
        workspace: Arc<dyn Workspace>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            host,
            bus,
            attachments,
            workspace,
            queue: RequestQueue::new(),
            config,
            custom_system_prompt: None,
        }
    }

    /// Instructions used for direct-mode queries in place of the default
    /// system prompt.
    pub fn with_custom_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.custom_system_prompt = prompt;
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn attachments(&self) -> &Arc<RequestAttachments> {
        &self.attachments
    }

    /// Requests waiting for or holding the chat surface.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Validates `body` and starts the request. Invalid input is rejected
    /// before anything is stored or queued.
    pub fn submit(self: &Arc<Self>, body: AgentRequestBody) -> Result<EventReceiver, BridgeError> {
        let request = AgentRequest::from_body(body)?;
        Ok(match request.mode {
            RequestMode::Participant => self.submit_agent_request(request),
            RequestMode::Direct => self.submit_direct_message(request),
        })
    }

    pub fn submit_agent_request(self: &Arc<Self>, request: AgentRequest) -> EventReceiver {
        let (events, receiver) = mpsc::unbounded_channel();
        let AgentRequest {
            id,
            images,
            system_prompt,
            background,
            ..
        } = request.clone();
        let prompt = request.compose_prompt();
        let preview = request.prompt_preview();

        self.attachments.store(&id, images, system_prompt);
        info!(request_id = %id, prompt = %preview, "request queued");

        let bridge = Arc::clone(self);
        let options = TurnOptions {
            reveal: !background,
        };
        // Detached: the turn runs to completion even if the caller disconnects.
        drop(self.queue.enqueue(async move {
            bridge.process(id, prompt, preview, options, events).await;
        }));
        receiver
    }

    pub fn submit_direct_message(self: &Arc<Self>, request: AgentRequest) -> EventReceiver {
        let (events, receiver) = mpsc::unbounded_channel();
        info!(request_id = %request.id, prompt = %request.prompt_preview(), "direct message");

        if !request.images.is_empty() {
            self.attachments.images.put(&request.id, request.images.clone());
            self.attachments
                .purge_after(&request.id, self.config.screenshot_retention);
        }

        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            bridge.dispatch_direct(request).await;
        });

        send(&events, BridgeEvent::Status(DIRECT_STARTED_STATUS.to_string()));
        send(&events, BridgeEvent::Done);
        receiver
    }

    /// Screenshot `index` of request `id`, while it is still retained.
    pub fn screenshot(&self, id: &str, index: usize) -> Option<ImageAttachment> {
        self.attachments
            .images
            .with(id, |images| images.get(index).cloned())
            .flatten()
    }

    async fn dispatch_direct(&self, request: AgentRequest) {
        let screenshots = (!request.images.is_empty()).then(|| ScreenshotInfo {
            request_id: request.id.clone(),
            base_url: self.config.base_url(),
            labels: request
                .images
                .iter()
                .enumerate()
                .map(|(index, image)| image.label(index))
                .collect(),
        });
        let enriched = build_enriched_query(
            self.workspace.as_ref(),
            EnrichQueryOptions {
                prompt: &request.prompt,
                content: request.content.as_deref(),
                custom_system_prompt: self.custom_system_prompt.as_deref(),
                request_system_prompt: request.system_prompt.as_deref(),
                screenshots,
            },
        )
        .await;
        debug!(
            request_id = %request.id,
            source_context_added = enriched.source_context_added,
            "direct query assembled"
        );

        let options = TurnOptions {
            reveal: !request.background,
        };
        if let Err(error) = self.host.open_turn(enriched.query, options).await {
            warn!(request_id = %request.id, error = %error, "direct message was not dispatched");
        }
    }

    async fn process(
        &self,
        id: String,
        prompt: String,
        preview: String,
        options: TurnOptions,
        events: EventSender,
    ) {
        info!(request_id = %id, prompt = %preview, "processing request");
        let mut status = self.bus.subscribe_status(&id);
        let waiter = self.bus.register_completion(&id);

        let result = match self.host.open_turn(prompt, options).await {
            Ok(()) => self.await_completion(&id, waiter, &mut status, &events).await,
            Err(error) => {
                warn!(request_id = %id, error = %error, "host refused the turn");
                TurnResult::Failed(error.to_string())
            }
        };

        for event in status.drain_ready() {
            send(&events, BridgeEvent::Status(event.status_line()));
        }
        drop(status);
        self.bus.release(&id);
        self.attachments.purge(&id);

        match result {
            TurnResult::Completed => {
                info!(request_id = %id, prompt = %preview, "request done");
                send(&events, BridgeEvent::Done);
            }
            TurnResult::TimedOut => {
                info!(request_id = %id, prompt = %preview, "request timed out; reported as done");
                send(&events, BridgeEvent::Done);
            }
            TurnResult::Failed(message) => {
                warn!(request_id = %id, error = %message, "request failed");
                send(&events, BridgeEvent::Error(message));
            }
        }
    }

    async fn await_completion(
        &self,
        id: &str,
        mut waiter: CompletionWaiter,
        status: &mut StatusSubscription,
        events: &EventSender,
    ) -> TurnResult {
        let deadline = tokio::time::sleep(self.config.completion_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                Some(event) = status.recv() => {
                    send(events, BridgeEvent::Status(event.status_line()));
                }
                completion = &mut waiter => {
                    return match completion {
                        Some(Completion::Failed { message }) => TurnResult::Failed(message),
                        Some(Completion::Done) => TurnResult::Completed,
                        None => {
                            debug!(request_id = id, "completion waiter closed without a signal");
                            TurnResult::Completed
                        }
                    };
                }
                _ = &mut deadline => {
                    self.bus.completions().cancel(id);
                    warn!(
                        request_id = id,
                        timeout_ms = self.config.completion_timeout.as_millis() as u64,
                        "no completion before timeout"
                    );
                    return TurnResult::TimedOut;
                }
            }
        }
    }
}

fn send(events: &EventSender, event: BridgeEvent) {
    if events.send(event).is_err() {
        debug!("event stream receiver dropped");
    }
}
