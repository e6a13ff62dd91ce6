//! The session handler a host surface calls back for every opened turn.

use grab_llm::{Client, ImageAttachment};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::session::{LoopExit, SessionLoop, SessionOutcome, SessionSetup};
use crate::tools::{build_default_registry, save_screenshot, screenshot_tool};
use crate::{
    CapabilityNegotiator, Completion, CompletionGuard, EventBus, ImageShaping, RequestAttachments,
    ResponseSink, SessionConfig, SystemPromptParts, ToolRegistry, Workspace,
    enrich_with_source_context, extract_request_id, initial_messages, load_agents_md,
};

pub const NO_MODEL_MESSAGE: &str = "No suitable model found.";

pub struct TurnInvocation {
    pub prompt: String,
    pub cancel: CancellationToken,
    pub sink: Arc<dyn ResponseSink>,
}

#[derive(Clone)]
pub struct ChatParticipant {
    client: Arc<Client>,
    tools: ToolRegistry,
    bus: Arc<EventBus>,
    attachments: Arc<RequestAttachments>,
    workspace: Arc<dyn Workspace>,
    config: Arc<SessionConfig>,
    preferred_model: Option<String>,
}

impl ChatParticipant {
    pub fn new(
        client: Arc<Client>,
        bus: Arc<EventBus>,
        attachments: Arc<RequestAttachments>,
        workspace: Arc<dyn Workspace>,
        config: SessionConfig,
    ) -> Self {
        Self {
            client,
            tools: build_default_registry(),
            bus,
            attachments,
            workspace,
            config: Arc::new(config),
            preferred_model: None,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_preferred_model(mut self, model: impl Into<String>) -> Self {
        self.preferred_model = Some(model.into());
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn attachments(&self) -> &Arc<RequestAttachments> {
        &self.attachments
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn handle(&self, invocation: TurnInvocation) -> SessionOutcome {
        let TurnInvocation { prompt, cancel, sink } = invocation;
        let request_id = extract_request_id(&prompt);
        let mut guard = CompletionGuard::new(Arc::clone(&self.bus), request_id.clone());
        let log_id = request_id.as_deref().unwrap_or("-");

        let Some(provider) = self.client.select_model(self.preferred_model.as_deref()) else {
            warn!(request_id = log_id, "no model available for chat request");
            sink.markdown(NO_MODEL_MESSAGE);
            guard.set_outcome(Completion::failed(NO_MODEL_MESSAGE));
            guard.finish();
            return SessionOutcome {
                exit: LoopExit::Failed(NO_MODEL_MESSAGE.to_string()),
                turns: 0,
                messages: Vec::new(),
            };
        };
        info!(request_id = log_id, model = %provider.info().id, "chat request started");

        let images = request_id
            .as_deref()
            .and_then(|id| self.attachments.images.take(id))
            .unwrap_or_default();
        let request_system_prompt = request_id
            .as_deref()
            .and_then(|id| self.attachments.system_prompts.take(id));
        let agents_md = if self.config.use_agents_md {
            load_agents_md(self.workspace.as_ref()).await
        } else {
            None
        };

        let system_prompt = SystemPromptParts {
            custom_system_prompt: self.config.custom_system_prompt.as_deref(),
            request_system_prompt: request_system_prompt.as_deref(),
            agents_md: agents_md.as_deref(),
        }
        .render();
        let (query, source_context_added) =
            enrich_with_source_context(self.workspace.as_ref(), &prompt, None).await;
        debug!(request_id = log_id, source_context_added, "user query assembled");
        let mut messages = initial_messages(system_prompt, query);

        let negotiator = CapabilityNegotiator::new(
            provider.info().name.clone(),
            provider.capabilities(),
            self.config.send_screenshots_to_model,
        );
        if !images.is_empty() {
            let display_id = request_id
                .clone()
                .unwrap_or_else(|| format!("local-{}", Uuid::new_v4()));
            self.display_screenshots(&display_id, &images, sink.as_ref()).await;
        }
        if let Some(user_message) = messages.last_mut() {
            match negotiator.shape_user_message(user_message, &images) {
                ImageShaping::VisionUnsupported { count, warning } => {
                    warn!(request_id = log_id, count, "model cannot take image input");
                    sink.markdown(&format!("{warning}\n\n"));
                }
                ImageShaping::Disabled { count } => {
                    info!(request_id = log_id, count, "screenshots not sent to the model by configuration");
                }
                ImageShaping::Embedded {
                    embedded,
                    unsupported,
                    deferred,
                    dropped,
                } => {
                    if dropped > 0 {
                        info!(request_id = log_id, dropped, "screenshots beyond the per-turn limit were dropped");
                    }
                    debug!(request_id = log_id, embedded, unsupported, deferred, "screenshots shaped");
                }
                ImageShaping::NoImages => {}
            }
        }

        let mut tools = if negotiator.offers_tools() {
            self.tools.clone()
        } else {
            ToolRegistry::default()
        };
        match request_id.as_deref() {
            Some(id) if negotiator.offers_screenshot_tool(&images) => {
                tools = tools.with_tool(screenshot_tool(id, Arc::new(images)));
            }
            _ => {}
        }

        let setup = SessionSetup {
            provider,
            tools,
            negotiator,
            sink,
            bus: Arc::clone(&self.bus),
            workspace: Arc::clone(&self.workspace),
            config: Arc::clone(&self.config),
            request_id,
            messages,
        };
        SessionLoop::with_guard(setup, guard).run(cancel).await
    }

    async fn display_screenshots(&self, request_id: &str, images: &[ImageAttachment], sink: &dyn ResponseSink) {
        sink.markdown(&format!("**Attached Screenshots ({}):**\n\n", images.len()));
        let dir = self.config.screenshot_dir();
        for (index, image) in images.iter().enumerate() {
            sink.markdown(&format!("*{}*\n", image.label(index)));
            match save_screenshot(&dir, request_id, index, image).await {
                Ok(path) => sink.reference(&path),
                Err(error) => warn!(request_id, index, error = %error, "could not save screenshot for display"),
            }
        }
        sink.markdown("\n");
    }
}
