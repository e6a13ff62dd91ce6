use crate::{
    CapabilityNegotiator, Completion, CompletionGuard, EventBus, ResponseSink, SessionConfig,
    StatusEvent, ToolContext, ToolRegistry, Workspace, excerpt,
};
use futures::StreamExt;
use grab_llm::{
    ContentPart, FragmentAccumulator, FragmentStream, Message, ModelProvider, SDKError,
    StreamFragment, ToolCall, ToolResult, TurnRequest,
};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod runner;
#[cfg(test)]
mod tests;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Ready,
    Requesting,
    Streaming,
    ToolExecution,
    Done,
}

impl LoopState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Requesting => "requesting",
            Self::Streaming => "streaming",
            Self::ToolExecution => "tool_execution",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// The model answered without requesting tools.
    Completed,
    Cancelled,
    TurnLimit,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct SessionOutcome {
    pub exit: LoopExit,
    pub turns: usize,
    pub messages: Vec<Message>,
}

/// Everything one session needs. `tools` holds exactly the offered tools.
pub struct SessionSetup {
    pub provider: Arc<dyn ModelProvider>,
    pub tools: ToolRegistry,
    pub negotiator: CapabilityNegotiator,
    pub sink: Arc<dyn ResponseSink>,
    pub bus: Arc<EventBus>,
    pub workspace: Arc<dyn Workspace>,
    pub config: Arc<SessionConfig>,
    pub request_id: Option<String>,
    pub messages: Vec<Message>,
}

/// Drives model turns until the model stops calling tools.
pub struct SessionLoop {
    provider: Arc<dyn ModelProvider>,
    tools: ToolRegistry,
    negotiator: CapabilityNegotiator,
    sink: Arc<dyn ResponseSink>,
    bus: Arc<EventBus>,
    workspace: Arc<dyn Workspace>,
    config: Arc<SessionConfig>,
    request_id: Option<String>,
    messages: Vec<Message>,
    state: LoopState,
    turns: usize,
    guard: CompletionGuard,
}

impl SessionLoop {
    pub fn new(setup: SessionSetup) -> Self {
        let guard = CompletionGuard::new(Arc::clone(&setup.bus), setup.request_id.clone());
        Self::with_guard(setup, guard)
    }

    /// Uses a guard created earlier, so failures before the loop starts
    /// still complete the request.
    pub fn with_guard(setup: SessionSetup, guard: CompletionGuard) -> Self {
        Self {
            provider: setup.provider,
            tools: setup.tools,
            negotiator: setup.negotiator,
            sink: setup.sink,
            bus: setup.bus,
            workspace: setup.workspace,
            config: setup.config,
            request_id: setup.request_id,
            messages: setup.messages,
            state: LoopState::Ready,
            turns: 0,
            guard,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Runs to completion. The request's completion is published exactly
    /// once, whatever the exit path.
    pub async fn run(mut self, cancel: CancellationToken) -> SessionOutcome {
        let exit = self.drive(&cancel).await;
        self.state = LoopState::Done;

        info!(
            request_id = self.request_id.as_deref().unwrap_or("-"),
            turns = self.turns,
            exit = ?exit,
            "session finished"
        );

        let Self {
            mut guard,
            messages,
            turns,
            ..
        } = self;
        guard.set_outcome(match &exit {
            LoopExit::Failed(message) => Completion::failed(message.clone()),
            _ => Completion::Done,
        });
        guard.finish();

        SessionOutcome {
            exit,
            turns,
            messages,
        }
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> LoopExit {
        loop {
            if cancel.is_cancelled() {
                return LoopExit::Cancelled;
            }
            if self.turns >= self.config.max_tool_rounds {
                warn!(
                    request_id = self.request_id.as_deref().unwrap_or("-"),
                    max_tool_rounds = self.config.max_tool_rounds,
                    "session stopped at the turn limit"
                );
                self.sink.markdown(&format!(
                    "\n\n_Stopped after {} model turns without finishing._\n",
                    self.turns
                ));
                return LoopExit::TurnLimit;
            }
            self.turns += 1;

            self.state = LoopState::Requesting;
            let request = self.build_request();
            debug!(
                turn = self.turns,
                messages = request.messages.len(),
                tools = request.tools.len(),
                "requesting model turn"
            );
            let stream = tokio::select! {
                biased;
                _ = cancel.cancelled() => return LoopExit::Cancelled,
                result = self.provider.send_turn(request, cancel.child_token()) => result,
            };
            let stream = match stream {
                Ok(stream) => stream,
                Err(error) => return self.fail(error),
            };

            self.state = LoopState::Streaming;
            let accumulator = match self.consume_stream(stream, cancel).await {
                Ok(Some(accumulator)) => accumulator,
                Ok(None) => return LoopExit::Cancelled,
                Err(error) => return self.fail(error),
            };

            let tool_calls = accumulator.tool_calls().to_vec();
            if !accumulator.is_empty() {
                self.messages.push(accumulator.into_message());
            }
            if tool_calls.is_empty() {
                return LoopExit::Completed;
            }

            self.state = LoopState::ToolExecution;
            let results = self.execute_tools(&tool_calls).await;
            self.messages.push(Message::tool_results(results));
        }
    }
}
