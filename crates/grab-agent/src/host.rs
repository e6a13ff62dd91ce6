use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::{ChatParticipant, HostError, ResponseSink, TurnInvocation};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TurnOptions {
    /// Bring the chat view to the foreground.
    pub reveal: bool,
}

/// Where chat turns are opened. Fire-and-forget: the caller learns about
/// progress and completion only through the event bus.
#[async_trait]
pub trait HostSurface: Send + Sync {
    async fn open_turn(&self, prompt: String, options: TurnOptions) -> Result<(), HostError>;
}

/// Runs turns in-process on the tokio runtime.
pub struct LocalHost {
    participant: Arc<ChatParticipant>,
    sink: Arc<dyn ResponseSink>,
    shutdown: CancellationToken,
    turns: TaskTracker,
}

impl LocalHost {
    pub fn new(participant: Arc<ChatParticipant>, sink: Arc<dyn ResponseSink>) -> Self {
        Self {
            participant,
            sink,
            shutdown: CancellationToken::new(),
            turns: TaskTracker::new(),
        }
    }

    pub fn participant(&self) -> &Arc<ChatParticipant> {
        &self.participant
    }

    pub fn running_turns(&self) -> usize {
        self.turns.len()
    }

    /// Cancels running turns and refuses new ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.turns.close();
    }

    /// Waits for every spawned turn after [`LocalHost::shutdown`].
    pub async fn wait(&self) {
        self.turns.wait().await;
    }
}

#[async_trait]
impl HostSurface for LocalHost {
    async fn open_turn(&self, prompt: String, options: TurnOptions) -> Result<(), HostError> {
        if self.shutdown.is_cancelled() {
            return Err(HostError::ShutDown);
        }
        if prompt.trim().is_empty() {
            return Err(HostError::Rejected("empty prompt".to_string()));
        }
        if options.reveal {
            debug!("revealing chat view");
        }

        let participant = Arc::clone(&self.participant);
        let invocation = TurnInvocation {
            prompt,
            cancel: self.shutdown.child_token(),
            sink: Arc::clone(&self.sink),
        };
        self.turns.spawn(async move {
            let outcome = participant.handle(invocation).await;
            info!(exit = ?outcome.exit, turns = outcome.turns, "host turn finished");
        });
        Ok(())
    }
}
