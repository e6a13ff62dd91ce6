//! Correlation-keyed event bus.
//!
//! Two primitives, both keyed by request id:
//! - [`CompletionRegistry`]: a single-resolution completion per id. The
//!   first `complete` wins and removes the entry; later calls are no-ops.
//! - [`StatusChannels`]: repeating status events fanned out synchronously to
//!   every current subscriber of an id, in publish order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEvent {
    Tool { tool: String, input: Value },
    Thinking { text: String },
}

impl StatusEvent {
    pub fn tool(tool: impl Into<String>, input: Value) -> Self {
        Self::Tool {
            tool: tool.into(),
            input,
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self::Thinking { text: text.into() }
    }

    /// Text relayed to the external client as a `status` event.
    pub fn status_line(&self) -> String {
        match self {
            Self::Tool { tool, .. } => format!("use tool {tool}"),
            Self::Thinking { text } => text.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Done,
    Failed { message: String },
}

impl Completion {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves with the completion for one request id, or `None` when the
/// registration was cancelled or replaced before anything was published.
#[derive(Debug)]
pub struct CompletionWaiter {
    request_id: String,
    receiver: oneshot::Receiver<Completion>,
}

impl CompletionWaiter {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Future for CompletionWaiter {
    type Output = Option<Completion>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.ok())
    }
}

#[derive(Debug, Default)]
pub struct CompletionRegistry {
    waiters: Mutex<HashMap<String, oneshot::Sender<Completion>>>,
}

impl CompletionRegistry {
    pub fn register(&self, request_id: &str) -> CompletionWaiter {
        let (sender, receiver) = oneshot::channel();
        if lock(&self.waiters)
            .insert(request_id.to_string(), sender)
            .is_some()
        {
            warn!(request_id, "replaced an existing completion waiter");
        }
        CompletionWaiter {
            request_id: request_id.to_string(),
            receiver,
        }
    }

    /// Publishes the completion for `request_id`. Returns `false` when no
    /// waiter was registered, including every call after the first.
    pub fn complete(&self, request_id: &str, completion: Completion) -> bool {
        let Some(sender) = lock(&self.waiters).remove(request_id) else {
            debug!(request_id, "completion published with no waiter");
            return false;
        };
        if sender.send(completion).is_err() {
            debug!(request_id, "completion waiter was dropped");
        }
        true
    }

    /// Removes a waiter without resolving it.
    pub fn cancel(&self, request_id: &str) -> bool {
        lock(&self.waiters).remove(request_id).is_some()
    }

    pub fn is_registered(&self, request_id: &str) -> bool {
        lock(&self.waiters).contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        lock(&self.waiters).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type Subscriber = (u64, mpsc::UnboundedSender<StatusEvent>);

#[derive(Debug, Default)]
pub struct StatusChannels {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_token: AtomicU64,
}

impl StatusChannels {
    pub fn subscribe(self: &Arc<Self>, request_id: &str) -> StatusSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers)
            .entry(request_id.to_string())
            .or_default()
            .push((token, sender));
        StatusSubscription {
            request_id: request_id.to_string(),
            token,
            receiver,
            channels: Arc::downgrade(self),
        }
    }

    /// Delivers `event` to every current subscriber of `request_id` and
    /// returns how many received it. Events with no subscriber are dropped.
    pub fn publish(&self, request_id: &str, event: StatusEvent) -> usize {
        let mut subscribers = lock(&self.subscribers);
        let Some(entries) = subscribers.get_mut(request_id) else {
            return 0;
        };
        entries.retain(|(_, sender)| sender.send(event.clone()).is_ok());
        let delivered = entries.len();
        if entries.is_empty() {
            subscribers.remove(request_id);
        }
        delivered
    }

    pub fn unsubscribe_all(&self, request_id: &str) -> usize {
        lock(&self.subscribers)
            .remove(request_id)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self, request_id: &str) -> usize {
        lock(&self.subscribers)
            .get(request_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Number of request ids with at least one subscriber.
    pub fn len(&self) -> usize {
        lock(&self.subscribers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, request_id: &str, token: u64) {
        let mut subscribers = lock(&self.subscribers);
        if let Some(entries) = subscribers.get_mut(request_id) {
            entries.retain(|(entry_token, _)| *entry_token != token);
            if entries.is_empty() {
                subscribers.remove(request_id);
            }
        }
    }
}

/// Receiving end of a status subscription; unsubscribes when dropped.
#[derive(Debug)]
pub struct StatusSubscription {
    request_id: String,
    token: u64,
    receiver: mpsc::UnboundedReceiver<StatusEvent>,
    channels: Weak<StatusChannels>,
}

impl StatusSubscription {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Next event, or `None` once every publisher for the id is gone.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.receiver.recv().await
    }

    /// Events already delivered but not yet read.
    pub fn drain_ready(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        if let Some(channels) = self.channels.upgrade() {
            channels.remove(&self.request_id, self.token);
        }
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    completions: CompletionRegistry,
    status: Arc<StatusChannels>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn completions(&self) -> &CompletionRegistry {
        &self.completions
    }

    pub fn status(&self) -> &Arc<StatusChannels> {
        &self.status
    }

    pub fn register_completion(&self, request_id: &str) -> CompletionWaiter {
        self.completions.register(request_id)
    }

    pub fn complete(&self, request_id: &str, completion: Completion) -> bool {
        self.completions.complete(request_id, completion)
    }

    pub fn subscribe_status(&self, request_id: &str) -> StatusSubscription {
        self.status.subscribe(request_id)
    }

    pub fn publish_status(&self, request_id: &str, event: StatusEvent) -> usize {
        self.status.publish(request_id, event)
    }

    /// Drops every registration held for `request_id`.
    pub fn release(&self, request_id: &str) {
        self.completions.cancel(request_id);
        self.status.unsubscribe_all(request_id);
    }
}

/// Publishes the completion for a request id exactly once, on whichever
/// exit path comes first: an explicit [`CompletionGuard::finish`] or drop.
pub struct CompletionGuard {
    bus: Arc<EventBus>,
    request_id: Option<String>,
    outcome: Completion,
    signalled: bool,
}

impl CompletionGuard {
    pub fn new(bus: Arc<EventBus>, request_id: Option<String>) -> Self {
        Self {
            bus,
            request_id,
            outcome: Completion::failed("session ended unexpectedly"),
            signalled: false,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn set_outcome(&mut self, outcome: Completion) {
        self.outcome = outcome;
    }

    pub fn finish(mut self) {
        self.signal();
    }

    fn signal(&mut self) {
        if std::mem::replace(&mut self.signalled, true) {
            return;
        }
        let Some(request_id) = self.request_id.as_deref() else {
            return;
        };
        let delivered = self.bus.complete(request_id, self.outcome.clone());
        let removed = self.bus.status().unsubscribe_all(request_id);
        debug!(
            request_id,
            delivered,
            removed_listeners = removed,
            outcome = ?self.outcome,
            "session completion published"
        );
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.signal();
    }
}
