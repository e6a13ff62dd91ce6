//! Per-request side tables for payloads too large or too structured to ride
//! inside the prompt text.

use grab_llm::ImageAttachment;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct AttachmentStore<T> {
    entries: Mutex<HashMap<String, T>>,
}

impl<T> Default for AttachmentStore<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> AttachmentStore<T> {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, request_id: &str, value: T) {
        self.entries().insert(request_id.to_string(), value);
    }

    /// Reads and removes the entry.
    pub fn take(&self, request_id: &str) -> Option<T> {
        self.entries().remove(request_id)
    }

    /// Reads without removing.
    pub fn with<R>(&self, request_id: &str, read: impl FnOnce(&T) -> R) -> Option<R> {
        self.entries().get(request_id).map(read)
    }

    pub fn remove(&self, request_id: &str) -> bool {
        self.entries().remove(request_id).is_some()
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.entries().contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> AttachmentStore<T> {
    pub fn peek(&self, request_id: &str) -> Option<T> {
        self.with(request_id, T::clone)
    }
}

/// Images and custom system prompts attached to in-flight requests.
#[derive(Debug, Default)]
pub struct RequestAttachments {
    pub images: AttachmentStore<Vec<ImageAttachment>>,
    pub system_prompts: AttachmentStore<String>,
}

impl RequestAttachments {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stores the non-empty parts of a request's payload.
    pub fn store(&self, request_id: &str, images: Vec<ImageAttachment>, system_prompt: Option<String>) {
        if !images.is_empty() {
            self.images.put(request_id, images);
        }
        if let Some(prompt) = system_prompt.filter(|prompt| !prompt.trim().is_empty()) {
            self.system_prompts.put(request_id, prompt);
        }
    }

    pub fn purge(&self, request_id: &str) {
        let images = self.images.remove(request_id);
        let prompt = self.system_prompts.remove(request_id);
        if images || prompt {
            debug!(request_id, images, prompt, "purged request attachments");
        }
    }

    /// Purges `request_id` after `delay` on a detached task. Must be called
    /// from within a tokio runtime.
    pub fn purge_after(self: &Arc<Self>, request_id: &str, delay: Duration) {
        let attachments = Arc::clone(self);
        let request_id = request_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            attachments.purge(&request_id);
        });
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.system_prompts.is_empty()
    }
}
