use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Human-facing output of a session: the chat panel of the host surface.
pub trait ResponseSink: Send + Sync {
    fn markdown(&self, text: &str);

    /// Points the reader at a file, e.g. a saved screenshot.
    fn reference(&self, target: &Path);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEntry {
    Markdown(String),
    Reference(PathBuf),
}

#[derive(Default)]
pub struct TracingSink;

impl ResponseSink for TracingSink {
    fn markdown(&self, text: &str) {
        debug!(target: "grab_agent::chat", "{text}");
    }

    fn reference(&self, target: &Path) {
        debug!(target: "grab_agent::chat", reference = %target.display());
    }
}

#[derive(Clone, Default)]
pub struct BufferedSink {
    inner: Arc<Mutex<Vec<SinkEntry>>>,
}

impl BufferedSink {
    pub fn snapshot(&self) -> Vec<SinkEntry> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All markdown written so far, concatenated.
    pub fn markdown_text(&self) -> String {
        self.snapshot()
            .into_iter()
            .filter_map(|entry| match entry {
                SinkEntry::Markdown(text) => Some(text),
                SinkEntry::Reference(_) => None,
            })
            .collect()
    }

    fn push(&self, entry: SinkEntry) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

impl ResponseSink for BufferedSink {
    fn markdown(&self, text: &str) {
        self.push(SinkEntry::Markdown(text.to_string()));
    }

    fn reference(&self, target: &Path) {
        self.push(SinkEntry::Reference(target.to_path_buf()));
    }
}
