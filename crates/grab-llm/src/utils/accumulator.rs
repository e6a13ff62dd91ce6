//! Folds a turn's fragment stream into one assistant message.

use crate::stream::StreamFragment;
use crate::types::{ContentPart, Message, Role, ToolCall};

/// Keeps text and tool-call parts in arrival order; adjacent text fragments
/// are merged into one part.
#[derive(Clone, Debug, Default)]
pub struct FragmentAccumulator {
    parts: Vec<ContentPart>,
    text: String,
    tool_calls: Vec<ToolCall>,
}

impl FragmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: StreamFragment) {
        match fragment {
            StreamFragment::Text(delta) => self.push_text(&delta),
            StreamFragment::ToolCall(call) => {
                self.tool_calls.push(call.clone());
                self.parts.push(ContentPart::tool_call(call));
            }
        }
    }

    fn push_text(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.text.push_str(delta);
        if let Some(ContentPart::Text { text }) = self.parts.last_mut() {
            text.push_str(delta);
            return;
        }
        self.parts.push(ContentPart::text(delta));
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn into_message(self) -> Message {
        Message::new(Role::Assistant, self.parts)
    }
}
