//! Incremental Server-Sent Events decoder.
//!
//! Used for provider streams (`data: {...}` chunks terminated by `[DONE]`)
//! and by clients of the bridge's `/agent` event stream.

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Event type, defaulting to `message` as the SSE standard does.
    pub fn name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }

    /// OpenAI-style end-of-stream sentinel.
    pub fn is_done_marker(&self) -> bool {
        self.data.trim() == "[DONE]"
    }

    fn is_blank(&self) -> bool {
        self.event.is_none() && self.data.is_empty() && self.id.is_none() && self.retry.is_none()
    }
}

/// Accepts arbitrary text chunks (split anywhere, including mid-line) and
/// yields each event once its terminating blank line arrives.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: String,
    current: SseEvent,
    has_data: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.pending.push_str(chunk);
        let mut events = Vec::new();

        while let Some(end) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=end).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.accept_line(line) {
                events.push(event);
            }
        }

        events
    }

    /// Flushes a trailing event that was not followed by a blank line.
    pub fn finish(mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.pending);
        let rest = rest.trim_end_matches(['\n', '\r']);
        if !rest.is_empty() {
            self.accept_line(rest);
        }
        self.take_current()
    }

    fn accept_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.take_current();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.current.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
                self.has_data = true;
            }
            "id" => self.current.id = Some(value.to_string()),
            "retry" => self.current.retry = value.parse().ok(),
            _ => {}
        }
        None
    }

    fn take_current(&mut self) -> Option<SseEvent> {
        let had_data = std::mem::replace(&mut self.has_data, false);
        if self.current.is_blank() && !had_data {
            return None;
        }
        Some(std::mem::take(&mut self.current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_multiline_data() {
        let mut parser = SseParser::new();
        let events = parser.push("data: first\ndata: second\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "first\nsecond");
        assert_eq!(events[0].name(), "message");
    }

    #[test]
    fn keeps_named_events_with_empty_data() {
        let mut parser = SseParser::new();
        let events = parser.push("event: status\ndata: use tool read_file\n\nevent: done\ndata: \n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name(), "status");
        assert_eq!(events[0].data, "use tool read_file");
        assert_eq!(events[1].name(), "done");
        assert_eq!(events[1].data, "");
    }

    #[test]
    fn handles_chunks_split_mid_line_and_crlf() {
        let mut parser = SseParser::new();
        assert!(parser.push("data: {\"a\"").is_empty());
        assert!(parser.push(":1}\r\n").is_empty());
        let events = parser.push("\r\n: keep-alive\r\n\r\ndata: [DONE]\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"a\":1}");
        assert!(events[1].is_done_marker());
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut parser = SseParser::new();
        assert!(parser.push("id: 7\nretry: 250\ndata: tail").is_empty());
        let event = parser.finish().expect("trailing event");
        assert_eq!(event.id.as_deref(), Some("7"));
        assert_eq!(event.retry, Some(250));
        assert_eq!(event.data, "tail");
    }
}
