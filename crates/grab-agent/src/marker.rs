//! Correlation marker carried inside prompt text.
//!
//! The host surface has no side channel, so the request id travels as a
//! trailing `[request-id:<id>]` token (format version 1). Nothing outside
//! this module knows the delimiter.
//!
//! Prompts carry caller text (DOM snippets, user prompts) ahead of the
//! marker, and that text may itself contain marker-shaped tokens. Only the
//! last token counts, since `embed` always appends.

use regex::Regex;
use std::sync::OnceLock;

pub const MARKER_VERSION: u32 = 1;

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[request-id:([A-Za-z0-9-]+)\]").expect("marker pattern should compile")
    })
}

pub fn format_marker(request_id: &str) -> String {
    format!("[request-id:{request_id}]")
}

/// Appends the marker for `request_id` on its own paragraph.
pub fn embed(prompt: &str, request_id: &str) -> String {
    format!("{prompt}\n\n{}", format_marker(request_id))
}

/// Last marker in `text`, if any.
pub fn extract_request_id(text: &str) -> Option<String> {
    marker_pattern()
        .captures_iter(text)
        .last()
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}
