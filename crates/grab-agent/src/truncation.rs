//! Character and line budgets for tool results headed back to the model.

use crate::SessionConfig;
use crate::tools::{
    FIND_FILES_TOOL, FIND_TEXT_TOOL, LIST_DIR_TOOL, READ_PROJECT_STRUCTURE_TOOL,
};

const FALLBACK_OUTPUT_CHARS: usize = 20_000;

/// Which part of an oversized result reaches the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keep {
    /// Leading entries only. Search hits and listings are ordered, so later
    /// entries are the ones to drop.
    Head,
    /// Start and end, with the middle elided.
    Ends,
}

pub fn keep_for_tool(tool_name: &str) -> Keep {
    match tool_name {
        FIND_TEXT_TOOL | FIND_FILES_TOOL | LIST_DIR_TOOL | READ_PROJECT_STRUCTURE_TOOL => Keep::Head,
        _ => Keep::Ends,
    }
}

/// Fits `output` into the budgets configured for `tool_name`.
pub fn truncate_tool_output(output: &str, tool_name: &str, config: &SessionConfig) -> String {
    let keep = keep_for_tool(tool_name);
    let max_chars = config
        .tool_output_limits
        .get(tool_name)
        .copied()
        .unwrap_or(FALLBACK_OUTPUT_CHARS);
    let clipped = clip_chars(output, max_chars, keep);
    match config.tool_line_limits.get(tool_name) {
        Some(max_lines) => clip_lines(&clipped, *max_lines, keep),
        None => clipped,
    }
}

pub fn clip_chars(output: &str, max_chars: usize, keep: Keep) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_string();
    }
    let omitted = total - max_chars;

    match keep {
        Keep::Head => format!(
            "{}\n\n[{omitted} more characters not shown. Narrow the query to see them.]",
            &output[..byte_offset(output, max_chars)]
        ),
        Keep::Ends => {
            let head_end = byte_offset(output, max_chars / 2);
            let tail_start = byte_offset(output, total - (max_chars - max_chars / 2));
            format!(
                "{}\n\n[{omitted} characters omitted from the middle of this result.]\n\n{}",
                &output[..head_end],
                &output[tail_start..]
            )
        }
    }
}

pub fn clip_lines(output: &str, max_lines: usize, keep: Keep) -> String {
    let total = output.lines().count();
    if total <= max_lines {
        return output.to_string();
    }
    let omitted = total - max_lines;

    let mut clipped: Vec<String> = Vec::with_capacity(max_lines + 1);
    match keep {
        Keep::Head => {
            clipped.extend(output.lines().take(max_lines).map(str::to_string));
            clipped.push(format!("[{omitted} more lines not shown]"));
        }
        Keep::Ends => {
            let head = max_lines / 2;
            clipped.extend(output.lines().take(head).map(str::to_string));
            clipped.push(format!("[{omitted} lines omitted]"));
            clipped.extend(output.lines().skip(head + omitted).map(str::to_string));
        }
    }
    clipped.join("\n")
}

/// Leading `max_chars` characters of `text`, ellipsised when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let end = byte_offset(text, max_chars);
    if end == text.len() {
        return text.to_string();
    }
    format!("{}…", &text[..end])
}

/// Byte index of the `chars`-th character, or the end of `text`.
fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(index, _)| index)
        .unwrap_or(text.len())
}
