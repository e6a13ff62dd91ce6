use super::Hunk;
use crate::ToolError;

/// Applies `hunks` in order. A numbered hunk is tried at its stated line
/// first (shifted by earlier hunks); otherwise, and for bare `@@` hunks, its
/// old lines are searched for, exactly and then ignoring surrounding
/// whitespace. A whitespace-insensitive match must be unique.
pub(crate) fn apply_hunks(content: &str, hunks: &[Hunk]) -> Result<String, ToolError> {
    let had_trailing_newline = content.ends_with('\n');
    let mut lines = split_lines(content);
    let mut shift: isize = 0;
    let mut search_from = 0usize;

    for hunk in hunks {
        let (old_lines, new_lines) = hunk.old_and_new();
        let hinted = hunk
            .old_start
            .map(|start| shifted(start, shift, old_lines.is_empty()))
            .map(|index| index.min(lines.len()));

        let position = if old_lines.is_empty() {
            hinted.unwrap_or(search_from.min(lines.len()))
        } else {
            locate(&lines, &old_lines, hinted, search_from, hunk)?
        };

        let replaced = old_lines.len();
        let inserted = new_lines.len();
        lines.splice(position..position + replaced, new_lines);
        shift += inserted as isize - replaced as isize;
        search_from = position + inserted;
    }

    let mut updated = lines.join("\n");
    if had_trailing_newline && !updated.is_empty() {
        updated.push('\n');
    }
    Ok(updated)
}

/// `-N,0` hunks insert after line N; all others start at line N.
fn shifted(start: usize, shift: isize, pure_insertion: bool) -> usize {
    let index = if pure_insertion {
        start as isize
    } else {
        start as isize - 1
    };
    (index + shift).max(0) as usize
}

fn locate(
    lines: &[String],
    old_lines: &[String],
    hinted: Option<usize>,
    search_from: usize,
    hunk: &Hunk,
) -> Result<usize, ToolError> {
    if let Some(index) = hinted.filter(|index| matches_at(lines, old_lines, *index, exact)) {
        return Ok(index);
    }
    if let Some(index) = find(lines, old_lines, search_from, exact).or_else(|| find(lines, old_lines, 0, exact)) {
        return Ok(index);
    }

    let candidates: Vec<usize> = (0..=lines.len().saturating_sub(old_lines.len()))
        .filter(|index| matches_at(lines, old_lines, *index, loose))
        .take(2)
        .collect();
    match candidates.as_slice() {
        [index] => Ok(*index),
        [] => Err(ToolError::Execution(format!(
            "Could not find matching context for hunk '{}'. Looking for: \"{}...\"",
            hunk.header,
            old_lines.iter().take(3).map(String::as_str).collect::<Vec<_>>().join("\\n")
        ))),
        _ => Err(ToolError::Execution(format!(
            "Context for hunk '{}' matches more than one location; include more context lines",
            hunk.header
        ))),
    }
}

fn exact(left: &str, right: &str) -> bool {
    left == right
}

fn loose(left: &str, right: &str) -> bool {
    left.trim() == right.trim()
}

fn matches_at(lines: &[String], old_lines: &[String], index: usize, same: fn(&str, &str) -> bool) -> bool {
    lines.len() >= index + old_lines.len()
        && lines[index..index + old_lines.len()]
            .iter()
            .zip(old_lines)
            .all(|(line, old)| same(line, old))
}

fn find(lines: &[String], old_lines: &[String], from: usize, same: fn(&str, &str) -> bool) -> Option<usize> {
    (from..=lines.len().saturating_sub(old_lines.len())).find(|index| matches_at(lines, old_lines, *index, same))
}

fn split_lines(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    content
        .strip_suffix('\n')
        .unwrap_or(content)
        .split('\n')
        .map(str::to_string)
        .collect()
}
