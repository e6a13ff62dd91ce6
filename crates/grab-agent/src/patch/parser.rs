use regex::Regex;
use std::sync::OnceLock;

use super::{FilePatch, Hunk, HunkLine};
use crate::ToolError;

const DEV_NULL: &str = "/dev/null";

fn numbered_hunk_header() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^@@\s+-(\d+)(?:,\d+)?\s+\+\d+(?:,\d+)?\s+@@")
            .expect("hunk header pattern should compile")
    })
}

/// Parses every file section of a unified diff. Sections without hunks are
/// skipped; a diff with no usable section is rejected.
pub(crate) fn parse_unified_diff(patch: &str) -> Result<Vec<FilePatch>, ToolError> {
    let lines: Vec<&str> = patch.lines().collect();
    let mut files = Vec::new();
    let mut idx = 0usize;

    while idx < lines.len() {
        if !is_file_header(&lines, idx) {
            idx += 1;
            continue;
        }
        let old_path = header_path(lines[idx], "---", "a/");
        let new_path = header_path(lines[idx + 1], "+++", "b/");
        idx += 2;

        let mut hunks = Vec::new();
        while idx < lines.len() && !ends_file_section(&lines, idx) {
            let header = lines[idx];
            idx += 1;
            if !header.starts_with("@@") {
                continue;
            }

            let mut hunk_lines = Vec::new();
            let mut trailing_blank = 0usize;
            while idx < lines.len() && !lines[idx].starts_with("@@") && !ends_file_section(&lines, idx) {
                let line = lines[idx];
                let parsed = match line.chars().next() {
                    // A bare empty line is an empty context line with its space stripped.
                    None => {
                        trailing_blank += 1;
                        Some(HunkLine::Context(String::new()))
                    }
                    Some(' ') => Some(HunkLine::Context(line[1..].to_string())),
                    Some('-') => Some(HunkLine::Delete(line[1..].to_string())),
                    Some('+') => Some(HunkLine::Add(line[1..].to_string())),
                    // "\ No newline at end of file"
                    Some('\\') => None,
                    Some(_) => break,
                };
                if let Some(parsed) = parsed {
                    if !line.is_empty() {
                        trailing_blank = 0;
                    }
                    hunk_lines.push(parsed);
                }
                idx += 1;
            }
            hunk_lines.truncate(hunk_lines.len() - trailing_blank);

            if hunk_lines.is_empty() {
                return Err(ToolError::Validation(format!("empty hunk '{header}' in patch")));
            }
            hunks.push(Hunk {
                header: header.to_string(),
                old_start: old_start(header),
                lines: hunk_lines,
            });
        }

        if hunks.is_empty() || (old_path.is_none() && new_path.is_none()) {
            continue;
        }
        files.push(FilePatch {
            old_path,
            new_path,
            hunks,
        });
    }

    if files.is_empty() {
        return Err(ToolError::Validation(
            "No valid patches found in the provided diff. Ensure the patch is in unified diff format with proper headers.".to_string(),
        ));
    }
    Ok(files)
}

fn is_file_header(lines: &[&str], idx: usize) -> bool {
    lines[idx].starts_with("--- ")
        && lines
            .get(idx + 1)
            .is_some_and(|next| next.starts_with("+++ "))
}

fn ends_file_section(lines: &[&str], idx: usize) -> bool {
    lines[idx].starts_with("diff ") || is_file_header(lines, idx)
}

/// Path from a `---`/`+++` line, without the `a/`/`b/` prefix git adds or a
/// trailing tab-separated timestamp.
fn header_path(line: &str, marker: &str, git_prefix: &str) -> Option<String> {
    let rest = line[marker.len()..].trim_start();
    let path = rest.split('\t').next().unwrap_or(rest).trim_end();
    if path.is_empty() || path == DEV_NULL {
        return None;
    }
    Some(path.strip_prefix(git_prefix).unwrap_or(path).to_string())
}

fn old_start(header: &str) -> Option<usize> {
    numbered_hunk_header()
        .captures(header)
        .and_then(|captures| captures.get(1))
        .and_then(|start| start.as_str().parse().ok())
}
