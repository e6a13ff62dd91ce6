use regex::{Regex, RegexBuilder};

use crate::ToolError;

const FUZZY_LIMIT_CHARS: usize = 20_000;
const PUNCTUATION: &str = "=:,;(){}[]+-*/<>\"'";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replacement {
    pub content: String,
    /// 1-based line where the replaced text started.
    pub line: usize,
}

/// Replaces the single occurrence of `old_string`. An exact match is tried
/// first, then a whitespace, quote and dash tolerant match. Either way the
/// match must be unique.
pub fn replace_unique(
    content: &str,
    file_path: &str,
    old_string: &str,
    new_string: &str,
) -> Result<Replacement, ToolError> {
    if old_string.is_empty() {
        return Err(ToolError::Validation("old_string must not be empty".to_string()));
    }

    let exact: Vec<usize> = content.match_indices(old_string).map(|(start, _)| start).take(2).collect();
    let (start, end) = match exact.as_slice() {
        [start] => (*start, start + old_string.len()),
        [_, _, ..] => {
            return Err(ToolError::Execution(format!(
                "old_string is not unique in {file_path}. Please provide more context to identify a unique match."
            )));
        }
        [] => fuzzy_match(content, file_path, old_string)?,
    };

    let mut updated = String::with_capacity(content.len() + new_string.len());
    updated.push_str(&content[..start]);
    updated.push_str(new_string);
    updated.push_str(&content[end..]);
    Ok(Replacement {
        content: updated,
        line: content[..start].matches('\n').count() + 1,
    })
}

fn fuzzy_match(content: &str, file_path: &str, old_string: &str) -> Result<(usize, usize), ToolError> {
    let regex = build_fuzzy_regex(old_string)?;
    let matches: Vec<(usize, usize)> = regex
        .find_iter(content)
        .take(2)
        .map(|found| (found.start(), found.end()))
        .collect();

    match matches.as_slice() {
        [single] => Ok(*single),
        [] => Err(ToolError::Execution(format!(
            "old_string not found in {file_path}. The text you're trying to replace does not exist in the file."
        ))),
        _ => Err(ToolError::Execution(format!(
            "old_string is not unique in {file_path} (fuzzy match). Please provide more context to identify a unique match."
        ))),
    }
}

fn build_fuzzy_regex(old_string: &str) -> Result<Regex, ToolError> {
    if old_string.chars().count() > FUZZY_LIMIT_CHARS {
        return Err(ToolError::Execution(
            "old_string too large for fuzzy matching; narrow the selection".to_string(),
        ));
    }

    let mut pattern = String::new();
    let mut previous: Option<char> = None;
    let mut gap = false;
    for ch in old_string.trim().chars() {
        if ch.is_whitespace() {
            gap = true;
            continue;
        }
        if let Some(previous) = previous {
            let near_punctuation = PUNCTUATION.contains(previous) || PUNCTUATION.contains(ch);
            match (gap, near_punctuation) {
                (_, true) => pattern.push_str(r"\s*"),
                (true, false) => pattern.push_str(r"\s+"),
                (false, false) => {}
            }
        }
        pattern.push_str(&char_match_pattern(ch));
        previous = Some(ch);
        gap = false;
    }

    if pattern.is_empty() {
        return Err(ToolError::Execution(
            "old_string must include non-whitespace content".to_string(),
        ));
    }

    RegexBuilder::new(&pattern)
        .dot_matches_new_line(true)
        .multi_line(true)
        .build()
        .map_err(|error| ToolError::Execution(format!("failed to build fuzzy matcher for old_string: {error}")))
}

fn char_match_pattern(ch: char) -> String {
    match ch {
        '\'' | '\u{2018}' | '\u{2019}' | '\u{02BC}' => "['\u{2018}\u{2019}\u{02BC}]".to_string(),
        '"' | '\u{201C}' | '\u{201D}' => "[\"\u{201C}\u{201D}]".to_string(),
        '-' | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2212}' => {
            "[-\u{2010}\u{2011}\u{2012}\u{2013}\u{2014}\u{2212}]".to_string()
        }
        _ => regex::escape(&ch.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::replace_unique;

    #[test]
    fn exact_match_replaces_and_reports_line() {
        let replacement = replace_unique("one\ntwo\nthree\n", "f.ts", "two", "2")
            .expect("exact match should succeed");
        assert_eq!(replacement.content, "one\n2\nthree\n");
        assert_eq!(replacement.line, 2);
    }

    #[test]
    fn duplicate_exact_match_is_rejected() {
        let error = replace_unique("a = 1;\na = 1;\n", "f.ts", "a = 1;", "a = 2;")
            .expect_err("expected ambiguity");
        assert!(error.to_string().contains("is not unique in f.ts"));
    }

    #[test]
    fn fuzzy_match_tolerates_whitespace_around_punctuation() {
        let replacement = replace_unique(
            "const style = {color:'red'};\n",
            "f.ts",
            "color: 'red'",
            "color: 'blue'",
        )
        .expect("fuzzy match should succeed");
        assert_eq!(replacement.content, "const style = {color: 'blue'};\n");
    }

    #[test]
    fn fuzzy_match_reports_ambiguity() {
        let error = replace_unique("a  b\nx\na b\n", "f.ts", "a   b", "z")
            .expect_err("expected ambiguity");
        assert!(error.to_string().contains("(fuzzy match)"));
    }

    #[test]
    fn missing_text_is_reported() {
        let error = replace_unique("hello", "f.ts", "goodbye", "x").expect_err("expected not found");
        assert!(error.to_string().contains("not found in f.ts"));
    }
}
