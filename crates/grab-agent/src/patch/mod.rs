//! Unified diffs as produced by `git diff` or `diff -u`, and as commonly
//! written by models (bare `@@` hunk markers without line numbers).

mod apply;
mod parser;

pub(crate) use apply::apply_hunks;
pub(crate) use parser::parse_unified_diff;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FilePatch {
    /// `None` for `/dev/null`, i.e. a new file.
    pub(crate) old_path: Option<String>,
    /// `None` for `/dev/null`, i.e. a deletion.
    pub(crate) new_path: Option<String>,
    pub(crate) hunks: Vec<Hunk>,
}

impl FilePatch {
    pub(crate) fn added_lines(&self) -> usize {
        self.count_lines(|line| matches!(line, HunkLine::Add(_)))
    }

    pub(crate) fn removed_lines(&self) -> usize {
        self.count_lines(|line| matches!(line, HunkLine::Delete(_)))
    }

    fn count_lines(&self, predicate: impl Fn(&HunkLine) -> bool) -> usize {
        self.hunks
            .iter()
            .flat_map(|hunk| hunk.lines.iter())
            .filter(|line| predicate(line))
            .count()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Hunk {
    pub(crate) header: String,
    /// 1-based start in the old file; absent for bare `@@` markers.
    pub(crate) old_start: Option<usize>,
    pub(crate) lines: Vec<HunkLine>,
}

impl Hunk {
    /// Lines the hunk expects to find, and the lines it leaves behind.
    pub(crate) fn old_and_new(&self) -> (Vec<String>, Vec<String>) {
        let mut old_lines = Vec::new();
        let mut new_lines = Vec::new();
        for line in &self.lines {
            match line {
                HunkLine::Context(text) => {
                    old_lines.push(text.clone());
                    new_lines.push(text.clone());
                }
                HunkLine::Delete(text) => old_lines.push(text.clone()),
                HunkLine::Add(text) => new_lines.push(text.clone()),
            }
        }
        (old_lines, new_lines)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum HunkLine {
    Context(String),
    Delete(String),
    Add(String),
}
