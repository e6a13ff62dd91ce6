use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::{DirEntry as WalkEntry, WalkDir};

use crate::ToolError;

/// Directories never searched or listed in trees.
pub const EXCLUDED_DIRS: [&str; 4] = ["node_modules", ".git", "dist", "build"];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindTextOptions {
    /// Glob matched against file names, e.g. `*.ts` or `*.{ts,tsx}`.
    pub include: Option<String>,
    pub case_insensitive: bool,
    pub max_results: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMatch {
    pub path: String,
    pub line: usize,
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindTextResult {
    pub matches: Vec<TextMatch>,
    pub limit_reached: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u128,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// The project the agent edits. Tools only touch the filesystem and shell
/// through this trait.
#[async_trait]
pub trait Workspace: Send + Sync {
    fn root(&self) -> &Path;

    /// Paths that exist are used as given; everything else is taken relative
    /// to the root, with a leading `/` stripped.
    fn resolve_path(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() && (candidate.starts_with(self.root()) || candidate.exists()) {
            return candidate.to_path_buf();
        }
        self.root().join(path.trim_start_matches('/'))
    }

    async fn file_exists(&self, path: &str) -> Result<bool, ToolError>;
    async fn read_file(&self, path: &str) -> Result<String, ToolError>;
    async fn write_file(&self, path: &str, content: &str) -> Result<PathBuf, ToolError>;
    async fn create_dir(&self, path: &str) -> Result<PathBuf, ToolError>;
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, ToolError>;
    async fn find_text(&self, query: &str, options: FindTextOptions) -> Result<FindTextResult, ToolError>;
    async fn find_files(&self, pattern: &str, max_results: usize) -> Result<Vec<PathBuf>, ToolError>;
    async fn project_tree(&self, max_depth: usize) -> Result<String, ToolError>;
    async fn exec_command(&self, command: &str, timeout_ms: u64) -> Result<ExecResult, ToolError>;
}

#[derive(Clone, Debug)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn relative_display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

fn path_error(path: &Path, error: std::io::Error) -> ToolError {
    ToolError::Execution(format!("{}: {error}", path.display()))
}

fn is_excluded(entry: &WalkEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && EXCLUDED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref())
}

/// Expands one `{a,b}` group, which `glob` does not understand.
fn expand_braces(pattern: &str) -> Vec<String> {
    let (Some(open), Some(close)) = (pattern.find('{'), pattern.find('}')) else {
        return vec![pattern.to_string()];
    };
    if close < open {
        return vec![pattern.to_string()];
    }
    let (prefix, rest) = pattern.split_at(open);
    let alternatives = &rest[1..close - open];
    let suffix = &rest[close - open + 1..];
    alternatives
        .split(',')
        .map(|alternative| format!("{prefix}{alternative}{suffix}"))
        .collect()
}

fn compile_globs(pattern: &str) -> Result<Vec<Pattern>, ToolError> {
    expand_braces(pattern)
        .iter()
        .map(|expanded| {
            Pattern::new(expanded)
                .map_err(|error| ToolError::Validation(format!("invalid glob '{pattern}': {error}")))
        })
        .collect()
}

fn compile_query(query: &str, case_insensitive: bool) -> Result<Regex, ToolError> {
    RegexBuilder::new(query)
        .case_insensitive(case_insensitive)
        .build()
        .or_else(|_| {
            RegexBuilder::new(&regex::escape(query))
                .case_insensitive(case_insensitive)
                .build()
        })
        .map_err(|error| ToolError::Validation(format!("invalid query '{query}': {error}")))
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8_000).any(|byte| *byte == 0)
}

async fn run_blocking<T, F>(work: F) -> Result<T, ToolError>
where
    F: FnOnce() -> Result<T, ToolError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| ToolError::Execution(format!("workspace task failed: {error}")))?
}

#[async_trait]
impl Workspace for LocalWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn file_exists(&self, path: &str) -> Result<bool, ToolError> {
        let resolved = self.resolve_path(path);
        tokio::fs::try_exists(&resolved)
            .await
            .map_err(|error| path_error(&resolved, error))
    }

    async fn read_file(&self, path: &str) -> Result<String, ToolError> {
        let resolved = self.resolve_path(path);
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|error| path_error(&resolved, error))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<PathBuf, ToolError> {
        let resolved = self.resolve_path(path);
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| path_error(parent, error))?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|error| path_error(&resolved, error))?;
        Ok(resolved)
    }

    async fn create_dir(&self, path: &str) -> Result<PathBuf, ToolError> {
        let resolved = self.resolve_path(path);
        tokio::fs::create_dir_all(&resolved)
            .await
            .map_err(|error| path_error(&resolved, error))?;
        Ok(resolved)
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, ToolError> {
        let resolved = self.resolve_path(path);
        let mut reader = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|error| path_error(&resolved, error))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|error| path_error(&resolved, error))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|file_type| file_type.is_dir())
                .unwrap_or(false);
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn find_text(&self, query: &str, options: FindTextOptions) -> Result<FindTextResult, ToolError> {
        let regex = compile_query(query, options.case_insensitive)?;
        let include = options.include.as_deref().map(compile_globs).transpose()?;
        let root = self.root.clone();
        let workspace = self.clone();
        let max_results = options.max_results.max(1);

        run_blocking(move || {
            let mut result = FindTextResult::default();
            let walker = WalkDir::new(&root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| !is_excluded(entry));
            for entry in walker.filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(patterns) = &include {
                    let name = entry.file_name().to_string_lossy();
                    if !patterns.iter().any(|pattern| pattern.matches(&name)) {
                        continue;
                    }
                }
                let Ok(bytes) = std::fs::read(entry.path()) else {
                    continue;
                };
                if looks_binary(&bytes) {
                    continue;
                }
                let content = String::from_utf8_lossy(&bytes);
                for (index, line) in content.lines().enumerate() {
                    if !regex.is_match(line) {
                        continue;
                    }
                    if result.matches.len() == max_results {
                        result.limit_reached = true;
                        return Ok(result);
                    }
                    result.matches.push(TextMatch {
                        path: workspace.relative_display(entry.path()),
                        line: index + 1,
                        text: line.to_string(),
                    });
                }
            }
            Ok(result)
        })
        .await
    }

    async fn find_files(&self, pattern: &str, max_results: usize) -> Result<Vec<PathBuf>, ToolError> {
        let pattern = if pattern.contains('/') || pattern.starts_with("**/") {
            pattern.to_string()
        } else {
            format!("**/{pattern}")
        };
        let patterns = compile_globs(&pattern)?;
        let root = self.root.clone();
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };

        run_blocking(move || {
            let mut found = Vec::new();
            let walker = WalkDir::new(&root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| !is_excluded(entry));
            for entry in walker.filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                // `**/x` must also match `x` at the root.
                let relative = relative.to_string_lossy();
                let rooted = format!("/{relative}");
                if patterns.iter().any(|p| {
                    p.matches_with(&relative, options) || p.matches_with(&rooted, options)
                }) {
                    found.push(entry.path().to_path_buf());
                    if found.len() >= max_results {
                        break;
                    }
                }
            }
            Ok(found)
        })
        .await
    }

    async fn project_tree(&self, max_depth: usize) -> Result<String, ToolError> {
        let root = self.root.clone();
        run_blocking(move || {
            let mut tree = String::new();
            let walker = WalkDir::new(&root)
                .min_depth(1)
                .max_depth(max_depth.saturating_add(1))
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| {
                    let name = entry.file_name().to_string_lossy();
                    !(name.starts_with('.') || name == "node_modules" || name == "dist")
                });
            for entry in walker.filter_map(Result::ok) {
                let indent = "  ".repeat(entry.depth() - 1);
                let suffix = if entry.file_type().is_dir() { "/" } else { "" };
                tree.push_str(&format!(
                    "{indent}{}{suffix}\n",
                    entry.file_name().to_string_lossy()
                ));
            }
            Ok(tree)
        })
        .await
    }

    async fn exec_command(&self, command: &str, timeout_ms: u64) -> Result<ExecResult, ToolError> {
        let mut process = if cfg!(windows) {
            let mut process = tokio::process::Command::new("cmd");
            process.arg("/C").arg(command);
            process
        } else {
            let mut process = tokio::process::Command::new("sh");
            process.arg("-c").arg(command);
            process
        };
        process.current_dir(&self.root).kill_on_drop(true);

        let started = Instant::now();
        let output = tokio::time::timeout(Duration::from_millis(timeout_ms), process.output()).await;
        let duration_ms = started.elapsed().as_millis();

        match output {
            Ok(Ok(output)) => Ok(ExecResult {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
                timed_out: false,
                duration_ms,
            }),
            Ok(Err(error)) => Err(ToolError::Execution(format!("failed to spawn command: {error}"))),
            Err(_) => Ok(ExecResult {
                stderr: format!("command timed out after {timeout_ms} ms"),
                exit_code: -1,
                timed_out: true,
                duration_ms,
                ..ExecResult::default()
            }),
        }
    }
}
