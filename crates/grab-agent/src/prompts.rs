//! System prompt and user query assembly.

use grab_llm::Message;
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;
use tracing::debug;

use crate::Workspace;

pub const AGENTS_MD_FILE: &str = "AGENTS.md";
pub const SOURCE_CONTEXT_LINES: usize = 10;

pub const DEFAULT_SYSTEM_PROMPT: &str = "
## Core Rules:

1. **Use Context First**
   - Context contains exact code snippets, file paths, and component locations
   - Look for `data-tsd-source=\"/src/...\"` attributes or `at localhost:PORT/src/...` patterns
   - Do NOT search the project when context provides the location

2. **Handle Screenshots**
   - If screenshots are listed, fetch them via GET request to analyze visual context
   - Screenshots help understand UI state, errors, or layout issues
   - Use the exact URL provided (e.g., `GET http://localhost:6567/screenshot/{id}/{index}`)

3. **Make Targeted Edits**
   - PREFER `replace_string` for precise code modifications
   - Use `create_file` only for new files or full file replacements
   - Use `apply_patch` with a unified diff for changes spanning several hunks or files
   - Read a file before editing it when the context does not show the exact text

4. **Act Decisively**
   - NEVER ask for confirmation - proceed with the information given
   - If a path is truncated, infer the extension (.tsx for React, .ts for TypeScript)
   - If first attempt fails, try alternatives silently
   - Make reasonable assumptions and ACT immediately

5. **Be Concise**
   - Execute changes directly, don't describe what you \"could\" do
   - No explanations unless explicitly requested
   - Action over description
";

/// Inputs to the session's system message.
#[derive(Clone, Debug, Default)]
pub struct SystemPromptParts<'a> {
    pub custom_system_prompt: Option<&'a str>,
    pub request_system_prompt: Option<&'a str>,
    pub agents_md: Option<&'a str>,
}

impl SystemPromptParts<'_> {
    pub fn render(&self) -> String {
        let mut prompt = base_system_prompt(self.custom_system_prompt).to_string();
        if let Some(request) = non_blank(self.request_system_prompt) {
            prompt.push_str("\n\n");
            prompt.push_str(request);
        }
        if let Some(agents_md) = non_blank(self.agents_md) {
            prompt.push_str("\n\n## Project Guidelines (from AGENTS.md):\n");
            prompt.push_str(agents_md);
        }
        prompt
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|text| !text.is_empty())
}

/// The configured custom prompt when non-blank, else [`DEFAULT_SYSTEM_PROMPT`].
pub fn base_system_prompt(custom: Option<&str>) -> &str {
    non_blank(custom).unwrap_or(DEFAULT_SYSTEM_PROMPT)
}

pub fn initial_messages(system_prompt: String, user_query: String) -> Vec<Message> {
    vec![Message::system(system_prompt), Message::user(user_query)]
}

/// Where the external client can fetch a request's screenshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScreenshotInfo {
    pub request_id: String,
    pub base_url: String,
    pub labels: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct EnrichQueryOptions<'a> {
    pub prompt: &'a str,
    pub content: Option<&'a str>,
    pub custom_system_prompt: Option<&'a str>,
    pub request_system_prompt: Option<&'a str>,
    pub screenshots: Option<ScreenshotInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrichedQuery {
    pub query: String,
    pub source_context_added: bool,
}

/// Self-contained query for hosts that take only a prompt: instructions,
/// context and screenshot URLs travel inside the text.
pub async fn build_enriched_query(workspace: &dyn Workspace, options: EnrichQueryOptions<'_>) -> EnrichedQuery {
    let (prompt, source_context_added) =
        enrich_with_source_context(workspace, options.prompt, options.content).await;

    let mut instructions = base_system_prompt(options.custom_system_prompt).to_string();
    if let Some(request) = non_blank(options.request_system_prompt) {
        instructions.push_str("\n\n");
        instructions.push_str(request);
    }

    let mut sections = vec![
        "## Request Structure:\n\
         - **Instructions**: Guidelines and rules for how to handle the request\n\
         - **Context**: Selected code elements, file paths, and relevant information\n\
         - **Screenshots Available**: URLs to fetch visual context (if provided)\n\
         - **User Prompt**: The actual task or question from the user\n"
            .to_string(),
        format!("## Instructions:\n{instructions}"),
    ];
    if let Some(content) = options.content.filter(|content| !content.is_empty()) {
        sections.push(format!("## Context:\n{content}"));
    }
    if let Some(screenshots) = options.screenshots.filter(|info| !info.labels.is_empty()) {
        let base_url = screenshots.base_url.trim_end_matches('/');
        let lines = screenshots
            .labels
            .iter()
            .enumerate()
            .map(|(index, label)| {
                format!(
                    "- {label}: GET {base_url}/screenshot/{}/{index}",
                    screenshots.request_id
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("## Screenshots Available:\n{lines}"));
    }
    sections.push(format!("## User Prompt:\n{prompt}"));

    EnrichedQuery {
        query: sections.join("\n\n"),
        source_context_added,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFileReference {
    pub path: String,
    pub line: usize,
}

fn source_files_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        RegexBuilder::new(r"Source Files:\s*([\s\S]*?)(?:\n\n|$)")
            .case_insensitive(true)
            .build()
            .expect("source files pattern should compile")
    })
}

fn source_entry_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        RegexBuilder::new(r"^\s*-\s*([^:\s]+):(\d+)(?::\d+)?")
            .multi_line(true)
            .build()
            .expect("source entry pattern should compile")
    })
}

/// First `- path:line[:column]` entry under a `Source Files:` heading.
pub fn parse_source_file_reference(text: &str) -> Option<SourceFileReference> {
    let section = source_files_pattern().captures(text)?.get(1)?.as_str();
    let entry = source_entry_pattern().captures(section)?;
    Some(SourceFileReference {
        path: entry.get(1)?.as_str().to_string(),
        line: entry.get(2)?.as_str().parse().ok()?,
    })
}

/// Lines around `target_line` (1-based), numbered, with `>` on the target.
pub fn format_source_lines(content: &str, target_line: usize, context_lines: usize) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let target = target_line.saturating_sub(1);
    let start = target.saturating_sub(context_lines);
    let end = (target + context_lines).min(lines.len().saturating_sub(1));
    (start..=end)
        .filter_map(|index| lines.get(index).map(|line| (index + 1, line)))
        .map(|(number, line)| {
            let marker = if number == target_line { ">" } else { " " };
            format!("{marker}{number:>4}: {line}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rendered source context section, or `None` when the file cannot be read.
pub async fn source_context(workspace: &dyn Workspace, reference: &SourceFileReference) -> Option<String> {
    let content = match workspace.read_file(&reference.path).await {
        Ok(content) => content,
        Err(error) => {
            debug!(path = %reference.path, error = %error, "source context unavailable");
            return None;
        }
    };
    let block = format_source_lines(&content, reference.line, SOURCE_CONTEXT_LINES);
    Some(format!(
        "\n\n## Source Context ({}:{}):\n```\n{block}\n```",
        reference.path, reference.line
    ))
}

/// Appends source context for the first referenced file found in the
/// prompt or, failing that, the context payload.
pub async fn enrich_with_source_context(
    workspace: &dyn Workspace,
    prompt: &str,
    content: Option<&str>,
) -> (String, bool) {
    let reference = parse_source_file_reference(prompt)
        .or_else(|| content.and_then(parse_source_file_reference));
    let Some(reference) = reference else {
        return (prompt.to_string(), false);
    };
    match source_context(workspace, &reference).await {
        Some(context) => (format!("{prompt}{context}"), true),
        None => (prompt.to_string(), false),
    }
}

/// Project guidelines from `AGENTS.md` at the workspace root.
pub async fn load_agents_md(workspace: &dyn Workspace) -> Option<String> {
    let path = workspace.root().join(AGENTS_MD_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) if !content.trim().is_empty() => Some(content),
        Ok(_) => None,
        Err(error) => {
            debug!(path = %path.display(), error = %error, "no project guidelines loaded");
            None
        }
    }
}
