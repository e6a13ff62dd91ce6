use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;

use super::{
    FIND_TEXT_TOOL, RegisteredTool, ToolOutput, optional_bool_argument, optional_string_argument,
    optional_usize_argument, required_string_argument,
};
use crate::FindTextOptions;

pub(super) fn find_text_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: FIND_TEXT_TOOL.to_string(),
            description: "Search file contents for text or a regular expression. Skips node_modules, .git, dist and build.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": { "type": "string", "description": "The text or regex to search for" },
                    "include_pattern": {
                        "type": "string",
                        "description": "Glob pattern for files to include (e.g. \"*.ts\" or \"*.{ts,tsx}\")"
                    },
                    "case_insensitive": { "type": "boolean" },
                    "max_results": { "type": "number", "description": "Maximum number of results to return (default: 100)" }
                },
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|args, context| {
            Box::pin(async move {
                let query = required_string_argument(&args, "query")?;
                let include = optional_string_argument(&args, "include_pattern")?;
                let max_results = optional_usize_argument(&args, "max_results")?
                    .filter(|max| *max > 0)
                    .unwrap_or(context.config.find_text_max_results);

                context.sink.markdown(&match &include {
                    Some(include) => format!("Search: `{query}` in `{include}`\n"),
                    None => format!("Search: `{query}`\n"),
                });

                let result = context
                    .workspace
                    .find_text(
                        &query,
                        FindTextOptions {
                            include,
                            case_insensitive: optional_bool_argument(&args, "case_insensitive")?
                                .unwrap_or(false),
                            max_results,
                        },
                    )
                    .await?;

                if result.matches.is_empty() {
                    return Ok(ToolOutput::text("No matches found."));
                }
                let mut text = result
                    .matches
                    .iter()
                    .map(|found| format!("{}:{}:{}", found.path, found.line, found.text))
                    .collect::<Vec<_>>()
                    .join("\n");
                if result.limit_reached {
                    text.push_str(&format!(
                        "\n... (showing first {max_results} results, use max_results for more)"
                    ));
                }
                Ok(ToolOutput::text(text))
            })
        }),
    }
}
