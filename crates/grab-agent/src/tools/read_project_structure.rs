use grab_llm::ToolDefinition;
use serde_json::json;
use std::sync::Arc;

use super::{READ_PROJECT_STRUCTURE_TOOL, RegisteredTool, ToolOutput, optional_usize_argument};

const DEFAULT_DEPTH: usize = 3;

pub(super) fn read_project_structure_tool() -> RegisteredTool {
    RegisteredTool {
        definition: ToolDefinition {
            name: READ_PROJECT_STRUCTURE_TOOL.to_string(),
            description: "Show the project's directory tree, skipping hidden entries, node_modules and dist".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "max_depth": { "type": "number", "description": "How many levels to show (default: 3)" }
                },
                "additionalProperties": false
            }),
        },
        executor: Arc::new(|args, context| {
            Box::pin(async move {
                let depth = optional_usize_argument(&args, "max_depth")?.unwrap_or(DEFAULT_DEPTH);
                let tree = context.workspace.project_tree(depth).await?;
                Ok(ToolOutput::text(tree))
            })
        }),
    }
}
