use crate::{ToolError, truncate_tool_output};
use grab_llm::{ToolCall, ToolDefinition};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::{ToolContext, ToolOutput, validate_tool_arguments};

pub type ToolFuture = Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send>>;
pub type ToolExecutor = Arc<dyn Fn(Value, ToolContext) -> ToolFuture + Send + Sync>;

pub const TOOL_NOT_FOUND: &str = "Tool not found";
pub const EMPTY_TOOL_RESULT: &str = "Tool returned no result";

#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub executor: ToolExecutor,
}

/// Tools in registration order. Re-registering a name replaces the tool in place.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn register(&mut self, tool: RegisteredTool) {
        match self
            .tools
            .iter_mut()
            .find(|existing| existing.definition.name == tool.definition.name)
        {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
    }

    /// A copy of this registry with `tool` added.
    pub fn with_tool(&self, tool: RegisteredTool) -> Self {
        let mut extended = self.clone();
        extended.register(tool);
        extended
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|tool| tool.definition.name == name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition.clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|tool| tool.definition.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Runs one call. Failures come back as result text so the model can react.
    pub async fn execute(&self, call: &ToolCall, context: ToolContext) -> ToolOutput {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.call_id, "model requested unknown tool");
            return ToolOutput::text(TOOL_NOT_FOUND);
        };

        let config = Arc::clone(&context.config);
        let started = Instant::now();
        let result = match validate_tool_arguments(&tool.definition.parameters, &call.input) {
            Ok(()) => (tool.executor)(call.input.clone(), context).await,
            Err(error) => Err(error),
        };
        let duration_ms = started.elapsed().as_millis();

        match result {
            Ok(output) if output.text.trim().is_empty() && output.image.is_none() => {
                debug!(tool = %call.name, duration_ms, "tool returned no output");
                ToolOutput::text(EMPTY_TOOL_RESULT)
            }
            Ok(mut output) => {
                debug!(tool = %call.name, duration_ms, chars = output.text.len(), "tool finished");
                output.text = truncate_tool_output(&output.text, &call.name, &config);
                output
            }
            Err(error) => {
                warn!(tool = %call.name, duration_ms, error = %error, "tool failed");
                ToolOutput::text(format!("Error executing tool: {error}"))
            }
        }
    }
}
