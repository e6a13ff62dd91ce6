use std::collections::HashMap;
use std::path::PathBuf;

use crate::AgentError;
use crate::tools::{
    APPLY_PATCH_TOOL, CREATE_FILE_TOOL, EDIT_FILE_TOOL, FIND_FILES_TOOL, FIND_TEXT_TOOL,
    GET_SCREENSHOT_TOOL, LIST_DIR_TOOL, READ_FILE_TOOL, READ_PROJECT_STRUCTURE_TOOL,
    REPLACE_STRING_TOOL, RUN_COMMAND_TOOL, SCM_CHANGES_TOOL,
};

/// Runtime configuration for a chat session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Upper bound on model round trips in one session.
    pub max_tool_rounds: usize,
    /// Replaces the built-in system prompt when set.
    pub custom_system_prompt: Option<String>,
    pub use_agents_md: bool,
    pub send_screenshots_to_model: bool,
    /// Cap on the thinking text relayed as one status event.
    pub status_excerpt_chars: usize,
    pub tool_output_limits: HashMap<String, usize>,
    pub tool_line_limits: HashMap<String, usize>,
    pub default_command_timeout_ms: u64,
    pub max_command_timeout_ms: u64,
    pub find_text_max_results: usize,
    /// Where attached screenshots are written for display; the system temp
    /// directory when unset.
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 200,
            custom_system_prompt: None,
            use_agents_md: true,
            send_screenshots_to_model: true,
            status_excerpt_chars: 4_000,
            tool_output_limits: default_tool_output_limits(),
            tool_line_limits: default_tool_line_limits(),
            default_command_timeout_ms: 30_000,
            max_command_timeout_ms: 600_000,
            find_text_max_results: 100,
            screenshot_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn screenshot_dir(&self) -> PathBuf {
        self.screenshot_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("grab-screenshots"))
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.max_tool_rounds == 0 {
            return Err(AgentError::InvalidConfiguration(
                "max_tool_rounds must be at least 1".to_string(),
            ));
        }
        if self.status_excerpt_chars == 0 {
            return Err(AgentError::InvalidConfiguration(
                "status_excerpt_chars must be at least 1".to_string(),
            ));
        }
        if self.find_text_max_results == 0 {
            return Err(AgentError::InvalidConfiguration(
                "find_text_max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn default_tool_output_limits() -> HashMap<String, usize> {
    HashMap::from([
        (READ_FILE_TOOL.to_string(), 50_000),
        (RUN_COMMAND_TOOL.to_string(), 30_000),
        (FIND_TEXT_TOOL.to_string(), 20_000),
        (LIST_DIR_TOOL.to_string(), 20_000),
        (FIND_FILES_TOOL.to_string(), 20_000),
        (READ_PROJECT_STRUCTURE_TOOL.to_string(), 30_000),
        (REPLACE_STRING_TOOL.to_string(), 10_000),
        (APPLY_PATCH_TOOL.to_string(), 10_000),
        (SCM_CHANGES_TOOL.to_string(), 40_000),
        (CREATE_FILE_TOOL.to_string(), 1_000),
        (EDIT_FILE_TOOL.to_string(), 1_000),
        (GET_SCREENSHOT_TOOL.to_string(), 1_000),
    ])
}

pub fn default_tool_line_limits() -> HashMap<String, usize> {
    HashMap::from([
        (RUN_COMMAND_TOOL.to_string(), 256),
        (SCM_CHANGES_TOOL.to_string(), 1_000),
        (FIND_TEXT_TOOL.to_string(), 200),
        (LIST_DIR_TOOL.to_string(), 500),
        (READ_PROJECT_STRUCTURE_TOOL.to_string(), 1_000),
    ])
}
