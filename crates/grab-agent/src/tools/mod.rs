mod apply_patch;
mod create_directory;
mod create_file;
mod edit_file;
mod find_files;
mod find_text;
mod get_screenshot;
mod list_dir;
mod read_file;
mod read_project_structure;
mod registry;
mod replace_string;
mod run_command;
mod scm_changes;
mod task_completed;

use crate::{EventBus, ResponseSink, SessionConfig, ToolError, Workspace};
use grab_llm::ImageAttachment;
use serde_json::Value;
use std::sync::Arc;

pub(crate) use get_screenshot::save_screenshot;
pub use get_screenshot::screenshot_tool;
pub use registry::{RegisteredTool, ToolExecutor, ToolFuture, ToolRegistry};

pub const READ_FILE_TOOL: &str = "read_file";
pub const CREATE_FILE_TOOL: &str = "create_file";
pub const CREATE_DIRECTORY_TOOL: &str = "create_directory";
pub const LIST_DIR_TOOL: &str = "list_dir";
pub const READ_PROJECT_STRUCTURE_TOOL: &str = "read_project_structure";
pub const FIND_FILES_TOOL: &str = "find_files";
pub const FIND_TEXT_TOOL: &str = "find_text";
pub const EDIT_FILE_TOOL: &str = "edit_file";
pub const REPLACE_STRING_TOOL: &str = "replace_string";
pub const APPLY_PATCH_TOOL: &str = "apply_patch";
pub const SCM_CHANGES_TOOL: &str = "scm_changes";
pub const RUN_COMMAND_TOOL: &str = "run_command";
pub const TASK_COMPLETED_TOOL: &str = "task_completed";
pub const GET_SCREENSHOT_TOOL: &str = "get_screenshot";

/// Everything a tool may touch while it runs.
#[derive(Clone)]
pub struct ToolContext {
    pub sink: Arc<dyn ResponseSink>,
    pub bus: Arc<EventBus>,
    pub request_id: Option<String>,
    pub workspace: Arc<dyn Workspace>,
    pub config: Arc<SessionConfig>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub image: Option<ImageAttachment>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(text: impl Into<String>, image: ImageAttachment) -> Self {
        Self {
            text: text.into(),
            image: Some(image),
        }
    }
}

/// The tools every session offers when the model supports tool calling.
pub fn build_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(read_file::read_file_tool());
    registry.register(create_file::create_file_tool());
    registry.register(create_directory::create_directory_tool());
    registry.register(list_dir::list_dir_tool());
    registry.register(read_project_structure::read_project_structure_tool());
    registry.register(edit_file::edit_file_tool());
    registry.register(replace_string::replace_string_tool());
    registry.register(apply_patch::apply_patch_tool());
    registry.register(find_files::find_files_tool());
    registry.register(find_text::find_text_tool());
    registry.register(scm_changes::scm_changes_tool());
    registry.register(run_command::run_command_tool());
    registry.register(task_completed::task_completed_tool());
    registry
}

fn required_string_argument(arguments: &Value, key: &str) -> Result<String, ToolError> {
    optional_string_argument(arguments, key)?
        .ok_or_else(|| ToolError::Validation(format!("missing required argument '{key}'")))
}

fn optional_string_argument(arguments: &Value, key: &str) -> Result<Option<String>, ToolError> {
    let Some(value) = arguments.get(key) else {
        return Ok(None);
    };
    let Some(value) = value.as_str() else {
        return Err(ToolError::Validation(format!("argument '{key}' must be a string")));
    };
    Ok(Some(value.to_string()))
}

fn optional_bool_argument(arguments: &Value, key: &str) -> Result<Option<bool>, ToolError> {
    let Some(value) = arguments.get(key) else {
        return Ok(None);
    };
    let Some(value) = value.as_bool() else {
        return Err(ToolError::Validation(format!("argument '{key}' must be a boolean")));
    };
    Ok(Some(value))
}

/// Models often send whole numbers as floats; `3.0` is accepted, `-1` and `2.5` are not.
fn optional_u64_argument(arguments: &Value, key: &str) -> Result<Option<u64>, ToolError> {
    let Some(value) = arguments.get(key) else {
        return Ok(None);
    };
    let parsed = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|number| number.fract() == 0.0 && *number >= 0.0)
            .map(|number| number as u64)
    });
    let Some(parsed) = parsed else {
        return Err(ToolError::Validation(format!(
            "argument '{key}' must be a non-negative integer"
        )));
    };
    Ok(Some(parsed))
}

fn optional_usize_argument(arguments: &Value, key: &str) -> Result<Option<usize>, ToolError> {
    Ok(optional_u64_argument(arguments, key)?.map(|value| value as usize))
}

pub(crate) fn validate_tool_arguments(schema: &Value, arguments: &Value) -> Result<(), ToolError> {
    let object = arguments
        .as_object()
        .ok_or_else(|| ToolError::Validation("tool arguments must be a JSON object".to_string()))?;

    let schema_object = schema
        .as_object()
        .ok_or_else(|| ToolError::Validation("tool schema root must be a JSON object".to_string()))?;

    if let Some(required) = schema_object.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(ToolError::Validation(format!("missing required argument '{key}'")));
            }
        }
    }

    let properties = schema_object
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let additional_allowed = schema_object
        .get("additionalProperties")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    for (key, value) in object {
        let Some(property) = properties.get(key) else {
            if additional_allowed {
                continue;
            }
            return Err(ToolError::Validation(format!(
                "unexpected argument '{key}' not allowed by schema"
            )));
        };

        if let Some(type_name) = property.get("type").and_then(Value::as_str) {
            let is_valid = match type_name {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                "null" => value.is_null(),
                _ => true,
            };

            if !is_valid {
                return Err(ToolError::Validation(format!(
                    "argument '{key}' expected type '{type_name}' but received '{}'",
                    json_type_name(value)
                )));
            }
        }
    }

    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Last path component, for compact sink lines.
fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
