use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Image formats providers accept as raw data parts.
pub const SUPPORTED_IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Base64 image supplied by the external client (usually a screenshot).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(rename = "type")]
    pub mime_type: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ImageAttachment {
    pub fn new(
        mime_type: impl Into<String>,
        data: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
            description,
        }
    }

    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8], description: Option<String>) -> Self {
        Self::new(mime_type, STANDARD.encode(bytes), description)
    }

    /// Lowercased mime type with the common `image/jpg` alias folded into `image/jpeg`.
    pub fn normalized_mime_type(&self) -> String {
        let mime = self.mime_type.trim().to_ascii_lowercase();
        if mime == "image/jpg" {
            "image/jpeg".to_string()
        } else {
            mime
        }
    }

    pub fn is_supported_format(&self) -> bool {
        SUPPORTED_IMAGE_TYPES.contains(&self.normalized_mime_type().as_str())
    }

    /// Human label for the image at `index` within its request.
    pub fn label(&self, index: usize) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(description) if !description.is_empty() => description.to_string(),
            _ => format!("Screenshot {}", index + 1),
        }
    }

    /// Decodes the payload, accepting either bare base64 or a `data:` URL.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let payload = match self.data.split_once(";base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => self.data.as_str(),
        };
        STANDARD.decode(payload.trim())
    }

    pub fn data_url(&self) -> String {
        if self.data.starts_with("data:") {
            return self.data.clone();
        }
        format!("data:{};base64,{}", self.normalized_mime_type(), self.data)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub input: Value,
}

impl ToolCall {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            input,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub content: Vec<ContentPart>,
}

impl ToolResult {
    pub fn text(call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn text_content(&self) -> String {
        collect_text(&self.content)
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageAttachment> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::Image { image } => Some(image),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { image: ImageAttachment },
    ToolCall { call: ToolCall },
    ToolResult { result: ToolResult },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(image: ImageAttachment) -> Self {
        Self::Image { image }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self::ToolCall { call }
    }

    pub fn tool_result(result: ToolResult) -> Self {
        Self::ToolResult { result }
    }

    fn has_image(&self) -> bool {
        match self {
            Self::Image { .. } => true,
            Self::ToolResult { result } => result.content.iter().any(ContentPart::has_image),
            Self::Text { .. } | Self::ToolCall { .. } => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self { role, content }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentPart::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::text(text)])
    }

    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self::new(
            Role::User,
            results.into_iter().map(ContentPart::tool_result).collect(),
        )
    }

    pub fn text(&self) -> String {
        collect_text(&self.content)
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall { call } => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn has_images(&self) -> bool {
        self.content.iter().any(ContentPart::has_image)
    }
}

fn collect_text(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// What a model accepts. Queried once per session through
/// [`crate::ModelProvider::capabilities`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub supports_vision: bool,
    pub supports_tools: bool,
    /// `None` when the provider takes any number of images in one message.
    pub max_images_per_turn: Option<usize>,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            supports_vision: false,
            supports_tools: true,
            max_images_per_turn: Some(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
}

/// One model round trip: full history, offered tools, and provider options
/// such as the vision request flag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub model_options: HashMap<String, String>,
}
