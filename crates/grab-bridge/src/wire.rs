//! Request body and event stream shapes of `POST /agent`.

use axum::response::sse::Event;
use grab_llm::ImageAttachment;
use serde::Deserialize;
use uuid::Uuid;

use crate::BridgeError;

/// JSON body as sent by the browser client.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequestBody {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<ImageAttachment>>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub direct_message: bool,
    #[serde(default)]
    pub background: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestMode {
    /// Queued, correlated turn whose status and completion are relayed.
    Participant,
    /// Fire-and-forget dispatch to the host surface.
    Direct,
}

/// A validated request with its bridge-assigned correlation id.
#[derive(Clone, Debug)]
pub struct AgentRequest {
    pub id: String,
    pub prompt: String,
    pub content: Option<String>,
    pub images: Vec<ImageAttachment>,
    pub system_prompt: Option<String>,
    pub mode: RequestMode,
    /// Run without bringing the chat view to the foreground.
    pub background: bool,
}

impl AgentRequest {
    pub fn from_body(body: AgentRequestBody) -> Result<Self, BridgeError> {
        let prompt = body
            .prompt
            .filter(|prompt| !prompt.trim().is_empty())
            .ok_or(BridgeError::PromptRequired)?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            prompt,
            content: body.content,
            images: body.images.unwrap_or_default(),
            system_prompt: body.system_prompt,
            mode: if body.direct_message {
                RequestMode::Direct
            } else {
                RequestMode::Participant
            },
            background: body.background,
        })
    }

    /// Prompt with context and the correlation marker, as handed to the host.
    pub fn compose_prompt(&self) -> String {
        let body = match self.content.as_deref() {
            Some(content) => format!("{}\n\nContext:\n{content}", self.prompt),
            None => self.prompt.clone(),
        };
        grab_agent::marker::embed(&body, &self.id)
    }

    pub fn prompt_preview(&self) -> String {
        preview(&self.prompt, 100)
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// One entry of the response stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeEvent {
    Status(String),
    Done,
    Error(String),
}

impl BridgeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Done => "done",
            Self::Error(_) => "error",
        }
    }

    pub fn data(&self) -> &str {
        match self {
            Self::Status(text) | Self::Error(text) => text,
            Self::Done => "",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Status(_))
    }

    pub fn to_sse(&self) -> Event {
        // SSE lines cannot carry carriage returns.
        Event::default()
            .event(self.name())
            .data(self.data().replace('\r', ""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_uses_camel_case_fields() {
        let body: AgentRequestBody = serde_json::from_str(
            r#"{
                "prompt": "Make it red",
                "systemPrompt": "be brief",
                "directMessage": true,
                "images": [{"type": "image/png", "data": "AAAA", "description": "nav"}]
            }"#,
        )
        .expect("body should parse");

        let request = AgentRequest::from_body(body).expect("request should validate");
        assert_eq!(request.mode, RequestMode::Direct);
        assert_eq!(request.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(request.images[0].description.as_deref(), Some("nav"));
        assert!(!request.background);
        assert!(Uuid::parse_str(&request.id).is_ok());
    }

    #[test]
    fn blank_prompt_is_rejected() {
        let body = AgentRequestBody {
            prompt: Some("  \n".to_string()),
            ..AgentRequestBody::default()
        };
        assert!(matches!(
            AgentRequest::from_body(body),
            Err(BridgeError::PromptRequired)
        ));
        assert!(matches!(
            AgentRequest::from_body(AgentRequestBody::default()),
            Err(BridgeError::PromptRequired)
        ));
    }

    #[test]
    fn composed_prompt_carries_context_and_marker() {
        let body = AgentRequestBody {
            prompt: Some("Fix the title".to_string()),
            content: Some("<h1 class=\"title\">".to_string()),
            ..AgentRequestBody::default()
        };
        let request = AgentRequest::from_body(body).expect("request");
        let composed = request.compose_prompt();

        assert!(composed.starts_with("Fix the title\n\nContext:\n<h1 class=\"title\">\n\n"));
        assert_eq!(
            grab_agent::extract_request_id(&composed).as_deref(),
            Some(request.id.as_str())
        );
    }

    #[test]
    fn marker_text_inside_content_does_not_hijack_correlation() {
        let body = AgentRequestBody {
            prompt: Some("Make [request-id:prompt-side] bold".to_string()),
            content: Some("<span>[request-id:someone-else]</span>".to_string()),
            ..AgentRequestBody::default()
        };
        let request = AgentRequest::from_body(body).expect("request");

        assert_eq!(
            grab_agent::extract_request_id(&request.compose_prompt()).as_deref(),
            Some(request.id.as_str())
        );
    }

    #[test]
    fn preview_truncates_long_prompts() {
        assert_eq!(preview("short", 100), "short");
        let long = "x".repeat(120);
        assert_eq!(preview(&long, 100), format!("{}...", "x".repeat(100)));
    }

    #[test]
    fn event_names_follow_stream_protocol() {
        assert_eq!(BridgeEvent::Status("use tool read_file".to_string()).name(), "status");
        assert!(BridgeEvent::Done.is_terminal());
        assert_eq!(BridgeEvent::Error("boom".to_string()).data(), "boom");
    }
}
