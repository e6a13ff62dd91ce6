//! Streaming adapter for OpenAI-compatible `/chat/completions` endpoints.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{ConfigurationError, SDKError};
use crate::provider::ModelProvider;
use crate::stream::{FragmentStream, StreamFragment};
use crate::types::{
    ContentPart, ImageAttachment, Message, ModelCapabilities, ModelInfo, Role, ToolCall,
    ToolDefinition, TurnRequest,
};
use crate::utils::sse::SseParser;

const FRAGMENT_BUFFER: usize = 64;

#[derive(Clone, Debug)]
pub struct OpenAiCompatibleConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub display_name: Option<String>,
    pub capabilities: ModelCapabilities,
    pub connect_timeout: Duration,
}

impl OpenAiCompatibleConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            display_name: None,
            capabilities: ModelCapabilities::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub struct OpenAiCompatibleProvider {
    http: reqwest::Client,
    config: OpenAiCompatibleConfig,
    info: ModelInfo,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, SDKError> {
        if config.model.trim().is_empty() {
            return Err(ConfigurationError::new("model id must not be empty").into());
        }
        if config.base_url.trim().is_empty() {
            return Err(ConfigurationError::new("base url must not be empty").into());
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|error| ConfigurationError::new(format!("http client: {error}")))?;
        let info = ModelInfo {
            id: config.model.clone(),
            name: config
                .display_name
                .clone()
                .unwrap_or_else(|| config.model.clone()),
            provider: "openai-compatible".to_string(),
        };

        Ok(Self { http, config, info })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, request: &TurnRequest) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": convert_messages(&request.messages),
            "stream": true,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(convert_tool).collect());
            body["tool_choice"] = Value::String("auto".to_string());
        }
        body
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatibleProvider {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn capabilities(&self) -> ModelCapabilities {
        self.config.capabilities
    }

    async fn send_turn(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, SDKError> {
        let body = self.request_body(&request);
        debug!(
            model = %self.config.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            options = ?request.model_options,
            "sending chat completion request"
        );

        let mut builder = self.http.post(self.endpoint()).json(&body);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }
        for (name, value) in &request.model_options {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(SDKError::Cancelled),
            response = builder.send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SDKError::provider(Some(status.as_u16()), error_message(&text)));
        }

        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        tokio::spawn(pump_fragments(response.bytes_stream(), tx, cancel));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

type FragmentSender = mpsc::Sender<Result<StreamFragment, SDKError>>;

async fn pump_fragments<S>(bytes: S, tx: FragmentSender, cancel: CancellationToken)
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let mut bytes = Box::pin(bytes);
    let mut parser = SseParser::new();
    let mut calls = ToolCallAssembler::default();
    let mut undecoded = Vec::new();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tx.closed() => return,
            chunk = bytes.next() => chunk,
        };
        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(error)) => {
                let _ = tx.send(Err(SDKError::Stream(error.to_string()))).await;
                return;
            }
            None => break,
        };

        let text = decode_utf8_chunk(&mut undecoded, &chunk);
        for event in parser.push(&text) {
            let finished = event.is_done_marker();
            let outcome = if finished {
                Ok(ChunkOutcome {
                    fragments: calls.drain(),
                    finished: true,
                })
            } else {
                apply_chunk(&event.data, &mut calls)
            };
            match outcome {
                Ok(outcome) => {
                    for fragment in outcome.fragments {
                        if tx.send(Ok(fragment)).await.is_err() {
                            return;
                        }
                    }
                    if outcome.finished {
                        debug!(done_marker = finished, "model finished turn");
                    }
                    if finished {
                        return;
                    }
                }
                Err(error) => {
                    let _ = tx.send(Err(error)).await;
                    return;
                }
            }
        }
    }

    if let Some(event) = parser.finish() {
        if !event.is_done_marker() {
            if let Ok(outcome) = apply_chunk(&event.data, &mut calls) {
                for fragment in outcome.fragments {
                    if tx.send(Ok(fragment)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
    for fragment in calls.drain() {
        if tx.send(Ok(fragment)).await.is_err() {
            return;
        }
    }
}

/// Appends `chunk` to `pending` and returns the longest valid UTF-8 prefix,
/// keeping an incomplete trailing code point for the next chunk.
fn decode_utf8_chunk(pending: &mut Vec<u8>, chunk: &[u8]) -> String {
    pending.extend_from_slice(chunk);
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        Err(error) if error.error_len().is_none() => {
            let valid = error.valid_up_to();
            let rest = pending.split_off(valid);
            let text = String::from_utf8_lossy(pending).into_owned();
            *pending = rest;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct ChunkOutcome {
    fragments: Vec<StreamFragment>,
    finished: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

fn apply_chunk(data: &str, calls: &mut ToolCallAssembler) -> Result<ChunkOutcome, SDKError> {
    let chunk: ChatChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(error) => {
            warn!(error = %error, "skipping malformed stream chunk");
            return Ok(ChunkOutcome::default());
        }
    };
    if let Some(error) = chunk.error {
        return Err(SDKError::provider(None, error.message));
    }

    let mut outcome = ChunkOutcome::default();
    for choice in chunk.choices {
        if let Some(delta) = choice.delta {
            if let Some(content) = delta.content.filter(|content| !content.is_empty()) {
                outcome.fragments.push(StreamFragment::Text(content));
            }
            for call in delta.tool_calls.unwrap_or_default() {
                calls.apply(call);
            }
        }
        if choice.finish_reason.is_some() {
            outcome.fragments.extend(calls.drain());
            outcome.finished = true;
        }
    }
    Ok(outcome)
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Rebuilds tool calls whose name and arguments arrive split across chunks.
#[derive(Debug, Default)]
struct ToolCallAssembler {
    calls: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAssembler {
    fn apply(&mut self, delta: ChunkToolCall) {
        let entry = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            entry.id = Some(id);
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                entry.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    fn drain(&mut self) -> Vec<StreamFragment> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .map(|(index, call)| {
                let input = if call.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&call.arguments)
                        .unwrap_or(Value::String(call.arguments))
                };
                StreamFragment::ToolCall(ToolCall {
                    call_id: call.id.unwrap_or_else(|| format!("call_{index}")),
                    name: call.name,
                    input,
                })
            })
            .collect()
    }
}

fn convert_tool(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn image_part(image: &ImageAttachment) -> Value {
    json!({
        "type": "image_url",
        "image_url": { "url": image.data_url() }
    })
}

fn convert_messages(messages: &[Message]) -> Vec<Value> {
    let mut converted = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            Role::System => converted.push(json!({
                "role": "system",
                "content": message.text(),
            })),
            Role::Assistant => {
                let text = message.text();
                let mut entry = json!({
                    "role": "assistant",
                    "content": if text.is_empty() { Value::Null } else { Value::String(text) },
                });
                let calls: Vec<Value> = message
                    .tool_calls()
                    .into_iter()
                    .map(|call| {
                        json!({
                            "id": call.call_id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.input.to_string(),
                            }
                        })
                    })
                    .collect();
                if !calls.is_empty() {
                    entry["tool_calls"] = Value::Array(calls);
                }
                converted.push(entry);
            }
            Role::User => {
                let mut parts = Vec::new();
                let mut tool_images = Vec::new();
                for part in &message.content {
                    match part {
                        ContentPart::Text { text } => {
                            parts.push(json!({ "type": "text", "text": text }));
                        }
                        ContentPart::Image { image } => parts.push(image_part(image)),
                        ContentPart::ToolResult { result } => {
                            converted.push(json!({
                                "role": "tool",
                                "tool_call_id": result.call_id,
                                "content": result.text_content(),
                            }));
                            tool_images.extend(result.images().map(image_part));
                        }
                        ContentPart::ToolCall { .. } => {}
                    }
                }
                // Tool messages cannot carry images; forward them as user content.
                if !tool_images.is_empty() {
                    parts.push(json!({ "type": "text", "text": "Images returned by tools:" }));
                    parts.extend(tool_images);
                }
                if !parts.is_empty() {
                    converted.push(json!({ "role": "user", "content": parts }));
                }
            }
        }
    }
    converted
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty error response".to_string()
            } else {
                trimmed.chars().take(500).collect()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolResult;

    fn provider() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(OpenAiCompatibleConfig::new(
            "http://localhost:1234/v1/",
            "test-model",
        ))
        .expect("provider should build")
    }

    #[test]
    fn rejects_empty_model() {
        let error = OpenAiCompatibleProvider::new(OpenAiCompatibleConfig::new("http://x", " "))
            .err()
            .expect("empty model should fail");
        assert!(error.to_string().contains("model id"));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            provider().endpoint(),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn request_body_places_tool_results_before_user_content() {
        let image = ImageAttachment::new("image/png", "AAAA", None);
        let messages = vec![
            Message::system("rules"),
            Message::user("hello"),
            Message::new(
                Role::Assistant,
                vec![
                    ContentPart::text("checking"),
                    ContentPart::tool_call(ToolCall::new("c1", "get_screenshot", json!({"index": 0}))),
                ],
            ),
            Message::tool_results(vec![ToolResult {
                call_id: "c1".to_string(),
                content: vec![ContentPart::text("Screenshot 1 retrieved"), ContentPart::image(image)],
            }]),
        ];
        let request = TurnRequest {
            messages,
            tools: vec![ToolDefinition {
                name: "get_screenshot".to_string(),
                description: "d".to_string(),
                parameters: json!({"type": "object"}),
            }],
            ..TurnRequest::default()
        };

        let body = provider().request_body(&request);
        let messages = body["messages"].as_array().expect("messages array");
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], "{\"index\":0}");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "c1");
        assert_eq!(messages[4]["role"], "user");
        assert_eq!(messages[4]["content"][1]["type"], "image_url");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn assembles_tool_calls_split_across_chunks() {
        let mut calls = ToolCallAssembler::default();
        let first = apply_chunk(
            r#"{"choices":[{"delta":{"content":"Looking","tool_calls":[{"index":0,"id":"call_a","function":{"name":"read_file","arguments":"{\"file"}}]}}]}"#,
            &mut calls,
        )
        .expect("first chunk");
        assert_eq!(first.fragments, vec![StreamFragment::Text("Looking".to_string())]);
        assert!(!first.finished);

        let second = apply_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"Path\":\"a.ts\"}"}}]},"finish_reason":"tool_calls"}]}"#,
            &mut calls,
        )
        .expect("second chunk");
        assert!(second.finished);
        assert_eq!(
            second.fragments,
            vec![StreamFragment::ToolCall(ToolCall::new(
                "call_a",
                "read_file",
                json!({"filePath": "a.ts"})
            ))]
        );
    }

    #[test]
    fn malformed_arguments_are_kept_as_raw_string() {
        let mut calls = ToolCallAssembler::default();
        calls.apply(ChunkToolCall {
            index: 2,
            id: None,
            function: Some(ChunkFunction {
                name: Some("list_dir".to_string()),
                arguments: Some("{oops".to_string()),
            }),
        });
        let fragments = calls.drain();
        let StreamFragment::ToolCall(call) = &fragments[0] else {
            panic!("expected tool call");
        };
        assert_eq!(call.call_id, "call_2");
        assert_eq!(call.input, Value::String("{oops".to_string()));
    }

    #[test]
    fn error_chunk_becomes_provider_error() {
        let mut calls = ToolCallAssembler::default();
        let error = apply_chunk(r#"{"error":{"message":"overloaded"}}"#, &mut calls)
            .expect_err("error chunk");
        assert_eq!(error, SDKError::provider(None, "overloaded"));
    }

    #[test]
    fn utf8_decoding_holds_back_split_code_points() {
        let bytes = "héllo".as_bytes();
        let mut pending = Vec::new();
        let first = decode_utf8_chunk(&mut pending, &bytes[..2]);
        assert_eq!(first, "h");
        let second = decode_utf8_chunk(&mut pending, &bytes[2..]);
        assert_eq!(second, "éllo");
        assert!(pending.is_empty());
    }

    #[test]
    fn error_message_prefers_structured_body() {
        assert_eq!(
            error_message(r#"{"error":{"message":"bad key"}}"#),
            "bad key"
        );
        assert_eq!(error_message("  "), "empty error response");
    }
}
