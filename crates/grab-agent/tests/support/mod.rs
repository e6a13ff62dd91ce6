#![allow(dead_code)]

use async_trait::async_trait;
use grab_llm::{
    Client, FragmentStream, ModelCapabilities, ModelInfo, ModelProvider, SDKError,
    StreamFragment, ToolCall, TurnRequest, fragment_stream,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub enum Reply {
    Fragments(Vec<StreamFragment>),
    Error(String),
}

#[derive(Clone)]
pub struct ScriptedProvider {
    pub info: ModelInfo,
    pub capabilities: ModelCapabilities,
    pub replies: Arc<Mutex<VecDeque<Reply>>>,
    pub requests: Arc<Mutex<Vec<TurnRequest>>>,
}

impl ScriptedProvider {
    pub fn new(capabilities: ModelCapabilities, replies: Vec<Reply>) -> Self {
        Self {
            info: ModelInfo {
                id: "scripted".to_string(),
                name: "Scripted Model".to_string(),
                provider: "test".to_string(),
            },
            capabilities,
            replies: Arc::new(Mutex::new(replies.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().expect("requests mutex").clone()
    }

    pub fn client(&self) -> Arc<Client> {
        Arc::new(Client::new(vec![Arc::new(self.clone())], None))
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn capabilities(&self) -> ModelCapabilities {
        self.capabilities
    }

    async fn send_turn(
        &self,
        request: TurnRequest,
        _cancel: CancellationToken,
    ) -> Result<FragmentStream, SDKError> {
        self.requests.lock().expect("requests mutex").push(request);
        let reply = self.replies.lock().expect("replies mutex").pop_front();
        match reply {
            Some(Reply::Fragments(fragments)) => {
                Ok(fragment_stream(fragments.into_iter().map(Ok)))
            }
            Some(Reply::Error(message)) => Err(SDKError::provider(Some(500), message)),
            None => Ok(fragment_stream([Ok(StreamFragment::Text("Done.".to_string()))])),
        }
    }
}

pub fn full_capabilities() -> ModelCapabilities {
    ModelCapabilities {
        supports_vision: true,
        supports_tools: true,
        max_images_per_turn: Some(1),
    }
}

pub fn text(value: &str) -> StreamFragment {
    StreamFragment::Text(value.to_string())
}

pub fn call(id: &str, name: &str, input: serde_json::Value) -> StreamFragment {
    StreamFragment::ToolCall(ToolCall::new(id, name, input))
}

/// 1x1 transparent PNG.
pub const PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";
