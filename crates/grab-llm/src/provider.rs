//! Model provider contract.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::SDKError;
use crate::stream::FragmentStream;
use crate::types::{ModelCapabilities, ModelInfo, TurnRequest};

#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn info(&self) -> &ModelInfo;

    fn capabilities(&self) -> ModelCapabilities;

    /// Starts one model round trip. Implementations stop producing fragments
    /// once `cancel` fires; callers may also just drop the stream.
    async fn send_turn(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, SDKError>;
}
