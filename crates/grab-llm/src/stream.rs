use futures::Stream;
use std::pin::Pin;

use crate::errors::SDKError;
use crate::types::ToolCall;

/// Unit of streamed model output.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamFragment {
    Text(String),
    ToolCall(ToolCall),
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<StreamFragment, SDKError>> + Send>>;

/// Wraps an already-materialised fragment list as a stream.
pub fn fragment_stream(
    fragments: impl IntoIterator<Item = Result<StreamFragment, SDKError>>,
) -> FragmentStream {
    let fragments: Vec<_> = fragments.into_iter().collect();
    Box::pin(futures::stream::iter(fragments))
}
