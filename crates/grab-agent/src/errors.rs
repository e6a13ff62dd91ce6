use thiserror::Error;

/// Top-level error type for the grab-agent crate.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Llm(#[from] grab_llm::SDKError),
}

/// Failure raised inside a tool executor. The registry turns it into
/// result text; it never aborts the session.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Execution(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host surface is shut down")]
    ShutDown,
    #[error("host rejected turn: {0}")]
    Rejected(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queued task aborted before producing a result")]
    TaskAborted,
}
