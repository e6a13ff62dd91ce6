//! Error taxonomy for provider calls.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure of a provider call or of the fragment stream it returned.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SDKError {
    #[error("provider error{}: {message}", status_suffix(.status))]
    Provider {
        status: Option<u16>,
        message: String,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("stream error: {0}")]
    Stream(String),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("request cancelled")]
    Cancelled,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" ({code})")).unwrap_or_default()
}

impl SDKError {
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for SDKError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::provider(Some(status.as_u16()), error.to_string());
        }
        Self::Network(error.to_string())
    }
}
