use std::time::Duration;

pub const DEFAULT_PORT: u16 = 6567;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    pub port: u16,
    /// Ceiling on waiting for a session to report completion. On expiry the
    /// request finishes as done.
    pub completion_timeout: Duration,
    /// How long direct-mode screenshots stay fetchable.
    pub screenshot_retention: Duration,
    /// Base URL put into screenshot links; `http://localhost:<port>` when unset.
    pub public_base_url: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            completion_timeout: Duration::from_secs(60),
            screenshot_retention: Duration::from_secs(10 * 60),
            public_base_url: None,
        }
    }
}

impl BridgeConfig {
    pub fn base_url(&self) -> String {
        match self.public_base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("http://localhost:{}", self.port),
        }
    }
}
