//! Registry of available models and selection of the active one.

use std::sync::Arc;

use crate::errors::{ConfigurationError, SDKError};
use crate::provider::ModelProvider;
use crate::types::ModelInfo;

#[derive(Clone, Default)]
pub struct Client {
    providers: Vec<Arc<dyn ModelProvider>>,
    default_provider: Option<String>,
}

impl Client {
    pub fn new(providers: Vec<Arc<dyn ModelProvider>>, default_provider: Option<String>) -> Self {
        Self {
            providers,
            default_provider,
        }
    }

    pub fn register_provider(&mut self, provider: Arc<dyn ModelProvider>) -> Result<(), SDKError> {
        let id = provider.info().id.clone();
        if self.providers.iter().any(|existing| existing.info().id == id) {
            return Err(ConfigurationError::new(format!("model '{id}' is already registered")).into());
        }
        if self.default_provider.is_none() {
            self.default_provider = Some(id);
        }
        self.providers.push(provider);
        Ok(())
    }

    pub fn set_default_provider(&mut self, id: impl Into<String>) {
        self.default_provider = Some(id.into());
    }

    pub fn models(&self) -> Vec<ModelInfo> {
        self.providers
            .iter()
            .map(|provider| provider.info().clone())
            .collect()
    }

    /// Picks the model a session should use: the requested id if present,
    /// otherwise the default, otherwise the first registered model.
    pub fn select_model(&self, preferred: Option<&str>) -> Option<Arc<dyn ModelProvider>> {
        let wanted = preferred
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or(self.default_provider.as_deref());

        if let Some(id) = wanted {
            if let Some(provider) = self.providers.iter().find(|p| p.info().id == id) {
                return Some(provider.clone());
            }
        }
        self.providers.first().cloned()
    }
}
