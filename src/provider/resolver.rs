//! Model-to-client resolution.
//!
//! Sections are assigned model identifiers, not clients. A resolver turns an identifier
//! into a shareable client; the default pool builds one client per model from the
//! configured provider profile and reuses it for the rest of the process.

use crate::error::ApiError;
use crate::provider::{ModelProviderClient, ProviderConfig, ProviderFactory};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolve a model identifier to a client.
pub trait ModelClientResolver: Send + Sync {
    fn client_for(&self, model: &str) -> Result<Arc<dyn ModelProviderClient>, ApiError>;

    /// Model used when no worker model list is configured.
    fn default_model(&self) -> &str;
}

/// Client pool over a single provider profile.
pub struct ProviderClientPool {
    config: ProviderConfig,
    clients: RwLock<HashMap<String, Arc<dyn ModelProviderClient>>>,
}

impl ProviderClientPool {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

impl ModelClientResolver for ProviderClientPool {
    fn client_for(&self, model: &str) -> Result<Arc<dyn ModelProviderClient>, ApiError> {
        if let Some(client) = self.clients.read().get(model) {
            return Ok(client.clone());
        }

        let provider = self.config.with_model(model).to_model_provider()?;
        let client: Arc<dyn ModelProviderClient> = Arc::from(ProviderFactory::create_client(&provider)?);

        let mut clients = self.clients.write();
        Ok(clients
            .entry(model.to_string())
            .or_insert(client)
            .clone())
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }
}
