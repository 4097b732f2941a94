//! Provider profile: config shape, validation, and conversion to a concrete client spec.

use crate::error::ApiError;
use crate::provider::{CompletionOptions, ModelProvider};
use serde::{Deserialize, Serialize};

/// Kind of model service behind a provider profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Ollama,
    #[serde(rename = "openai")]
    OpenAI,
    /// Self-hosted server speaking the OpenAI-compatible API
    Local,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Ollama => "ollama",
            ProviderType::OpenAI => "openai",
            ProviderType::Local => "local",
        }
    }
}

/// Provider configuration as it appears in `[provider]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_type")]
    pub provider_type: ProviderType,

    /// Default model; worker models fall back to this one
    #[serde(default = "default_model")]
    pub model: String,

    /// API key; for OpenAI falls back to the OPENAI_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the service
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub default_options: CompletionOptions,
}

fn default_provider_type() -> ProviderType {
    ProviderType::Ollama
}

fn default_model() -> String {
    "qwen2.5:7b".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            model: default_model(),
            api_key: None,
            endpoint: None,
            default_options: CompletionOptions::default(),
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if self.provider_type == ProviderType::Local && self.endpoint.is_none() {
            return Err("Local providers require an endpoint".to_string());
        }
        if let Some(endpoint) = &self.endpoint {
            if endpoint.trim().is_empty() {
                return Err("Endpoint cannot be empty when set".to_string());
            }
        }
        if let Some(temperature) = self.default_options.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(format!(
                    "Temperature {} out of range (0.0-2.0)",
                    temperature
                ));
            }
        }
        Ok(())
    }

    /// Same service, different model.
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    fn resolved_endpoint(&self) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| {
            if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint.clone()
            } else {
                format!("http://{}", endpoint)
            }
        })
    }

    pub fn to_model_provider(&self) -> Result<ModelProvider, ApiError> {
        self.validate().map_err(ApiError::ConfigError)?;
        match self.provider_type {
            ProviderType::Ollama => Ok(ModelProvider::Ollama {
                model: self.model.clone(),
                base_url: self.resolved_endpoint(),
            }),
            ProviderType::OpenAI => {
                let api_key = self
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                    .ok_or_else(|| {
                        ApiError::ProviderNotConfigured(
                            "OpenAI provider requires api_key or OPENAI_API_KEY".to_string(),
                        )
                    })?;
                Ok(ModelProvider::OpenAI {
                    model: self.model.clone(),
                    api_key: Some(api_key),
                    base_url: self.resolved_endpoint(),
                })
            }
            ProviderType::Local => Ok(ModelProvider::OpenAI {
                model: self.model.clone(),
                api_key: self.api_key.clone(),
                base_url: self.resolved_endpoint(),
            }),
        }
    }
}
