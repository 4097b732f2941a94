//! Error types for the docweave generation pipeline.

use std::time::Duration;
use thiserror::Error;

/// Content cache storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cache I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cache database error: {0}")]
    Database(String),

    #[error("Cache entry encoding error: {0}")]
    Encoding(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// Errors surfaced by the public API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Model service unavailable: {0}")]
    ModelServiceUnavailable(String),

    #[error("No sections could be resolved for the document")]
    NoSectionsResolved,

    #[error("Section '{0}' is empty after all attempts (strict mode)")]
    StrictEmptySection(String),

    #[error("Generation stalled: no event for {0:?}")]
    GenerationStalled(Duration),

    #[error("Generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ApiError {
    /// Whether a section attempt that failed with this error should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::ConfigError(_) => false,
            ApiError::ProviderNotConfigured(_) => false,
            ApiError::ProviderAuthFailed(_) => false,
            ApiError::Cancelled => false,
            ApiError::ProviderRateLimit(_) => true,
            ApiError::ProviderRequestFailed(_) => true,
            ApiError::ProviderError(_) => true,
            _ => true,
        }
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_config_errors_are_not_retried() {
        assert!(!ApiError::ProviderAuthFailed("401".into()).is_retryable());
        assert!(!ApiError::ConfigError("bad".into()).is_retryable());
        assert!(ApiError::ProviderRequestFailed("timeout".into()).is_retryable());
        assert!(ApiError::GenerationFailed("empty".into()).is_retryable());
    }
}
