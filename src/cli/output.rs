//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain errors to the message printed on stderr.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::ModelServiceUnavailable(detail) => format!(
            "Model service unavailable: {}\nCheck that the provider is running and `provider.endpoint` is correct.",
            detail
        ),
        ApiError::ConfigError(detail) => format!("Invalid configuration: {}", detail),
        other => other.to_string(),
    }
}
