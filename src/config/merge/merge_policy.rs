//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Only values that other layers commonly override partially are seeded here; the rest
/// come from serde defaults on the config structs.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("provider.provider_type", "ollama")?
        .set_default("provider.model", "qwen2.5:7b")?
        .set_default("generation.max_workers", 12)?
        .set_default("generation.per_model_concurrency", 4)?
        .set_default("generation.section_attempts", 2)?
        .set_default("stream.stall_timeout_secs", 120)?
        .set_default("stream.overall_timeout_secs", 360)
}
