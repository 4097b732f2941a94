//! Configuration System
//!
//! Layered run configuration: merge-policy defaults, a global user file, workspace files,
//! and `DOCWEAVE__*` environment overrides. Every knob the orchestrator reads lives here as
//! an explicit field; nothing is read from ambient globals at generation time.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use crate::provider::{ProviderConfig, ProviderType};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocweaveConfig {
    /// Model service profile
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Worker model selection and affinity
    #[serde(default)]
    pub models: ModelSettings,

    /// Orchestrator behaviour
    #[serde(default)]
    pub generation: GenerationSettings,

    /// Evidence prefetch
    #[serde(default)]
    pub evidence: EvidenceSettings,

    /// Caller-side stall guard
    #[serde(default)]
    pub stream: StreamSettings,

    /// Cross-run section cache
    #[serde(default)]
    pub cache: CacheSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Worker model selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Candidate worker models; empty means the provider's default model
    #[serde(default)]
    pub worker_models: Vec<String>,

    #[serde(default = "default_max_worker_models")]
    pub max_worker_models: usize,

    /// Model for sections matching `support_keywords`; defaults to the second worker model
    #[serde(default)]
    pub support_model: Option<String>,

    /// Title keywords routed to the support model
    #[serde(default = "default_support_keywords")]
    pub support_keywords: Vec<String>,

    /// Model used for planning, validation and the single-pass fallback
    #[serde(default)]
    pub aggregator_model: Option<String>,
}

fn default_max_worker_models() -> usize {
    4
}

fn default_support_keywords() -> Vec<String> {
    [
        "引言", "背景", "相关", "综述", "文献", "参考", "绪论", "概述", "introduction",
        "background", "related", "references",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            worker_models: Vec::new(),
            max_worker_models: default_max_worker_models(),
            support_model: None,
            support_keywords: default_support_keywords(),
            aggregator_model: None,
        }
    }
}

/// Orchestrator behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Upper bound on concurrently drafting sections
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Concurrent sections per distinct worker model
    #[serde(default = "default_per_model_concurrency")]
    pub per_model_concurrency: usize,

    /// Force `max_workers = 1`
    #[serde(default)]
    pub serial: bool,

    /// Attempts per section before falling back
    #[serde(default = "default_section_attempts")]
    pub section_attempts: u32,

    /// Backoff before attempt n is `retry_backoff_ms * (n - 1)`
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Reject empty sections instead of filling them
    #[serde(default)]
    pub strict: bool,

    /// Skip model-backed planning steps
    #[serde(default)]
    pub fast_plan: bool,

    /// Fill sections from the content filler without model calls
    #[serde(default)]
    pub fast_draft: bool,

    /// Run the instruction analysis step
    #[serde(default = "default_true")]
    pub analysis: bool,

    /// Ask the model for a structured plan (key points, evidence queries)
    #[serde(default = "default_true")]
    pub model_plan: bool,

    #[serde(default = "default_plan_timeout_secs")]
    pub plan_timeout_secs: u64,

    /// Heuristic length validation and repair
    #[serde(default = "default_true")]
    pub validate: bool,

    /// Additional model-backed holistic validation
    #[serde(default)]
    pub model_validation: bool,

    /// Expand sections that end below their minimum
    #[serde(default = "default_true")]
    pub enforce_min_length: bool,

    /// Continuation rounds per expand repair
    #[serde(default = "default_expand_rounds")]
    pub expand_rounds: u32,

    #[serde(default)]
    pub min_total_chars: usize,

    #[serde(default)]
    pub max_total_chars: usize,

    /// Budget when neither total bound is set
    #[serde(default = "default_total_chars")]
    pub default_total_chars: usize,

    #[serde(default = "default_min_section_paragraphs")]
    pub min_section_paragraphs: usize,

    #[serde(default)]
    pub include_acknowledgements: bool,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Minimum gap between aggregate progress events
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Consumer loop receive timeout
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_workers() -> usize {
    12
}

fn default_per_model_concurrency() -> usize {
    4
}

fn default_section_attempts() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    800
}

fn default_true() -> bool {
    true
}

fn default_plan_timeout_secs() -> u64 {
    20
}

fn default_expand_rounds() -> u32 {
    2
}

fn default_total_chars() -> usize {
    1800
}

fn default_min_section_paragraphs() -> usize {
    2
}

fn default_temperature() -> f32 {
    0.3
}

fn default_progress_interval_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            per_model_concurrency: default_per_model_concurrency(),
            serial: false,
            section_attempts: default_section_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            strict: false,
            fast_plan: false,
            fast_draft: false,
            analysis: default_true(),
            model_plan: default_true(),
            plan_timeout_secs: default_plan_timeout_secs(),
            validate: default_true(),
            model_validation: false,
            enforce_min_length: default_true(),
            expand_rounds: default_expand_rounds(),
            min_total_chars: 0,
            max_total_chars: 0,
            default_total_chars: default_total_chars(),
            min_section_paragraphs: default_min_section_paragraphs(),
            include_acknowledgements: false,
            temperature: default_temperature(),
            progress_interval_ms: default_progress_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl GenerationSettings {
    /// Total character budget the planner allocates from.
    pub fn total_chars(&self) -> usize {
        if self.max_total_chars > 0 {
            self.max_total_chars
        } else if self.min_total_chars > 0 {
            self.min_total_chars
        } else {
            self.default_total_chars
        }
    }

    /// `min(configured cap, per-model concurrency × distinct models)`, or 1 when serial.
    pub fn max_workers_for(&self, distinct_models: usize) -> usize {
        if self.serial {
            return 1;
        }
        let by_models = self
            .per_model_concurrency
            .max(1)
            .saturating_mul(distinct_models.max(1));
        self.max_workers.max(1).min(by_models)
    }

    pub fn plan_timeout(&self) -> Duration {
        Duration::from_secs(self.plan_timeout_secs.max(1))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be at least 1".to_string());
        }
        if self.per_model_concurrency == 0 {
            return Err("per_model_concurrency must be at least 1".to_string());
        }
        if self.section_attempts == 0 {
            return Err("section_attempts must be at least 1".to_string());
        }
        if self.max_total_chars > 0 && self.min_total_chars > self.max_total_chars {
            return Err(format!(
                "min_total_chars ({}) exceeds max_total_chars ({})",
                self.min_total_chars, self.max_total_chars
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be positive".to_string());
        }
        Ok(())
    }
}

/// Evidence prefetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Pool size; the effective size is `min(workers, sections)`
    #[serde(default = "default_evidence_workers")]
    pub workers: usize,

    /// Single deadline for the whole prefetch batch
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,

    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    /// Report missing `[n]` citation markers in the final self-check
    #[serde(default = "default_true")]
    pub require_citations: bool,
}

fn default_evidence_workers() -> usize {
    3
}

fn default_batch_timeout_secs() -> u64 {
    40
}

fn default_summary_max_chars() -> usize {
    1200
}

impl Default for EvidenceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            workers: default_evidence_workers(),
            batch_timeout_secs: default_batch_timeout_secs(),
            summary_max_chars: default_summary_max_chars(),
            require_citations: default_true(),
        }
    }
}

impl EvidenceSettings {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }
}

/// Caller-side stall guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Maximum gap between two events
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    /// Wall-clock limit for the whole run
    #[serde(default = "default_overall_timeout_secs")]
    pub overall_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub fallback_enabled: bool,

    /// Fallback deltas are flushed once this many chars are buffered
    #[serde(default = "default_fallback_chunk_chars")]
    pub fallback_chunk_chars: usize,

    /// ...or after this long
    #[serde(default = "default_fallback_flush_ms")]
    pub fallback_flush_ms: u64,
}

fn default_stall_timeout_secs() -> u64 {
    120
}

fn default_overall_timeout_secs() -> u64 {
    360
}

fn default_fallback_chunk_chars() -> usize {
    60
}

fn default_fallback_flush_ms() -> u64 {
    1200
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            stall_timeout_secs: default_stall_timeout_secs(),
            overall_timeout_secs: default_overall_timeout_secs(),
            fallback_enabled: default_true(),
            fallback_chunk_chars: default_fallback_chunk_chars(),
            fallback_flush_ms: default_fallback_flush_ms(),
        }
    }
}

impl StreamSettings {
    /// (stall, overall). A stall window that would never fire before the overall deadline
    /// is shrunk to `max(30s, 0.6 × overall)`.
    pub fn effective_timeouts(&self) -> (Duration, Duration) {
        let overall = Duration::from_secs(self.overall_timeout_secs.max(1));
        let mut stall = Duration::from_secs(self.stall_timeout_secs.max(1));
        if stall >= overall {
            stall = Duration::from_secs(30).max(overall.mul_f64(0.6));
        }
        (stall, overall)
    }
}

/// Cross-run section cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database directory; defaults to the platform cache dir
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Only sections longer than this are stored
    #[serde(default = "default_min_cacheable_chars")]
    pub min_cacheable_chars: usize,
}

fn default_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_max_entries() -> usize {
    500
}

fn default_min_cacheable_chars() -> usize {
    100
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: None,
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            min_cacheable_chars: default_min_cacheable_chars(),
        }
    }
}

impl CacheSettings {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("", "", "docweave")
                .map(|dirs| dirs.cache_dir().join("sections"))
                .unwrap_or_else(|| PathBuf::from(".docweave/cache/sections"))
        })
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Provider(String),
    Models(String),
    Generation(String),
    Stream(String),
    Cache(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Models(msg) => write!(f, "Models: {}", msg),
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
            ValidationError::Stream(msg) => write!(f, "Stream: {}", msg),
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl DocweaveConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }

        if self.models.max_worker_models == 0 {
            errors.push(ValidationError::Models(
                "max_worker_models must be at least 1".to_string(),
            ));
        }
        if self.models.worker_models.iter().any(|m| m.trim().is_empty()) {
            errors.push(ValidationError::Models(
                "worker_models cannot contain empty names".to_string(),
            ));
        }

        if let Err(e) = self.generation.validate() {
            errors.push(ValidationError::Generation(e));
        }

        if self.stream.stall_timeout_secs == 0 || self.stream.overall_timeout_secs == 0 {
            errors.push(ValidationError::Stream(
                "timeouts must be positive".to_string(),
            ));
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            errors.push(ValidationError::Cache(
                "max_entries must be at least 1 when the cache is enabled".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all problems into one error.
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            ApiError::ConfigError(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })
    }
}
