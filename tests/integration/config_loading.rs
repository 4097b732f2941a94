//! Layered configuration: workspace files over defaults, validation at load.

use docweave::config::{ConfigLoader, ProviderType};
use docweave::error::ApiError;
use std::fs;
use tempfile::TempDir;

#[test]
fn workspace_files_override_defaults_in_order() {
    let workspace = TempDir::new().unwrap();
    fs::write(
        workspace.path().join("docweave.toml"),
        r#"
[provider]
provider_type = "ollama"
model = "llama3.1:8b"

[generation]
max_workers = 6
section_attempts = 3
"#,
    )
    .unwrap();
    fs::create_dir_all(workspace.path().join("config")).unwrap();
    fs::write(
        workspace.path().join("config").join("config.toml"),
        "[generation]\nmax_workers = 2\n\n[stream]\nfallback_enabled = false\n",
    )
    .unwrap();

    let config = ConfigLoader::load(workspace.path()).unwrap();
    assert_eq!(config.provider.provider_type, ProviderType::Ollama);
    assert_eq!(config.provider.model, "llama3.1:8b");
    assert_eq!(config.generation.max_workers, 2);
    assert_eq!(config.generation.section_attempts, 3);
    assert!(!config.stream.fallback_enabled);
    assert_eq!(config.generation.per_model_concurrency, 4);
}

#[test]
fn empty_workspace_uses_defaults() {
    let workspace = TempDir::new().unwrap();
    let config = ConfigLoader::load(workspace.path()).unwrap();
    assert_eq!(config.generation.total_chars(), 1800);
    assert_eq!(config.stream.effective_timeouts().0.as_secs(), 120);
    assert!(config.cache.enabled);
}

#[test]
fn inverted_total_bounds_are_rejected() {
    let workspace = TempDir::new().unwrap();
    fs::write(
        workspace.path().join("docweave.toml"),
        "[generation]\nmin_total_chars = 5000\nmax_total_chars = 3000\n",
    )
    .unwrap();
    let err = ConfigLoader::load(workspace.path()).unwrap_err();
    match err {
        ApiError::ConfigError(message) => assert!(message.contains("min_total_chars")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn stall_window_is_shrunk_below_overall_deadline() {
    let workspace = TempDir::new().unwrap();
    fs::write(
        workspace.path().join("docweave.toml"),
        "[stream]\nstall_timeout_secs = 300\noverall_timeout_secs = 100\n",
    )
    .unwrap();
    let config = ConfigLoader::load(workspace.path()).unwrap();
    let (stall, overall) = config.stream.effective_timeouts();
    assert_eq!(overall.as_secs(), 100);
    assert_eq!(stall.as_secs(), 60);
}
