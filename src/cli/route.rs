//! CLI route: single route table and CLI context. Dispatches to generation services and
//! presentation.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::cli::parse::{CacheCommands, Commands, RequestArgs};
use crate::cli::presentation::{
    format_cache_stats, format_document, format_event_json, format_event_line, format_models,
    format_plan_json, format_plan_text,
};
use crate::config::{ConfigLoader, DocweaveConfig};
use crate::error::ApiError;
use crate::generation::{
    ContentCache, GenerationRequest, OutlineItem, Planner, RunContext, StallGuard,
};
use crate::progress::EventBus;
use crate::provider::{ModelClientResolver, ProviderClientPool};

/// Outline file layout: an optional document title plus ordered `[[section]]` entries.
#[derive(Debug, Deserialize)]
struct OutlineFile {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "section")]
    sections: Vec<OutlineItem>,
}

fn load_outline(path: &Path) -> Result<OutlineFile, ApiError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ApiError::ConfigError(format!("Failed to read outline {}: {}", path.display(), e))
    })?;
    toml::from_str(&raw).map_err(|e| {
        ApiError::ConfigError(format!("Invalid outline {}: {}", path.display(), e))
    })
}

/// Runtime context for CLI execution: workspace, loaded configuration and the model
/// client pool. Built from workspace path and optional config path using ConfigLoader only.
pub struct CliContext {
    workspace_root: PathBuf,
    config: DocweaveConfig,
    resolver: Arc<ProviderClientPool>,
}

impl CliContext {
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        let resolver = Arc::new(ProviderClientPool::new(config.provider.clone()));
        Ok(Self {
            workspace_root,
            config,
            resolver,
        })
    }

    pub fn config(&self) -> &DocweaveConfig {
        &self.config
    }

    /// Execute a command and return the text to print on stdout.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let result = match command {
            Commands::Generate {
                request,
                strict,
                serial,
                json,
            } => self.handle_generate(request, *strict, *serial, *json).await,
            Commands::Plan { request, format } => self.handle_plan(request, format).await,
            Commands::Models => self.handle_models().await,
            Commands::Cache { command } => self.handle_cache(command),
        };
        info!(
            workspace = %self.workspace_root.display(),
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    /// Configuration with request flags applied on top of the loaded layers.
    fn run_config(&self, args: &RequestArgs) -> DocweaveConfig {
        let mut config = self.config.clone();
        let generation = &mut config.generation;
        if let Some(min) = args.min_total_chars {
            generation.min_total_chars = min;
        }
        if let Some(max) = args.max_total_chars {
            generation.max_total_chars = max;
        }
        if args.fast {
            generation.fast_plan = true;
            generation.fast_draft = true;
        }
        config
    }

    fn build_request(&self, args: &RequestArgs) -> Result<GenerationRequest, ApiError> {
        let mut request = GenerationRequest::new(args.instruction.clone());
        if let Some(path) = &args.outline_file {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                self.workspace_root.join(path)
            };
            let outline = load_outline(&path)?;
            request = request.with_outline(outline.sections, args.expand_outline);
            if let Some(title) = outline.title {
                request = request.with_title(title);
            }
        }
        Ok(request)
    }

    async fn handle_generate(
        &self,
        args: &RequestArgs,
        strict: bool,
        serial: bool,
        json: bool,
    ) -> Result<String, ApiError> {
        let mut config = self.run_config(args);
        config.generation.strict |= strict;
        config.generation.serial |= serial;
        let request = self.build_request(args)?;

        let mut ctx = RunContext::new(config.clone(), self.resolver.clone());
        if config.cache.enabled {
            let path = config.cache.resolved_path();
            match ContentCache::open(&path, &config.cache) {
                Ok(cache) => ctx = ctx.with_cache(Arc::new(cache)),
                Err(e) => warn!(path = %path.display(), error = %e, "Section cache unavailable"),
            }
        }

        let (events, mut rx) = EventBus::new_pair();
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if json {
                    match format_event_json(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!(error = %e, "Dropped event"),
                    }
                } else if let Some(line) = format_event_line(&event) {
                    eprintln!("{}", line);
                }
            }
        });

        let guard = StallGuard::new(Arc::new(ctx));
        let result = guard.run(request, &events).await;
        drop(events);
        if let Err(e) = printer.await {
            warn!(error = %e, "Event printer ended abnormally");
        }

        let doc = result?;
        info!(run_id = %doc.run_id, problems = doc.problems.len(), "Document generated");
        if json {
            Ok(String::new())
        } else {
            Ok(format_document(&doc))
        }
    }

    async fn handle_plan(&self, args: &RequestArgs, format: &str) -> Result<String, ApiError> {
        let config = self.run_config(args);
        config.ensure_valid()?;
        let request = self.build_request(args)?;

        let client = if config.generation.fast_plan {
            None
        } else {
            let model = config
                .models
                .aggregator_model
                .clone()
                .unwrap_or_else(|| self.resolver.default_model().to_string());
            let client = self.resolver.client_for(&model)?;
            if client.is_running().await {
                Some(client)
            } else {
                warn!(model = %model, "Model service not reachable; planning heuristically");
                None
            }
        };

        let planner = Planner::new(&config.generation, client.as_deref());
        let plan = planner.plan(&request).await?;
        match format {
            "json" => format_plan_json(&plan),
            "text" => Ok(format_plan_text(&plan)),
            other => Err(ApiError::ConfigError(format!(
                "Invalid format: {}. Must be 'text' or 'json'",
                other
            ))),
        }
    }

    async fn handle_models(&self) -> Result<String, ApiError> {
        let client = self.resolver.client_for(self.resolver.default_model())?;
        if !client.is_running().await {
            return Err(ApiError::ModelServiceUnavailable(format!(
                "{} is not reachable",
                client.provider_name()
            )));
        }
        let models = client.list_models().await?;
        Ok(format_models(client.provider_name(), &models))
    }

    fn handle_cache(&self, command: &CacheCommands) -> Result<String, ApiError> {
        let settings = &self.config.cache;
        let path = settings.resolved_path();
        let cache = ContentCache::open(&path, settings)?;
        match command {
            CacheCommands::Stats => Ok(format_cache_stats(&cache.stats()?)),
            CacheCommands::Clear => {
                let removed = cache.clear()?;
                Ok(format!("Removed {} cached sections from {}", removed, path.display()))
            }
        }
    }
}
