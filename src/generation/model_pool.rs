//! Worker model selection and model-section affinity.

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::ModelSettings;
use crate::provider::ModelClientResolver;

/// Immutable candidate list with a locked rotation cursor.
#[derive(Debug)]
pub struct ModelPool {
    models: Vec<String>,
    cursor: Mutex<usize>,
}

impl ModelPool {
    /// Deduplicated pool. An empty list is replaced by `fallback`.
    pub fn new(models: Vec<String>, fallback: &str) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for model in models {
            let model = model.trim().to_string();
            if !model.is_empty() && !unique.contains(&model) {
                unique.push(model);
            }
        }
        if unique.is_empty() {
            unique.push(fallback.to_string());
        }
        Self {
            models: unique,
            cursor: Mutex::new(0),
        }
    }

    /// Configured worker models, filtered to those the service reports as installed and
    /// capped at `max_worker_models`.
    pub async fn resolve(settings: &ModelSettings, resolver: &dyn ModelClientResolver) -> Self {
        let fallback = resolver.default_model().to_string();
        let candidates = if settings.worker_models.is_empty() {
            vec![fallback.clone()]
        } else {
            settings.worker_models.clone()
        };

        let mut available = Vec::new();
        for model in candidates {
            if available.len() >= settings.max_worker_models.max(1) {
                break;
            }
            let installed = match resolver.client_for(&model) {
                Ok(client) => client.has_model(&model).await.unwrap_or(false),
                Err(err) => {
                    warn!(model = %model, error = %err, "Worker model has no client");
                    false
                }
            };
            if installed {
                available.push(model);
            } else {
                debug!(model = %model, "Worker model not available; skipping");
            }
        }
        Self::new(available, &fallback)
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn main(&self) -> &str {
        &self.models[0]
    }

    /// Round-robin rotation, safe to call from concurrent workers.
    pub fn next(&self) -> String {
        let mut cursor = self.cursor.lock();
        let model = self.models[*cursor % self.models.len()].clone();
        *cursor = (*cursor + 1) % self.models.len();
        model
    }
}

/// Static per-run assignment of sections to models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affinity {
    main: String,
    support: Option<String>,
    keywords: Vec<String>,
}

impl Affinity {
    pub fn choose(pool: &ModelPool, settings: &ModelSettings) -> Self {
        let support = settings
            .support_model
            .clone()
            .filter(|m| pool.models().contains(m))
            .or_else(|| pool.models().get(1).cloned());
        Self {
            main: pool.main().to_string(),
            support,
            keywords: settings
                .support_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    pub fn main(&self) -> &str {
        &self.main
    }

    pub fn model_for(&self, section_title: &str) -> &str {
        let title = section_title.to_lowercase();
        match &self.support {
            Some(support) if self.keywords.iter().any(|k| title.contains(k.as_str())) => support,
            _ => &self.main,
        }
    }

    /// Distinct models this assignment can use.
    pub fn distinct_models(&self) -> usize {
        match &self.support {
            Some(support) if support != &self.main => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn pool_deduplicates_and_falls_back() {
        let pool = ModelPool::new(vec!["a".into(), " a ".into(), "b".into()], "z");
        assert_eq!(pool.models(), ["a".to_string(), "b".to_string()]);
        let empty = ModelPool::new(vec![], "z");
        assert_eq!(empty.main(), "z");
    }

    #[test]
    fn rotation_cycles_under_concurrency() {
        let pool = Arc::new(ModelPool::new(vec!["a".into(), "b".into(), "c".into()], "z"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || (0..30).map(|_| pool.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut counts = std::collections::HashMap::new();
        for handle in handles {
            for model in handle.join().unwrap() {
                *counts.entry(model).or_insert(0) += 1;
            }
        }
        assert_eq!(counts["a"], 40);
        assert_eq!(counts["b"], 40);
        assert_eq!(counts["c"], 40);
    }

    #[test]
    fn support_sections_route_to_support_model() {
        let pool = ModelPool::new(vec!["main".into(), "helper".into()], "z");
        let affinity = Affinity::choose(&pool, &ModelSettings::default());
        assert_eq!(affinity.model_for("研究背景"), "helper");
        assert_eq!(affinity.model_for("References"), "helper");
        assert_eq!(affinity.model_for("系统设计"), "main");
        assert_eq!(affinity.distinct_models(), 2);

        let single = ModelPool::new(vec!["main".into()], "z");
        let affinity = Affinity::choose(&single, &ModelSettings::default());
        assert_eq!(affinity.model_for("背景"), "main");
        assert_eq!(affinity.distinct_models(), 1);
    }
}
