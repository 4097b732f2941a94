//! Evidence prefetch.
//!
//! One retrieval task per section, bounded by a semaphore, all sharing a single batch
//! deadline. Evidence is best-effort: failures and timeouts leave the section with an empty
//! pack and an advisory problem, never an error.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::EvidenceSettings;
use crate::error::ApiError;
use crate::generation::plan::PlanSection;
use crate::text::measure::truncate_visible;
use crate::text::SectionToken;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub id: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Supporting context for one section. The empty pack is a valid state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePack {
    pub summary: String,
    pub sources: Vec<EvidenceSource>,
    pub allowed_urls: Vec<String>,
}

impl EvidencePack {
    pub fn is_empty(&self) -> bool {
        self.summary.trim().is_empty() && self.sources.is_empty()
    }
}

/// Raw retrieval result.
#[derive(Debug, Clone, Default)]
pub struct RetrievedEvidence {
    pub context: String,
    pub sources: Vec<EvidenceSource>,
}

#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    async fn retrieve(&self, section: &str, instruction: &str) -> Result<RetrievedEvidence, ApiError>;
}

/// Provider used when evidence mode is off.
pub struct NoEvidence;

#[async_trait]
impl EvidenceProvider for NoEvidence {
    async fn retrieve(&self, _section: &str, _instruction: &str) -> Result<RetrievedEvidence, ApiError> {
        Ok(RetrievedEvidence::default())
    }
}

#[derive(Debug, Default)]
pub struct PrefetchOutcome {
    pub packs: HashMap<SectionToken, EvidencePack>,
    pub failed: usize,
    pub timed_out: usize,
    pub problems: Vec<String>,
}

pub struct EvidencePrefetcher {
    provider: Arc<dyn EvidenceProvider>,
    workers: usize,
    batch_timeout: Duration,
    summary_max_chars: usize,
}

impl EvidencePrefetcher {
    pub fn new(provider: Arc<dyn EvidenceProvider>, settings: &EvidenceSettings) -> Self {
        Self {
            provider,
            workers: settings.workers,
            batch_timeout: settings.batch_timeout(),
            summary_max_chars: settings.summary_max_chars,
        }
    }

    fn query_for(section: &PlanSection) -> String {
        let mut query = section.title().to_string();
        for extra in &section.evidence_queries {
            if !extra.trim().is_empty() {
                query.push(' ');
                query.push_str(extra.trim());
            }
        }
        query
    }

    fn pack_from(&self, evidence: RetrievedEvidence) -> EvidencePack {
        let mut seen = HashSet::new();
        let allowed_urls = evidence
            .sources
            .iter()
            .map(|s| s.url.trim().to_string())
            .filter(|u| !u.is_empty() && seen.insert(u.clone()))
            .collect();
        EvidencePack {
            summary: truncate_visible(&evidence.context, self.summary_max_chars),
            sources: evidence.sources,
            allowed_urls,
        }
    }

    /// Fetch evidence for every section under one deadline. Sections whose retrieval
    /// failed or was still outstanding at the deadline receive an empty pack.
    pub async fn prefetch(&self, sections: &[PlanSection], instruction: &str) -> PrefetchOutcome {
        let mut outcome = PrefetchOutcome::default();
        if sections.is_empty() {
            return outcome;
        }

        let pool = self.workers.max(1).min(sections.len());
        let semaphore = Arc::new(Semaphore::new(pool));
        let deadline = tokio::time::Instant::now() + self.batch_timeout;

        let mut pending = FuturesUnordered::new();
        for section in sections {
            let provider = self.provider.clone();
            let semaphore = semaphore.clone();
            let query = Self::query_for(section);
            let instruction = instruction.to_string();
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| ApiError::Cancelled)?;
                provider.retrieve(&query, &instruction).await
            });
            let token = section.section.clone();
            pending.push(async move { (token, handle.await) });
        }

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((token, Ok(Ok(evidence))))) => {
                    debug!(section = %token, sources = evidence.sources.len(), "Evidence retrieved");
                    outcome.packs.insert(token, self.pack_from(evidence));
                }
                Ok(Some((token, Ok(Err(err))))) => {
                    warn!(section = %token, error = %err, "Evidence retrieval failed");
                    outcome.failed += 1;
                }
                Ok(Some((token, Err(join_err)))) => {
                    warn!(section = %token, error = %join_err, "Evidence task panicked");
                    outcome.failed += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    outcome.timed_out = pending.len();
                    warn!(
                        outstanding = outcome.timed_out,
                        timeout_ms = self.batch_timeout.as_millis() as u64,
                        "Evidence batch deadline reached; abandoning outstanding retrievals"
                    );
                    break;
                }
            }
        }
        // Queued retrievals never start; running ones finish detached and are ignored.
        semaphore.close();
        drop(pending);

        for section in sections {
            outcome.packs.entry(section.section.clone()).or_default();
        }
        if outcome.failed + outcome.timed_out > 0 {
            outcome.problems.push(format!(
                "evidence unavailable for {} of {} sections ({} failed, {} timed out)",
                outcome.failed + outcome.timed_out,
                sections.len(),
                outcome.failed,
                outcome.timed_out
            ));
        }
        outcome
    }
}

/// Sources across all packs in plan order, deduplicated by url, then title, then id.
pub fn collect_sources<'a>(
    packs: impl IntoIterator<Item = &'a EvidencePack>,
) -> Vec<EvidenceSource> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for pack in packs {
        for source in &pack.sources {
            let key = [&source.url, &source.title, &source.id]
                .into_iter()
                .map(|s| s.trim().to_lowercase())
                .find(|s| !s.is_empty());
            if let Some(key) = key {
                if seen.insert(key) {
                    sources.push(source.clone());
                }
            }
        }
    }
    sources
}
