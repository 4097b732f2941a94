//! Section draft worker.
//!
//! One worker per section:
//!
//! ```text
//! START -> CACHE_HIT -> END
//! START -> ATTEMPT[1..N] -> SUCCESS -> POSTPROCESS -> END
//! START -> ALL_ATTEMPTS_FAILED -> FALLBACK_FILL -> END      (strict: error instead)
//! ```
//!
//! The worker is the only writer of its section's text and hands it back through its task
//! handle. Cancellation is checked between steps; an in-flight model call is never
//! interrupted, its result is just discarded.

use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::generation::cache::ContentCache;
use crate::generation::evidence::{EvidencePack, EvidenceSource};
use crate::generation::filler::ContentFiller;
use crate::generation::plan::PlanSection;
use crate::generation::postprocess::Shaper;
use crate::generation::prompts::{references_prompt, section_prompt, WRITER_SYSTEM};
use crate::progress::{EventBus, ProgressEvent};
use crate::provider::{ChatMessage, CompletionOptions, ModelClientResolver};
use crate::text::SectionToken;

/// Run-wide inputs shared by every worker.
pub struct WorkerShared {
    pub run_id: String,
    pub doc_title: String,
    pub instruction: String,
    pub outline: Vec<SectionToken>,
    pub sources: Vec<EvidenceSource>,
    pub resolver: Arc<dyn ModelClientResolver>,
    pub cache: Option<Arc<ContentCache>>,
    pub filler: Arc<dyn ContentFiller>,
    pub attempts: u32,
    pub retry_backoff: Duration,
    pub strict: bool,
    pub fast_draft: bool,
    pub temperature: f32,
    pub min_paragraphs: usize,
    pub cancelled: Arc<AtomicBool>,
}

impl WorkerShared {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn shaper(&self) -> Shaper<'_> {
        Shaper {
            filler: self.filler.as_ref(),
            min_paragraphs: self.min_paragraphs,
            doc_title: &self.doc_title,
            sources: &self.sources,
        }
    }
}

/// Everything one worker needs about its own section.
#[derive(Debug, Clone)]
pub struct SectionJob {
    pub section: PlanSection,
    pub model: String,
    pub evidence: EvidencePack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionOutcome {
    CacheHit,
    Drafted,
    Filled,
    FallbackFilled,
}

#[derive(Debug, Clone)]
pub struct SectionResult {
    pub section: SectionToken,
    pub text: String,
    pub outcome: SectionOutcome,
    pub attempts: u32,
    /// Degraded-non-fatal note for the final problems list
    pub problem: Option<String>,
}

fn finished(
    events: &EventBus,
    section: &SectionToken,
    text: String,
    outcome: SectionOutcome,
    attempts: u32,
    problem: Option<String>,
) -> SectionResult {
    events.emit(ProgressEvent::section_end(section));
    SectionResult {
        section: section.clone(),
        text,
        outcome,
        attempts,
        problem,
    }
}

/// Draft one section end to end.
pub async fn draft_section(
    shared: Arc<WorkerShared>,
    job: SectionJob,
    events: EventBus,
) -> Result<SectionResult, ApiError> {
    let token = job.section.section.clone();
    if shared.is_cancelled() {
        return Err(ApiError::Cancelled);
    }
    events.emit(ProgressEvent::section_start(&token));

    if let Some(cache) = &shared.cache {
        match cache.get(token.title(), &shared.instruction, job.section.min_chars) {
            Ok(Some(text)) => {
                debug!(run_id = %shared.run_id, section = %token, "Section served from cache");
                events.emit(ProgressEvent::section_delta(&token, text.clone()));
                return Ok(finished(&events, &token, text, SectionOutcome::CacheHit, 0, None));
            }
            Ok(None) => {}
            Err(err) => warn!(section = %token, error = %err, "Cache lookup failed"),
        }
    }

    if shared.fast_draft {
        let text = shared.shaper().fill(&job.section);
        events.emit(ProgressEvent::section_delta(&token, text.clone()));
        return Ok(finished(&events, &token, text, SectionOutcome::Filled, 0, None));
    }

    let mut last_error = String::new();
    let mut tried = 0;
    for attempt in 1..=shared.attempts.max(1) {
        if shared.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        match attempt_draft(&shared, &job, &events).await {
            Ok(raw) => {
                if shared.is_cancelled() {
                    return Err(ApiError::Cancelled);
                }
                let text = shared.shaper().finalize(&raw, &job.section);
                if let Some(cache) = &shared.cache {
                    if let Err(err) = cache.put(token.title(), &shared.instruction, job.section.min_chars, &text) {
                        warn!(section = %token, error = %err, "Cache store failed");
                    }
                }
                info!(
                    run_id = %shared.run_id,
                    section = %token,
                    model = %job.model,
                    attempt,
                    chars = crate::text::body_len(&text),
                    "Section draft completed"
                );
                return Ok(finished(&events, &token, text, SectionOutcome::Drafted, attempt, None));
            }
            Err(err) => {
                tried = attempt;
                warn!(
                    run_id = %shared.run_id,
                    section = %token,
                    attempt,
                    error = %err,
                    "Section attempt failed"
                );
                last_error = err.to_string();
                events.emit(ProgressEvent::section_retry(&token, attempt, last_error.clone()));
                if !err.is_retryable() {
                    break;
                }
                if attempt < shared.attempts {
                    tokio::time::sleep(shared.retry_backoff * attempt).await;
                }
            }
        }
    }

    if shared.strict {
        return Err(ApiError::StrictEmptySection(token.title().to_string()));
    }
    let text = shared.shaper().fallback(&job.section);
    events.emit(ProgressEvent::section_delta(&token, text.clone()));
    let problem = format!(
        "section '{}' used fallback content after {} failed attempts: {}",
        token.title(),
        tried,
        last_error
    );
    Ok(finished(
        &events,
        &token,
        text,
        SectionOutcome::FallbackFilled,
        tried,
        Some(problem),
    ))
}

/// One model attempt, streaming each chunk out as a section delta.
async fn attempt_draft(
    shared: &WorkerShared,
    job: &SectionJob,
    events: &EventBus,
) -> Result<String, ApiError> {
    let token = &job.section.section;
    let client = shared.resolver.client_for(&job.model)?;
    let user = if job.section.is_reference() {
        references_prompt(&shared.doc_title, &shared.instruction, &job.evidence)
    } else {
        section_prompt(
            &shared.doc_title,
            &shared.instruction,
            &job.section,
            &job.evidence,
            &shared.outline,
        )
    };
    let options = CompletionOptions::default().with_temperature(shared.temperature);
    let mut stream = client
        .stream(ChatMessage::exchange(WRITER_SYSTEM, user), options)
        .await?;

    let mut raw = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        events.emit(ProgressEvent::section_delta(token, chunk.clone()));
        raw.push_str(&chunk);
    }
    if raw.trim().is_empty() {
        return Err(ApiError::GenerationFailed(format!(
            "empty completion for section '{}'",
            token.title()
        )));
    }
    Ok(raw)
}
