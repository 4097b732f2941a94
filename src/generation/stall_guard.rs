//! Caller-side stall guard.
//!
//! The orchestrator runs on its own task and reports through a channel; the guard reads
//! that channel with a per-event stall window and an overall deadline, so a hung producer
//! can never block detection. On stall, timeout or an `error` terminal event the guard
//! aborts the run and falls back to a single-pass generation.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::generation::aggregate::normalize_headings;
use crate::generation::orchestrator::{new_run_id, Orchestrator, RunContext};
use crate::generation::planner::title::resolve_title;
use crate::generation::prompts::{single_pass_prompt, SINGLE_PASS_SYSTEM};
use crate::generation::request::{GeneratedDocument, GenerationRequest};
use crate::progress::{EventBus, ProgressEvent};
use crate::provider::{ChatMessage, CompletionOptions};
use crate::text::measure::body_len;
use crate::text::sanitize::{sanitize_output_text, strip_markdown_noise};
use crate::text::SectionToken;

/// Buffers streamed chunks into deltas of at least `min_chars`, or whatever has arrived
/// once `max_wait` has passed since the last flush.
pub struct DeltaCoalescer {
    min_chars: usize,
    max_wait: Duration,
    buffer: String,
    last_flush: Instant,
}

impl DeltaCoalescer {
    pub fn new(min_chars: usize, max_wait: Duration) -> Self {
        Self {
            min_chars,
            max_wait,
            buffer: String::new(),
            last_flush: Instant::now(),
        }
    }

    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.buffer.push_str(chunk);
        let due = self.buffer.chars().count() >= self.min_chars
            || self.last_flush.elapsed() >= self.max_wait;
        if due && !self.buffer.is_empty() {
            self.last_flush = Instant::now();
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    pub fn finish(&mut self) -> Option<String> {
        (!self.buffer.is_empty()).then(|| std::mem::take(&mut self.buffer))
    }
}

pub struct StallGuard {
    ctx: Arc<RunContext>,
}

impl StallGuard {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx }
    }

    /// Run the orchestrator under the stall and overall timeouts. Every event is relayed to
    /// `events`; the last one is always `final` or `error`.
    pub async fn run(
        &self,
        request: GenerationRequest,
        events: &EventBus,
    ) -> Result<GeneratedDocument, ApiError> {
        let stream = &self.ctx.config.stream;
        let (stall, overall) = stream.effective_timeouts();
        let deadline = Instant::now() + overall;

        let (inner, mut rx) = EventBus::new_pair();
        let orchestrator = Orchestrator::new(self.ctx.clone());
        let run_request = request.clone();
        let mut handle = tokio::spawn(async move { orchestrator.run(run_request, &inner).await });

        let cause = loop {
            let now = Instant::now();
            if now >= deadline {
                break ApiError::GenerationTimeout(overall);
            }
            match tokio::time::timeout(stall.min(deadline - now), rx.recv()).await {
                Ok(Some(ProgressEvent::Final { text, problems })) => {
                    events.emit(ProgressEvent::Final {
                        text: text.clone(),
                        problems: problems.clone(),
                    });
                    return match (&mut handle).await {
                        Ok(Ok(doc)) => Ok(doc),
                        _ => Ok(minimal_document(&request, text, problems)),
                    };
                }
                Ok(Some(ProgressEvent::Error { message })) => {
                    break ApiError::GenerationFailed(message);
                }
                Ok(Some(event)) => {
                    events.emit(event);
                }
                Ok(None) => {
                    break ApiError::GenerationFailed(
                        "generator ended without a terminal event".to_string(),
                    );
                }
                Err(_) if Instant::now() >= deadline => break ApiError::GenerationTimeout(overall),
                Err(_) => break ApiError::GenerationStalled(stall),
            }
        };
        handle.abort();
        warn!(cause = %cause, "Orchestrated generation abandoned");

        if !stream.fallback_enabled {
            events.emit(ProgressEvent::Error {
                message: cause.to_string(),
            });
            return Err(cause);
        }

        match self.single_pass(&request, &cause, events, overall).await {
            Ok(doc) => Ok(doc),
            Err(fallback_err) => {
                let message = format!("{}; single-pass fallback failed: {}", cause, fallback_err);
                error!(message = %message, "Generation failed");
                events.emit(ProgressEvent::Error {
                    message: message.clone(),
                });
                Err(ApiError::GenerationFailed(message))
            }
        }
    }

    async fn single_pass(
        &self,
        request: &GenerationRequest,
        cause: &ApiError,
        events: &EventBus,
        limit: Duration,
    ) -> Result<GeneratedDocument, ApiError> {
        let config = &self.ctx.config;
        let model = config
            .models
            .aggregator_model
            .clone()
            .unwrap_or_else(|| self.ctx.resolver.default_model().to_string());
        let client = self.ctx.resolver.client_for(&model)?;
        let title = resolve_title(request.title.as_deref(), &request.existing_text, &request.instruction);
        let token = SectionToken::h2(title.clone());
        let total = config.generation.total_chars();
        info!(model = %model, cause = %cause, "Running single-pass fallback");

        events.emit(ProgressEvent::section_start(&token));
        let prompt = single_pass_prompt(&request.instruction, &request.existing_text, total);
        let options = CompletionOptions::default().with_temperature(config.generation.temperature);
        let draft = async {
            let mut stream = client
                .stream(ChatMessage::exchange(SINGLE_PASS_SYSTEM, prompt), options)
                .await?;
            let mut coalescer = DeltaCoalescer::new(
                config.stream.fallback_chunk_chars,
                Duration::from_millis(config.stream.fallback_flush_ms),
            );
            let mut raw = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                raw.push_str(&chunk);
                if let Some(delta) = coalescer.push(&chunk) {
                    events.emit(ProgressEvent::section_delta(&token, delta));
                }
            }
            if let Some(delta) = coalescer.finish() {
                events.emit(ProgressEvent::section_delta(&token, delta));
            }
            Ok::<_, ApiError>(raw)
        };
        let raw = tokio::time::timeout(limit, draft)
            .await
            .map_err(|_| ApiError::GenerationTimeout(limit))??;

        let cleaned = sanitize_output_text(&strip_markdown_noise(&raw));
        if cleaned.trim().is_empty() {
            return Err(ApiError::GenerationFailed(
                "single-pass fallback produced no text".to_string(),
            ));
        }
        let text = normalize_headings(&cleaned, &title, &[]);
        events.emit(ProgressEvent::section_end(&token));

        let mut problems = Vec::new();
        if !text.lines().any(|l| l.starts_with("## ")) {
            problems.push("fallback output has no section headings".to_string());
        }
        let len = body_len(&text);
        if total > 0 && (len as f64 - total as f64).abs() / total as f64 > 0.10 {
            problems.push(format!("document length {} deviates from the target {}", len, total));
        }
        problems.push(format!("fallback used: {}", cause));

        events.emit(ProgressEvent::Final {
            text: text.clone(),
            problems: problems.clone(),
        });
        Ok(GeneratedDocument {
            run_id: new_run_id(&request.instruction),
            title,
            sections: vec![(token, text.clone())],
            text,
            problems,
            phase_timings: Vec::new(),
        })
    }
}

fn minimal_document(request: &GenerationRequest, text: String, problems: Vec<String>) -> GeneratedDocument {
    let title = text
        .lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(str::to_string)
        .unwrap_or_else(|| resolve_title(request.title.as_deref(), &request.existing_text, &request.instruction));
    GeneratedDocument {
        run_id: new_run_id(&request.instruction),
        title,
        text,
        problems,
        sections: Vec::new(),
        phase_timings: Vec::new(),
    }
}
