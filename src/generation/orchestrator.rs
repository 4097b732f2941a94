//! Generation orchestrator: one run from instruction to final document.
//!
//! Phases run in a fixed order (PLAN, DRAFT_SECTIONS, AGGREGATE) and each is bracketed by
//! `state` events. The run ends with exactly one terminal event: `final` on success,
//! `error` when a fatal-for-run error escapes.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::DocweaveConfig;
use crate::error::ApiError;
use crate::generation::aggregate::Aggregator;
use crate::generation::cache::ContentCache;
use crate::generation::evidence::{collect_sources, EvidencePrefetcher, EvidenceProvider, NoEvidence};
use crate::generation::filler::{ContentFiller, TemplateFiller};
use crate::generation::model_pool::{Affinity, ModelPool};
use crate::generation::planner::Planner;
use crate::generation::postprocess::Shaper;
use crate::generation::repair::RepairLoop;
use crate::generation::request::{GeneratedDocument, GenerationRequest, PhaseTiming};
use crate::generation::scheduler::SectionScheduler;
use crate::generation::worker::{SectionJob, WorkerShared};
use crate::progress::{EventBus, PhaseMark, ProgressEvent, RunPhase};
use crate::provider::{ModelClientResolver, ModelProviderClient};

/// Services and configuration for generation runs. Built once by the caller and shared
/// across runs; nothing here is ambient.
pub struct RunContext {
    pub config: DocweaveConfig,
    pub resolver: Arc<dyn ModelClientResolver>,
    pub evidence: Arc<dyn EvidenceProvider>,
    pub cache: Option<Arc<ContentCache>>,
    pub filler: Arc<dyn ContentFiller>,
}

impl RunContext {
    pub fn new(config: DocweaveConfig, resolver: Arc<dyn ModelClientResolver>) -> Self {
        Self {
            config,
            resolver,
            evidence: Arc::new(NoEvidence),
            cache: None,
            filler: Arc::new(TemplateFiller),
        }
    }

    pub fn with_evidence(mut self, evidence: Arc<dyn EvidenceProvider>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_filler(mut self, filler: Arc<dyn ContentFiller>) -> Self {
        self.filler = filler;
        self
    }
}

pub(crate) fn new_run_id(instruction: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(instruction.as_bytes());
    hasher.update(&nanos.to_le_bytes());
    let hex = hasher.finalize().to_hex();
    format!("run-{}", &hex.as_str()[..12])
}

struct PhaseClock {
    timings: Vec<PhaseTiming>,
}

impl PhaseClock {
    fn start(&self, events: &EventBus, phase: RunPhase) -> Instant {
        events.emit(ProgressEvent::state(phase, PhaseMark::Start));
        Instant::now()
    }

    fn end(&mut self, events: &EventBus, phase: RunPhase, started: Instant) {
        self.timings.push(PhaseTiming {
            phase,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        events.emit(ProgressEvent::state(phase, PhaseMark::End));
    }
}

pub struct Orchestrator {
    ctx: Arc<RunContext>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Run one generation, streaming events to `events`. A fatal error is emitted as the
    /// terminal `error` event and returned.
    pub async fn run(
        &self,
        request: GenerationRequest,
        events: &EventBus,
    ) -> Result<GeneratedDocument, ApiError> {
        match self.run_inner(&request, events).await {
            Ok(doc) => Ok(doc),
            Err(err) => {
                warn!(error = %err, "Generation run failed");
                events.emit(ProgressEvent::Error {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Client used for planning, validation and the service check. `None` when no step of
    /// the run needs a model.
    async fn aggregator_client(&self) -> Result<Option<Arc<dyn ModelProviderClient>>, ApiError> {
        let config = &self.ctx.config;
        if config.generation.fast_plan && config.generation.fast_draft {
            return Ok(None);
        }
        let model = config
            .models
            .aggregator_model
            .clone()
            .unwrap_or_else(|| self.ctx.resolver.default_model().to_string());
        let client = self
            .ctx
            .resolver
            .client_for(&model)
            .map_err(|e| ApiError::ModelServiceUnavailable(format!("{}: {}", model, e)))?;
        if !client.is_running().await {
            return Err(ApiError::ModelServiceUnavailable(format!(
                "{} ({}) is not reachable",
                model,
                client.provider_name()
            )));
        }
        Ok(Some(client))
    }

    async fn run_inner(
        &self,
        request: &GenerationRequest,
        events: &EventBus,
    ) -> Result<GeneratedDocument, ApiError> {
        let ctx = &self.ctx;
        let config = &ctx.config;
        let settings = &config.generation;
        config.ensure_valid()?;

        let run_id = new_run_id(&request.instruction);
        let mut clock = PhaseClock { timings: Vec::new() };
        let mut problems: Vec<String> = Vec::new();
        info!(run_id = %run_id, strict = settings.strict, "Generation run started");

        // PLAN
        let started = clock.start(events, RunPhase::Plan);
        let aggregator = self.aggregator_client().await?;
        let plan = Planner::new(settings, aggregator.as_deref()).plan(request).await?;
        problems.extend(plan.problems.iter().cloned());
        if !plan.struct_plan.is_empty() {
            events.emit(ProgressEvent::StructPlan {
                plan: plan.struct_plan.clone(),
            });
        }
        events.emit(ProgressEvent::Plan {
            title: plan.title.clone(),
            sections: plan.tokens(),
        });
        events.emit(ProgressEvent::Targets {
            targets: plan.budgets(),
        });

        let pool = if settings.fast_draft {
            ModelPool::new(Vec::new(), ctx.resolver.default_model())
        } else {
            ModelPool::resolve(&config.models, ctx.resolver.as_ref()).await
        };
        let affinity = Affinity::choose(&pool, &config.models);
        info!(
            run_id = %run_id,
            models = ?pool.models(),
            main = affinity.main(),
            "Worker models selected"
        );
        clock.end(events, RunPhase::Plan, started);

        // DRAFT_SECTIONS
        let mut packs = if config.evidence.enabled {
            let outcome = EvidencePrefetcher::new(ctx.evidence.clone(), &config.evidence)
                .prefetch(&plan.sections, &request.instruction)
                .await;
            problems.extend(outcome.problems);
            outcome.packs
        } else {
            Default::default()
        };
        let sources = collect_sources(plan.sections.iter().filter_map(|s| packs.get(&s.section)));

        let started = clock.start(events, RunPhase::DraftSections);
        let jobs: Vec<SectionJob> = plan
            .sections
            .iter()
            .map(|section| SectionJob {
                section: section.clone(),
                model: affinity.model_for(section.title()).to_string(),
                evidence: packs.remove(&section.section).unwrap_or_default(),
            })
            .collect();
        let shared = Arc::new(WorkerShared {
            run_id: run_id.clone(),
            doc_title: plan.title.clone(),
            instruction: request.instruction.clone(),
            outline: plan.tokens(),
            sources: sources.clone(),
            resolver: ctx.resolver.clone(),
            cache: ctx.cache.clone(),
            filler: ctx.filler.clone(),
            attempts: settings.section_attempts.max(1),
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
            strict: settings.strict,
            fast_draft: settings.fast_draft,
            temperature: settings.temperature,
            min_paragraphs: settings.min_section_paragraphs,
            cancelled: Arc::new(AtomicBool::new(false)),
        });
        let scheduler = SectionScheduler::new(settings.max_workers_for(affinity.distinct_models()), settings);
        let results = scheduler.run(shared, jobs, events).await?;
        if let Some(cache) = &ctx.cache {
            if let Err(err) = cache.flush() {
                warn!(error = %err, "Cache flush failed");
            }
        }
        clock.end(events, RunPhase::DraftSections, started);

        if settings.strict {
            if let Some(empty) = results.iter().find(|r| r.text.trim().is_empty()) {
                return Err(ApiError::StrictEmptySection(empty.section.title().to_string()));
            }
        }
        problems.extend(results.iter().filter_map(|r| r.problem.clone()));
        let mut texts: Vec<String> = results.into_iter().map(|r| r.text).collect();

        // AGGREGATE
        let started = clock.start(events, RunPhase::Aggregate);
        let report = RepairLoop {
            settings,
            resolver: ctx.resolver.as_ref(),
            pool: &pool,
            reviewer: aggregator.as_deref(),
            shaper: Shaper {
                filler: ctx.filler.as_ref(),
                min_paragraphs: settings.min_section_paragraphs,
                doc_title: &plan.title,
                sources: &sources,
            },
        }
        .run(&plan, &mut texts)
        .await;
        problems.extend(report.problems);

        let aggregated = Aggregator {
            settings,
            evidence: &config.evidence,
            filler: ctx.filler.as_ref(),
        }
        .aggregate(&plan, &texts, &request.instruction, &sources);
        problems.extend(aggregated.problems);
        clock.end(events, RunPhase::Aggregate, started);

        events.emit(ProgressEvent::Final {
            text: aggregated.text.clone(),
            problems: problems.clone(),
        });
        info!(
            run_id = %run_id,
            sections = aggregated.sections.len(),
            problems = problems.len(),
            "Generation run completed"
        );

        Ok(GeneratedDocument {
            run_id,
            title: plan.title,
            text: aggregated.text,
            problems,
            sections: aggregated.sections,
            phase_timings: clock.timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    struct OneClient(Arc<MockProvider>);

    impl ModelClientResolver for OneClient {
        fn client_for(&self, _model: &str) -> Result<Arc<dyn ModelProviderClient>, ApiError> {
            Ok(self.0.clone())
        }
        fn default_model(&self) -> &str {
            "m"
        }
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn fast_run_emits_phases_in_order_and_ends_with_final() {
        let mut config = DocweaveConfig::default();
        config.generation.fast_plan = true;
        config.generation.fast_draft = true;
        config.generation.progress_interval_ms = 0;
        let mock = Arc::new(MockProvider::new("m", vec![]));
        let ctx = RunContext::new(config, Arc::new(OneClient(mock.clone())));
        let (bus, mut rx) = EventBus::new_pair();

        let doc = Orchestrator::new(Arc::new(ctx))
            .run(GenerationRequest::new("写一篇关于供应链管理的报告"), &bus)
            .await
            .unwrap();
        assert_eq!(mock.calls(), 0);
        assert_eq!(doc.title, "供应链管理");
        assert_eq!(doc.text.lines().filter(|l| l.starts_with("# ")).count(), 1);
        assert_eq!(doc.phase_timings.len(), 3);

        let events = drain(&mut rx);
        let states: Vec<(RunPhase, PhaseMark)> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::State { name, phase } => Some((*name, *phase)),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                (RunPhase::Plan, PhaseMark::Start),
                (RunPhase::Plan, PhaseMark::End),
                (RunPhase::DraftSections, PhaseMark::Start),
                (RunPhase::DraftSections, PhaseMark::End),
                (RunPhase::Aggregate, PhaseMark::Start),
                (RunPhase::Aggregate, PhaseMark::End),
            ]
        );
        assert!(matches!(events.last(), Some(ProgressEvent::Final { .. })));
    }

    struct Offline;

    #[async_trait::async_trait]
    impl ModelProviderClient for Offline {
        async fn complete(
            &self,
            _messages: Vec<crate::provider::ChatMessage>,
            _options: crate::provider::CompletionOptions,
        ) -> Result<crate::provider::CompletionResponse, ApiError> {
            Err(ApiError::ProviderRequestFailed("offline".to_string()))
        }

        fn provider_name(&self) -> &str {
            "offline"
        }

        fn model_name(&self) -> &str {
            "m"
        }

        async fn list_models(&self) -> Result<Vec<String>, ApiError> {
            Err(ApiError::ProviderRequestFailed("offline".to_string()))
        }
    }

    struct OfflineResolver;

    impl ModelClientResolver for OfflineResolver {
        fn client_for(&self, _model: &str) -> Result<Arc<dyn ModelProviderClient>, ApiError> {
            Ok(Arc::new(Offline))
        }
        fn default_model(&self) -> &str {
            "m"
        }
    }

    #[tokio::test]
    async fn unreachable_service_fails_with_error_event() {
        let ctx = RunContext::new(DocweaveConfig::default(), Arc::new(OfflineResolver));
        let (bus, mut rx) = EventBus::new_pair();
        let err = Orchestrator::new(Arc::new(ctx))
            .run(GenerationRequest::new("Write a report"), &bus)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ModelServiceUnavailable(_)));
        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
    }

    #[test]
    fn run_ids_are_short_hex() {
        let id = new_run_id("x");
        assert!(id.starts_with("run-"));
        assert_eq!(id.len(), 16);
    }
}
