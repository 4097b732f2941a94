//! Section scheduler: bounded parallel drafting with a single consumer loop.
//!
//! Workers run as tasks and report through an internal bus. The consumer loop here is the
//! only place that forwards their events to the caller, deduplicates section ends and
//! derives the rate-limited aggregate progress event.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::GenerationSettings;
use crate::error::ApiError;
use crate::generation::worker::{draft_section, SectionJob, SectionResult, WorkerShared};
use crate::progress::{EventBus, ProgressEvent, SectionPhase};
use crate::text::SectionToken;

type WorkerHandle = JoinHandle<Result<SectionResult, ApiError>>;

/// Cancels outstanding workers unless disarmed. Queued workers fail to acquire a permit
/// once the semaphore is closed; running ones see the flag at their next checkpoint.
struct Teardown {
    cancelled: Arc<AtomicBool>,
    semaphore: Arc<Semaphore>,
    armed: bool,
}

impl Teardown {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.store(true, Ordering::SeqCst);
            self.semaphore.close();
            debug!("Section workers cancelled");
        }
    }
}

pub struct SectionScheduler {
    max_workers: usize,
    progress_interval: Duration,
    poll_interval: Duration,
}

impl SectionScheduler {
    pub fn new(max_workers: usize, settings: &GenerationSettings) -> Self {
        Self {
            max_workers: max_workers.max(1),
            progress_interval: Duration::from_millis(settings.progress_interval_ms),
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Draft every job and return the results in job order.
    ///
    /// The first worker error aborts the batch: remaining workers are cancelled and the
    /// error is returned. Dropping the returned future cancels them the same way.
    pub async fn run(
        &self,
        shared: Arc<WorkerShared>,
        jobs: Vec<SectionJob>,
        events: &EventBus,
    ) -> Result<Vec<SectionResult>, ApiError> {
        let total = jobs.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let teardown = Teardown {
            cancelled: shared.cancelled.clone(),
            semaphore: semaphore.clone(),
            armed: true,
        };
        info!(
            run_id = %shared.run_id,
            sections = total,
            max_workers = self.max_workers,
            "Drafting sections"
        );

        let (worker_bus, mut rx) = EventBus::new_pair();
        let mut handles: Vec<Option<WorkerHandle>> = Vec::with_capacity(total);
        for job in jobs {
            let shared = shared.clone();
            let semaphore = semaphore.clone();
            let bus = worker_bus.clone();
            handles.push(Some(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| ApiError::Cancelled)?;
                draft_section(shared, job, bus).await
            })));
        }
        drop(worker_bus);

        let started = Instant::now();
        let mut results: Vec<Option<SectionResult>> = vec![None; total];
        let mut completed: HashSet<SectionToken> = HashSet::new();
        let mut last_progress: Option<Instant> = None;

        loop {
            harvest(&mut handles, &mut results, false).await?;
            match tokio::time::timeout(self.poll_interval, rx.recv()).await {
                Ok(Some(event)) => {
                    let ended = match event.section_phase() {
                        Some((token, SectionPhase::End)) => Some(token.clone()),
                        _ => None,
                    };
                    let Some(token) = ended else {
                        events.emit(event);
                        continue;
                    };
                    if !completed.insert(token.clone()) {
                        debug!(section = %token, "Duplicate section end dropped");
                        continue;
                    }
                    events.emit(event);
                    events.emit(ProgressEvent::Delta {
                        delta: format!("Completed {}/{}", completed.len(), total),
                    });

                    let now = Instant::now();
                    let due = last_progress
                        .map_or(true, |at| now.duration_since(at) >= self.progress_interval);
                    if due {
                        last_progress = Some(now);
                        let current = completed.len();
                        events.emit(ProgressEvent::Progress {
                            current,
                            total,
                            percent: (current * 100 / total) as u32,
                            section: token,
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                }
                // Every worker has dropped its bus handle and the queue is drained.
                Ok(None) => break,
                Err(_) => continue,
            }
        }

        harvest(&mut handles, &mut results, true).await?;
        teardown.disarm();

        let results: Vec<SectionResult> = results.into_iter().flatten().collect();
        if results.len() != total {
            return Err(ApiError::GenerationFailed(format!(
                "{} of {} sections produced no result",
                total - results.len(),
                total
            )));
        }
        info!(
            run_id = %shared.run_id,
            sections = total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "All sections drafted"
        );
        Ok(results)
    }
}

/// Collect finished workers (or all of them when `wait` is set). The first failure is
/// returned as is; a panicked worker becomes a generation failure.
async fn harvest(
    handles: &mut [Option<WorkerHandle>],
    results: &mut [Option<SectionResult>],
    wait: bool,
) -> Result<(), ApiError> {
    for (slot, result) in handles.iter_mut().zip(results.iter_mut()) {
        let ready = slot.as_ref().is_some_and(|h| wait || h.is_finished());
        if !ready {
            continue;
        }
        let Some(handle) = slot.take() else {
            continue;
        };
        match handle.await {
            Ok(Ok(section)) => *result = Some(section),
            Ok(Err(err)) => return Err(err),
            Err(join_err) => {
                error!(error = %join_err, "Section worker panicked");
                return Err(ApiError::GenerationFailed(format!(
                    "section worker failed: {}",
                    join_err
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::evidence::EvidencePack;
    use crate::generation::filler::TemplateFiller;
    use crate::generation::plan::PlanSection;
    use crate::provider::{MockProvider, ModelClientResolver, ModelProviderClient};

    struct OneClient(Arc<MockProvider>);

    impl ModelClientResolver for OneClient {
        fn client_for(&self, _model: &str) -> Result<Arc<dyn ModelProviderClient>, ApiError> {
            Ok(self.0.clone())
        }
        fn default_model(&self) -> &str {
            "m"
        }
    }

    fn shared(mock: MockProvider, strict: bool, fast_draft: bool) -> Arc<WorkerShared> {
        Arc::new(WorkerShared {
            run_id: "run-test".to_string(),
            doc_title: "Supply Chains".to_string(),
            instruction: "Write a report on supply chains".to_string(),
            outline: vec![],
            sources: vec![],
            resolver: Arc::new(OneClient(Arc::new(mock))),
            cache: None,
            filler: Arc::new(TemplateFiller),
            attempts: 1,
            retry_backoff: Duration::from_millis(1),
            strict,
            fast_draft,
            temperature: 0.3,
            min_paragraphs: 2,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    fn jobs(titles: &[&str]) -> Vec<SectionJob> {
        titles
            .iter()
            .map(|title| SectionJob {
                section: PlanSection {
                    section: SectionToken::h2(*title),
                    target_chars: 200,
                    min_chars: 150,
                    max_chars: 600,
                    min_tables: 0,
                    min_figures: 0,
                    key_points: vec![],
                    evidence_queries: vec![],
                },
                model: "m".to_string(),
                evidence: EvidencePack::default(),
            })
            .collect()
    }

    fn settings() -> GenerationSettings {
        GenerationSettings {
            progress_interval_ms: 0,
            poll_interval_ms: 10,
            ..GenerationSettings::default()
        }
    }

    #[tokio::test]
    async fn results_come_back_in_plan_order_with_one_end_each() {
        let scheduler = SectionScheduler::new(2, &settings());
        let (bus, mut rx) = EventBus::new_pair();
        let results = scheduler
            .run(
                shared(MockProvider::new("m", vec![]), false, true),
                jobs(&["Background", "Design", "Conclusion"]),
                &bus,
            )
            .await
            .unwrap();
        let titles: Vec<&str> = results.iter().map(|r| r.section.title()).collect();
        assert_eq!(titles, vec!["Background", "Design", "Conclusion"]);

        let mut ends = 0;
        let mut progress = Vec::new();
        let mut completions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                ProgressEvent::Section { phase: SectionPhase::End, .. } => ends += 1,
                ProgressEvent::Progress { current, total, .. } => progress.push((current, total)),
                ProgressEvent::Delta { delta } => completions.push(delta),
                _ => {}
            }
        }
        assert_eq!(ends, 3);
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(completions, vec!["Completed 1/3", "Completed 2/3", "Completed 3/3"]);
    }

    #[tokio::test]
    async fn progress_is_rate_limited() {
        let settings = GenerationSettings {
            progress_interval_ms: 60_000,
            poll_interval_ms: 10,
            ..GenerationSettings::default()
        };
        let scheduler = SectionScheduler::new(4, &settings);
        let (bus, mut rx) = EventBus::new_pair();
        scheduler
            .run(
                shared(MockProvider::new("m", vec![]), false, true),
                jobs(&["A", "B", "C", "D"]),
                &bus,
            )
            .await
            .unwrap();
        let mut progress = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ProgressEvent::Progress { .. }) {
                progress += 1;
            }
        }
        assert_eq!(progress, 1);
    }

    #[tokio::test]
    async fn strict_failure_aborts_and_cancels() {
        let scheduler = SectionScheduler::new(1, &settings());
        let (bus, _rx) = EventBus::new_pair();
        let shared = shared(
            MockProvider::new("m", vec![Err("down".to_string())]),
            true,
            false,
        );
        let err = scheduler
            .run(shared.clone(), jobs(&["Background", "Design"]), &bus)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::StrictEmptySection(ref t) if t == "Background"));
        assert!(shared.cancelled.load(Ordering::SeqCst));
    }
}
