//! Worker-pool bounds and result ordering under real concurrency.

use docweave::config::GenerationSettings;
use docweave::generation::worker::{SectionJob, WorkerShared};
use docweave::generation::{
    EvidencePack, GenerationRequest, Orchestrator, OutlineItem, PlanSection, RunContext,
    SectionScheduler, TemplateFiller,
};
use docweave::progress::{EventBus, ProgressEvent};
use docweave::text::SectionToken;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::integration::support::{drain, stub_config, ScriptedClient, StubResolver};

fn jobs(titles: &[&str]) -> Vec<SectionJob> {
    titles
        .iter()
        .map(|title| SectionJob {
            section: PlanSection {
                section: SectionToken::h2(*title),
                target_chars: 300,
                min_chars: 220,
                max_chars: 900,
                min_tables: 0,
                min_figures: 0,
                key_points: Vec::new(),
                evidence_queries: Vec::new(),
            },
            model: "stub-model".to_string(),
            evidence: EvidencePack::default(),
        })
        .collect()
}

fn shared(client: Arc<ScriptedClient>, titles: &[&str]) -> Arc<WorkerShared> {
    Arc::new(WorkerShared {
        run_id: "run-bounds".to_string(),
        doc_title: "并发测试".to_string(),
        instruction: "写一份仓储系统改造方案".to_string(),
        outline: titles.iter().map(|t| SectionToken::h2(*t)).collect(),
        sources: Vec::new(),
        resolver: StubResolver::new(client),
        cache: None,
        filler: Arc::new(TemplateFiller),
        attempts: 2,
        retry_backoff: Duration::ZERO,
        strict: false,
        fast_draft: false,
        temperature: 0.3,
        min_paragraphs: 2,
        cancelled: Arc::new(AtomicBool::new(false)),
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_drafts_never_exceed_max_workers() {
    let titles = ["一", "二", "三", "四", "五", "六", "七", "八"];
    let client = Arc::new(ScriptedClient::new(300).with_delay(Duration::from_millis(60)));
    let settings = GenerationSettings {
        progress_interval_ms: 0,
        poll_interval_ms: 10,
        ..GenerationSettings::default()
    };
    let scheduler = SectionScheduler::new(3, &settings);
    let (bus, _rx) = EventBus::new_pair();

    let results = scheduler
        .run(shared(client.clone(), &titles), jobs(&titles), &bus)
        .await
        .unwrap();

    assert!(client.peak() <= 3, "peak concurrency {}", client.peak());
    assert!(client.peak() >= 2, "drafts never overlapped");
    let order: Vec<&str> = results.iter().map(|r| r.section.title()).collect();
    assert_eq!(order, titles.to_vec());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn serial_runs_draft_one_section_at_a_time() {
    let mut config = stub_config();
    config.generation.serial = true;
    let client = Arc::new(ScriptedClient::new(600).with_delay(Duration::from_millis(20)));
    let ctx = RunContext::new(config, StubResolver::new(client.clone()));
    let (bus, mut rx) = EventBus::new_pair();

    let request = GenerationRequest::new("写一份仓储系统改造方案").with_outline(
        vec![
            OutlineItem::new(1, "背景"),
            OutlineItem::new(1, "方案"),
            OutlineItem::new(1, "结论"),
        ],
        false,
    );
    Orchestrator::new(Arc::new(ctx)).run(request, &bus).await.unwrap();

    assert_eq!(client.peak(), 1);
    let progress: Vec<(usize, usize)> = drain(&mut rx)
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress { current, total, .. } => Some((*current, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
}
