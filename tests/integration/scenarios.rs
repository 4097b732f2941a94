//! End-to-end generation scenarios against the scripted model client.

use docweave::generation::{GenerationRequest, Orchestrator, OutlineItem, Planner, RunContext};
use docweave::progress::{EventBus, ProgressEvent, SectionPhase};
use docweave::text::measure::body_len;
use std::sync::Arc;

use crate::integration::support::{
    drain, stub_config, HangingEvidence, ScriptedClient, StaticEvidence, StubResolver,
};

fn three_part_outline() -> Vec<OutlineItem> {
    vec![
        OutlineItem::new(1, "背景"),
        OutlineItem::new(1, "方案"),
        OutlineItem::new(1, "结论"),
    ]
}

#[tokio::test]
async fn report_without_outline_ends_in_references_with_one_title() {
    let client = Arc::new(ScriptedClient::new(600));
    let ctx = RunContext::new(stub_config(), StubResolver::new(client.clone()));
    let (bus, mut rx) = EventBus::new_pair();

    let doc = Orchestrator::new(Arc::new(ctx))
        .run(GenerationRequest::new("写一篇关于供应链管理的报告"), &bus)
        .await
        .unwrap();
    let events = drain(&mut rx);

    let planned = events
        .iter()
        .find_map(|e| match e {
            ProgressEvent::Plan { sections, .. } => Some(sections.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(planned.last().unwrap().title(), "参考文献");

    let top_level = doc.text.lines().filter(|l| l.starts_with("# ")).count();
    assert_eq!(top_level, 1);
    assert!(doc.text.contains("## 参考文献"));
    assert!(matches!(events.last(), Some(ProgressEvent::Final { .. })));
}

#[tokio::test]
async fn required_outline_keeps_three_primary_sections() {
    let config = stub_config();
    let request = GenerationRequest::new("写一份仓储系统改造方案").with_outline(three_part_outline(), false);

    let plan = Planner::new(&config.generation, None).plan(&request).await.unwrap();

    let titles: Vec<&str> = plan.sections.iter().map(|s| s.title()).collect();
    assert_eq!(titles, vec!["背景", "方案", "结论", "参考文献"]);
    let sum = plan.target_sum() as f64;
    let total = plan.total_chars as f64;
    assert!((sum - total).abs() / total <= 0.05, "sum {} vs total {}", sum, total);
}

#[tokio::test]
async fn two_failures_then_success_yield_two_retries_and_one_end() {
    let mut config = stub_config();
    config.generation.section_attempts = 3;
    let client = Arc::new(ScriptedClient::new(600).failing("背景", 2));
    let ctx = RunContext::new(config, StubResolver::new(client.clone()));
    let (bus, mut rx) = EventBus::new_pair();

    let request = GenerationRequest::new("写一份仓储系统改造方案").with_outline(three_part_outline(), false);
    let doc = Orchestrator::new(Arc::new(ctx)).run(request, &bus).await.unwrap();
    let events = drain(&mut rx);

    let phases: Vec<SectionPhase> = events
        .iter()
        .filter_map(|e| e.section_phase())
        .filter(|(token, _)| token.title() == "背景")
        .map(|(_, phase)| phase)
        .collect();
    assert_eq!(phases.iter().filter(|p| **p == SectionPhase::Retry).count(), 2);
    assert_eq!(phases.iter().filter(|p| **p == SectionPhase::End).count(), 1);
    assert_eq!(phases.first(), Some(&SectionPhase::Start));
    assert_eq!(phases.last(), Some(&SectionPhase::End));
    assert!(!doc.problems.iter().any(|p| p.contains("fallback content")));
}

#[tokio::test]
async fn hanging_evidence_degrades_to_empty_packs() {
    let mut config = stub_config();
    config.evidence.enabled = true;
    config.evidence.batch_timeout_secs = 1;
    let client = Arc::new(ScriptedClient::new(600));
    let ctx = RunContext::new(config, StubResolver::new(client)).with_evidence(Arc::new(HangingEvidence));
    let (bus, mut rx) = EventBus::new_pair();

    let request = GenerationRequest::new("写一份仓储系统改造方案").with_outline(three_part_outline(), false);
    let doc = Orchestrator::new(Arc::new(ctx)).run(request, &bus).await.unwrap();
    let events = drain(&mut rx);

    assert!(matches!(events.last(), Some(ProgressEvent::Final { .. })));
    assert!(doc
        .problems
        .iter()
        .any(|p| p.starts_with("evidence unavailable for 4 of 4 sections")));
    assert!(doc
        .problems
        .iter()
        .any(|p| p == "evidence mode is enabled but no sources were retrieved"));
}

#[tokio::test]
async fn retrieved_sources_without_citations_are_reported() {
    let mut config = stub_config();
    config.evidence.enabled = true;
    let client = Arc::new(ScriptedClient::new(600));
    let ctx = RunContext::new(config, StubResolver::new(client)).with_evidence(Arc::new(StaticEvidence));
    let (bus, _rx) = EventBus::new_pair();

    let request = GenerationRequest::new("写一份仓储系统改造方案").with_outline(three_part_outline(), false);
    let doc = Orchestrator::new(Arc::new(ctx)).run(request, &bus).await.unwrap();

    assert!(!doc.problems.iter().any(|p| p.starts_with("evidence unavailable")));
    assert!(doc.problems.iter().any(|p| p.contains("cites none")));
}

#[tokio::test]
async fn global_floor_pads_short_drafts_to_the_minimum() {
    let mut config = stub_config();
    config.generation.min_total_chars = 5000;
    let client = Arc::new(ScriptedClient::new(1000));
    let ctx = RunContext::new(config, StubResolver::new(client));
    let (bus, _rx) = EventBus::new_pair();

    let request = GenerationRequest::new("写一份仓储系统改造方案").with_outline(three_part_outline(), false);
    let doc = Orchestrator::new(Arc::new(ctx)).run(request, &bus).await.unwrap();

    let body: usize = doc.sections.iter().map(|(_, text)| body_len(text)).sum();
    assert!(body >= 5000, "document body is {} chars", body);
    assert!(!doc.problems.iter().any(|p| p.contains("below the configured minimum")));
    assert_eq!(doc.text.lines().filter(|l| l.starts_with("## ")).count(), 4);
}
