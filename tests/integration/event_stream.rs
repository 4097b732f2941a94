//! Event stream contract: phase ordering, section identity, terminal event, passthrough.

use docweave::config::DocweaveConfig;
use docweave::generation::{GeneratedDocument, GenerationRequest, Orchestrator, RunContext};
use docweave::progress::{EventBus, PhaseMark, ProgressEvent, RunPhase, SectionPhase, StreamEvent};
use docweave::text::measure::body_len;
use docweave::text::SectionToken;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::integration::support::{drain, stub_config, ScriptedClient, StubResolver};

async fn run_with(config: DocweaveConfig) -> (GeneratedDocument, Vec<ProgressEvent>) {
    let client = Arc::new(ScriptedClient::new(500));
    let ctx = RunContext::new(config, StubResolver::new(client));
    let (bus, mut rx) = EventBus::new_pair();
    let doc = Orchestrator::new(Arc::new(ctx))
        .run(GenerationRequest::new("写一篇关于供应链管理的报告"), &bus)
        .await
        .unwrap();
    (doc, drain(&mut rx))
}

async fn run_events() -> Vec<ProgressEvent> {
    run_with(stub_config()).await.1
}

fn planned_tokens(events: &[ProgressEvent]) -> BTreeSet<SectionToken> {
    events
        .iter()
        .find_map(|e| match e {
            ProgressEvent::Plan { sections, .. } => Some(sections.iter().cloned().collect()),
            _ => None,
        })
        .unwrap()
}

/// Every section meets its planned minimum or is named in the problem list.
fn assert_floors_met_or_reported(doc: &GeneratedDocument, events: &[ProgressEvent]) {
    let minimums: HashMap<SectionToken, usize> = events
        .iter()
        .find_map(|e| match e {
            ProgressEvent::Targets { targets } => Some(
                targets
                    .iter()
                    .map(|t| (t.section.clone(), t.min_chars))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap();
    for (token, body) in &doc.sections {
        let min = minimums[token];
        let len = body_len(body);
        if len < min {
            let named = format!("section '{}' is below its minimum length", token.title());
            assert!(
                doc.problems.iter().any(|p| p.starts_with(&named)),
                "{} has {} < {} chars but no problem: {:?}",
                token,
                len,
                min,
                doc.problems
            );
        }
    }
}

#[tokio::test]
async fn phases_are_bracketed_in_run_order() {
    let events = run_events().await;
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
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn every_planned_section_has_one_lifecycle() {
    let events = run_events().await;
    let planned: BTreeSet<SectionToken> = events
        .iter()
        .find_map(|e| match e {
            ProgressEvent::Plan { sections, .. } => Some(sections.iter().cloned().collect()),
            _ => None,
        })
        .unwrap();
    let targeted: BTreeSet<SectionToken> = events
        .iter()
        .find_map(|e| match e {
            ProgressEvent::Targets { targets } => {
                Some(targets.iter().map(|t| t.section.clone()).collect())
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(planned, targeted);

    let mut lifecycles: HashMap<SectionToken, Vec<SectionPhase>> = HashMap::new();
    for (token, phase) in events.iter().filter_map(|e| e.section_phase()) {
        lifecycles.entry(token.clone()).or_default().push(phase);
    }
    let drafted: BTreeSet<SectionToken> = lifecycles.keys().cloned().collect();
    assert_eq!(drafted, planned);
    for (token, phases) in &lifecycles {
        assert_eq!(phases.first(), Some(&SectionPhase::Start), "{}", token);
        assert_eq!(phases.last(), Some(&SectionPhase::End), "{}", token);
        assert_eq!(phases.iter().filter(|p| **p == SectionPhase::End).count(), 1, "{}", token);
    }
}

#[tokio::test]
async fn document_sections_match_the_planned_tokens() {
    let (doc, events) = run_with(stub_config()).await;
    let produced: BTreeSet<SectionToken> = doc.sections.iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(produced, planned_tokens(&events));
    assert_eq!(produced.len(), doc.sections.len());
    assert_floors_met_or_reported(&doc, &events);
}

#[tokio::test]
async fn total_ceiling_keeps_floors_met_or_reported() {
    let mut config = stub_config();
    config.generation.max_total_chars = 1200;
    let (doc, events) = run_with(config).await;

    let total: usize = doc.sections.iter().map(|(_, body)| body_len(body)).sum();
    assert!(total <= 1200, "document body is {} chars", total);
    let produced: BTreeSet<SectionToken> = doc.sections.iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(produced, planned_tokens(&events));
    assert_floors_met_or_reported(&doc, &events);
}

#[tokio::test]
async fn progress_counts_up_to_the_section_total() {
    let events = run_events().await;
    let progress: Vec<(usize, usize, u32)> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress {
                current,
                total,
                percent,
                ..
            } => Some((*current, *total, *percent)),
            _ => None,
        })
        .collect();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0].0 < w[1].0));
    let (current, total, percent) = *progress.last().unwrap();
    assert_eq!(current, total);
    assert_eq!(percent, 100);
}

#[test]
fn unknown_event_kinds_pass_through_unchanged() {
    let raw = json!({"event": "heartbeat", "seq": 7, "note": "still alive"});
    let parsed = StreamEvent::parse(&raw.to_string()).unwrap();
    assert!(parsed.known().is_none());
    assert_eq!(serde_json::to_value(&parsed).unwrap(), raw);

    let known = StreamEvent::parse(r#"{"event":"error","message":"boom"}"#).unwrap();
    assert_eq!(
        known.known(),
        Some(&ProgressEvent::Error {
            message: "boom".to_string()
        })
    );
}
