//! Caller-side stall detection and the single-pass fallback.

use docweave::error::ApiError;
use docweave::generation::{GenerationRequest, RunContext, StallGuard};
use docweave::progress::{EventBus, ProgressEvent};
use std::sync::Arc;

use crate::integration::support::{drain, stub_config, ScriptedClient, StubResolver, WriterMode};

fn stalling_context(fallback: bool) -> (Arc<ScriptedClient>, Arc<RunContext>) {
    let mut config = stub_config();
    config.stream.stall_timeout_secs = 1;
    config.stream.overall_timeout_secs = 10;
    config.stream.fallback_enabled = fallback;
    config.stream.fallback_chunk_chars = 20;
    let client = Arc::new(ScriptedClient::new(300).with_writer(WriterMode::Hang));
    let ctx = RunContext::new(config, StubResolver::new(client.clone()));
    (client, Arc::new(ctx))
}

#[tokio::test]
async fn stalled_producer_falls_back_to_single_pass() {
    let (_client, ctx) = stalling_context(true);
    let (bus, mut rx) = EventBus::new_pair();

    let doc = StallGuard::new(ctx)
        .run(GenerationRequest::new("写一篇关于供应链管理的报告"), &bus)
        .await
        .unwrap();
    let events = drain(&mut rx);

    match events.last() {
        Some(ProgressEvent::Final { problems, .. }) => {
            assert!(problems.iter().any(|p| p.starts_with("fallback used: Generation stalled")));
        }
        other => panic!("expected final event, got {:?}", other),
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(doc.text.starts_with("# "));
    assert!(doc.text.contains("## 概述"));
}

#[tokio::test]
async fn stall_without_fallback_ends_in_error() {
    let (_client, ctx) = stalling_context(false);
    let (bus, mut rx) = EventBus::new_pair();

    let err = StallGuard::new(ctx)
        .run(GenerationRequest::new("写一篇关于供应链管理的报告"), &bus)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::GenerationStalled(_)));

    let events = drain(&mut rx);
    assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
    assert!(!events.iter().any(|e| matches!(e, ProgressEvent::Final { .. })));
}

#[tokio::test]
async fn healthy_run_passes_through_unchanged() {
    let config = stub_config();
    let client = Arc::new(ScriptedClient::new(600));
    let ctx = Arc::new(RunContext::new(config, StubResolver::new(client)));
    let (bus, mut rx) = EventBus::new_pair();

    let doc = StallGuard::new(ctx)
        .run(GenerationRequest::new("写一篇关于供应链管理的报告"), &bus)
        .await
        .unwrap();
    let events = drain(&mut rx);

    assert!(!doc.problems.iter().any(|p| p.starts_with("fallback used")));
    assert!(!doc.phase_timings.is_empty());
    match events.last() {
        Some(ProgressEvent::Final { text, .. }) => assert_eq!(text, &doc.text),
        other => panic!("expected final event, got {:?}", other),
    }
}
