//! Cross-run section cache: a repeated run is served without model calls.

use docweave::config::CacheSettings;
use docweave::generation::{ContentCache, GenerationRequest, Orchestrator, OutlineItem, RunContext};
use docweave::progress::EventBus;
use std::sync::Arc;
use tempfile::TempDir;

use crate::integration::support::{stub_config, ScriptedClient, StubResolver};

fn request() -> GenerationRequest {
    GenerationRequest::new("写一份仓储系统改造方案").with_outline(
        vec![OutlineItem::new(1, "背景"), OutlineItem::new(1, "方案")],
        false,
    )
}

#[tokio::test]
async fn second_run_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let settings = CacheSettings::default();
    let cache = Arc::new(ContentCache::open(dir.path().join("sections"), &settings).unwrap());
    let client = Arc::new(ScriptedClient::new(600));
    let ctx = Arc::new(
        RunContext::new(stub_config(), StubResolver::new(client.clone())).with_cache(cache.clone()),
    );

    let (bus, _rx) = EventBus::new_pair();
    let first = Orchestrator::new(ctx.clone()).run(request(), &bus).await.unwrap();
    let calls_after_first = client.calls();
    assert!(calls_after_first > 0);
    assert_eq!(cache.stats().unwrap().entries, 3);

    let second = Orchestrator::new(ctx).run(request(), &bus).await.unwrap();
    assert_eq!(client.calls(), calls_after_first);
    assert_eq!(first.text, second.text);
}

#[tokio::test]
async fn cache_survives_reopen_and_clears() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sections");
    let settings = CacheSettings::default();
    let text = "供应链协同需要稳定的数据基础。".repeat(12);
    {
        let cache = ContentCache::open(&path, &settings).unwrap();
        assert!(cache.put("背景", "写方案", 300, &text).unwrap());
        cache.flush().unwrap();
    }

    let cache = ContentCache::open(&path, &settings).unwrap();
    assert_eq!(cache.get("背景", "写方案", 300).unwrap(), Some(text));
    assert_eq!(cache.get("背景", "写方案", 400).unwrap(), None);
    assert_eq!(cache.clear().unwrap(), 1);
    assert_eq!(cache.stats().unwrap().entries, 0);
}
