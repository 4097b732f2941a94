//! Shared stubs: a scripted model client, a single-client resolver and evidence providers.

use async_trait::async_trait;
use docweave::config::DocweaveConfig;
use docweave::error::ApiError;
use docweave::generation::prompts::{REVIEWER_SYSTEM, SINGLE_PASS_SYSTEM, WRITER_SYSTEM};
use docweave::generation::{EvidenceProvider, EvidenceSource, RetrievedEvidence};
use docweave::progress::ProgressEvent;
use docweave::provider::{
    ChatMessage, CompletionOptions, CompletionResponse, MessageRole, ModelClientResolver,
    ModelProviderClient, TokenUsage,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// What the stub does when asked to write a section body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterMode {
    Answer,
    Hang,
}

/// Model client answering by system prompt. Section bodies are `body_chars` characters of
/// Chinese prose; planner requests get an unusable reply so planning stays heuristic.
pub struct ScriptedClient {
    models: Vec<String>,
    body_chars: usize,
    delay: Duration,
    writer: WriterMode,
    failures: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(body_chars: usize) -> Self {
        Self {
            models: vec!["stub-model".to_string()],
            body_chars,
            delay: Duration::ZERO,
            writer: WriterMode::Answer,
            failures: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_writer(mut self, writer: WriterMode) -> Self {
        self.writer = writer;
        self
    }

    /// The first `count` drafts of `section` fail with a retryable error.
    pub fn failing(self, section: &str, count: usize) -> Self {
        self.failures.lock().insert(section.to_string(), count);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `complete` calls observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn body(&self, title: &str) -> String {
        let sentence = format!("{}部分围绕供应链协同展开分析，说明现状、问题与改进路径。", title);
        let per = sentence.chars().count().max(1);
        let repeats = (self.body_chars / per).max(1);
        let mut paragraphs = Vec::new();
        for i in 0..repeats {
            paragraphs.push(format!("{}{}", sentence, i));
        }
        paragraphs.join("\n\n")
    }

    fn reply_for(&self, system: &str, user: &str) -> Result<String, ApiError> {
        if system == REVIEWER_SYSTEM {
            return Ok(r#"{"issues": []}"#.to_string());
        }
        if system == SINGLE_PASS_SYSTEM {
            return Ok(format!(
                "# 单次生成文档\n\n## 概述\n\n{}\n\n## 参考文献\n\n[1] 供应链管理实务",
                self.body("概述")
            ));
        }
        if system != WRITER_SYSTEM {
            return Ok("unavailable".to_string());
        }
        let title = section_title(user).unwrap_or_default();
        if let Some(left) = self.failures.lock().get_mut(&title) {
            if *left > 0 {
                *left -= 1;
                return Err(ApiError::ProviderRequestFailed(format!(
                    "scripted failure for {}",
                    title
                )));
            }
        }
        Ok(self.body(&title))
    }
}

/// Title quoted in a section prompt.
fn section_title(prompt: &str) -> Option<String> {
    let marker = "Write the body of the section \"";
    let start = prompt.find(marker)? + marker.len();
    let end = prompt[start..].find('"')?;
    Some(prompt[start..start + end].to_string())
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelProviderClient for ScriptedClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let system = messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let user = messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak.fetch_max(now, Ordering::SeqCst);

        if system == WRITER_SYSTEM && self.writer == WriterMode::Hang {
            futures::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let content = self.reply_for(&system, &user)?;
        Ok(CompletionResponse {
            content,
            model: self.models[0].clone(),
            usage: TokenUsage::default(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        &self.models[0]
    }

    async fn list_models(&self) -> Result<Vec<String>, ApiError> {
        Ok(self.models.clone())
    }
}

/// Resolves every model to the same client.
pub struct StubResolver {
    pub client: Arc<ScriptedClient>,
    default_model: String,
}

impl StubResolver {
    pub fn new(client: Arc<ScriptedClient>) -> Arc<Self> {
        let default_model = client.model_name().to_string();
        Arc::new(Self {
            client,
            default_model,
        })
    }
}

impl ModelClientResolver for StubResolver {
    fn client_for(&self, _model: &str) -> Result<Arc<dyn ModelProviderClient>, ApiError> {
        Ok(self.client.clone())
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

/// Evidence provider that never answers.
pub struct HangingEvidence;

#[async_trait]
impl EvidenceProvider for HangingEvidence {
    async fn retrieve(&self, _section: &str, _instruction: &str) -> Result<RetrievedEvidence, ApiError> {
        futures::future::pending::<()>().await;
        Ok(RetrievedEvidence::default())
    }
}

/// Evidence provider returning one source per section.
pub struct StaticEvidence;

#[async_trait]
impl EvidenceProvider for StaticEvidence {
    async fn retrieve(&self, section: &str, _instruction: &str) -> Result<RetrievedEvidence, ApiError> {
        Ok(RetrievedEvidence {
            context: format!("{}相关资料摘要", section),
            sources: vec![EvidenceSource {
                id: "1".to_string(),
                title: "供应链管理实务".to_string(),
                url: "https://example.org/scm".to_string(),
                snippet: "供应链协同".to_string(),
            }],
        })
    }
}

/// Config for runs against the stub: no model planning, no backoff, immediate progress.
pub fn stub_config() -> DocweaveConfig {
    let mut config = DocweaveConfig::default();
    config.generation.fast_plan = true;
    config.generation.analysis = false;
    config.generation.model_plan = false;
    config.generation.retry_backoff_ms = 0;
    config.generation.progress_interval_ms = 0;
    config.generation.poll_interval_ms = 10;
    config.cache.enabled = false;
    config
}

pub fn drain(rx: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
