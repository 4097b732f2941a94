//! Planner: title, section list and per-section budget.
//!
//! Resolution never fails to produce sections. Each model-backed step is optional and
//! bounded by the plan timeout; a failure there is recorded as an advisory problem and the
//! heuristic result stands.

pub mod assist;
pub mod budget;
pub mod outline;
pub mod title;

use tracing::{debug, info, warn};

use crate::config::GenerationSettings;
use crate::error::ApiError;
use crate::generation::plan::{DocumentPlan, InstructionAnalysis};
use crate::generation::request::GenerationRequest;
use crate::provider::ModelProviderClient;
use crate::text::sanitize::{has_cjk, wants_acknowledgement};
use crate::text::SectionToken;

use assist::{apply_struct_plan, PlanAssistant};

const SEEDED_QUERIES: usize = 3;

pub struct Planner<'a> {
    settings: &'a GenerationSettings,
    client: Option<&'a dyn ModelProviderClient>,
}

impl<'a> Planner<'a> {
    /// `client` is the planning model; `None` (or fast-plan mode) skips every model step.
    pub fn new(settings: &'a GenerationSettings, client: Option<&'a dyn ModelProviderClient>) -> Self {
        let client = if settings.fast_plan { None } else { client };
        Self { settings, client }
    }

    fn assistant(&self) -> Option<PlanAssistant<'a>> {
        self.client.map(|client| {
            PlanAssistant::new(client, self.settings.plan_timeout(), self.settings.temperature)
        })
    }

    pub async fn plan(&self, request: &GenerationRequest) -> Result<DocumentPlan, ApiError> {
        let mut problems = Vec::new();
        let title = title::resolve_title(
            request.title.as_deref(),
            &request.existing_text,
            &request.instruction,
        );
        let cjk = has_cjk(&request.instruction) || has_cjk(&title);

        let sections = self.resolve_sections(request, &title, cjk, &mut problems).await;
        if sections.is_empty() {
            return Err(ApiError::NoSectionsResolved);
        }

        let analysis = self.analyze(&request.instruction, &mut problems).await;

        let total = self.settings.total_chars();
        let mut planned = budget::allocate(&sections, total);

        let mut struct_plan = Vec::new();
        if self.settings.model_plan {
            if let Some(assistant) = self.assistant() {
                match assistant
                    .struct_plan(&title, &request.instruction, &planned, total)
                    .await
                {
                    Ok(entries) => {
                        struct_plan = apply_struct_plan(&mut planned, entries, total);
                    }
                    Err(err) => {
                        warn!(error = %err, "Structured plan unavailable; using heuristic defaults");
                        problems.push(format!(
                            "model plan unavailable, heuristic defaults used: {}",
                            err
                        ));
                    }
                }
            }
        }

        if let Some(analysis) = &analysis {
            let seeds: Vec<String> = analysis
                .keywords
                .iter()
                .take(SEEDED_QUERIES)
                .cloned()
                .collect();
            for section in planned.iter_mut().filter(|s| s.evidence_queries.is_empty()) {
                section.evidence_queries = seeds.clone();
            }
        }

        let plan = DocumentPlan {
            title,
            expected_outline: sections,
            sections: planned,
            total_chars: total,
            analysis,
            struct_plan,
            problems,
        };
        info!(
            title = %plan.title,
            sections = plan.sections.len(),
            total_chars = plan.total_chars,
            target_sum = plan.target_sum(),
            "Document planned"
        );
        Ok(plan)
    }

    async fn resolve_sections(
        &self,
        request: &GenerationRequest,
        title: &str,
        cjk: bool,
        problems: &mut Vec<String>,
    ) -> Vec<SectionToken> {
        let allow_ack = self.settings.include_acknowledgements
            || wants_acknowledgement(&request.instruction);

        let candidates = if !request.required_outline.is_empty() {
            outline::from_required_outline(&request.required_outline, request.expand_outline)
        } else if !request.required_h2.is_empty() {
            outline::from_required_h2(&request.required_h2)
        } else if let Some(heuristic) = outline::heuristic_outline(&request.instruction) {
            heuristic
        } else if let Some(assistant) = self.assistant() {
            match assistant.outline(title, &request.instruction).await {
                Ok(sections) => sections,
                Err(err) => {
                    warn!(error = %err, "Model outline unavailable");
                    problems.push(format!("model outline unavailable: {}", err));
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let mut sections = outline::filter_sections(candidates, allow_ack);
        if outline::primary_count(&sections) == 0 {
            debug!("No sections resolved; using the fallback skeleton");
            sections = outline::fallback_skeleton(cjk);
        }
        outline::ensure_references(sections, cjk)
    }

    async fn analyze(&self, instruction: &str, problems: &mut Vec<String>) -> Option<InstructionAnalysis> {
        if !self.settings.analysis {
            return None;
        }
        let assistant = self.assistant()?;
        match assistant.analyze(instruction).await {
            Ok(analysis) => Some(analysis),
            Err(err) => {
                warn!(error = %err, "Instruction analysis unavailable");
                problems.push(format!("instruction analysis unavailable: {}", err));
                None
            }
        }
    }
}
