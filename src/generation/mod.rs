//! Document generation: planning, parallel section drafting, repair and aggregation.

pub mod aggregate;
pub mod cache;
pub mod evidence;
pub mod filler;
pub mod model_pool;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod postprocess;
pub mod prompts;
pub mod repair;
pub mod request;
pub mod scheduler;
pub mod stall_guard;
pub mod worker;

pub use aggregate::{normalize_headings, AggregatedDocument, Aggregator};
pub use cache::{CacheStats, ContentCache};
pub use evidence::{
    EvidencePack, EvidencePrefetcher, EvidenceProvider, EvidenceSource, NoEvidence,
    RetrievedEvidence,
};
pub use filler::{ContentFiller, TemplateFiller};
pub use model_pool::{Affinity, ModelPool};
pub use orchestrator::{Orchestrator, RunContext};
pub use plan::{DocumentPlan, PlanSection, SectionBudget, StructPlanItem};
pub use planner::Planner;
pub use request::{GeneratedDocument, GenerationRequest, OutlineItem, PhaseTiming};
pub use scheduler::SectionScheduler;
pub use stall_guard::StallGuard;
pub use worker::{SectionOutcome, SectionResult};
