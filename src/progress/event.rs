//! Event schema for progress observability.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::generation::plan::{SectionBudget, StructPlanItem};
use crate::text::SectionToken;

/// Top-level run phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Plan,
    DraftSections,
    Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseMark {
    Start,
    End,
}

/// Per-section lifecycle. For one section the emitted phases always read
/// `start, (delta | retry)*, end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionPhase {
    Start,
    Delta,
    Retry,
    End,
}

/// Closed set of events a run emits. `final` or `error` is always the last event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    State {
        name: RunPhase,
        phase: PhaseMark,
    },
    Plan {
        title: String,
        sections: Vec<SectionToken>,
    },
    Targets {
        targets: Vec<SectionBudget>,
    },
    Section {
        section: SectionToken,
        phase: SectionPhase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attempt: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Progress {
        current: usize,
        total: usize,
        percent: u32,
        section: SectionToken,
        elapsed_ms: u64,
    },
    Delta {
        delta: String,
    },
    StructPlan {
        plan: Vec<StructPlanItem>,
    },
    Final {
        text: String,
        problems: Vec<String>,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn state(name: RunPhase, phase: PhaseMark) -> Self {
        ProgressEvent::State { name, phase }
    }

    pub fn section_start(section: &SectionToken) -> Self {
        Self::section(section, SectionPhase::Start)
    }

    pub fn section_end(section: &SectionToken) -> Self {
        Self::section(section, SectionPhase::End)
    }

    pub fn section_delta(section: &SectionToken, delta: impl Into<String>) -> Self {
        ProgressEvent::Section {
            section: section.clone(),
            phase: SectionPhase::Delta,
            delta: Some(delta.into()),
            attempt: None,
            error: None,
        }
    }

    pub fn section_retry(section: &SectionToken, attempt: u32, error: impl Into<String>) -> Self {
        ProgressEvent::Section {
            section: section.clone(),
            phase: SectionPhase::Retry,
            delta: None,
            attempt: Some(attempt),
            error: Some(error.into()),
        }
    }

    fn section(section: &SectionToken, phase: SectionPhase) -> Self {
        ProgressEvent::Section {
            section: section.clone(),
            phase,
            delta: None,
            attempt: None,
            error: None,
        }
    }

    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::State { .. } => "state",
            ProgressEvent::Plan { .. } => "plan",
            ProgressEvent::Targets { .. } => "targets",
            ProgressEvent::Section { .. } => "section",
            ProgressEvent::Progress { .. } => "progress",
            ProgressEvent::Delta { .. } => "delta",
            ProgressEvent::StructPlan { .. } => "struct_plan",
            ProgressEvent::Final { .. } => "final",
            ProgressEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Final { .. } | ProgressEvent::Error { .. })
    }

    /// Section this event belongs to, for section lifecycle events.
    pub fn section_phase(&self) -> Option<(&SectionToken, SectionPhase)> {
        match self {
            ProgressEvent::Section { section, phase, .. } => Some((section, *phase)),
            _ => None,
        }
    }
}

/// An event as seen at the consumer boundary: a known kind, or an unknown one kept
/// verbatim so newer producers do not break older consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Known(ProgressEvent),
    Passthrough(Value),
}

impl StreamEvent {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn known(&self) -> Option<&ProgressEvent> {
        match self {
            StreamEvent::Known(event) => Some(event),
            StreamEvent::Passthrough(_) => None,
        }
    }
}

impl From<ProgressEvent> for StreamEvent {
    fn from(event: ProgressEvent) -> Self {
        StreamEvent::Known(event)
    }
}
