//! Transparency trace: what the pipeline tried, degraded, or corrected.
//!
//! One [`TraceRecorder`] is created per `analyze` call and shared by the
//! stages of that call only. The recorded [`AnalysisTrace`] travels with the
//! returned `Report`, or with the `AnalysisError` on a fatal failure.

use crate::error::FieldError;
use crate::types::PlanLabel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// A degraded, corrected, or informational event raised during an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    /// The planner produced this many validated plans.
    PlansGenerated { labels: Vec<PlanLabel> },
    /// A plan failed schema validation and was skipped.
    PlanRejected {
        label: PlanLabel,
        errors: Vec<FieldError>,
    },
    /// Malformed classification codes were dropped before filtering.
    CodesDropped { label: PlanLabel, codes: Vec<String> },
    /// The code filter matched too few documents; the search was rerun unfiltered.
    FilterRelaxed {
        label: PlanLabel,
        filtered_results: usize,
        threshold: usize,
    },
    /// The unfiltered rerun failed; the filtered results were kept.
    RelaxedQueryFailed { label: PlanLabel, error: String },
    /// A plan's retrieval failed after retries and was left out of the merge.
    RetrievalDegraded { label: PlanLabel, error: String },
    /// The grounding set exceeded its ceiling and the weakest documents were dropped.
    GroundingCapped { kept: usize, dropped: Vec<String> },
    /// The model cited ids outside the grounding set; they were removed.
    CitationsStripped { ids: Vec<String> },
}

impl TraceEvent {
    /// Whether this event signals reduced confidence in the result.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            TraceEvent::PlanRejected { .. }
                | TraceEvent::FilterRelaxed { .. }
                | TraceEvent::RelaxedQueryFailed { .. }
                | TraceEvent::RetrievalDegraded { .. }
                | TraceEvent::CitationsStripped { .. }
        )
    }
}

/// A trace event with the time it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: TraceEvent,
}

/// Ordered record of everything notable that happened during one analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTrace {
    pub entries: Vec<TraceEntry>,
}

impl AnalysisTrace {
    pub fn events(&self) -> impl Iterator<Item = &TraceEvent> {
        self.entries.iter().map(|e| &e.event)
    }

    /// True when any recorded event lowered confidence in the result.
    pub fn is_degraded(&self) -> bool {
        self.events().any(TraceEvent::is_degraded)
    }

    /// Labels of plans whose retrieval failed.
    pub fn degraded_plans(&self) -> Vec<PlanLabel> {
        self.events()
            .filter_map(|e| match e {
                TraceEvent::RetrievalDegraded { label, .. } => Some(*label),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cheaply cloneable, append-only recorder scoped to a single analysis.
#[derive(Debug, Clone, Default)]
pub struct TraceRecorder {
    entries: Arc<Mutex<Vec<TraceEntry>>>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: TraceEvent) {
        let entry = TraceEntry {
            at: Utc::now(),
            event,
        };
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> AnalysisTrace {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        AnalysisTrace { entries }
    }
}
