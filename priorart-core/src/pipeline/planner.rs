//! Query planner: idea text to validated search plans.

use crate::brain::{GenerationRequest, LlmProvider};
use crate::error::PlanningError;
use crate::pipeline::prompts;
use crate::pipeline::validation::{parse_plan, structured_value};
use crate::providers::{CallPolicy, with_retry};
use crate::trace::{TraceEvent, TraceRecorder};
use crate::types::{PlanLabel, SearchPlan};
use std::sync::Arc;
use tracing::{info, warn};

/// Turns one idea into up to one [`SearchPlan`] per configured label using a
/// single structured-generation call.
pub struct QueryPlanner {
    provider: Arc<dyn LlmProvider>,
    labels: Vec<PlanLabel>,
    policy: CallPolicy,
}

impl QueryPlanner {
    pub fn new(provider: Arc<dyn LlmProvider>, labels: &[PlanLabel], policy: CallPolicy) -> Self {
        Self {
            provider,
            labels: labels.to_vec(),
            policy,
        }
    }

    /// Generate and validate plans.
    ///
    /// A plan that fails validation is skipped and recorded; the call only
    /// fails when no plan survives or the gateway itself fails.
    pub async fn plan(
        &self,
        idea: &str,
        trace: &TraceRecorder,
    ) -> Result<Vec<SearchPlan>, PlanningError> {
        let request = GenerationRequest::new(prompts::planner_prompt(idea, &self.labels))
            .with_system(prompts::PLANNER_SYSTEM)
            .with_schema(
                prompts::PLANNER_SCHEMA_NAME,
                prompts::planner_schema(&self.labels),
            );

        let generation =
            with_retry(&self.policy, || self.provider.generate(request.clone())).await?;

        let root = structured_value(&generation)
            .map_err(|e| PlanningError::NoValidPlans { errors: vec![e] })?;

        let mut plans = Vec::with_capacity(self.labels.len());
        let mut all_errors = Vec::new();
        for &label in &self.labels {
            match parse_plan(&root, label) {
                Ok(validated) => {
                    if !validated.dropped_codes.is_empty() {
                        warn!(
                            plan = %label,
                            codes = ?validated.dropped_codes,
                            "Dropping malformed classification codes"
                        );
                        trace.record(TraceEvent::CodesDropped {
                            label,
                            codes: validated.dropped_codes,
                        });
                    }
                    plans.push(validated.plan);
                }
                Err(errors) => {
                    warn!(plan = %label, errors = errors.len(), "Search plan failed validation");
                    trace.record(TraceEvent::PlanRejected {
                        label,
                        errors: errors.clone(),
                    });
                    all_errors.extend(errors);
                }
            }
        }

        if plans.is_empty() {
            return Err(PlanningError::NoValidPlans { errors: all_errors });
        }

        let labels: Vec<PlanLabel> = plans.iter().map(SearchPlan::label).collect();
        info!(plans = ?labels, "Search plans generated");
        trace.record(TraceEvent::PlansGenerated { labels });
        Ok(plans)
    }
}
