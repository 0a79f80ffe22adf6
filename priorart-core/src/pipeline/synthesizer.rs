//! Analyst synthesizer: grounded report generation with citation enforcement.

use crate::brain::{GenerationRequest, LlmProvider};
use crate::error::SynthesisError;
use crate::pipeline::prompts;
use crate::pipeline::validation::{DraftReport, parse_report, structured_value};
use crate::providers::{CallPolicy, with_retry};
use crate::trace::{TraceEvent, TraceRecorder};
use crate::types::{GroundingSet, Narrative, NoveltySignal, ReportOutcome};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

const NO_PRIOR_ART_SUMMARY: &str =
    "No prior art was found in the indexed corpus for this invention description.";
const NO_PRIOR_ART_CONCLUSION: &str = "None of the search plans matched an indexed document. \
This reflects the coverage of the index only and is not a determination of novelty.";

/// Synthesizer output before it is assembled into a `Report`.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub outcome: ReportOutcome,
    pub narrative: Narrative,
    /// Subset of the grounding ids, in grounding order.
    pub cited_ids: Vec<String>,
}

impl Synthesis {
    /// The defined terminal state for an empty grounding set.
    pub fn no_prior_art() -> Self {
        Self {
            outcome: ReportOutcome::NoPriorArtFound,
            narrative: Narrative {
                summary: NO_PRIOR_ART_SUMMARY.to_string(),
                conclusion: NO_PRIOR_ART_CONCLUSION.to_string(),
                novelty: NoveltySignal::Undetermined,
                ..Default::default()
            },
            cited_ids: Vec::new(),
        }
    }
}

pub struct AnalystSynthesizer {
    provider: Arc<dyn LlmProvider>,
    policy: CallPolicy,
}

impl AnalystSynthesizer {
    pub fn new(provider: Arc<dyn LlmProvider>, policy: CallPolicy) -> Self {
        Self { provider, policy }
    }

    /// Produce a narrative grounded in `grounding`.
    ///
    /// An empty grounding set short-circuits to [`Synthesis::no_prior_art`]
    /// without calling the model.
    pub async fn synthesize(
        &self,
        idea: &str,
        grounding: &GroundingSet,
        trace: &TraceRecorder,
    ) -> Result<Synthesis, SynthesisError> {
        if grounding.is_empty() {
            info!("Grounding set is empty, reporting no prior art");
            return Ok(Synthesis::no_prior_art());
        }

        let request = GenerationRequest::new(prompts::analyst_prompt(idea, grounding))
            .with_system(prompts::ANALYST_SYSTEM)
            .with_schema(prompts::ANALYST_SCHEMA_NAME, prompts::analyst_schema());

        let generation =
            with_retry(&self.policy, || self.provider.generate(request.clone())).await?;

        let root = structured_value(&generation)
            .map_err(|e| SynthesisError::Validation { errors: vec![e] })?;
        let draft = parse_report(&root).map_err(|errors| SynthesisError::Validation { errors })?;

        let synthesis = enforce_citations(draft, grounding, trace);
        info!(
            cited = synthesis.cited_ids.len(),
            grounding = grounding.len(),
            novelty = %synthesis.narrative.novelty,
            "Report synthesized"
        );
        Ok(synthesis)
    }
}

/// Restrict citations and overlap entries to the grounding set.
///
/// Cited ids are the model's explicit citations plus every overlap id, kept
/// only when present in the grounding set, in grounding order. Anything else
/// is stripped and recorded.
pub fn enforce_citations(
    draft: DraftReport,
    grounding: &GroundingSet,
    trace: &TraceRecorder,
) -> Synthesis {
    let DraftReport {
        mut narrative,
        cited_ids: model_cited,
    } = draft;

    let mut stripped: Vec<String> = Vec::new();
    let mut note_stripped = |id: &str| {
        if !stripped.iter().any(|s| s == id) {
            stripped.push(id.to_string());
        }
    };

    let mut cited: HashSet<String> = HashSet::new();
    for id in model_cited.iter().chain(narrative.overlaps.iter().map(|o| &o.document_id)) {
        if grounding.contains(id) {
            cited.insert(id.clone());
        } else {
            note_stripped(id);
        }
    }

    narrative.overlaps.retain(|o| grounding.contains(&o.document_id));
    for overlap in &mut narrative.overlaps {
        if overlap.title.trim().is_empty()
            && let Some(doc) = grounding.get(&overlap.document_id)
        {
            overlap.title = doc.document.title.clone();
        }
    }

    if !stripped.is_empty() {
        warn!(ids = ?stripped, "Stripping citations outside the grounding set");
        trace.record(TraceEvent::CitationsStripped { ids: stripped });
    }

    let cited_ids = grounding
        .ids()
        .into_iter()
        .filter(|id| cited.contains(*id))
        .map(str::to_string)
        .collect();

    Synthesis {
        outcome: ReportOutcome::Grounded,
        narrative,
        cited_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::config::RetryConfig;
    use crate::error::GatewayError;
    use crate::pipeline::merger::ResultMerger;
    use crate::types::{PlanLabel, ReferenceOverlap, RetrievedDocument};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn policy() -> CallPolicy {
        CallPolicy {
            retry: RetryConfig {
                max_attempts: 2,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
                backoff_multiplier: 2.0,
                jitter: false,
            },
            per_call_timeout: Duration::from_secs(1),
        }
    }

    fn grounding(ids: &[&str]) -> GroundingSet {
        let docs = ids
            .iter()
            .map(|id| RetrievedDocument {
                document_id: id.to_string(),
                title: format!("Title {id}"),
                snippet: format!("Abstract {id}"),
                classification_codes: vec!["H01L31/18".into()],
                score: 0.8,
                source_plan: PlanLabel::BaseTechnology,
            })
            .collect();
        ResultMerger::new(10).merge(vec![(PlanLabel::BaseTechnology, docs)], &TraceRecorder::new())
    }

    #[tokio::test]
    async fn test_empty_grounding_skips_model() {
        let mock = Arc::new(MockLlmProvider::new());
        let synthesizer = AnalystSynthesizer::new(mock.clone(), policy());
        let out = synthesizer
            .synthesize("idea", &GroundingSet::default(), &TraceRecorder::new())
            .await
            .unwrap();
        assert_eq!(out.outcome, ReportOutcome::NoPriorArtFound);
        assert!(out.narrative.summary.contains("No prior art"));
        assert!(out.cited_ids.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_strips_hallucinated_citations() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_json(json!({
            "summary": "Partial overlap.",
            "overlaps": [
                {"document_id": "US2", "title": "", "analysis": "Shares the coating."},
                {"document_id": "US999", "title": "Ghost", "analysis": "Invented."}
            ],
            "differentiators": [],
            "novelty": "partial_overlap",
            "conclusion": "Proceed carefully.",
            "cited_ids": ["US3", "US404", "US2"]
        }));
        let synthesizer = AnalystSynthesizer::new(mock.clone(), policy());
        let trace = TraceRecorder::new();
        let set = grounding(&["US1", "US2", "US3"]);

        let out = synthesizer.synthesize("idea", &set, &trace).await.unwrap();
        assert_eq!(out.cited_ids, vec!["US2", "US3"]);
        assert_eq!(
            out.narrative.overlaps,
            vec![ReferenceOverlap {
                document_id: "US2".into(),
                title: "Title US2".into(),
                analysis: "Shares the coating.".into(),
            }]
        );
        assert_eq!(
            trace.snapshot().events().cloned().collect::<Vec<_>>(),
            vec![TraceEvent::CitationsStripped {
                ids: vec!["US404".into(), "US999".into()]
            }]
        );

        let prompt = &mock.requests()[0].prompt;
        assert!(prompt.contains("Document ID: US1"));
    }

    #[tokio::test]
    async fn test_missing_summary_is_validation_error() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_json(json!({"cited_ids": ["US1"]}));
        let synthesizer = AnalystSynthesizer::new(mock, policy());
        let err = synthesizer
            .synthesize("idea", &grounding(&["US1"]), &TraceRecorder::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_gateway_failure_surfaces() {
        let mock = Arc::new(MockLlmProvider::failing(GatewayError::RateLimited {
            retry_after_secs: 0,
        }));
        let synthesizer = AnalystSynthesizer::new(mock.clone(), policy());
        let err = synthesizer
            .synthesize("idea", &grounding(&["US1"]), &TraceRecorder::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Gateway(GatewayError::RateLimited { .. })));
        assert_eq!(mock.call_count(), 2);
    }

    #[test]
    fn test_overlap_ids_count_as_citations() {
        let draft = DraftReport {
            narrative: Narrative {
                summary: "s".into(),
                overlaps: vec![ReferenceOverlap {
                    document_id: "US3".into(),
                    title: "Mine".into(),
                    analysis: "a".into(),
                }],
                ..Default::default()
            },
            cited_ids: vec!["US1".into(), "US1".into()],
        };
        let trace = TraceRecorder::new();
        let out = enforce_citations(draft, &grounding(&["US1", "US2", "US3"]), &trace);
        assert_eq!(out.cited_ids, vec!["US1", "US3"]);
        assert_eq!(out.narrative.overlaps[0].title, "Mine");
        assert!(trace.snapshot().is_empty());
    }
}
