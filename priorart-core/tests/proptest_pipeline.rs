//! Property-based tests for the merger, citation enforcement, and
//! classification-code parsing.

use proptest::prelude::*;

use priorart_core::pipeline::ResultMerger;
use priorart_core::pipeline::synthesizer::enforce_citations;
use priorart_core::pipeline::validation::DraftReport;
use priorart_core::trace::{TraceEvent, TraceRecorder};
use priorart_core::types::{
    ClassificationCode, GroundingSet, Narrative, PlanLabel, ReferenceOverlap, RetrievedDocument,
};
use std::collections::HashSet;

fn doc(id: String, score: f32, plan: PlanLabel) -> RetrievedDocument {
    RetrievedDocument {
        title: format!("Title {id}"),
        snippet: String::new(),
        classification_codes: Vec::new(),
        document_id: id,
        score,
        source_plan: plan,
    }
}

/// Per-plan results drawn from a small id pool so overlaps are common.
fn plan_results() -> impl Strategy<Value = Vec<(PlanLabel, Vec<RetrievedDocument>)>> {
    let docs = prop::collection::vec((0u8..20, 0.0f32..1.0), 0..12);
    (docs.clone(), docs).prop_map(|(base, novel)| {
        let to_docs = |items: Vec<(u8, f32)>, plan| {
            items
                .into_iter()
                .map(|(id, score)| doc(format!("US{id}"), score, plan))
                .collect::<Vec<_>>()
        };
        vec![
            (PlanLabel::BaseTechnology, to_docs(base, PlanLabel::BaseTechnology)),
            (PlanLabel::NovelFeatures, to_docs(novel, PlanLabel::NovelFeatures)),
        ]
    })
}

fn grounding_of(results: Vec<(PlanLabel, Vec<RetrievedDocument>)>) -> GroundingSet {
    ResultMerger::new(50).merge(results, &TraceRecorder::new())
}

// --- Merger properties ---

proptest! {
    #[test]
    fn merged_ids_are_unique(results in plan_results(), cap in 1usize..15) {
        let set = ResultMerger::new(cap).merge(results, &TraceRecorder::new());
        let ids = set.ids();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        prop_assert_eq!(ids.len(), unique.len());
        prop_assert!(set.len() <= cap);
    }

    #[test]
    fn merge_keeps_every_id_under_cap(results in plan_results()) {
        let input: HashSet<String> = results
            .iter()
            .flat_map(|(_, docs)| docs.iter().map(|d| d.document_id.clone()))
            .collect();
        let set = ResultMerger::new(100).merge(results, &TraceRecorder::new());
        let merged: HashSet<String> = set.ids().into_iter().map(str::to_string).collect();
        prop_assert_eq!(merged, input);
    }

    #[test]
    fn capped_documents_outrank_dropped_ones(results in plan_results(), cap in 1usize..8) {
        let full = ResultMerger::new(100).merge(results.clone(), &TraceRecorder::new());
        let trace = TraceRecorder::new();
        let capped = ResultMerger::new(cap).merge(results, &trace);

        let kept_min = capped
            .documents()
            .iter()
            .map(|d| d.best_score())
            .fold(f32::INFINITY, f32::min);
        for d in full.documents() {
            if !capped.contains(d.id()) {
                prop_assert!(d.best_score() <= kept_min);
            }
        }
        let was_capped = trace
            .snapshot()
            .events()
            .any(|e| matches!(e, TraceEvent::GroundingCapped { .. }));
        prop_assert_eq!(was_capped, full.len() > cap);
    }

    #[test]
    fn capped_set_preserves_first_seen_order(results in plan_results(), cap in 1usize..8) {
        let full = ResultMerger::new(100).merge(results.clone(), &TraceRecorder::new());
        let capped = ResultMerger::new(cap).merge(results, &TraceRecorder::new());
        let expected: Vec<&str> = full
            .ids()
            .into_iter()
            .filter(|id| capped.contains(id))
            .collect();
        prop_assert_eq!(capped.ids(), expected);
    }
}

// --- Citation containment ---

proptest! {
    #[test]
    fn cited_ids_are_contained_in_grounding(
        results in plan_results(),
        cited in prop::collection::vec(0u8..40, 0..15),
        overlap_ids in prop::collection::vec(0u8..40, 0..5),
    ) {
        let grounding = grounding_of(results);
        let draft = DraftReport {
            narrative: Narrative {
                summary: "summary".into(),
                overlaps: overlap_ids
                    .iter()
                    .map(|id| ReferenceOverlap {
                        document_id: format!("US{id}"),
                        title: String::new(),
                        analysis: "overlap".into(),
                    })
                    .collect(),
                ..Default::default()
            },
            cited_ids: cited.iter().map(|id| format!("US{id}")).collect(),
        };
        let synthesis = enforce_citations(draft, &grounding, &TraceRecorder::new());

        let unique: HashSet<&String> = synthesis.cited_ids.iter().collect();
        prop_assert_eq!(unique.len(), synthesis.cited_ids.len());
        for id in &synthesis.cited_ids {
            prop_assert!(grounding.contains(id));
        }
        for overlap in &synthesis.narrative.overlaps {
            prop_assert!(grounding.contains(&overlap.document_id));
        }
        // Citation order follows grounding order.
        let positions: Vec<usize> = synthesis
            .cited_ids
            .iter()
            .filter_map(|id| grounding.ids().iter().position(|g| *g == id.as_str()))
            .collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}

// --- Classification codes ---

proptest! {
    #[test]
    fn valid_codes_canonicalize(
        section in prop::sample::select(vec!['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'Y']),
        class in 0u8..100,
        subclass in prop::char::range('A', 'Z'),
        group in 1u32..10_000,
        subgroup in 0u32..1_000_000,
        lowercase in any::<bool>(),
        spaced in any::<bool>(),
    ) {
        let sep = if spaced { " " } else { "" };
        let raw = format!("{section}{class:02}{subclass}{sep}{group}/{subgroup}");
        let raw = if lowercase { raw.to_lowercase() } else { raw };

        let code = ClassificationCode::parse(&raw);
        prop_assert!(code.is_some(), "rejected {}", raw);
        let code = code.unwrap();
        let expected = format!("{section}{class:02}{subclass}{group}/{subgroup}");
        prop_assert_eq!(code.as_str(), expected.as_str());
        // Canonical form is a fixed point.
        prop_assert_eq!(ClassificationCode::parse(code.as_str()), Some(code.clone()));
    }

    #[test]
    fn parsed_codes_never_contain_whitespace(raw in "\\PC{0,24}") {
        if let Some(code) = ClassificationCode::parse(&raw) {
            prop_assert!(!code.as_str().chars().any(char::is_whitespace));
            prop_assert!(code.as_str().contains('/'));
        }
    }
}
