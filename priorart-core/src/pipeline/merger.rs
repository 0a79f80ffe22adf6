//! Result merger: per-plan candidates to one deduplicated grounding set.

use crate::trace::{TraceEvent, TraceRecorder};
use crate::types::{GroundedDocument, GroundingSet, PlanLabel, PlanScore, RetrievedDocument};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Merges plan results by document id.
///
/// Plans are consumed in the order given, which is plan-generation order.
/// The first plan to return a document supplies its display fields; every
/// plan's score is kept. Ranking across plans uses the best (max) score.
#[derive(Debug, Clone)]
pub struct ResultMerger {
    cap: usize,
}

impl ResultMerger {
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1) }
    }

    pub fn merge(
        &self,
        results: Vec<(PlanLabel, Vec<RetrievedDocument>)>,
        trace: &TraceRecorder,
    ) -> GroundingSet {
        let mut merged: Vec<GroundedDocument> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (plan, documents) in results {
            for document in documents {
                let score = PlanScore {
                    plan,
                    score: document.score,
                };
                match index.get(&document.document_id) {
                    Some(&i) => merged[i].scores.push(score),
                    None => {
                        index.insert(document.document_id.clone(), merged.len());
                        merged.push(GroundedDocument {
                            document,
                            scores: vec![score],
                        });
                    }
                }
            }
        }

        debug!(unique = merged.len(), cap = self.cap, "Merged plan results");

        if merged.len() > self.cap {
            merged = self.apply_cap(merged, trace);
        }

        GroundingSet::from_unique(merged)
    }

    /// Keep the `cap` best documents by best score, in first-seen order.
    fn apply_cap(&self, merged: Vec<GroundedDocument>, trace: &TraceRecorder) -> Vec<GroundedDocument> {
        let mut ranked: Vec<usize> = (0..merged.len()).collect();
        // Stable sort: equal scores keep first-seen precedence.
        ranked.sort_by(|&a, &b| merged[b].best_score().total_cmp(&merged[a].best_score()));
        let keep: HashSet<usize> = ranked.into_iter().take(self.cap).collect();

        let (kept, dropped): (Vec<_>, Vec<_>) = merged
            .into_iter()
            .enumerate()
            .partition(|(i, _)| keep.contains(i));
        let dropped: Vec<String> = dropped.into_iter().map(|(_, d)| d.id().to_string()).collect();

        info!(kept = kept.len(), dropped = dropped.len(), "Grounding set capped");
        trace.record(TraceEvent::GroundingCapped {
            kept: kept.len(),
            dropped,
        });
        kept.into_iter().map(|(_, d)| d).collect()
    }
}
