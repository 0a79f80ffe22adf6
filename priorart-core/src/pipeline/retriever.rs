//! Hybrid retriever: hypothetical-abstract embedding plus classification-code
//! filtering, with a relaxed rerun when the filter is too narrow.

use crate::config::{MetadataSchema, PipelineConfig};
use crate::embeddings::Embedder;
use crate::error::{GatewayError, RetrievalError};
use crate::providers::{CallPolicy, with_retry};
use crate::trace::{TraceEvent, TraceRecorder};
use crate::types::{PlanLabel, RetrievedDocument, SearchPlan};
use crate::vector_store::{MetadataFilter, StoreMatch, StoreQuery, VectorStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fallback metadata field for snippet text.
const ABSTRACT_FIELD: &str = "abstract";

/// Executes one plan's hybrid search.
pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    metadata: MetadataSchema,
    top_k: usize,
    min_results: usize,
    overfetch_factor: usize,
    policy: CallPolicy,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        metadata: MetadataSchema,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            metadata,
            top_k: pipeline.top_k_per_plan,
            min_results: pipeline.relaxed_retry_min_results,
            overfetch_factor: pipeline.overfetch_factor,
            policy: CallPolicy::from(pipeline),
        }
    }

    /// Retrieve at most `top_k` documents for `plan`, best first.
    pub async fn retrieve(
        &self,
        plan: &SearchPlan,
        trace: &TraceRecorder,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let label = plan.label();
        let vector = with_retry(&self.policy, || {
            self.embedder.embed(plan.hypothetical_abstract())
        })
        .await
        .map_err(RetrievalError::Embedding)?;

        let filter = (!plan.classification_codes().is_empty()).then(|| MetadataFilter::AnyOf {
            field: self.metadata.codes_field.clone(),
            values: plan
                .classification_codes()
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
        });
        let filtered = filter.is_some();

        let documents = self
            .search(label, vector.clone(), filter)
            .await
            .map_err(RetrievalError::Store)?;

        if !filtered || documents.len() >= self.min_results {
            info!(plan = %label, results = documents.len(), filtered, "Plan retrieval complete");
            return Ok(documents);
        }

        warn!(
            plan = %label,
            results = documents.len(),
            threshold = self.min_results,
            "Classification filter too narrow, retrying without it"
        );
        trace.record(TraceEvent::FilterRelaxed {
            label,
            filtered_results: documents.len(),
            threshold: self.min_results,
        });

        match self.search(label, vector, None).await {
            Ok(relaxed) => {
                info!(plan = %label, results = relaxed.len(), "Relaxed retrieval complete");
                Ok(relaxed)
            }
            Err(e) => {
                warn!(plan = %label, error = %e, "Relaxed query failed, keeping filtered results");
                trace.record(TraceEvent::RelaxedQueryFailed {
                    label,
                    error: e.to_string(),
                });
                Ok(documents)
            }
        }
    }

    async fn search(
        &self,
        label: PlanLabel,
        vector: Vec<f32>,
        filter: Option<MetadataFilter>,
    ) -> Result<Vec<RetrievedDocument>, GatewayError> {
        let query = StoreQuery {
            vector,
            top_k: self.top_k * self.overfetch_factor,
            filter,
        };
        debug!(plan = %label, top_k = query.top_k, filtered = query.filter.is_some(), "Searching");
        let matches = with_retry(&self.policy, || self.store.query(query.clone())).await?;
        Ok(self.collapse(label, matches))
    }

    /// Map hits to documents, keep the best chunk per document id, sort by
    /// descending score, and truncate to `top_k`.
    fn collapse(&self, label: PlanLabel, matches: Vec<StoreMatch>) -> Vec<RetrievedDocument> {
        let mut documents: Vec<RetrievedDocument> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for hit in &matches {
            let doc = self.to_document(label, hit);
            match index.get(&doc.document_id) {
                Some(&i) => {
                    if doc.score > documents[i].score {
                        documents[i] = doc;
                    }
                }
                None => {
                    index.insert(doc.document_id.clone(), documents.len());
                    documents.push(doc);
                }
            }
        }

        documents.sort_by(|a, b| b.score.total_cmp(&a.score));
        documents.truncate(self.top_k);
        documents
    }

    fn to_document(&self, label: PlanLabel, hit: &StoreMatch) -> RetrievedDocument {
        let schema = &self.metadata;
        RetrievedDocument {
            document_id: hit
                .metadata_str(&schema.document_id_field)
                .unwrap_or(hit.id.as_str())
                .to_string(),
            title: hit
                .metadata_str(&schema.title_field)
                .unwrap_or_default()
                .to_string(),
            snippet: hit
                .metadata_str(&schema.text_field)
                .or_else(|| hit.metadata_str(ABSTRACT_FIELD))
                .unwrap_or_default()
                .to_string(),
            classification_codes: hit.metadata_strings(&schema.codes_field),
            score: hit.score,
            source_plan: label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::embeddings::LocalEmbedder;
    use crate::types::ClassificationCode;
    use crate::vector_store::MockVectorStore;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn pipeline() -> PipelineConfig {
        PipelineConfig {
            top_k_per_plan: 3,
            relaxed_retry_min_results: 2,
            overfetch_factor: 2,
            per_call_timeout_ms: 500,
            retry: RetryConfig {
                max_attempts: 2,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
                backoff_multiplier: 2.0,
                jitter: false,
            },
            ..Default::default()
        }
    }

    fn plan(codes: &[&str]) -> SearchPlan {
        let codes: BTreeSet<ClassificationCode> = codes
            .iter()
            .filter_map(|c| ClassificationCode::parse(c))
            .collect();
        SearchPlan::new(
            PlanLabel::NovelFeatures,
            vec!["healing".into()],
            "A self-healing coating.".into(),
            codes,
        )
    }

    fn chunk(patent: &str, n: usize, score: f32) -> StoreMatch {
        StoreMatch {
            id: format!("{patent}-chunk-{n}"),
            score,
            metadata: json!({
                "patent_id": patent,
                "title": format!("Title {patent}"),
                "text": format!("Chunk {n} of {patent}"),
                "cpc_codes": ["C09D5/00"]
            })
            .as_object()
            .cloned()
            .unwrap(),
        }
    }

    fn retriever(store: Arc<MockVectorStore>) -> HybridRetriever {
        HybridRetriever::new(
            Arc::new(LocalEmbedder::new(8)),
            store,
            MetadataSchema::default(),
            &pipeline(),
        )
    }

    #[tokio::test]
    async fn test_collapses_chunks_and_truncates() {
        let store = Arc::new(MockVectorStore::new(8, |_| {
            Ok(vec![
                chunk("US1", 0, 0.70),
                chunk("US1", 1, 0.90),
                chunk("US2", 0, 0.80),
                chunk("US3", 0, 0.60),
                chunk("US4", 0, 0.50),
            ])
        }));
        let docs = retriever(store.clone())
            .retrieve(&plan(&[]), &TraceRecorder::new())
            .await
            .unwrap();

        let ids: Vec<&str> = docs.iter().map(|d| d.document_id.as_str()).collect();
        assert_eq!(ids, vec!["US1", "US2", "US3"]);
        assert_eq!(docs[0].snippet, "Chunk 1 of US1");
        assert!(docs.iter().all(|d| d.source_plan == PlanLabel::NovelFeatures));

        let queries = store.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].top_k, 6);
        assert!(queries[0].filter.is_none());
    }

    #[tokio::test]
    async fn test_relaxes_narrow_filter() {
        let store = Arc::new(MockVectorStore::new(8, |q| {
            if q.filter.is_some() {
                Ok(vec![chunk("US1", 0, 0.9)])
            } else {
                Ok(vec![chunk("US1", 0, 0.9), chunk("US2", 0, 0.8)])
            }
        }));
        let trace = TraceRecorder::new();
        let docs = retriever(store.clone())
            .retrieve(&plan(&["C09D 5/00"]), &trace)
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        let queries = store.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(
            queries[0].filter,
            Some(MetadataFilter::AnyOf {
                field: "cpc_codes".into(),
                values: vec!["C09D5/00".into()],
            })
        );
        assert!(queries[1].filter.is_none());
        assert!(trace.snapshot().events().any(|e| matches!(
            e,
            TraceEvent::FilterRelaxed {
                filtered_results: 1,
                threshold: 2,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_sufficient_filtered_results_skip_relaxation() {
        let store = Arc::new(MockVectorStore::new(8, |_| {
            Ok(vec![chunk("US1", 0, 0.9), chunk("US2", 0, 0.8)])
        }));
        let trace = TraceRecorder::new();
        retriever(store.clone())
            .retrieve(&plan(&["C09D5/00"]), &trace)
            .await
            .unwrap();
        assert_eq!(store.query_count(), 1);
        assert!(trace.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_relaxed_failure_keeps_filtered_results() {
        let store = Arc::new(MockVectorStore::new(8, |q| {
            if q.filter.is_some() {
                Ok(vec![chunk("US1", 0, 0.9)])
            } else {
                Err(GatewayError::AuthFailed {
                    provider: "pinecone".into(),
                })
            }
        }));
        let trace = TraceRecorder::new();
        let docs = retriever(store)
            .retrieve(&plan(&["C09D5/00"]), &trace)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(trace
            .snapshot()
            .events()
            .any(|e| matches!(e, TraceEvent::RelaxedQueryFailed { .. })));
    }

    #[tokio::test]
    async fn test_store_failure_is_retried_then_surfaced() {
        let store = Arc::new(MockVectorStore::new(8, |_| {
            Err(GatewayError::Connection {
                message: "reset".into(),
            })
        }));
        let err = retriever(store.clone())
            .retrieve(&plan(&[]), &TraceRecorder::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Store(GatewayError::Connection { .. })));
        assert_eq!(store.query_count(), 2);
    }

    #[test]
    fn test_missing_metadata_falls_back() {
        let retriever = retriever(Arc::new(MockVectorStore::empty(8)));
        let hit = StoreMatch {
            id: "EP123".into(),
            score: 0.4,
            metadata: json!({"abstract": "An abstract."}).as_object().cloned().unwrap(),
        };
        let doc = retriever.to_document(PlanLabel::BaseTechnology, &hit);
        assert_eq!(doc.document_id, "EP123");
        assert_eq!(doc.snippet, "An abstract.");
        assert!(doc.title.is_empty());
        assert!(doc.classification_codes.is_empty());
    }
}
