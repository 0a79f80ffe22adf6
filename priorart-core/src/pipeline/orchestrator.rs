//! Pipeline orchestrator: planner, concurrent retrieval, merger, synthesizer.
//!
//! Owns the per-analysis trace, the overall deadline, and cooperative
//! cancellation. Transient failures are retried inside each stage; the
//! orchestrator itself never retries.

use crate::brain::LlmProvider;
use crate::config::{AppConfig, MetadataSchema, PipelineConfig};
use crate::embeddings::Embedder;
use crate::error::{AnalysisError, ConfigError, GatewayError};
use crate::pipeline::merger::ResultMerger;
use crate::pipeline::planner::QueryPlanner;
use crate::pipeline::retriever::HybridRetriever;
use crate::pipeline::synthesizer::AnalystSynthesizer;
use crate::providers::{
    CallPolicy, create_embedder, create_provider, create_vector_store, with_retry,
};
use crate::trace::{TraceEvent, TraceRecorder};
use crate::types::{PlanLabel, ReferenceSummary, Report, RetrievedDocument};
use crate::vector_store::VectorStore;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Entry point of the core: `analyze(idea) -> Report`.
///
/// Gateways are shared read-only; concurrent `analyze` calls share no
/// mutable state.
pub struct PriorArtAnalyst {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    planner: QueryPlanner,
    retriever: HybridRetriever,
    merger: ResultMerger,
    synthesizer: AnalystSynthesizer,
    config: PipelineConfig,
}

impl PriorArtAnalyst {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        metadata: MetadataSchema,
        config: PipelineConfig,
    ) -> Self {
        let policy = CallPolicy::from(&config);
        Self {
            planner: QueryPlanner::new(provider.clone(), config.plan_labels(), policy.clone()),
            retriever: HybridRetriever::new(embedder.clone(), store.clone(), metadata, &config),
            merger: ResultMerger::new(config.grounding_set_cap),
            synthesizer: AnalystSynthesizer::new(provider, policy),
            embedder,
            store,
            config,
        }
    }

    /// Build every gateway from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        Ok(Self::new(
            create_provider(&config.llm)?,
            create_embedder(&config.embedding)?,
            create_vector_store(&config.vector_store)?,
            config.vector_store.metadata.clone(),
            config.pipeline.clone(),
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Verify the embedder and the index agree on vector dimension.
    ///
    /// The index lookup runs under the same retry and per-call timeout
    /// policy as every other gateway call.
    pub async fn check_compatibility(&self) -> Result<usize, ConfigError> {
        let store = with_retry(&CallPolicy::from(&self.config), || self.store.dimension())
            .await
            .map_err(ConfigError::StoreUnavailable)?;
        let embedder = self.embedder.dimensions();
        if store != embedder {
            return Err(ConfigError::DimensionMismatch { embedder, store });
        }
        info!(dimension = store, "Embedder and vector store dimensions match");
        Ok(store)
    }

    /// Analyze an idea with no external cancellation.
    pub async fn analyze(&self, idea: &str) -> Result<Report, AnalysisError> {
        self.analyze_with_cancellation(idea, &CancellationToken::new())
            .await
    }

    /// Analyze an idea, abandoning in-flight calls if `cancel` fires.
    ///
    /// The whole analysis is bounded by `pipeline.deadline_ms`.
    pub async fn analyze_with_cancellation(
        &self,
        idea: &str,
        cancel: &CancellationToken,
    ) -> Result<Report, AnalysisError> {
        let idea = idea.trim();
        if idea.is_empty() {
            return Err(AnalysisError::EmptyIdea);
        }

        let trace = TraceRecorder::new();
        info!(chars = idea.len(), "Starting prior-art analysis");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Analysis cancelled");
                Err(AnalysisError::Cancelled)
            }
            outcome = tokio::time::timeout(self.config.deadline(), self.run(idea, &trace)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(deadline_ms = self.config.deadline_ms, "Analysis deadline exceeded");
                        Err(AnalysisError::DeadlineExceeded {
                            deadline_ms: self.config.deadline_ms,
                            trace: trace.snapshot(),
                        })
                    }
                }
            }
        }
    }

    async fn run(&self, idea: &str, trace: &TraceRecorder) -> Result<Report, AnalysisError> {
        let plans = self
            .planner
            .plan(idea, trace)
            .await
            .map_err(|e| AnalysisError::PlanningFailure {
                reason: e.to_string(),
                trace: trace.snapshot(),
            })?;

        let retrievals = futures::future::join_all(plans.iter().map(|plan| async move {
            (plan.label(), self.retriever.retrieve(plan, trace).await)
        }))
        .await;

        // join_all preserves input order, so plan order carries into the merge.
        let mut succeeded: Vec<(PlanLabel, Vec<RetrievedDocument>)> = Vec::new();
        for (label, result) in retrievals {
            match result {
                Ok(documents) => succeeded.push((label, documents)),
                Err(e) => {
                    warn!(plan = %label, error = %e, "Plan retrieval failed, continuing without it");
                    trace.record(TraceEvent::RetrievalDegraded {
                        label,
                        error: e.to_string(),
                    });
                }
            }
        }
        if succeeded.is_empty() {
            return Err(AnalysisError::RetrievalFailure {
                trace: trace.snapshot(),
            });
        }

        let grounding = self.merger.merge(succeeded, trace);
        info!(documents = grounding.len(), "Grounding set built");

        let synthesis = self
            .synthesizer
            .synthesize(idea, &grounding, trace)
            .await
            .map_err(|e| AnalysisError::SynthesisFailure {
                reason: e.to_string(),
                trace: trace.snapshot(),
            })?;

        let report = Report {
            id: Uuid::new_v4(),
            idea: idea.to_string(),
            outcome: synthesis.outcome,
            narrative: synthesis.narrative,
            cited_ids: synthesis.cited_ids,
            references: grounding
                .documents()
                .iter()
                .map(ReferenceSummary::from)
                .collect(),
            plans,
            trace: trace.snapshot(),
            generated_at: Utc::now(),
        };
        info!(
            report = %report.id,
            cited = report.cited_ids.len(),
            degraded = report.trace.is_degraded(),
            "Analysis complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::embeddings::LocalEmbedder;
    use crate::config::RetryConfig;
    use crate::vector_store::{MockVectorStore, StoreMatch, StoreQuery};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Answers queries but never reports its dimension.
    struct StalledStore;

    #[async_trait]
    impl VectorStore for StalledStore {
        async fn query(&self, _query: StoreQuery) -> Result<Vec<StoreMatch>, GatewayError> {
            Ok(Vec::new())
        }

        async fn dimension(&self) -> Result<usize, GatewayError> {
            std::future::pending().await
        }
    }

    fn analyst(store_dimension: usize) -> PriorArtAnalyst {
        PriorArtAnalyst::new(
            Arc::new(MockLlmProvider::new()),
            Arc::new(LocalEmbedder::new(16)),
            Arc::new(MockVectorStore::empty(store_dimension)),
            MetadataSchema::default(),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_check_compatibility() {
        assert_eq!(analyst(16).check_compatibility().await.unwrap(), 16);
        assert!(matches!(
            analyst(1536).check_compatibility().await,
            Err(ConfigError::DimensionMismatch {
                embedder: 16,
                store: 1536
            })
        ));
    }

    #[tokio::test]
    async fn test_check_compatibility_times_out_stalled_store() {
        let config = PipelineConfig {
            per_call_timeout_ms: 50,
            retry: RetryConfig {
                max_attempts: 2,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
                jitter: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let analyst = PriorArtAnalyst::new(
            Arc::new(MockLlmProvider::new()),
            Arc::new(LocalEmbedder::new(16)),
            Arc::new(StalledStore),
            MetadataSchema::default(),
            config,
        );

        let outcome = tokio::time::timeout(Duration::from_secs(2), analyst.check_compatibility())
            .await
            .expect("check_compatibility hung on a stalled store");
        assert!(matches!(
            outcome,
            Err(ConfigError::StoreUnavailable(GatewayError::Timeout {
                timeout_ms: 50
            }))
        ));
    }

    #[tokio::test]
    async fn test_blank_idea_is_rejected() {
        let err = analyst(16).analyze("   \n").await.unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyIdea));
    }

    #[tokio::test]
    async fn test_precancelled_token() {
        let token = CancellationToken::new();
        token.cancel();
        let err = analyst(16)
            .analyze_with_cancellation("an idea", &token)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled));
    }
}
