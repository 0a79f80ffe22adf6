//! # Prior-Art Core
//!
//! Core library for retrieval-augmented prior-art analysis.
//! Turns a free-text invention description into search plans, runs hybrid
//! vector + classification-code retrieval per plan, merges the evidence, and
//! synthesizes a report whose citations are restricted to that evidence.

pub mod brain;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod trace;
pub mod types;
pub mod vector_store;

// Re-export commonly used types at the crate root.
pub use brain::{Generation, GenerationRequest, LlmProvider, MockLlmProvider};
pub use config::{AppConfig, MetadataSchema, PipelineConfig, RetryConfig, load_config};
pub use embeddings::{Embedder, LocalEmbedder, OpenAiEmbedder};
pub use error::{
    AnalysisError, ConfigError, FieldError, GatewayError, PlanningError, RetrievalError,
    SynthesisError,
};
pub use pipeline::PriorArtAnalyst;
pub use trace::{AnalysisTrace, TraceEntry, TraceEvent};
pub use types::{
    ClassificationCode, GroundedDocument, GroundingSet, Narrative, NoveltySignal, PlanLabel,
    PlanScore, ReferenceOverlap, ReferenceSummary, Report, ReportOutcome, RetrievedDocument,
    SearchPlan,
};
pub use vector_store::{MetadataFilter, MockVectorStore, StoreMatch, StoreQuery, VectorStore};
