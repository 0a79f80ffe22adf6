//! The four pipeline stages and the orchestrator that composes them.
//!
//! Query Planner -> Hybrid Retriever (one call per plan, concurrently) ->
//! Result Merger -> Analyst Synthesizer.

pub mod merger;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod retriever;
pub mod synthesizer;
pub mod validation;

pub use merger::ResultMerger;
pub use orchestrator::PriorArtAnalyst;
pub use planner::QueryPlanner;
pub use retriever::HybridRetriever;
pub use synthesizer::{AnalystSynthesizer, Synthesis};
