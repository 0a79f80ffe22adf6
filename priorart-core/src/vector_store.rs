//! Vector store client abstraction.
//!
//! The store is an external, query-only collaborator: similarity search with
//! an optional set-membership filter over one metadata field.

use crate::error::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Mutex;

/// Metadata predicate applied server-side during a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataFilter {
    /// Matches when the field (a string or list of strings) shares at least
    /// one value with `values`.
    AnyOf { field: String, values: Vec<String> },
}

impl MetadataFilter {
    /// Render in the Mongo-style dialect Pinecone accepts.
    pub fn to_pinecone(&self) -> Value {
        match self {
            MetadataFilter::AnyOf { field, values } => {
                let mut filter = Map::new();
                filter.insert(field.clone(), json!({ "$in": values }));
                Value::Object(filter)
            }
        }
    }
}

/// One similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub filter: Option<MetadataFilter>,
}

/// A ranked hit returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StoreMatch {
    /// String metadata value, if present and non-empty.
    pub fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// List-of-strings metadata value. A lone string is treated as a
    /// one-element list.
    pub fn metadata_strings(&self, field: &str) -> Vec<String> {
        match self.metadata.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// Trait for vector store clients.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Ranked similarity search, best match first.
    async fn query(&self, query: StoreQuery) -> Result<Vec<StoreMatch>, GatewayError>;

    /// Dimension of the vectors in the index.
    async fn dimension(&self) -> Result<usize, GatewayError>;
}

type Responder = dyn Fn(&StoreQuery) -> Result<Vec<StoreMatch>, GatewayError> + Send + Sync;

/// A scriptable store for tests.
///
/// Answers every query through a closure, so concurrent plans get
/// deterministic responses regardless of arrival order. Every query is
/// recorded for later assertions.
pub struct MockVectorStore {
    dimension: usize,
    responder: Box<Responder>,
    queries: Mutex<Vec<StoreQuery>>,
}

impl MockVectorStore {
    pub fn new<F>(dimension: usize, responder: F) -> Self
    where
        F: Fn(&StoreQuery) -> Result<Vec<StoreMatch>, GatewayError> + Send + Sync + 'static,
    {
        Self {
            dimension,
            responder: Box::new(responder),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// A store that never matches anything.
    pub fn empty(dimension: usize) -> Self {
        Self::new(dimension, |_| Ok(Vec::new()))
    }

    /// Every query received, in arrival order.
    pub fn queries(&self) -> Vec<StoreQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn query(&self, query: StoreQuery) -> Result<Vec<StoreMatch>, GatewayError> {
        let result = (self.responder)(&query);
        self.queries.lock().unwrap().push(query);
        result
    }

    async fn dimension(&self) -> Result<usize, GatewayError> {
        Ok(self.dimension)
    }
}
