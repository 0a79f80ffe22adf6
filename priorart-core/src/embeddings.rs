//! Pluggable embedding providers for hypothetical-abstract search vectors.
//!
//! Provides a trait-based abstraction over embedding models, with
//! implementations for the OpenAI embeddings API and a local hashed
//! bag-of-words embedder that needs no network.

use crate::config::EmbeddingConfig;
use crate::error::GatewayError;
use crate::providers::{map_http_error, resolve_api_key, retry_after_header};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError>;

    /// Return the dimensionality of embeddings.
    fn dimensions(&self) -> usize;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Local hashed term-frequency embedder (always available, deterministic).
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous embedding, shared by the trait impl and test fixtures.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        // L2 normalize
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }
}

/// djb2 string hash.
fn simple_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        Ok(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

/// OpenAI API embedder (uses text-embedding-3-small by default).
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, GatewayError> {
        let api_key = resolve_api_key("openai-embeddings", &config.api_key_env)?;
        Ok(Self::new_with_key(config, api_key))
    }

    pub fn new_with_key(config: &EmbeddingConfig, api_key: String) -> Self {
        Self {
            client: crate::providers::http_client(),
            api_key,
            model: config.model.clone(),
            dims: config.dimensions,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".into())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// Pull the first embedding out of an `/embeddings` response body.
    fn parse_embedding(body: &Value, expected_dims: usize) -> Result<Vec<f32>, GatewayError> {
        let values = body["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| GatewayError::ResponseParse {
                message: "No embedding in response".to_string(),
            })?;
        let vector: Vec<f32> = values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        if vector.len() != expected_dims {
            return Err(GatewayError::ResponseParse {
                message: format!(
                    "Embedding has {} dimensions, expected {}",
                    vector.len(),
                    expected_dims
                ),
            });
        }
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": text,
            "dimensions": self.dims,
        });

        debug!(url = %url, model = %self.model, chars = text.len(), "Requesting embedding");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;

        let status = response.status();
        let retry_after = retry_after_header(response.headers());
        let text = response
            .text()
            .await
            .map_err(GatewayError::from_transport)?;
        if !status.is_success() {
            return Err(map_http_error("OpenAI embeddings", status, retry_after, &text));
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| GatewayError::ResponseParse {
            message: format!("Invalid JSON: {}", e),
        })?;
        Self::parse_embedding(&json, self.dims)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
