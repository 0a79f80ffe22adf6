//! Pinecone data-plane client.
//!
//! Talks to a single serverless or pod index through its host URL:
//! `POST /query` for similarity search and `POST /describe_index_stats` for
//! the index dimension.

use crate::config::VectorStoreConfig;
use crate::error::GatewayError;
use crate::providers::{map_http_error, resolve_api_key, retry_after_header};
use crate::vector_store::{StoreMatch, StoreQuery, VectorStore};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

const API_VERSION: &str = "2024-07";

/// Vector store backed by a Pinecone index.
pub struct PineconeStore {
    client: Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
}

impl PineconeStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, GatewayError> {
        let api_key = resolve_api_key("pinecone", &config.api_key_env)?;
        Self::new_with_key(config, api_key)
    }

    pub fn new_with_key(config: &VectorStoreConfig, api_key: String) -> Result<Self, GatewayError> {
        let host = config.host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(GatewayError::ApiRequest {
                message: "vector_store.host is not configured".to_string(),
            });
        }
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        Ok(Self {
            client: super::http_client(),
            host,
            api_key,
            namespace: config.namespace.clone(),
        })
    }

    fn query_body(&self, query: &StoreQuery) -> Value {
        let mut body = json!({
            "vector": query.vector,
            "topK": query.top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        if let Some(filter) = &query.filter {
            body["filter"] = filter.to_pinecone();
        }
        if let Some(namespace) = &self.namespace {
            body["namespace"] = json!(namespace);
        }
        body
    }

    fn parse_matches(body: &Value) -> Result<Vec<StoreMatch>, GatewayError> {
        let Some(matches) = body.get("matches") else {
            return Ok(Vec::new());
        };
        serde_json::from_value(matches.clone()).map_err(|e| GatewayError::ResponseParse {
            message: format!("Malformed query matches: {}", e),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.host, path);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
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
            return Err(map_http_error("pinecone", status, retry_after, &text));
        }
        serde_json::from_str(&text).map_err(|e| GatewayError::ResponseParse {
            message: format!("Invalid JSON: {}", e),
        })
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn query(&self, query: StoreQuery) -> Result<Vec<StoreMatch>, GatewayError> {
        debug!(
            host = %self.host,
            top_k = query.top_k,
            filtered = query.filter.is_some(),
            "Querying vector index"
        );
        let body = self.post("/query", &self.query_body(&query)).await?;
        Self::parse_matches(&body)
    }

    async fn dimension(&self) -> Result<usize, GatewayError> {
        let body = self.post("/describe_index_stats", &json!({})).await?;
        body.get("dimension")
            .and_then(Value::as_u64)
            .map(|d| d as usize)
            .ok_or_else(|| GatewayError::ResponseParse {
                message: "No dimension in index stats".to_string(),
            })
    }
}
