//! Gateway implementations and the shared call discipline around them.
//!
//! Provides concrete backends for the three gateway traits:
//! - `OpenAiCompatibleProvider` for generation (Groq, OpenAI, Ollama, vLLM)
//! - `OpenAiEmbedder` / `LocalEmbedder` for embeddings
//! - `PineconeStore` for vector search
//!
//! Every call the pipeline makes goes through [`with_retry`], which bounds
//! each attempt with a timeout and backs off exponentially between attempts.

pub mod openai_compat;
pub mod pinecone;

use crate::brain::LlmProvider;
use crate::config::{EmbeddingConfig, LlmConfig, PipelineConfig, VectorStoreConfig};
use crate::embeddings::{Embedder, LocalEmbedder, OpenAiEmbedder};
use crate::error::GatewayError;
use crate::vector_store::VectorStore;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use crate::config::RetryConfig;
pub use openai_compat::OpenAiCompatibleProvider;
pub use pinecone::PineconeStore;

/// Retry and timeout settings applied to one gateway call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPolicy {
    pub retry: RetryConfig,
    pub per_call_timeout: Duration,
}

impl From<&PipelineConfig> for CallPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            per_call_timeout: config.per_call_timeout(),
        }
    }
}

/// Execute an async gateway call with a per-attempt timeout and exponential
/// backoff on transient errors.
///
/// A timed-out attempt becomes `GatewayError::Timeout`, which is retried like
/// any other transient failure. Permanent errors (auth, parse) return immediately.
pub async fn with_retry<F, Fut, T>(policy: &CallPolicy, mut operation: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let config = &policy.retry;
    let max_attempts = config.max_attempts.max(1);
    let timeout_ms = policy.per_call_timeout.as_millis() as u64;

    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(policy.per_call_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout { timeout_ms }),
        };

        match outcome {
            Ok(val) => return Ok(val),
            Err(e) => {
                attempt += 1;
                if !is_retryable(&e) || attempt >= max_attempts {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt - 1, &e);
                tracing::warn!(
                    attempt,
                    max = max_attempts,
                    backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
        }
    }
}

fn is_retryable(err: &GatewayError) -> bool {
    err.is_retryable()
}

/// Compute backoff delay, respecting rate limit retry-after hints.
///
/// A server hint never pushes the delay past `max_backoff_ms`.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &GatewayError) -> u64 {
    let computed = compute_exponential_backoff(config, attempt);
    if let GatewayError::RateLimited { retry_after_secs } = err {
        let server_ms = retry_after_secs.saturating_mul(1000);
        let ceiling = config.max_backoff_ms.max(computed);
        return server_ms.max(computed).min(ceiling);
    }
    computed
}

/// Default transport-level timeout for gateway HTTP clients.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client shared by the gateway implementations.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Add up to 25% jitter
        let jitter = (capped as f64 * 0.25 * rand::random::<f64>()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Read an integral `Retry-After` header, in seconds.
pub(crate) fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Map a non-success HTTP status to the appropriate `GatewayError`.
pub(crate) fn map_http_error(
    provider: &str,
    status: reqwest::StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> GatewayError {
    match status.as_u16() {
        401 | 403 => {
            tracing::debug!(provider, body = %body, "Authentication failed ({})", status);
            GatewayError::AuthFailed {
                provider: provider.to_string(),
            }
        }
        429 => GatewayError::RateLimited {
            retry_after_secs: retry_after
                .or_else(|| retry_after_from_body(body))
                .unwrap_or(5),
        },
        code if code >= 500 => GatewayError::Server {
            status: code,
            message: body.to_string(),
        },
        code => GatewayError::ApiRequest {
            message: format!("HTTP {}: {}", code, body),
        },
    }
}

/// Extract the delay from messages like "Rate limit reached ... try again in 7s".
fn retry_after_from_body(body: &str) -> Option<u64> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let message = parsed.get("error")?.get("message")?.as_str()?;
    let tail = message.rsplit("in ").next()?;
    let digits: String = tail
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse::<f64>().ok().map(|secs| secs.ceil() as u64)
}

/// Read an API key from the named environment variable.
pub fn resolve_api_key(provider: &str, env_var: &str) -> Result<String, GatewayError> {
    std::env::var(env_var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| GatewayError::AuthFailed {
            provider: format!("{provider}: env var '{env_var}' not set"),
        })
}

/// Create the generation provider named in the configuration.
///
/// Every supported backend speaks the OpenAI chat-completions dialect, so
/// the provider name only selects the default endpoint.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, GatewayError> {
    Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
}

/// Create the embedder named in the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, GatewayError> {
    match config.provider.as_str() {
        "local" => Ok(Arc::new(LocalEmbedder::new(config.dimensions))),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => Err(GatewayError::Unsupported {
            name: format!("embedding provider '{other}'"),
        }),
    }
}

/// Create the vector store client named in the configuration.
pub fn create_vector_store(
    config: &VectorStoreConfig,
) -> Result<Arc<dyn VectorStore>, GatewayError> {
    match config.provider.as_str() {
        "pinecone" => Ok(Arc::new(PineconeStore::new(config)?)),
        other => Err(GatewayError::Unsupported {
            name: format!("vector store '{other}'"),
        }),
    }
}
