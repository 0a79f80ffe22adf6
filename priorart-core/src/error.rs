//! Error types for the prior-art core.
//!
//! Uses `thiserror` with one enum per concern: gateway calls, schema
//! validation, configuration, the individual pipeline stages, and the
//! caller-facing [`AnalysisError`] taxonomy.

use crate::trace::AnalysisTrace;
use serde::{Deserialize, Serialize};

/// Errors from calls to an external gateway (generation, embedding, vector store).
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Unsupported provider: {name}")]
    Unsupported { name: String },
}

impl GatewayError {
    /// Whether the failure is transient and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. }
                | GatewayError::Timeout { .. }
                | GatewayError::Connection { .. }
                | GatewayError::Server { .. }
        )
    }

    /// Map a transport-level `reqwest` failure.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout {
                timeout_ms: crate::providers::HTTP_TIMEOUT.as_millis() as u64,
            }
        } else if err.is_connect() || err.is_request() {
            GatewayError::Connection {
                message: err.to_string(),
            }
        } else {
            GatewayError::ApiRequest {
                message: format!("Request failed: {err}"),
            }
        }
    }
}

/// A single field that failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "missing or empty")
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Embedding dimension {embedder} does not match vector store dimension {store}")]
    DimensionMismatch { embedder: usize, store: usize },

    #[error("Configuration load error: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Could not read vector store dimension: {0}")]
    StoreUnavailable(#[source] GatewayError),
}

/// Errors from the query planner.
#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    #[error("generation failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("no search plan passed validation ({} field errors)", .errors.len())]
    NoValidPlans { errors: Vec<FieldError> },
}

/// Errors from a single plan's hybrid retrieval.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(#[source] GatewayError),

    #[error("vector store query failed: {0}")]
    Store(#[source] GatewayError),
}

/// Errors from the analyst synthesizer.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("generation failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("report failed validation: {}", format_field_errors(.errors))]
    Validation { errors: Vec<FieldError> },
}

/// Terminal errors surfaced by `PriorArtAnalyst::analyze`.
///
/// Every variant raised after planning started carries the trace recorded so
/// far, so a caller can reconstruct what the pipeline attempted.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("idea text is empty")]
    EmptyIdea,

    #[error("could not analyze idea: {reason}")]
    PlanningFailure { reason: String, trace: AnalysisTrace },

    #[error("retrieval failed for every search plan")]
    RetrievalFailure { trace: AnalysisTrace },

    #[error("report synthesis failed: {reason}")]
    SynthesisFailure { reason: String, trace: AnalysisTrace },

    #[error("analysis exceeded its {deadline_ms}ms deadline")]
    DeadlineExceeded { deadline_ms: u64, trace: AnalysisTrace },

    #[error("analysis was cancelled")]
    Cancelled,
}

impl AnalysisError {
    /// The trace attached to this error, if any.
    pub fn trace(&self) -> Option<&AnalysisTrace> {
        match self {
            AnalysisError::PlanningFailure { trace, .. }
            | AnalysisError::RetrievalFailure { trace }
            | AnalysisError::SynthesisFailure { trace, .. }
            | AnalysisError::DeadlineExceeded { trace, .. } => Some(trace),
            AnalysisError::EmptyIdea | AnalysisError::Cancelled => None,
        }
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_timeout_maps_to_timeout() {
        // Accepted by the kernel backlog but never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(50))
            .build()
            .unwrap();

        let err = client
            .get(format!("http://{addr}/describe_index_stats"))
            .send()
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let mapped = GatewayError::from_transport(err);
        assert!(matches!(mapped, GatewayError::Timeout { .. }), "{mapped:?}");
        assert!(mapped.is_retryable());
        drop(listener);
    }

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::RateLimited {
            retry_after_secs: 60,
        };
        assert_eq!(err.to_string(), "Rate limited by provider, retry after 60s");

        let err = GatewayError::Timeout { timeout_ms: 1500 };
        assert_eq!(err.to_string(), "Request timed out after 1500ms");
    }

    #[test]
    fn test_is_retryable() {
        assert!(GatewayError::RateLimited { retry_after_secs: 1 }.is_retryable());
        assert!(GatewayError::Timeout { timeout_ms: 10 }.is_retryable());
        assert!(
            GatewayError::Connection {
                message: "reset".into()
            }
            .is_retryable()
        );
        assert!(
            GatewayError::Server {
                status: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );
        assert!(
            !GatewayError::AuthFailed {
                provider: "groq".into()
            }
            .is_retryable()
        );
        assert!(
            !GatewayError::ResponseParse {
                message: "bad json".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_synthesis_validation_display() {
        let err = SynthesisError::Validation {
            errors: vec![
                FieldError::missing("summary"),
                FieldError::new("overlaps[0].analysis", "expected string"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "report failed validation: summary: missing or empty; overlaps[0].analysis: expected string"
        );
    }

    #[test]
    fn test_analysis_error_trace_access() {
        let err = AnalysisError::RetrievalFailure {
            trace: AnalysisTrace::default(),
        };
        assert!(err.trace().is_some());
        assert!(AnalysisError::Cancelled.trace().is_none());
        assert_eq!(
            AnalysisError::Cancelled.to_string(),
            "analysis was cancelled"
        );
    }
}
