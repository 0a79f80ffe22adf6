//! Brain module: generative reasoning gateway abstraction.
//!
//! Defines the `LlmProvider` trait for model-agnostic generation in both
//! free-text and schema-constrained modes, plus a scriptable mock for tests.

use crate::error::GatewayError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A JSON schema the model's output must conform to.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

/// A single generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub prompt: String,
    /// When set, the provider runs in schema-constrained mode.
    pub schema: Option<OutputSchema>,
    /// Overrides the provider's configured temperature.
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.schema = Some(OutputSchema {
            name: name.into(),
            schema,
        });
        self
    }
}

/// Output of a generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// Raw text returned by the model.
    pub text: String,
    /// Parsed JSON value in schema-constrained mode, when the text parsed.
    pub structured: Option<Value>,
    pub model: String,
}

/// Trait for generative reasoning providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one generation and return the model output.
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GatewayError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Whether the provider natively enforces output schemas.
    fn supports_structured_output(&self) -> bool {
        false
    }
}

/// A scriptable provider for tests.
///
/// Queued outcomes are consumed in order; when the queue is empty the mock
/// returns the sticky failure if one is set, otherwise a placeholder text.
pub struct MockLlmProvider {
    model: String,
    outcomes: Mutex<VecDeque<Result<Generation, GatewayError>>>,
    sticky_failure: Option<GatewayError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            outcomes: Mutex::new(VecDeque::new()),
            sticky_failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A mock whose every call fails with `error`.
    pub fn failing(error: GatewayError) -> Self {
        Self {
            sticky_failure: Some(error),
            ..Self::new()
        }
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a JSON response (schema-constrained mode).
    pub fn queue_json(&self, value: Value) {
        self.push(Ok(Self::json_response(value)));
    }

    /// Queue a plain-text response.
    pub fn queue_text(&self, text: &str) {
        self.push(Ok(Self::text_response(text)));
    }

    /// Queue an error for the next call.
    pub fn queue_error(&self, error: GatewayError) {
        self.push(Err(error));
    }

    pub fn text_response(text: &str) -> Generation {
        Generation {
            text: text.to_string(),
            structured: None,
            model: "mock-model".to_string(),
        }
    }

    pub fn json_response(value: Value) -> Generation {
        Generation {
            text: value.to_string(),
            structured: Some(value),
            model: "mock-model".to_string(),
        }
    }

    /// Number of `generate` calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, outcome: Result<Generation, GatewayError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self.outcomes.lock().unwrap().pop_front();
        match (queued, &self.sticky_failure) {
            (Some(outcome), _) => outcome,
            (None, Some(error)) => Err(error.clone()),
            (None, None) => Ok(Self::text_response(
                "I'm a mock LLM. No queued responses available.",
            )),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_structured_output(&self) -> bool {
        true
    }
}
