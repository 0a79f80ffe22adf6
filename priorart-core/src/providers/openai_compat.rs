//! OpenAI-compatible chat-completions provider.
//!
//! Works with OpenAI, Groq, Ollama, vLLM, and any other endpoint that speaks
//! the `/chat/completions` dialect. Schema-constrained requests use either
//! `response_format: json_object` (schema carried in the system prompt) or
//! strict `json_schema`, depending on [`StructuredOutputMode`].

use crate::brain::{Generation, GenerationRequest, LlmProvider};
use crate::config::{LlmConfig, StructuredOutputMode};
use crate::error::GatewayError;
use crate::providers::{map_http_error, retry_after_header};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

/// Provider for any OpenAI-compatible chat-completions API.
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    structured_output: StructuredOutputMode,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider from configuration.
    ///
    /// Reads the API key from the environment variable named in `config.api_key_env`.
    pub fn new(config: &LlmConfig) -> Result<Self, GatewayError> {
        let base_url = config.resolved_base_url();
        let is_local = base_url.contains("localhost") || base_url.contains("127.0.0.1");

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .or_else(|| {
                if is_local {
                    // Local servers (Ollama, vLLM, LM Studio) don't require an API key
                    debug!("No API key set for local provider; using dummy bearer token");
                    Some("ollama".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| GatewayError::AuthFailed {
                provider: format!(
                    "{}: env var '{}' not set",
                    config.provider, config.api_key_env
                ),
            })?;
        Ok(Self::new_with_key(config, api_key))
    }

    /// Create a new provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Self {
        Self {
            client: super::http_client(),
            base_url: config.resolved_base_url(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            structured_output: config.structured_output,
        }
    }

    /// Build the chat-completions request body.
    fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut system = request.system.clone().unwrap_or_default();
        let mut response_format = None;

        if let Some(schema) = &request.schema {
            match self.structured_output {
                StructuredOutputMode::JsonObject => {
                    if !system.is_empty() {
                        system.push_str("\n\n");
                    }
                    system.push_str(&format!(
                        "Respond with a single JSON object that conforms to this JSON schema:\n{}",
                        schema.schema
                    ));
                    response_format = Some(json!({"type": "json_object"}));
                }
                StructuredOutputMode::JsonSchema => {
                    response_format = Some(json!({
                        "type": "json_schema",
                        "json_schema": {
                            "name": schema.name,
                            "schema": schema.schema,
                            "strict": true,
                        }
                    }));
                }
            }
        }

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "stream": false,
        });
        if let Some(format) = response_format {
            body["response_format"] = format;
        }
        body
    }

    /// Parse an OpenAI-format response body into a `Generation`.
    fn parse_response(
        body: &Value,
        model: &str,
        structured: bool,
    ) -> Result<Generation, GatewayError> {
        let choice = body
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| GatewayError::ResponseParse {
                message: "No choices in response".to_string(),
            })?;

        let text = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| GatewayError::ResponseParse {
                message: "No message content in choice".to_string(),
            })?
            .to_string();

        let structured = if structured {
            Some(
                serde_json::from_str::<Value>(strip_code_fences(&text)).map_err(|e| {
                    GatewayError::ResponseParse {
                        message: format!("Structured output is not valid JSON: {}", e),
                    }
                })?,
            )
        } else {
            None
        };

        Ok(Generation {
            text,
            structured,
            model: body
                .get("model")
                .and_then(|m| m.as_str())
                .unwrap_or(model)
                .to_string(),
        })
    }
}

/// Remove a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag, which may run straight into the body.
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(rest.len());
    let rest = &rest[tag_len..];
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(
            url = %url,
            model = %self.model,
            structured = request.schema.is_some(),
            "Sending chat completion request"
        );

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
        let response_body = response
            .text()
            .await
            .map_err(GatewayError::from_transport)?;

        if !status.is_success() {
            return Err(map_http_error("OpenAI-compatible", status, retry_after, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| GatewayError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;

        Self::parse_response(&json, &self.model, request.schema.is_some())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_structured_output(&self) -> bool {
        true
    }
}
