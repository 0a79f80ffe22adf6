//! Configuration system for priorart.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from the user config directory (`config.toml`) and/or
//! `.priorart/config.toml` in the workspace directory.

use crate::error::ConfigError;
use crate::types::PlanLabel;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub pipeline: PipelineConfig,
}

/// How schema-constrained generation is requested from an OpenAI-compatible API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredOutputMode {
    /// `response_format: json_object`; the schema travels in the system prompt.
    #[default]
    JsonObject,
    /// `response_format: json_schema` with strict schema enforcement.
    JsonSchema,
}

/// Configuration for the generative reasoning gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "groq", "openai", or any OpenAI-compatible endpoint.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Sampling temperature. Analysis wants deterministic output.
    pub temperature: f32,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    #[serde(default)]
    pub structured_output: StructuredOutputMode,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            base_url: None,
            temperature: 0.0,
            max_tokens: 4096,
            structured_output: StructuredOutputMode::JsonObject,
        }
    }
}

impl LlmConfig {
    /// Base URL, falling back to the provider's public endpoint.
    pub fn resolved_base_url(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        match self.provider.as_str() {
            "groq" => "https://api.groq.com/openai/v1".to_string(),
            "ollama" => "http://localhost:11434/v1".to_string(),
            _ => "https://api.openai.com/v1".to_string(),
        }
    }
}

/// Configuration for the embedding gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "openai" (default) or "local".
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Vector dimension; must match the store's index.
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            dimensions: 1536,
        }
    }
}

/// Names of the metadata fields the ingestion job writes for each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSchema {
    pub document_id_field: String,
    pub title_field: String,
    pub text_field: String,
    pub codes_field: String,
}

impl Default for MetadataSchema {
    fn default() -> Self {
        Self {
            document_id_field: "patent_id".to_string(),
            title_field: "title".to_string(),
            text_field: "text".to_string(),
            codes_field: "cpc_codes".to_string(),
        }
    }
}

/// Configuration for the vector store client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Provider name: "pinecone".
    pub provider: String,
    /// Index host, e.g. `https://patents-abc123.svc.us-east-1.pinecone.io`.
    #[serde(default)]
    pub host: String,
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub metadata: MetadataSchema,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: "pinecone".to_string(),
            host: String::new(),
            api_key_env: "PINECONE_API_KEY".to_string(),
            namespace: None,
            metadata: MetadataSchema::default(),
        }
    }
}

/// Exponential backoff settings for transient gateway failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Tunables for one `analyze` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of search plans to request (at most one per [`PlanLabel`]).
    pub plan_count: usize,
    pub top_k_per_plan: usize,
    /// Ceiling on documents handed to synthesis.
    pub grounding_set_cap: usize,
    /// A code-filtered search returning fewer documents than this is rerun unfiltered.
    pub relaxed_retry_min_results: usize,
    /// Store hits requested per wanted document, since chunks of one document collapse.
    pub overfetch_factor: usize,
    pub per_call_timeout_ms: u64,
    /// Budget for the whole analysis.
    pub deadline_ms: u64,
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            plan_count: 2,
            top_k_per_plan: 5,
            grounding_set_cap: 10,
            relaxed_retry_min_results: 3,
            overfetch_factor: 2,
            per_call_timeout_ms: 30_000,
            deadline_ms: 120_000,
            retry: RetryConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Labels of the plans to generate, in order.
    pub fn plan_labels(&self) -> &'static [PlanLabel] {
        static LABELS: [PlanLabel; 2] = PlanLabel::ALL;
        let count = self.plan_count.min(LABELS.len());
        &LABELS[..count]
    }

    /// Reject values the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if self.plan_count == 0 || self.plan_count > PlanLabel::ALL.len() {
            return invalid(format!(
                "pipeline.plan_count must be between 1 and {}, got {}",
                PlanLabel::ALL.len(),
                self.plan_count
            ));
        }
        if self.top_k_per_plan == 0 {
            return invalid("pipeline.top_k_per_plan must be at least 1".into());
        }
        if self.grounding_set_cap == 0 {
            return invalid("pipeline.grounding_set_cap must be at least 1".into());
        }
        if self.relaxed_retry_min_results > self.top_k_per_plan {
            return invalid(format!(
                "pipeline.relaxed_retry_min_results ({}) cannot exceed top_k_per_plan ({})",
                self.relaxed_retry_min_results, self.top_k_per_plan
            ));
        }
        if self.overfetch_factor == 0 {
            return invalid("pipeline.overfetch_factor must be at least 1".into());
        }
        if self.per_call_timeout_ms == 0 || self.deadline_ms == 0 {
            return invalid("pipeline timeouts must be non-zero".into());
        }
        if self.retry.max_attempts == 0 {
            return invalid("pipeline.retry.max_attempts must be at least 1".into());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return invalid("pipeline.retry.backoff_multiplier must be >= 1.0".into());
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `PRIORART_`)
/// 3. Workspace-local config (`.priorart/config.toml`)
/// 4. User config (`~/.config/priorart/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&AppConfig>,
) -> Result<AppConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "priorart", "priorart") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".priorart").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (PRIORART_LLM__MODEL, PRIORART_PIPELINE__TOP_K_PER_PLAN, etc.)
    figment = figment.merge(Env::prefixed("PRIORART_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: AppConfig = figment.extract().map_err(Box::new)?;
    config.pipeline.validate()?;
    Ok(config)
}
