//! LLM Provider Strategy Pattern
//!
//! Defines the model capability agents consume. A backend only has to
//! implement plain generation and embeddings; tool-augmented generation and
//! structured extraction are layered on top through prompt instructions and
//! the extractor in [`crate::extract`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jafs_core::provider::{GenerationOptions, LlmProvider};
//!
//! let provider = OllamaProvider::from_env();
//! let completion = provider.generate("Why is the sky blue?", &GenerationOptions::default()).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::extract::{self, Extraction};
use crate::tool::{ToolCall, ToolSchema, render_tool_section};

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "llama3.2", "qwq:32b")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// System message sent ahead of the prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

const fn default_temperature() -> f32 {
    0.0
}

const fn default_top_p() -> f32 {
    1.0
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            temperature: default_temperature(),
            max_tokens: None,
            top_p: default_top_p(),
            system_prompt: None,
        }
    }
}

impl GenerationOptions {
    #[must_use]
    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Model that generated this response
    pub model: String,
}

/// Response from tool-augmented generation
#[derive(Clone, Debug, Default)]
pub struct ToolCompletion {
    /// Visible text with tool-call blocks removed
    pub content: String,

    /// Tool calls requested by the model, in order
    pub tool_calls: Vec<ToolCall>,

    /// The unprocessed completion text
    pub raw: String,
}

impl ToolCompletion {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let Extraction {
            content,
            tool_calls,
        } = extract::extract(&raw);
        Self {
            content,
            tool_calls,
            raw,
        }
    }
}

/// Provider metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name (e.g., "Ollama")
    pub name: String,

    /// Available models
    pub models: Vec<ModelInfo>,

    /// Whether the backend calls tools natively
    pub supports_tools: bool,
}

/// Information about a model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

const STRUCTURED_SYSTEM_PROMPT: &str = "Extract the requested information and respond only with a valid JSON object according to the specified schema. Do not include any other text.";

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// Agents work exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get provider information and capabilities
    async fn info(&self) -> Result<ProviderInfo>;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion for a single prompt
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<Completion>;

    /// Generate with tools described in the system message.
    ///
    /// Backends without native tool calling get the tool list and JSON
    /// instructions appended to the system prompt; calls are then recovered
    /// from the completion text.
    async fn generate_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<ToolCompletion> {
        let mut options = options.clone();
        if !tools.is_empty() {
            let mut system = options.system_prompt.take().unwrap_or_default();
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str(&render_tool_section(tools));
            options.system_prompt = Some(system);
        }

        let completion = self.generate(prompt, &options).await?;
        Ok(ToolCompletion::from_raw(completion.content))
    }

    /// Ask for a JSON object matching `schema` and recover it from the reply
    async fn extract_structured(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
        options: &GenerationOptions,
    ) -> Result<serde_json::Value> {
        let mut options = options.clone();
        if options.system_prompt.is_none() {
            options.system_prompt = Some(STRUCTURED_SYSTEM_PROMPT.into());
        }

        let schema_prompt = format!(
            "Schema: {schema}\n\nPrompt: {prompt}\n\nRespond with a valid JSON object only."
        );
        let completion = self.generate(&schema_prompt, &options).await?;

        extract::recover_json(&completion.content).ok_or_else(|| {
            tracing::warn!(model = %completion.model, "No JSON found in structured response");
            AgentError::Parse("Failed to parse JSON response".into())
        })
    }

    /// Embed text as a vector of floats
    async fn embed(&self, text: &str, options: &GenerationOptions) -> Result<Vec<f32>>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use crate::tool::ParameterSchema;
    use serde_json::json;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert!(opts.temperature.abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, None);
        assert_eq!(opts.model, "llama3.2");
    }

    #[tokio::test]
    async fn test_generate_with_tools_appends_tool_section() {
        let provider = ScriptedProvider::new(["```json\n{\"tool_calls\": [{\"name\": \"datetime\"}]}\n```"]);
        let schema = ToolSchema {
            name: "datetime".into(),
            description: "Current time".into(),
            parameters: vec![ParameterSchema::optional("format", "string", "iso or human")],
        };
        let options = GenerationOptions::default().with_system_prompt("You are helpful.");

        let completion = provider
            .generate_with_tools("What time is it?", &[schema], &options)
            .await
            .unwrap();

        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.content, "");

        let system = provider.last_system_prompt().unwrap();
        assert!(system.starts_with("You are helpful."));
        assert!(system.contains("- datetime: Current time"));
    }

    #[tokio::test]
    async fn test_extract_structured_recovers_fenced_json() {
        let provider = ScriptedProvider::new(["Here:\n```json\n{\n  \"city\": \"Paris\"\n}\n```"]);

        let value = provider
            .extract_structured("Where is the Louvre?", &json!({"city": "string"}), &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(value, json!({"city": "Paris"}));
    }

    #[tokio::test]
    async fn test_extract_structured_parse_error() {
        let provider = ScriptedProvider::new(["I don't know."]);

        let err = provider
            .extract_structured("?", &json!({}), &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Parse(_)));
    }
}
