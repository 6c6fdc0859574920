//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference.

use jafs_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, GenerationOptions, LlmProvider, ModelInfo, ProviderInfo},
};
use async_trait::async_trait;
use ollama_rs::{
    Ollama,
    error::OllamaError,
    generation::{
        chat::{ChatMessage, MessageRole, request::ChatMessageRequest},
        embeddings::request::GenerateEmbeddingsRequest,
    },
    models::ModelOptions,
};

const DEFAULT_HOST: &str = "http://localhost";
const DEFAULT_PORT: u16 = 11434;

/// Ollama provider configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.into());
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self { host, port }
    }

    /// Split `scheme://host[:port][/]` into host and port
    pub fn from_base_url(url: &str) -> Result<Self> {
        let url = url.trim().trim_end_matches('/');
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| AgentError::Config(format!("base_url '{url}' has no scheme")))?;
        if rest.is_empty() {
            return Err(AgentError::Config(format!("base_url '{url}' has no host")));
        }

        match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| AgentError::Config(format!("invalid port in base_url '{url}'")))?;
                Ok(Self {
                    host: format!("{scheme}://{host}"),
                    port,
                })
            }
            None => Ok(Self {
                host: url.to_string(),
                port: DEFAULT_PORT,
            }),
        }
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create a new Ollama provider with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_config(OllamaConfig {
            host: host.into(),
            port,
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(&config.host, config.port),
            config,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_config(OllamaConfig::from_env())
    }

    pub const fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Convert agent messages to Ollama format
    fn convert_messages(messages: Vec<Message>) -> Vec<ChatMessage> {
        messages
            .into_iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => MessageRole::System,
                    Role::User => MessageRole::User,
                    Role::Assistant => MessageRole::Assistant,
                };
                ChatMessage::new(role, m.content)
            })
            .collect()
    }

    /// Build Ollama model options
    fn build_options(opts: &GenerationOptions) -> ModelOptions {
        let options = ModelOptions::default()
            .temperature(opts.temperature)
            .top_p(opts.top_p);
        match opts.max_tokens.and_then(|n| i32::try_from(n).ok()) {
            Some(limit) => options.num_predict(limit),
            None => options,
        }
    }

    /// Connection problems are worth retrying; anything else is a model error
    fn map_error(err: &OllamaError) -> AgentError {
        let message = err.to_string();
        let lower = message.to_lowercase();
        if ["connect", "timed out", "timeout", "unreachable"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            AgentError::ProviderUnavailable(message)
        } else {
            AgentError::Provider(message)
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        let models = self.list_models().await.unwrap_or_default();

        Ok(ProviderInfo {
            name: "Ollama".into(),
            models,
            supports_tools: false, // tool calls are recovered from text
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.list_local_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(host = %self.config.host, port = self.config.port, error = %e, "Ollama health check failed");
                Ok(false)
            }
        }
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<Completion> {
        let messages = Message::request(options.system_prompt.as_deref(), prompt);
        let request = ChatMessageRequest::new(options.model.clone(), Self::convert_messages(messages))
            .options(Self::build_options(options));

        tracing::debug!(model = %options.model, "Sending chat request");
        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| Self::map_error(&e))?;

        Ok(Completion {
            content: response.message.content,
            model: options.model.clone(),
        })
    }

    async fn embed(&self, text: &str, options: &GenerationOptions) -> Result<Vec<f32>> {
        let request = GenerateEmbeddingsRequest::new(options.model.clone(), text.to_string().into());
        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| Self::map_error(&e))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("Ollama returned no embedding".into()))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        Ok(models
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name.clone(),
                name: m.name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
    }

    #[test]
    fn test_base_url_parsing() {
        assert_eq!(
            OllamaConfig::from_base_url("http://gpu-box:9000/").unwrap(),
            OllamaConfig {
                host: "http://gpu-box".into(),
                port: 9000
            }
        );
        assert_eq!(
            OllamaConfig::from_base_url("https://ollama.internal").unwrap().port,
            11434
        );
        assert!(OllamaConfig::from_base_url("localhost:11434").is_err());
        assert!(OllamaConfig::from_base_url("http://host:abc").is_err());
    }

    #[test]
    fn test_message_conversion() {
        let converted = OllamaProvider::convert_messages(Message::request(Some("You are helpful."), "Hello"));
        assert_eq!(converted.len(), 2);

        let converted = OllamaProvider::convert_messages(Message::request(Some("  "), "Hello"));
        assert_eq!(converted.len(), 1);
    }
}
