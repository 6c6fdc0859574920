//! # jafs-runtime
//!
//! Model providers for JAFS.
//!
//! ## Providers
//!
//! - **Ollama** (default): Local LLM inference via Ollama
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jafs_runtime::provider_from_settings;
//!
//! let config = jafs_core::Config::load("config.yaml");
//! let provider = provider_from_settings(&config.models.default)?;
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;

use std::sync::Arc;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};

// Re-export core types for convenience
pub use jafs_core::{AgentError, LlmProvider, Message, Result, Role};

use jafs_core::config::ModelSettings;

/// Build the provider named in `models.default.provider`.
///
/// Ollama honours `base_url`, else `OLLAMA_HOST` / `OLLAMA_PORT`.
pub fn provider_from_settings(settings: &ModelSettings) -> Result<Arc<dyn LlmProvider>> {
    match settings.provider.to_ascii_lowercase().as_str() {
        #[cfg(feature = "ollama")]
        "ollama" => {
            let config = match &settings.base_url {
                Some(url) => OllamaConfig::from_base_url(url)?,
                None => OllamaConfig::from_env(),
            };
            tracing::info!(host = %config.host, port = config.port, model = %settings.model, "Using Ollama provider");
            Ok(Arc::new(OllamaProvider::from_config(config)))
        }
        other => Err(AgentError::Config(format!(
            "unsupported model provider '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str) -> ModelSettings {
        ModelSettings {
            provider: provider.into(),
            model: "llama3.2".into(),
            temperature: 0.0,
            max_tokens: None,
            base_url: Some("http://localhost:11434".into()),
        }
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let err = provider_from_settings(&settings("openai")).err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[cfg(feature = "ollama")]
    #[tokio::test]
    async fn test_ollama_provider_info_name() {
        let provider = provider_from_settings(&settings("Ollama")).unwrap();
        // No server is needed: model listing failures degrade to an empty list
        let info = provider.info().await.unwrap();
        assert_eq!(info.name, "Ollama");
    }
}
