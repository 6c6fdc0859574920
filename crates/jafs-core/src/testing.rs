//! Scripted provider for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::provider::{Completion, GenerationOptions, LlmProvider, ModelInfo, ProviderInfo};

type Responder = Box<dyn Fn(&str, &str) -> String + Send + Sync>;

pub(crate) enum Step {
    Reply(String),
    Unavailable,
    Fail,
}

/// Replays queued replies, then falls back to an optional responder closure
/// that sees `(system_prompt, prompt)`.
pub(crate) struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    responder: Option<Responder>,
    seen: Mutex<Vec<(String, String)>>,
}

impl ScriptedProvider {
    pub(crate) fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_steps(replies.into_iter().map(|r| Step::Reply(r.into())))
    }

    pub(crate) fn from_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            responder: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn responding(f: impl Fn(&str, &str) -> String + Send + Sync + 'static) -> Self {
        Self {
            responder: Some(Box::new(f)),
            ..Self::from_steps([])
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub(crate) fn prompts(&self) -> Vec<(String, String)> {
        self.seen.lock().unwrap().clone()
    }

    pub(crate) fn last_system_prompt(&self) -> Option<String> {
        self.seen.lock().unwrap().last().map(|(system, _)| system.clone())
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        Ok(ProviderInfo {
            name: "Scripted".into(),
            models: self.list_models().await?,
            supports_tools: false,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<Completion> {
        let system = options.system_prompt.clone().unwrap_or_default();
        self.seen
            .lock()
            .unwrap()
            .push((system.clone(), prompt.to_string()));

        let step = self.script.lock().unwrap().pop_front();
        let content = match step {
            Some(Step::Reply(text)) => text,
            Some(Step::Unavailable) => {
                return Err(AgentError::ProviderUnavailable("connection refused".into()));
            }
            Some(Step::Fail) => return Err(AgentError::Provider("model crashed".into())),
            None => match &self.responder {
                Some(f) => f(&system, prompt),
                None => return Err(AgentError::Provider("script exhausted".into())),
            },
        };

        Ok(Completion {
            content,
            model: options.model.clone(),
        })
    }

    async fn embed(&self, text: &str, _options: &GenerationOptions) -> Result<Vec<f32>> {
        #[allow(clippy::cast_precision_loss)]
        Ok(vec![text.len() as f32, 1.0])
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "scripted".into(),
            name: "scripted".into(),
        }])
    }
}
