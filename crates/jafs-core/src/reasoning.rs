//! Reasoning Loop
//!
//! One agent iterates: build a prompt from the task and recent memory, ask the
//! model with the agent's tools described, extract tool calls, run them and
//! write their results back to memory. A reply without tool calls is the
//! final answer. The loop never runs more than its iteration budget.

use std::fmt::Write as _;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{Value, json};

use crate::agent::{Agent, AgentProfile, TaskStatus};
use crate::error::Result;
use crate::provider::{GenerationOptions, ToolCompletion};
use crate::tool::{ToolCall, ToolResult, ToolSchema};

/// Memory entries shown to the model each iteration
const CONTEXT_ENTRIES: usize = 10;

/// Longest rendering of a single memory value inside a prompt
const CONTEXT_VALUE_CHARS: usize = 500;

/// Retry behavior for retryable model errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry; grows linearly
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Result of one bounded loop
#[derive(Clone, Debug)]
pub(crate) struct LoopOutcome {
    pub answer: String,
    pub status: TaskStatus,
    pub iterations: usize,
    pub error: Option<String>,
}

impl Agent {
    /// Iterate `profile` on `task` for at most `budget` model calls.
    ///
    /// `brief` is extra prompt material (handoffs, earlier answers).
    pub(crate) async fn iterate(
        &self,
        profile: &AgentProfile,
        task: &str,
        brief: &str,
        budget: usize,
    ) -> LoopOutcome {
        let schemas = self.tools.schemas_for(profile.tools());
        let options = self.generation.clone().with_system_prompt(profile.persona());

        let mut partial = String::new();
        let mut observation = String::new();
        let mut iterations = 0;

        while iterations < budget {
            iterations += 1;
            tracing::debug!(agent = %profile.name(), iteration = iterations, budget, "Starting iteration");

            let prompt = self.build_prompt(task, brief, iterations).await;
            let completion = match self.generate_with_retry(&prompt, &schemas, &options).await {
                Ok(completion) => completion,
                Err(e) => {
                    tracing::warn!(agent = %profile.name(), error = %e, "Model call failed");
                    return LoopOutcome {
                        answer: partial,
                        status: TaskStatus::Failed,
                        iterations,
                        error: Some(e.to_string()),
                    };
                }
            };

            if completion.tool_calls.is_empty() {
                tracing::debug!(agent = %profile.name(), iterations, "Final answer");
                return LoopOutcome {
                    answer: completion.content,
                    status: TaskStatus::Completed,
                    iterations,
                    error: None,
                };
            }

            if !completion.content.is_empty() {
                partial.clone_from(&completion.content);
            }

            let results = self.run_tool_calls(profile, &completion.tool_calls).await;
            observation = describe_results(&results);

            let mut memory = self.memory.lock().await;
            for (call, result) in completion.tool_calls.iter().zip(&results) {
                memory.remember(
                    format!("tool/{}/{iterations}/{}", profile.name(), call.id),
                    result_value(result),
                );
            }
        }

        tracing::info!(agent = %profile.name(), budget, "Iteration budget exhausted");
        LoopOutcome {
            answer: if partial.is_empty() { observation } else { partial },
            status: TaskStatus::Incomplete,
            iterations,
            error: None,
        }
    }

    async fn generate_with_retry(
        &self,
        prompt: &str,
        schemas: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<ToolCompletion> {
        let mut attempt = 0;
        loop {
            match self.provider.generate_with_tools(prompt, schemas, options).await {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.backoff * attempt;
                    tracing::warn!(attempt, error = %e, ?delay, "Retrying model call");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Execute one completion's calls concurrently; results keep call order
    async fn run_tool_calls(&self, profile: &AgentProfile, calls: &[ToolCall]) -> Vec<ToolResult> {
        let runs = calls.iter().map(|call| async move {
            if !profile.allows(&call.name) {
                tracing::debug!(agent = %profile.name(), tool = %call.name, "Tool not enabled for agent");
                return ToolResult::failure(
                    &call.name,
                    format!("Tool '{}' is not available to {}", call.name, profile.name()),
                )
                .with_id(&call.id);
            }

            tracing::debug!(agent = %profile.name(), tool = %call.name, id = %call.id, "Executing tool");
            self.tools.execute(call).await
        });

        join_all(runs).await
    }

    async fn build_prompt(&self, task: &str, brief: &str, iteration: usize) -> String {
        let context = self.memory.lock().await.context(CONTEXT_ENTRIES);

        let mut prompt = format!("Task: {task}\n");
        if !brief.is_empty() {
            prompt.push('\n');
            prompt.push_str(brief);
            prompt.push('\n');
        }

        if !context.is_empty() {
            prompt.push_str("\nRelevant context:\n");
            for (key, value) in &context {
                let _ = writeln!(prompt, "- {key}: {}", truncate(&render(value), CONTEXT_VALUE_CHARS));
            }
        }

        if iteration > 1 {
            prompt.push_str(
                "\nUse the tool results above to continue. Reply without tool calls once you have the final answer.\n",
            );
        }
        prompt
    }
}

fn result_value(result: &ToolResult) -> Value {
    json!({
        "name": result.name,
        "success": result.success,
        "message": result.message,
        "data": result.data,
    })
}

fn describe_results(results: &[ToolResult]) -> String {
    results
        .iter()
        .map(|r| {
            let outcome = if r.success { "returned" } else { "failed" };
            format!("[Tool '{}' {outcome}] {}", r.name, r.message)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
