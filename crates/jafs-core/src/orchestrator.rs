//! Orchestrator
//!
//! Owns the configuration and the primary agent, creates specialized agents
//! on the first multi/auto task, dispatches tasks and keeps an append-only
//! history of what ran.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::{Agent, AgentOutcome, AgentProfile, Mode, SpecialistRole, StepRecord, TaskStatus};
use crate::config::Config;
use crate::error::Result;
use crate::memory::MemoryStore;
use crate::provider::LlmProvider;
use crate::tool::ToolRegistry;

/// Result envelope returned for every task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: String,
    pub mode: Mode,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepRecord>>,
    pub status: TaskStatus,
    /// Wall-clock seconds
    pub execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    fn from_outcome(task: &str, mode: Mode, outcome: AgentOutcome, execution_time: f64) -> Self {
        Self {
            task: task.to_string(),
            mode,
            answer: outcome.answer,
            iterations: outcome.iterations,
            steps: outcome.steps,
            status: outcome.status,
            execution_time,
            error: outcome.error,
        }
    }
}

/// One entry of the task history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task: String,
    pub mode: Mode,
    pub start_time: DateTime<Utc>,
    pub execution_time: f64,
    pub status: TaskStatus,
    pub result: TaskResult,
}

/// Row of [`Orchestrator::list_agents`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: Uuid,
    pub name: String,
    /// "primary" or the specialist role
    #[serde(rename = "type")]
    pub kind: String,
    pub primary: bool,
}

impl AgentSummary {
    fn of(profile: &AgentProfile) -> Self {
        Self {
            id: profile.id(),
            name: profile.name().to_string(),
            kind: profile
                .role()
                .map_or_else(|| "primary".to_string(), |role| role.to_string()),
            primary: profile.role().is_none(),
        }
    }
}

pub struct Orchestrator {
    config: Config,
    primary: Agent,
    history: Vec<TaskRecord>,
    last_result: Option<TaskResult>,
}

impl Orchestrator {
    /// Build the primary agent (and specialists when the default mode needs them)
    pub fn new(config: Config, provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Result<Self> {
        for name in &config.tools.enabled {
            if !tools.contains(name) {
                tracing::warn!(tool = %name, "Enabled tool is not registered");
            }
        }

        let memory = MemoryStore::from_settings(&config.memory)?.shared();
        let profile = AgentProfile::primary(&config.agent, &config.tools.enabled);
        tracing::info!(agent = %profile.name(), mode = %profile.mode(), "Created primary agent");

        let primary = Agent::new(profile, provider, tools, memory, config.generation_options());
        let mut orchestrator = Self {
            config,
            primary,
            history: Vec::new(),
            last_result: None,
        };

        if orchestrator.config.agent.mode.uses_specialists() {
            orchestrator.configure_specialists();
        }
        Ok(orchestrator)
    }

    /// Run a task. `mode` defaults to `agent.mode` from the configuration.
    pub async fn execute_task(&mut self, task: &str, mode: Option<Mode>) -> TaskResult {
        let mode = mode.unwrap_or(self.config.agent.mode);
        if mode.uses_specialists() {
            self.configure_specialists();
        }

        tracing::info!(%mode, task, "Processing task");
        let start_time = Utc::now();
        let started = Instant::now();

        let outcome = self.primary.execute(task, mode).await;

        let execution_time = started.elapsed().as_secs_f64();
        let result = TaskResult::from_outcome(task, mode, outcome, execution_time);
        tracing::info!(status = %result.status, execution_time, "Task finished");

        self.history.push(TaskRecord {
            task: task.to_string(),
            mode,
            start_time,
            execution_time,
            status: result.status,
            result: result.clone(),
        });
        self.last_result = Some(result.clone());
        result
    }

    /// Primary agent first, then specialists in pipeline order
    pub fn list_agents(&self) -> Vec<AgentSummary> {
        std::iter::once(self.primary.profile())
            .chain(self.primary.specialists().pipeline().map(|(_, agent)| agent))
            .map(AgentSummary::of)
            .collect()
    }

    /// The most recent `limit` records, most recent last
    pub fn task_history(&self, limit: usize) -> &[TaskRecord] {
        &self.history[self.history.len().saturating_sub(limit)..]
    }

    pub const fn last_result(&self) -> Option<&TaskResult> {
        self.last_result.as_ref()
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn primary(&self) -> &Agent {
        &self.primary
    }

    /// Merge `overlay` into the live configuration and update existing
    /// agents in place. Memory settings apply to the next orchestrator only.
    pub fn apply_override(&mut self, overlay: &Value) -> Result<()> {
        let config = self.config.merged(overlay)?;

        self.primary
            .profile_mut()
            .apply_agent_settings(&config.agent, &config.tools.enabled);
        self.primary.set_generation(config.generation_options());
        self.config = config;

        if !self.primary.specialists().is_empty() || self.config.agent.mode.uses_specialists() {
            self.configure_specialists();
        }
        tracing::info!("Applied configuration override");
        Ok(())
    }

    /// Create or update one specialist per configured role and drop the rest
    fn configure_specialists(&mut self) {
        let primary_max = self.primary.profile().max_iterations();
        let threshold = self.primary.profile().complexity_threshold();
        let mut configured = Vec::new();

        for name in &self.config.specialized_agents.roles {
            let role = match name.parse::<SpecialistRole>() {
                Ok(role) => role,
                Err(e) => {
                    tracing::warn!(role = %name, error = %e, "Skipping unknown specialist role");
                    continue;
                }
            };
            match self.config.role_settings(name, primary_max) {
                Ok(settings) => {
                    self.primary
                        .specialists_mut()
                        .configure(role, &settings, threshold);
                    configured.push(role);
                }
                Err(e) => tracing::warn!(%role, error = %e, "Skipping specialist with invalid settings"),
            }
        }

        self.primary.specialists_mut().retain(&configured);
    }
}
