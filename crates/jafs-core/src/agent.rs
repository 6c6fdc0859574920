//! Agent State Machine
//!
//! ```text
//!            blank task
//!   INIT ───────────────────────────────────────────► FAILED
//!    │
//!    ├─ single ─► ITERATING ──────────────────────────► DONE
//!    ├─ multi ──► DELEGATING (researcher → planner →
//!    │                         executor → critic) ─────► DONE
//!    └─ auto ───► ITERATING ── threshold reached,
//!                              no final answer ─► DELEGATING ─► DONE
//! ```
//!
//! The iteration loop lives in [`crate::reasoning`], the specialist pipeline
//! in [`crate::delegation`]. This module holds the records both work on and
//! the mode dispatch.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::{AgentSettings, RoleSettings};
use crate::error::AgentError;
use crate::memory::SharedMemory;
use crate::provider::{GenerationOptions, LlmProvider};
use crate::reasoning::RetryPolicy;
use crate::tool::ToolRegistry;

/// Execution strategy for a task
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Single,
    Multi,
    Auto,
}

impl Mode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multi => "multi",
            Self::Auto => "auto",
        }
    }

    /// Whether this mode may run the specialist pipeline
    pub const fn uses_specialists(self) -> bool {
        matches!(self, Self::Multi | Self::Auto)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "multi" => Ok(Self::Multi),
            "auto" => Ok(Self::Auto),
            other => Err(AgentError::Config(format!(
                "unknown mode '{other}' (expected single, multi or auto)"
            ))),
        }
    }
}

/// Final status of a task or a pipeline step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Incomplete,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Failed => "failed",
        })
    }
}

/// Role of a specialized agent. Ordering is pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialistRole {
    Researcher,
    Planner,
    Executor,
    Critic,
}

impl SpecialistRole {
    pub const PIPELINE: [Self; 4] = [Self::Researcher, Self::Planner, Self::Executor, Self::Critic];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::Planner => "planner",
            Self::Executor => "executor",
            Self::Critic => "critic",
        }
    }

    /// System prompt for the role
    pub const fn persona(self) -> &'static str {
        match self {
            Self::Researcher => {
                "You are the researcher on a team of agents. Gather the facts and background the team needs for the task. Use tools when they help. Report your findings concisely."
            }
            Self::Planner => {
                "You are the planner on a team of agents. Turn the task and the findings so far into a short numbered plan of concrete steps."
            }
            Self::Executor => {
                "You are the executor on a team of agents. Follow the plan and produce the complete deliverable for the task. Use tools when they help. Reply with the deliverable itself."
            }
            Self::Critic => {
                "You are the critic on a team of agents. Review the team's work against the task and point out concrete problems. End your reply with exactly one line: VERDICT: APPROVE or VERDICT: REVISE."
            }
        }
    }
}

impl fmt::Display for SpecialistRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecialistRole {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PIPELINE
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AgentError::Config(format!("unknown specialist role '{s}'")))
    }
}

/// Identity and limits of one agent
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentProfile {
    id: Uuid,
    name: String,
    role: Option<SpecialistRole>,
    mode: Mode,
    max_iterations: usize,
    complexity_threshold: usize,
    tools: BTreeSet<String>,
}

impl AgentProfile {
    /// The primary agent described by the `agent` section
    pub fn primary(settings: &AgentSettings, tools: &[String]) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: settings.name.clone(),
            role: None,
            mode: settings.mode,
            max_iterations: settings.max_iterations,
            complexity_threshold: settings.complexity_threshold,
            tools: tools.iter().cloned().collect(),
        }
    }

    /// A specialized agent; specialists always iterate in single mode
    pub fn specialist(
        role: SpecialistRole,
        settings: &RoleSettings,
        complexity_threshold: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: settings.name.clone(),
            role: Some(role),
            mode: Mode::Single,
            max_iterations: settings.max_iterations,
            complexity_threshold,
            tools: settings.tools.iter().cloned().collect(),
        }
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn role(&self) -> Option<SpecialistRole> {
        self.role
    }

    pub const fn mode(&self) -> Mode {
        self.mode
    }

    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub const fn complexity_threshold(&self) -> usize {
        self.complexity_threshold
    }

    pub const fn tools(&self) -> &BTreeSet<String> {
        &self.tools
    }

    /// Whether this agent may call `tool`
    pub fn allows(&self, tool: &str) -> bool {
        self.tools.contains(tool)
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub const fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub const fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations;
    }

    pub const fn set_complexity_threshold(&mut self, threshold: usize) {
        self.complexity_threshold = threshold;
    }

    pub fn set_tools<I, S>(&mut self, tools: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
    }

    /// Apply the `agent` section to the primary agent in place
    pub fn apply_agent_settings(&mut self, settings: &AgentSettings, tools: &[String]) {
        self.rename(settings.name.clone());
        self.set_mode(settings.mode);
        self.set_max_iterations(settings.max_iterations);
        self.set_complexity_threshold(settings.complexity_threshold);
        self.set_tools(tools.iter().cloned());
    }

    /// Apply merged role settings to a specialist in place
    pub fn apply_role_settings(&mut self, settings: &RoleSettings, complexity_threshold: usize) {
        self.rename(settings.name.clone());
        self.set_max_iterations(settings.max_iterations);
        self.set_complexity_threshold(complexity_threshold);
        self.set_tools(settings.tools.iter().cloned());
    }

    /// System prompt used when this agent iterates
    pub fn persona(&self) -> String {
        match self.role {
            Some(role) => role.persona().to_string(),
            None => format!(
                "You are {}, a capable assistant. Work on the task step by step and call tools when they help. When you have the final answer, reply with it directly and without any tool calls.",
                self.name
            ),
        }
    }
}

/// Specialized agents addressed by role
#[derive(Clone, Debug, Default)]
pub struct SpecialistArena {
    agents: BTreeMap<SpecialistRole, AgentProfile>,
}

impl SpecialistArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the agent for `role`, or update the existing one in place
    pub fn configure(
        &mut self,
        role: SpecialistRole,
        settings: &RoleSettings,
        complexity_threshold: usize,
    ) -> &AgentProfile {
        self.agents
            .entry(role)
            .and_modify(|agent| agent.apply_role_settings(settings, complexity_threshold))
            .or_insert_with(|| {
                tracing::debug!(%role, name = %settings.name, "Created specialized agent");
                AgentProfile::specialist(role, settings, complexity_threshold)
            })
    }

    pub fn get(&self, role: SpecialistRole) -> Option<&AgentProfile> {
        self.agents.get(&role)
    }

    /// Drop the agents whose role is not in `roles`
    pub fn retain(&mut self, roles: &[SpecialistRole]) {
        self.agents.retain(|role, _| {
            let keep = roles.contains(role);
            if !keep {
                tracing::debug!(%role, "Removed specialized agent");
            }
            keep
        });
    }

    /// Agents in pipeline order; absent roles are skipped
    pub fn pipeline(&self) -> impl Iterator<Item = (SpecialistRole, &AgentProfile)> {
        self.agents.iter().map(|(role, agent)| (*role, agent))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// One specialist run inside a delegation pass
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub role: SpecialistRole,
    pub agent: String,
    pub pass: usize,
    pub iterations: usize,
    pub status: TaskStatus,
    pub answer: String,
}

/// What an agent hands back to the orchestrator
#[derive(Clone, Debug, PartialEq)]
pub struct AgentOutcome {
    pub answer: String,
    pub status: TaskStatus,
    /// Iterations of the primary loop (single, and auto before escalation)
    pub iterations: Option<usize>,
    /// Specialist steps (multi, and auto after escalation)
    pub steps: Option<Vec<StepRecord>>,
    pub error: Option<String>,
}

impl AgentOutcome {
    pub fn failed(error: &AgentError) -> Self {
        Self {
            answer: String::new(),
            status: TaskStatus::Failed,
            iterations: None,
            steps: None,
            error: Some(error.to_string()),
        }
    }
}

/// The primary agent plus its specialists and collaborators
pub struct Agent {
    profile: AgentProfile,
    specialists: SpecialistArena,
    pub(crate) provider: Arc<dyn LlmProvider>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) memory: SharedMemory,
    pub(crate) generation: GenerationOptions,
    pub(crate) retry: RetryPolicy,
}

impl Agent {
    pub fn new(
        profile: AgentProfile,
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        memory: SharedMemory,
        generation: GenerationOptions,
    ) -> Self {
        Self {
            profile,
            specialists: SpecialistArena::new(),
            provider,
            tools,
            memory,
            generation,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub const fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub const fn profile_mut(&mut self) -> &mut AgentProfile {
        &mut self.profile
    }

    pub const fn specialists(&self) -> &SpecialistArena {
        &self.specialists
    }

    pub const fn specialists_mut(&mut self) -> &mut SpecialistArena {
        &mut self.specialists
    }

    pub const fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    pub const fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn set_generation(&mut self, generation: GenerationOptions) {
        self.generation = generation;
    }

    /// Run a task in the given mode. Never returns an error: failures are
    /// reported through [`TaskStatus::Failed`].
    pub async fn execute(&self, task: &str, mode: Mode) -> AgentOutcome {
        let task = task.trim();
        if task.is_empty() {
            let err = AgentError::InvalidTask("task text is empty".into());
            tracing::warn!(agent = %self.profile.name, "Rejected blank task");
            return AgentOutcome::failed(&err);
        }

        let brief = self.recall_previous(task).await;
        let outcome = match mode {
            Mode::Single => self.run_single(task, &brief).await,
            Mode::Multi => self.run_multi(task, &brief).await,
            Mode::Auto => self.run_auto(task, &brief).await,
        };

        if outcome.status == TaskStatus::Completed {
            self.record_answer(task, mode, &outcome.answer).await;
        }
        outcome
    }

    async fn run_single(&self, task: &str, brief: &str) -> AgentOutcome {
        let run = self
            .iterate(&self.profile, task, brief, self.profile.max_iterations)
            .await;
        AgentOutcome {
            answer: run.answer,
            status: run.status,
            iterations: Some(run.iterations),
            steps: None,
            error: run.error,
        }
    }

    async fn run_multi(&self, task: &str, brief: &str) -> AgentOutcome {
        if self.specialists.is_empty() {
            tracing::warn!("No specialized agents configured, running in single mode");
            return self.run_single(task, brief).await;
        }

        let delegation = self.delegate(task, brief, self.profile.max_iterations).await;
        AgentOutcome {
            answer: delegation.answer,
            status: delegation.status,
            iterations: None,
            steps: Some(delegation.steps),
            error: delegation.error,
        }
    }

    async fn run_auto(&self, task: &str, brief: &str) -> AgentOutcome {
        if self.specialists.is_empty() {
            return self.run_single(task, brief).await;
        }

        let max = self.profile.max_iterations;
        let threshold = self.profile.complexity_threshold.min(max);
        let first = self.iterate(&self.profile, task, brief, threshold).await;

        let remaining = max.saturating_sub(first.iterations);
        if first.status != TaskStatus::Incomplete || remaining == 0 {
            return AgentOutcome {
                answer: first.answer,
                status: first.status,
                iterations: Some(first.iterations),
                steps: None,
                error: first.error,
            };
        }

        tracing::info!(
            iterations = first.iterations,
            threshold,
            remaining,
            "No final answer at complexity threshold, escalating to specialists"
        );

        let mut handoff = brief.to_string();
        if !first.answer.is_empty() {
            push_section(&mut handoff, "Progress so far", &first.answer);
        }

        let delegation = self.delegate(task, &handoff, remaining).await;
        AgentOutcome {
            answer: if delegation.answer.is_empty() {
                first.answer
            } else {
                delegation.answer
            },
            status: delegation.status,
            iterations: Some(first.iterations),
            steps: Some(delegation.steps),
            error: delegation.error,
        }
    }

    /// Answer recorded for this exact task in an earlier session, as a brief
    async fn recall_previous(&self, task: &str) -> String {
        let memory = self.memory.lock().await;
        match memory.recall_durable(&task_key(task)) {
            Ok(Some(record)) => record
                .get("answer")
                .and_then(serde_json::Value::as_str)
                .map(|answer| {
                    tracing::debug!("Found answer from a previous session");
                    let mut brief = String::new();
                    push_section(&mut brief, "A previous session answered this task", answer);
                    brief
                })
                .unwrap_or_default(),
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Long-term memory lookup failed");
                String::new()
            }
        }
    }

    async fn record_answer(&self, task: &str, mode: Mode, answer: &str) {
        let record = json!({
            "answer": answer,
            "mode": mode,
            "recorded_at": chrono::Utc::now().to_rfc3339(),
        });
        let memory = self.memory.lock().await;
        if let Err(e) = memory.persist(&task_key(task), record) {
            tracing::warn!(error = %e, "Failed to persist task answer");
        }
    }
}

/// Long-term memory key for a task's answer
pub fn task_key(task: &str) -> String {
    format!("task:{}", task.trim())
}

/// Append a titled block to a prompt brief
pub(crate) fn push_section(brief: &mut String, title: &str, body: &str) {
    if !brief.is_empty() {
        brief.push_str("\n\n");
    }
    brief.push_str(title);
    brief.push_str(":\n");
    brief.push_str(body.trim());
}
