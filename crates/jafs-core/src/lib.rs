//! # jafs-core
//!
//! Task routing, agent orchestration and tool calling over a provider-agnostic
//! LLM abstraction.
//!
//! ## Architecture
//!
//! ```text
//! task ─► TaskClassifier ─► mode
//!                             │
//! ┌───────────────────────────▼─────────────────────────────────┐
//! │                       Orchestrator                          │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │ Agent (primary)          SpecialistArena              │  │
//! │  │  ┌─────────────┐  ┌──────────────┐  ┌──────────────┐  │  │
//! │  │  │  Reasoning  │──│ ToolRegistry │  │ LlmProvider  │  │  │
//! │  │  │    Loop     │  └──────────────┘  │  (Strategy)  │  │  │
//! │  │  └──────┬──────┘                    └──────────────┘  │  │
//! │  │         │ extract ◄── completion                      │  │
//! │  │         ▼                                             │  │
//! │  │    MemoryStore (short-term + long-term)               │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps agents independent of the model backend;
//! `jafs-runtime` supplies the Ollama implementation.

pub mod agent;
pub mod builtin;
pub mod classifier;
pub mod config;
pub mod delegation;
pub mod error;
pub mod extract;
pub mod memory;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod reasoning;
pub mod tool;

#[cfg(test)]
mod testing;

pub use agent::{Agent, AgentOutcome, AgentProfile, Mode, SpecialistRole, StepRecord, TaskStatus};
pub use classifier::TaskClassifier;
pub use config::Config;
pub use error::{AgentError, Result};
pub use message::{Message, Role};
pub use orchestrator::{AgentSummary, Orchestrator, TaskRecord, TaskResult};
pub use provider::LlmProvider;
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
