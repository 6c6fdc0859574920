//! Specialist Delegation
//!
//! Runs the specialist pipeline (researcher → planner → executor → critic) as
//! passes. Each specialist iterates on its own with the earlier reports of the
//! pass handed to it. The critic ends a pass with a verdict; a revise verdict
//! starts another pass with its feedback, as long as passes remain.

use serde_json::json;

use crate::agent::{Agent, SpecialistRole, StepRecord, TaskStatus, push_section};

/// Critic decision at the end of a pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    Revise,
}

impl Verdict {
    /// Read the last `VERDICT: APPROVE|REVISE` line. A review without one
    /// approves.
    pub fn parse(review: &str) -> Self {
        review
            .lines()
            .rev()
            .map(|line| line.trim().trim_start_matches(['*', '#', ' ']))
            .find_map(|line| {
                let upper = line.to_ascii_uppercase();
                let rest = upper.strip_prefix("VERDICT")?;
                if !rest.starts_with([':', ' ', '\t']) {
                    return None;
                }
                let keyword = rest.trim_start_matches([':', ' ', '\t', '*']);
                if keyword.starts_with("REVISE") {
                    Some(Self::Revise)
                } else if keyword.starts_with("APPROVE") {
                    Some(Self::Approve)
                } else {
                    None
                }
            })
            .unwrap_or(Self::Approve)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Delegation {
    pub answer: String,
    pub status: TaskStatus,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
}

impl Agent {
    /// Run up to `max_passes` passes of the pipeline
    pub(crate) async fn delegate(&self, task: &str, brief: &str, max_passes: usize) -> Delegation {
        let mut steps = Vec::new();
        let mut answer = String::new();
        let mut feedback: Option<String> = None;
        let mut last_pass_incomplete = false;
        let mut revise_pending = false;

        for pass in 1..=max_passes {
            let mut handoff = brief.to_string();
            if let Some(review) = &feedback {
                push_section(&mut handoff, "Critic feedback from the previous pass", review);
            }

            last_pass_incomplete = false;
            let mut verdict = None;

            for (role, profile) in self.specialists().pipeline() {
                tracing::info!(%role, agent = %profile.name(), pass, "Delegating to specialist");
                let run = self
                    .iterate(profile, task, &handoff, profile.max_iterations())
                    .await;

                self.memory.lock().await.remember(
                    format!("step/{role}/{pass}"),
                    json!({
                        "agent": profile.name(),
                        "status": run.status,
                        "answer": run.answer,
                    }),
                );

                steps.push(StepRecord {
                    role,
                    agent: profile.name().to_string(),
                    pass,
                    iterations: run.iterations,
                    status: run.status,
                    answer: run.answer.clone(),
                });

                match run.status {
                    TaskStatus::Failed => {
                        tracing::warn!(%role, pass, "Specialist failed, stopping delegation");
                        return Delegation {
                            answer: if answer.is_empty() { run.answer } else { answer },
                            status: TaskStatus::Failed,
                            steps,
                            error: run.error,
                        };
                    }
                    TaskStatus::Incomplete => last_pass_incomplete = true,
                    TaskStatus::Completed => {}
                }

                if role == SpecialistRole::Critic {
                    verdict = Some(Verdict::parse(&run.answer));
                    feedback = Some(run.answer);
                } else {
                    push_section(&mut handoff, &format!("{role} report"), &run.answer);
                    if !run.answer.is_empty() {
                        answer = run.answer;
                    }
                }
            }

            if verdict != Some(Verdict::Revise) {
                break;
            }
            if pass == max_passes {
                tracing::info!(pass, "Critic requested revision but no passes remain");
                revise_pending = true;
            } else {
                tracing::info!(pass, "Critic requested another pass");
            }
        }

        let status = if revise_pending || last_pass_incomplete {
            TaskStatus::Incomplete
        } else {
            TaskStatus::Completed
        };

        Delegation {
            answer,
            status,
            steps,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentProfile, Mode};
    use crate::config::{AgentSettings, Config, RoleSettings};
    use crate::memory::MemoryStore;
    use crate::provider::GenerationOptions;
    use crate::testing::ScriptedProvider;
    use crate::tool::ToolRegistry;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pipeline_agent(provider: Arc<ScriptedProvider>, max_iterations: usize) -> Agent {
        let settings = AgentSettings {
            name: "jafs".into(),
            mode: Mode::Multi,
            max_iterations,
            complexity_threshold: 7,
        };
        let memory = MemoryStore::from_settings(&Config::default().memory)
            .unwrap()
            .shared();
        let mut agent = Agent::new(
            AgentProfile::primary(&settings, &[]),
            provider,
            Arc::new(ToolRegistry::new()),
            memory,
            GenerationOptions::default(),
        );
        for role in SpecialistRole::PIPELINE {
            let role_settings = RoleSettings {
                name: format!("{role}-agent"),
                max_iterations: 2,
                tools: vec![],
            };
            agent.specialists_mut().configure(role, &role_settings, 7);
        }
        agent
    }

    fn role_of(system: &str) -> &'static str {
        SpecialistRole::PIPELINE
            .into_iter()
            .find(|role| system.contains(&format!("You are the {role}")))
            .map_or("primary", SpecialistRole::as_str)
    }

    #[test]
    fn test_verdict_parsing() {
        assert_eq!(Verdict::parse("Fine.\nVERDICT: APPROVE"), Verdict::Approve);
        assert_eq!(Verdict::parse("Too short.\nverdict: revise"), Verdict::Revise);
        assert_eq!(Verdict::parse("**VERDICT: REVISE**"), Verdict::Revise);
        assert_eq!(Verdict::parse("No verdict given"), Verdict::Approve);
        assert_eq!(Verdict::parse("VERDICT REVISE"), Verdict::Revise);
    }

    #[test]
    fn test_verdict_requires_keyword() {
        assert_eq!(
            Verdict::parse("VERDICT: REVISE\nVerdict is approve-ish, mostly"),
            Verdict::Revise
        );
        assert_eq!(Verdict::parse("VERDICT: REVISE\nVERDICTS: APPROVE"), Verdict::Revise);
        assert_eq!(Verdict::parse("Verdict is revise"), Verdict::Approve);
    }

    #[tokio::test]
    async fn test_pipeline_runs_in_order() {
        let provider = Arc::new(ScriptedProvider::responding(|system, _| match role_of(system) {
            "critic" => "Good.\nVERDICT: APPROVE".into(),
            role => format!("{role} output"),
        }));
        let agent = pipeline_agent(Arc::clone(&provider), 3);

        let outcome = agent.execute("write a poem about autumn", Mode::Multi).await;

        assert_eq!(outcome.status, TaskStatus::Completed);
        assert_eq!(outcome.answer, "executor output");
        let steps = outcome.steps.unwrap();
        let roles: Vec<SpecialistRole> = steps.iter().map(|s| s.role).collect();
        assert_eq!(roles, SpecialistRole::PIPELINE.to_vec());
        assert!(steps.iter().all(|s| s.pass == 1));

        // Later specialists see earlier reports
        let prompts = provider.prompts();
        assert!(prompts[2].1.contains("planner report:\nplanner output"));

        let memory = agent.memory().lock().await;
        assert_eq!(memory.recall("step/executor/1").unwrap()["answer"], "executor output");
    }

    #[tokio::test]
    async fn test_critic_revision_gets_another_pass() {
        let reviews = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reviews);
        let provider = Arc::new(ScriptedProvider::responding(move |system, prompt| {
            match role_of(system) {
                "critic" if counter.fetch_add(1, Ordering::SeqCst) == 0 => {
                    "Missing a rhyme.\nVERDICT: REVISE".into()
                }
                "critic" => "VERDICT: APPROVE".into(),
                "executor" if prompt.contains("Missing a rhyme") => "revised poem".into(),
                role => format!("{role} output"),
            }
        }));
        let agent = pipeline_agent(provider, 3);

        let outcome = agent.execute("write a poem", Mode::Multi).await;

        assert_eq!(outcome.status, TaskStatus::Completed);
        assert_eq!(outcome.answer, "revised poem");
        let steps = outcome.steps.unwrap();
        assert_eq!(steps.len(), 8);
        assert_eq!(steps.last().unwrap().pass, 2);
        assert_eq!(reviews.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_revision_bounded_by_budget() {
        let provider = Arc::new(ScriptedProvider::responding(|system, _| match role_of(system) {
            "critic" => "VERDICT: REVISE".into(),
            role => format!("{role} output"),
        }));
        let agent = pipeline_agent(provider, 2);

        let outcome = agent.execute("write a poem", Mode::Multi).await;

        assert_eq!(outcome.status, TaskStatus::Incomplete);
        assert_eq!(outcome.steps.unwrap().len(), 8);
        assert_eq!(outcome.answer, "executor output");
    }

    #[tokio::test]
    async fn test_failed_step_stops_pipeline() {
        let provider = Arc::new(ScriptedProvider::new(["facts"]));
        let agent = pipeline_agent(provider, 3);

        // The planner's call exhausts the script and fails
        let outcome = agent.execute("research cats", Mode::Multi).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.answer, "facts");
        assert_eq!(outcome.steps.unwrap().len(), 2);
        assert!(outcome.error.is_some());
    }
}
