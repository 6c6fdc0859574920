//! jafs: run tasks through the JAFS agent orchestrator
//!
//! One-shot runner over `jafs-core`. When `--mode` is absent the task text is
//! classified to pick single, multi or auto.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use jafs_core::builtin::register_builtin_tools;
use jafs_core::{Config, LlmProvider, Mode, Orchestrator, TaskClassifier, TaskResult, TaskStatus, ToolRegistry};

#[derive(Debug, Parser)]
#[command(name = "jafs")]
#[command(about = "Route tasks to cooperating LLM agents", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration override file (YAML)
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Execute a task
    Run {
        /// Task description
        #[arg(required = true)]
        task: Vec<String>,

        /// Execution mode: single, multi or auto
        #[arg(short, long, value_parser = parse_mode)]
        mode: Option<Mode>,

        /// Use the configured default mode instead of classifying the task
        #[arg(long, conflicts_with = "mode")]
        no_classify: bool,

        /// Print the result envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the mode a task would be classified as
    Classify {
        task: Vec<String>,
    },

    /// List the configured agents
    Agents {
        /// Include specialized agents
        #[arg(long)]
        all: bool,
    },

    /// Print the merged configuration
    Config,
}

fn parse_mode(s: &str) -> std::result::Result<Mode, String> {
    s.parse().map_err(|e: jafs_core::AgentError| e.to_string())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(&cli.config);

    match cli.command {
        Commands::Classify { task } => {
            let task = task.join(" ");
            let classifier = TaskClassifier::new();
            println!("{}", classifier.classify(&task));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            print!("{}", config.to_yaml()?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Agents { all } => {
            let mut config = config;
            if all {
                config = config.merged(&serde_json::json!({ "agent": { "mode": "multi" } }))?;
            }
            let orchestrator = build(config)?;
            for agent in orchestrator.list_agents() {
                let marker = if agent.primary { "*" } else { " " };
                println!("{marker} {:<20} {:<12} {}", agent.name, agent.kind, agent.id);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            task,
            mode,
            no_classify,
            json,
        } => {
            let task = task.join(" ");
            let mode = match mode {
                Some(mode) => Some(mode),
                None if no_classify => None,
                None => Some(TaskClassifier::new().classify(&task)),
            };

            let mut orchestrator = build(config)?;
            check_provider(orchestrator.primary().provider()).await;

            let result = orchestrator.execute_task(&task, mode).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }

            Ok(match result.status {
                TaskStatus::Failed => ExitCode::FAILURE,
                TaskStatus::Completed | TaskStatus::Incomplete => ExitCode::SUCCESS,
            })
        }
    }
}

fn build(config: Config) -> Result<Orchestrator> {
    let provider = jafs_runtime::provider_from_settings(&config.models.default)?;

    let mut tools = ToolRegistry::new();
    register_builtin_tools(&mut tools, Arc::clone(&provider), &config.generation_options());
    tracing::debug!(tools = ?tools.names(), "Registered built-in tools");

    Ok(Orchestrator::new(config, provider, Arc::new(tools))?)
}

async fn check_provider(provider: &Arc<dyn LlmProvider>) {
    match provider.health_check().await {
        Ok(true) => {
            tracing::info!("Connected to model provider");
            if let Ok(models) = provider.list_models().await {
                for model in models {
                    tracing::debug!(model = %model.id, "Available model");
                }
            }
        }
        Ok(false) | Err(_) => {
            tracing::warn!("Model provider not available, the task will likely fail");
            tracing::warn!("Make sure Ollama is running: ollama serve");
        }
    }
}

fn print_result(result: &TaskResult) {
    println!("Mode: {}", result.mode);
    println!("Status: {}", result.status);
    if let Some(iterations) = result.iterations {
        println!("Iterations: {iterations}");
    }
    if let Some(steps) = &result.steps {
        println!("Steps:");
        for step in steps {
            println!(
                "  [pass {}] {} ({}): {} after {} iteration(s)",
                step.pass, step.role, step.agent, step.status, step.iterations
            );
        }
    }
    println!("Time: {:.2}s", result.execution_time);
    if let Some(error) = &result.error {
        println!("Error: {error}");
    }
    println!();
    println!("{}", result.answer);
}
