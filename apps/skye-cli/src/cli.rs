use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use skye_core::{Engine, EngineConfig, Interaction, MODEL_PATH_ENV};
use tracing::info;

use crate::console::Console;

#[derive(Debug, Parser)]
#[command(name = "skye", about = "Static analysis and model-driven patching for Python projects")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List a project's source files and run static checkers on them
    Analyze {
        /// Project directory (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Start an interactive improvement session
    Improve {
        /// Project directory (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

impl Cli {
    /// Project path and, for commands that write a log file, the log name.
    pub fn log_context(&self) -> (PathBuf, Option<&'static str>) {
        match &self.command {
            Commands::Analyze { path } => (path.clone(), None),
            Commands::Improve { path } => (path.clone(), Some("improve")),
        }
    }

    pub async fn run(self) -> Result<ExitCode> {
        match self.command {
            Commands::Analyze { path } => run_analyze(&path).await,
            Commands::Improve { path } => {
                let engine = Engine::new(engine_config(&path))?;
                run_improve(&engine, &mut Console::new()).await
            }
        }
    }
}

async fn run_analyze(path: &Path) -> Result<ExitCode> {
    let engine = Engine::new(engine_config(path))?;
    let mut console = Console::new();

    let files = engine.load_project()?;
    console.show(&format!(
        "Loaded {} Python files in '{}':",
        files.len(),
        path.display()
    ));
    for file in &files {
        console.show(&format!("  - {}", file.display()));
    }

    console.show("Running static analysis...");
    let findings = engine.analyze(&files).await;
    info!(findings = findings.len(), "analysis finished");

    if findings.is_empty() {
        console.show(&format!(
            "No issues found by {}.",
            engine.analyzer().checker_names().join(" and ")
        ));
        return Ok(ExitCode::SUCCESS);
    }

    console.show("Issues found:");
    for finding in &findings {
        console.show(&finding.message);
    }

    let answer = console.ask("Fix issues interactively? (y/n): ").await?;
    if answer.is_some_and(|a| is_affirmative(&a)) {
        return run_improve(&engine, &mut console).await;
    }
    Ok(ExitCode::SUCCESS)
}

/// Run the improvement session, abandoning it on Ctrl-C.
async fn run_improve(engine: &Engine, console: &mut Console) -> Result<ExitCode> {
    tokio::select! {
        result = engine.improve(console) => {
            result?;
            Ok(ExitCode::SUCCESS)
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nImprovement session cancelled.");
            info!("improvement session interrupted");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn engine_config(path: &Path) -> EngineConfig {
    match std::env::var_os(MODEL_PATH_ENV) {
        Some(model) if !model.is_empty() => EngineConfig::builder()
            .repo_path(path.to_path_buf())
            .model_path_override(PathBuf::from(model))
            .build(),
        _ => EngineConfig::builder().repo_path(path.to_path_buf()).build(),
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
