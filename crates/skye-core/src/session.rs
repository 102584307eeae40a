//! Interactive improvement session.
//!
//! Drives the select → describe → generate → review loop. Each state is a
//! [`Step`]; [`ImproveSession::run`] advances through them in a plain loop
//! until the user exits, declines to continue, or input ends.
//!
//! Failures inside the loop are reported to the user and the loop goes on:
//! a backend error or empty patch sends the user back to describe the change
//! again, a rejected patch is reported and analysis still runs.

use std::path::PathBuf;

use tracing::{debug, info, instrument};

use crate::analyzer::{Analyzer, Finding};
use crate::backend::Backend;
use crate::error::CoreError;
use crate::generator::{Patch, PatchGenerator};
use crate::git::{ApplyOutcome, GitOps};
use crate::interact::Interaction;
use crate::reload::{ModuleRegistry, ReloadOutcome, reload_changed};

const SELECT_PROMPT: &str = "Select number (or 'all', 'exit'): ";
const DESCRIBE_PROMPT: &str = "Describe the change or feature: ";
const CONTINUE_PROMPT: &str = "Apply another improvement? (y/n): ";

/// Transient state of one session. Never persisted.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    /// Files offered for selection.
    pub files: Vec<PathBuf>,
    /// Files chosen in the last selection.
    pub targets: Vec<PathBuf>,
    /// Last patch received from the backend.
    pub last_patch: Option<Patch>,
    /// Findings of the last analysis run.
    pub last_findings: Vec<Finding>,
}

/// A parsed answer to the target selection prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Exit,
    All,
    /// Zero-based index into the file list.
    Index(usize),
    Invalid,
}

/// Parse a selection answer against a list of `count` files.
///
/// Accepts `exit`/`quit`, `all`, or a 1-based index, case-insensitively and
/// ignoring surrounding whitespace.
pub fn parse_selection(input: &str, count: usize) -> Selection {
    let choice = input.trim().to_lowercase();
    match choice.as_str() {
        "exit" | "quit" => Selection::Exit,
        "all" => Selection::All,
        _ => match choice.parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => Selection::Index(n - 1),
            _ => Selection::Invalid,
        },
    }
}

/// Whether a continue answer declines another round.
fn is_negative(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "n" | "no")
}

#[derive(Debug)]
enum Step {
    SelectTarget,
    DescribeChange,
    GeneratePatch(String),
    ReviewResult(Patch),
    Finished,
}

/// One interactive improvement session over a fixed file set.
pub struct ImproveSession<B> {
    root: PathBuf,
    generator: PatchGenerator<B>,
    analyzer: Analyzer,
    git: GitOps,
    registry: ModuleRegistry,
    state: SessionState,
}

impl<B: Backend> ImproveSession<B> {
    pub fn new(
        root: PathBuf,
        files: Vec<PathBuf>,
        generator: PatchGenerator<B>,
        analyzer: Analyzer,
        git: GitOps,
        registry: ModuleRegistry,
    ) -> Self {
        Self {
            root,
            generator,
            analyzer,
            git,
            registry,
            state: SessionState {
                files,
                ..SessionState::default()
            },
        }
    }

    #[cfg(test)]
    fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Run the session until the user leaves.
    ///
    /// # Errors
    ///
    /// Only errors reading user input are returned; everything else is
    /// reported through `io` and the loop continues.
    #[instrument(skip_all, fields(root = %self.root.display(), files = self.state.files.len()))]
    pub async fn run<I: Interaction>(&mut self, io: &mut I) -> Result<(), CoreError> {
        let mut step = Step::SelectTarget;
        loop {
            debug!(?step, "session step");
            step = match step {
                Step::SelectTarget => self.select_target(io).await?,
                Step::DescribeChange => self.describe_change(io).await?,
                Step::GeneratePatch(instruction) => self.generate_patch(io, &instruction).await,
                Step::ReviewResult(patch) => self.review_result(io, patch).await?,
                Step::Finished => break,
            };
        }
        io.show("Exiting improvement session.");
        info!("improvement session finished");
        Ok(())
    }

    async fn select_target<I: Interaction>(&mut self, io: &mut I) -> Result<Step, CoreError> {
        if self.state.files.is_empty() {
            io.show("No source files found.");
            return Ok(Step::Finished);
        }

        loop {
            io.show("Available files:");
            for (idx, file) in self.state.files.iter().enumerate() {
                io.show(&format!("  {}. {}", idx + 1, file.display()));
            }

            let Some(answer) = io.ask(SELECT_PROMPT).await? else {
                return Ok(Step::Finished);
            };

            match parse_selection(&answer, self.state.files.len()) {
                Selection::Exit => return Ok(Step::Finished),
                Selection::All => {
                    self.state.targets = self.state.files.clone();
                    return Ok(Step::DescribeChange);
                }
                Selection::Index(idx) => {
                    self.state.targets = vec![self.state.files[idx].clone()];
                    return Ok(Step::DescribeChange);
                }
                Selection::Invalid => io.show("Invalid selection, try again."),
            }
        }
    }

    async fn describe_change<I: Interaction>(&mut self, io: &mut I) -> Result<Step, CoreError> {
        loop {
            let Some(answer) = io.ask(DESCRIBE_PROMPT).await? else {
                return Ok(Step::Finished);
            };
            let instruction = answer.trim();
            if instruction.is_empty() {
                io.show("Prompt cannot be empty.");
                continue;
            }
            return Ok(Step::GeneratePatch(instruction.to_owned()));
        }
    }

    async fn generate_patch<I: Interaction>(&mut self, io: &mut I, instruction: &str) -> Step {
        io.show(&format!("Generating patch for: {}...", self.target_list()));

        match self
            .generator
            .generate(&self.state.targets, instruction, &self.registry)
            .await
        {
            Ok(patch) if patch.is_blank() => {
                io.show("No patch received. Refine your prompt.");
                Step::DescribeChange
            }
            Ok(patch) => {
                self.state.last_patch = Some(patch.clone());
                Step::ReviewResult(patch)
            }
            Err(e) => {
                io.show(&format!("Patch generation failed: {e}"));
                Step::DescribeChange
            }
        }
    }

    async fn review_result<I: Interaction>(
        &mut self,
        io: &mut I,
        patch: Patch,
    ) -> Result<Step, CoreError> {
        io.show("Applying patch...");
        match self.git.apply_patch(patch.as_str()).await {
            ApplyOutcome::Applied => io.show("Patch applied successfully."),
            ApplyOutcome::Failed(reason) => io.show(&format!("Failed to apply patch: {reason}")),
        }

        io.show("Reloading changed modules...");
        for outcome in reload_changed(&mut self.registry, &self.state.targets, &self.root) {
            match outcome {
                ReloadOutcome::Reloaded(module) => io.show(&format!("Reloaded module: {module}")),
                ReloadOutcome::Failed { module, reason } => {
                    io.show(&format!("Failed to reload module {module}: {reason}"));
                }
            }
        }

        io.show("Re-running static analysis on updated files...");
        self.state.last_findings = self.analyzer.analyze(&self.state.targets).await;

        if !self.state.last_findings.is_empty() {
            io.show("Issues found in updated files:");
            for finding in &self.state.last_findings {
                io.show(&finding.message);
            }
            io.show("Refine prompt, select another file, or type 'exit'.");
            return Ok(Step::SelectTarget);
        }

        io.show("No issues found!");
        let Some(answer) = io.ask(CONTINUE_PROMPT).await? else {
            return Ok(Step::Finished);
        };
        if is_negative(&answer) {
            Ok(Step::Finished)
        } else {
            Ok(Step::SelectTarget)
        }
    }

    fn target_list(&self) -> String {
        self.state
            .targets
            .iter()
            .map(|t| t.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
