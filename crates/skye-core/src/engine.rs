//! Core engine.
//!
//! The [`Engine`] is the entry point for both CLI commands. It owns the
//! configuration and the analyzer, and wires the pieces of an improvement
//! session together.

use std::path::PathBuf;

use skye_pm::PromptManager;
use tracing::{debug, info, instrument};

use crate::analyzer::{Analyzer, Finding};
use crate::backend::ModelBackend;
use crate::config::{EngineConfig, ProjectConfig, load_project_config};
use crate::error::CoreError;
use crate::generator::PatchGenerator;
use crate::git::GitOps;
use crate::interact::Interaction;
use crate::loader;
use crate::reload::ModuleRegistry;
use crate::session::ImproveSession;

/// Drives project loading, analysis and improvement sessions.
///
/// # Examples
///
/// ```no_run
/// use std::path::PathBuf;
/// use skye_core::{Engine, EngineConfig};
///
/// # async fn example() -> Result<(), skye_core::CoreError> {
/// let config = EngineConfig::builder()
///     .repo_path(PathBuf::from("."))
///     .build();
///
/// let engine = Engine::new(config)?;
/// let files = engine.load_project()?;
/// for finding in engine.analyze(&files).await {
///     println!("{finding}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    /// Settings from `.skye/config.yaml`, or defaults.
    project_config: ProjectConfig,
    analyzer: Analyzer,
}

impl Engine {
    /// Create an engine for the project at `config.repo_path()`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Yaml` if `.skye/config.yaml` exists but is invalid.
    #[instrument(skip_all)]
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        info!(repo = %config.repo_path().display(), "initializing engine");

        let project_config = load_project_config(&config.config_path())?;
        let analyzer = Analyzer::new(project_config.checkers.clone());

        Ok(Self {
            config,
            project_config,
            analyzer,
        })
    }

    /// List the project's source files.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Io` if the project root cannot be read.
    pub fn load_project(&self) -> Result<Vec<PathBuf>, CoreError> {
        loader::load_project(self.config.repo_path())
    }

    /// Run the configured checkers over `files`.
    pub async fn analyze(&self, files: &[PathBuf]) -> Vec<Finding> {
        self.analyzer.analyze(files).await
    }

    /// Run an interactive improvement session.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Io` if the project cannot be listed,
    /// `CoreError::Config` if the local model cannot be located and
    /// `CoreError::Prompt` if custom templates fail to load. Errors inside
    /// the session loop are reported through `io` instead.
    #[instrument(skip(self, io))]
    pub async fn improve<I: Interaction>(&self, io: &mut I) -> Result<(), CoreError> {
        let root = self.config.repo_path().clone();
        io.show(&format!(
            "Starting interactive improvement in '{}'",
            root.display()
        ));

        let files = self.load_project()?;
        let backend = ModelBackend::from_config(&self.config, &self.project_config, io).await?;
        let prompts = self.prompt_manager()?;
        let registry = ModuleRegistry::load(&root, &files);
        debug!(modules = registry.len(), "module registry loaded");

        let generator = PatchGenerator::new(
            backend,
            prompts,
            root.clone(),
            self.project_config.local.stop.clone(),
        );
        let mut session = ImproveSession::new(
            root.clone(),
            files,
            generator,
            self.analyzer.clone(),
            GitOps::new(root),
            registry,
        );
        session.run(io).await
    }

    /// Built-in templates overlaid with the project's `prompts.include` dirs.
    fn prompt_manager(&self) -> Result<PromptManager, CoreError> {
        let mut pm = PromptManager::new()?;
        for dir in &self.project_config.prompts.include {
            let resolved = if dir.is_absolute() {
                dir.clone()
            } else {
                self.config.repo_path().join(dir)
            };
            if resolved.is_dir() {
                pm.load_dir(&resolved)?;
                debug!(dir = %resolved.display(), "loaded custom prompt directory");
            }
        }
        Ok(pm)
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }
}
