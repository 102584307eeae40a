//! Configuration types for skye-core.
//!
//! This module defines [`EngineConfig`] (CLI-level settings), [`ProjectConfig`]
//! (from `.skye/config.yaml`), and all sub-configuration types. The project
//! file is created lazily: it only appears once the local-model resolution
//! flow persists a path the user typed in.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use typed_builder::TypedBuilder;

use crate::error::CoreError;

/// Name of the project-local housekeeping directory.
pub const SKYE_DIR: &str = ".skye";

/// Environment variable that overrides the local model path.
pub const MODEL_PATH_ENV: &str = "SKYE_MODEL_PATH";

// ── Engine Configuration (CLI-level) ─────────────────────────

/// Engine configuration provided by the CLI layer.
///
/// Holds the project root and the inputs to local-model resolution that do
/// not live in the project file: the environment override and the fixed
/// default location.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use skye_core::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .repo_path(PathBuf::from("/tmp/my-project"))
///     .model_path_override(PathBuf::from("/models/coder.gguf"))
///     .build();
/// assert_eq!(config.config_path(), PathBuf::from("/tmp/my-project/.skye/config.yaml"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct EngineConfig {
    /// Path to the project root.
    repo_path: PathBuf,

    /// Local model path from the environment (takes precedence over config.yaml).
    #[builder(default, setter(strip_option, into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    model_path_override: Option<PathBuf>,

    /// Fixed fallback location for the local model file.
    #[builder(default = default_model_path())]
    #[serde(skip_serializing_if = "Option::is_none")]
    default_model_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Returns the project root.
    pub fn repo_path(&self) -> &PathBuf {
        &self.repo_path
    }

    /// Returns the environment override for the local model path, if set.
    pub fn model_path_override(&self) -> Option<&Path> {
        self.model_path_override.as_deref()
    }

    /// Returns the default local model location, if one could be determined.
    pub fn default_model_path(&self) -> Option<&Path> {
        self.default_model_path.as_deref()
    }

    /// Returns the `.skye` directory path for this project.
    pub fn skye_dir(&self) -> PathBuf {
        self.repo_path.join(SKYE_DIR)
    }

    /// Returns the path to `config.yaml` inside the `.skye` directory.
    pub fn config_path(&self) -> PathBuf {
        self.skye_dir().join("config.yaml")
    }
}

/// `~/.skye/models/default.gguf`, or `None` when no home directory is known.
fn default_model_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(SKYE_DIR).join("models").join("default.gguf"))
}

// ── Project Configuration (.skye/config.yaml) ────────────────

/// Project-level configuration, deserialized from `.skye/config.yaml`.
///
/// All fields have serde defaults so that missing keys in the YAML file
/// produce valid configuration with sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Which model backend produces patches.
    #[serde(default)]
    pub backend: BackendKind,

    /// Local model file, written by the model-path prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    /// Remote backend settings.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Local backend settings.
    #[serde(default)]
    pub local: LocalConfig,

    /// Static checkers, run in order.
    #[serde(default = "default_checkers")]
    pub checkers: Vec<Checker>,

    /// Prompt template search paths.
    #[serde(default)]
    pub prompts: PromptsConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            model_path: None,
            remote: RemoteConfig::default(),
            local: LocalConfig::default(),
            checkers: default_checkers(),
            prompts: PromptsConfig::default(),
        }
    }
}

// ── Sub-configuration types ──────────────────────────────────

/// Model backend selection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BackendKind {
    /// Hosted chat API (default).
    #[default]
    Remote,
    /// Local inference engine loaded from a model file.
    Local,
}

/// Remote backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Model identifier sent to the hosted API.
    #[serde(default = "default_remote_model")]
    pub model: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            model: default_remote_model(),
        }
    }
}

/// Local backend configuration.
///
/// The engine binary is a llama.cpp style CLI that accepts `-m`, `-p`, `-n`,
/// `--temp` and `-r`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    /// Inference engine executable.
    #[serde(default = "default_local_binary")]
    pub binary: String,

    /// Maximum number of tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Stop sequence that ends the completion.
    #[serde(default = "default_stop")]
    pub stop: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            binary: default_local_binary(),
            max_tokens: default_max_tokens(),
            stop: default_stop(),
        }
    }
}

/// A single static checker definition.
///
/// The checker runs as `program args... files...`; its stdout lines become
/// findings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Checker {
    /// Human-readable checker name (e.g., "flake8").
    pub name: String,

    /// Executable to run.
    pub program: String,

    /// Arguments placed before the file list.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Checker {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }
}

/// Prompt template configuration.
///
/// Templates found in these directories replace built-in templates with the
/// same name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptsConfig {
    /// Additional template directories to search (in order).
    #[serde(default)]
    pub include: Vec<PathBuf>,
}

// ── Default value functions for serde ────────────────────────

fn default_remote_model() -> String {
    "claude-sonnet-4-20250514".to_owned()
}

fn default_local_binary() -> String {
    "llama-cli".to_owned()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_stop() -> String {
    "</patch>".to_owned()
}

fn default_checkers() -> Vec<Checker> {
    vec![Checker::new("flake8", "flake8"), Checker::new("mypy", "mypy")]
}

// ── Config loading ───────────────────────────────────────────

/// Load [`ProjectConfig`] from the `.skye/config.yaml` file.
///
/// If the file does not exist, returns the default configuration.
///
/// # Errors
///
/// Returns `CoreError::Io` if the file exists but cannot be read.
/// Returns `CoreError::Yaml` if the file contains invalid YAML.
pub fn load_project_config(config_path: &Path) -> Result<ProjectConfig, CoreError> {
    if !config_path.exists() {
        return Ok(ProjectConfig::default());
    }
    let content = fs::read_to_string(config_path)?;
    if content.trim().is_empty() {
        return Ok(ProjectConfig::default());
    }
    let config: ProjectConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Record `model_path` as `modelPath` in the config file at `config_path`.
///
/// Only that key is touched: the file is merged as a YAML document, so other
/// keys, including ones this version does not know, survive unchanged and
/// defaults are never written out. Parent directories are created as needed.
///
/// # Errors
///
/// Returns `CoreError::Io` if the file cannot be read or written.
/// Returns `CoreError::Yaml` if the existing file is not valid YAML.
pub fn save_model_path(config_path: &Path, model_path: &Path) -> Result<(), CoreError> {
    let mut document = match fs::read_to_string(config_path) {
        Ok(content) if !content.trim().is_empty() => serde_yaml::from_str(&content)?,
        Ok(_) => serde_yaml::Value::Null,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_yaml::Value::Null,
        Err(e) => return Err(e.into()),
    };

    if !document.is_mapping() {
        document = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    }
    if let serde_yaml::Value::Mapping(map) = &mut document {
        map.insert(
            "modelPath".into(),
            model_path.display().to_string().into(),
        );
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(config_path, serde_yaml::to_string(&document)?)?;
    debug!(path = %config_path.display(), "saved model path to project config");
    Ok(())
}
