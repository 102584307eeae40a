//! Local model path resolution.
//!
//! The local backend needs a model file on disk. Sources are tried in order,
//! first existing file wins:
//!
//! 1. the `SKYE_MODEL_PATH` override (passed in through [`EngineConfig`]),
//! 2. `modelPath` in `.skye/config.yaml`,
//! 3. the fixed default location,
//! 4. a prompt, whose answer is saved back to `.skye/config.yaml`.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::config::{EngineConfig, load_project_config, save_model_path};
use crate::error::CoreError;
use crate::interact::Interaction;

/// Resolve the local model file for the project described by `config`.
///
/// # Errors
///
/// Returns `CoreError::Config` if no source, including the prompt, names an
/// existing file. Returns `CoreError::Io`/`CoreError::Yaml` if the project
/// config cannot be read or written.
#[instrument(skip_all)]
pub async fn resolve_model_path<I: Interaction>(
    config: &EngineConfig,
    io: &mut I,
) -> Result<PathBuf, CoreError> {
    if let Some(path) = config.model_path_override() {
        if path.is_file() {
            debug!(path = %path.display(), "using model path from environment");
            return Ok(path.to_path_buf());
        }
        warn!(path = %path.display(), "model path from environment is not a file");
    }

    let config_path = config.config_path();
    let project = load_project_config(&config_path)?;

    if let Some(path) = &project.model_path {
        let path = resolve_relative(path, config.repo_path());
        if path.is_file() {
            debug!(path = %path.display(), "using model path from project config");
            return Ok(path);
        }
        warn!(path = %path.display(), "model path from project config is not a file");
    }

    if let Some(path) = config.default_model_path()
        && path.is_file()
    {
        debug!(path = %path.display(), "using default model path");
        return Ok(path.to_path_buf());
    }

    let answer = io
        .ask("Path to local model file: ")
        .await?
        .map(|line| line.trim().to_owned())
        .unwrap_or_default();
    if answer.is_empty() {
        return Err(CoreError::Config(
            "no local model path configured; set SKYE_MODEL_PATH or modelPath in .skye/config.yaml"
                .to_owned(),
        ));
    }

    let path = PathBuf::from(&answer);
    if !resolve_relative(&path, config.repo_path()).is_file() {
        return Err(CoreError::Config(format!(
            "model file not found: {answer}"
        )));
    }

    save_model_path(&config_path, &path)?;
    info!(path = %path.display(), "saved model path to project config");
    Ok(resolve_relative(&path, config.repo_path()))
}

/// Relative config entries are taken relative to the project root.
fn resolve_relative(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::interact::testing::ScriptedInteraction;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::TempDir::new().expect("should create temp dir"),
            }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn model(&self, name: &str) -> PathBuf {
            let path = self.root().join(name);
            fs::write(&path, b"gguf").expect("should write model");
            path
        }

        fn write_config(&self, model_path: &Path) {
            save_model_path(&self.root().join(".skye/config.yaml"), model_path)
                .expect("should save config");
        }

        fn saved_model_path(&self) -> Option<PathBuf> {
            load_project_config(&self.root().join(".skye/config.yaml"))
                .expect("should load config")
                .model_path
        }
    }

    #[tokio::test]
    async fn test_should_prefer_environment_over_config() {
        let fx = Fixture::new();
        let env_model = fx.model("env.gguf");
        let config_model = fx.model("config.gguf");
        fx.write_config(&config_model);

        let config = EngineConfig::builder()
            .repo_path(fx.root().to_path_buf())
            .model_path_override(env_model.clone())
            .default_model_path(None)
            .build();
        let mut io = ScriptedInteraction::new(&[]);

        let path = resolve_model_path(&config, &mut io).await.expect("should resolve");
        assert_eq!(path, env_model);
        assert!(io.asked.is_empty());
    }

    #[tokio::test]
    async fn test_should_use_config_when_no_environment() {
        let fx = Fixture::new();
        let config_model = fx.model("config.gguf");
        let default_model = fx.model("default.gguf");
        fx.write_config(&config_model);

        let config = EngineConfig::builder()
            .repo_path(fx.root().to_path_buf())
            .default_model_path(Some(default_model))
            .build();
        let mut io = ScriptedInteraction::new(&[]);

        let path = resolve_model_path(&config, &mut io).await.expect("should resolve");
        assert_eq!(path, config_model);
    }

    #[tokio::test]
    async fn test_should_fall_back_to_default_location() {
        let fx = Fixture::new();
        let default_model = fx.model("default.gguf");

        let config = EngineConfig::builder()
            .repo_path(fx.root().to_path_buf())
            .model_path_override(fx.root().join("missing.gguf"))
            .default_model_path(Some(default_model.clone()))
            .build();
        let mut io = ScriptedInteraction::new(&[]);

        let path = resolve_model_path(&config, &mut io).await.expect("should resolve");
        assert_eq!(path, default_model);
        assert!(io.asked.is_empty());
    }

    #[tokio::test]
    async fn test_should_prompt_and_persist_answer() {
        let fx = Fixture::new();
        let typed = fx.model("typed.gguf");

        let config = EngineConfig::builder()
            .repo_path(fx.root().to_path_buf())
            .default_model_path(Some(fx.root().join("absent.gguf")))
            .build();
        let answer = format!("  {}  ", typed.display());
        let mut io = ScriptedInteraction::new(&[answer.as_str()]);

        let path = resolve_model_path(&config, &mut io).await.expect("should resolve");
        assert_eq!(path, typed);
        assert_eq!(io.asked, vec!["Path to local model file: "]);
        assert_eq!(fx.saved_model_path(), Some(typed));
    }

    #[tokio::test]
    async fn test_should_persist_answer_without_touching_other_settings() {
        let fx = Fixture::new();
        let typed = fx.model("typed.gguf");
        let config_path = fx.root().join(".skye/config.yaml");
        fs::create_dir_all(fx.root().join(".skye")).expect("should create .skye");
        fs::write(&config_path, "backend: local\ncheckers: []\n").expect("should write config");

        let config = EngineConfig::builder()
            .repo_path(fx.root().to_path_buf())
            .default_model_path(None)
            .build();
        let answer = typed.display().to_string();
        let mut io = ScriptedInteraction::new(&[answer.as_str()]);

        resolve_model_path(&config, &mut io).await.expect("should resolve");

        let saved = load_project_config(&config_path).expect("should load config");
        assert_eq!(saved.model_path, Some(typed));
        assert!(saved.checkers.is_empty());
        let content = fs::read_to_string(&config_path).expect("should read config");
        assert!(!content.contains("maxTokens"));
    }

    #[tokio::test]
    async fn test_should_fail_when_prompt_answer_is_not_a_file() {
        let fx = Fixture::new();
        let config = EngineConfig::builder()
            .repo_path(fx.root().to_path_buf())
            .default_model_path(None)
            .build();
        let mut io = ScriptedInteraction::new(&["/nonexistent/model.gguf"]);

        let result = resolve_model_path(&config, &mut io).await;
        assert!(matches!(result, Err(CoreError::Config(_))));
        assert!(!fx.root().join(".skye").exists());
    }

    #[tokio::test]
    async fn test_should_fail_at_end_of_input() {
        let fx = Fixture::new();
        let config = EngineConfig::builder()
            .repo_path(fx.root().to_path_buf())
            .default_model_path(None)
            .build();
        let mut io = ScriptedInteraction::new(&[]);

        let result = resolve_model_path(&config, &mut io).await;
        assert!(matches!(result, Err(CoreError::Config(_))));
    }
}
