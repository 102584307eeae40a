//! Model backends.
//!
//! A backend turns a rendered [`PatchRequest`] into completion text. The
//! improve loop only sees the [`Backend`] trait; which variant runs is a
//! configuration choice resolved once in [`ModelBackend::from_config`].
//!
//! - [`RemoteBackend`] wraps `claude-agent-sdk-rs`: the system instruction
//!   becomes the system prompt, the request becomes the user message, tools
//!   are disabled and the exchange is limited to one turn.
//! - [`LocalBackend`] drives a llama.cpp style inference engine loaded from a
//!   model file on disk, with a token budget, a stop sequence and zero
//!   temperature.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use claude_agent_sdk_rs::{
    ClaudeAgentOptions, ContentBlock, Message, PermissionMode as SdkPermissionMode, SystemPrompt,
    Tools,
};
use tracing::{debug, error, info, instrument};

use crate::config::{BackendKind, EngineConfig, LocalConfig, ProjectConfig};
use crate::error::CoreError;
use crate::generator::PatchRequest;
use crate::interact::Interaction;
use crate::model_path::resolve_model_path;

/// Capability shared by every model backend: produce completion text.
pub trait Backend {
    /// Short backend name for logs and messages.
    fn name(&self) -> &str;

    /// Submit `request` and return the raw completion text.
    fn complete(
        &self,
        request: &PatchRequest,
    ) -> impl Future<Output = Result<String, CoreError>> + Send;
}

// ── Remote ───────────────────────────────────────────────────

/// Hosted chat backend driven through the Claude Agent SDK.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    /// Model identifier sent with each request.
    model: String,
    /// Working directory for the SDK session.
    cwd: PathBuf,
}

impl RemoteBackend {
    pub fn new(model: impl Into<String>, cwd: PathBuf) -> Self {
        Self {
            model: model.into(),
            cwd,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_options(&self, request: &PatchRequest) -> ClaudeAgentOptions {
        ClaudeAgentOptions {
            system_prompt: Some(SystemPrompt::Text(request.system.clone())),
            // An empty tool list turns off every built-in tool.
            tools: Some(Tools::from(Vec::<String>::new())),
            max_turns: Some(1),
            permission_mode: Some(SdkPermissionMode::Plan),
            model: Some(self.model.clone()),
            cwd: Some(self.cwd.clone()),
            ..Default::default()
        }
    }
}

impl Backend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn complete(&self, request: &PatchRequest) -> Result<String, CoreError> {
        let options = self.build_options(request);
        debug!("sending patch request to remote model");

        let messages = claude_agent_sdk_rs::query(&request.user, Some(options))
            .await
            .map_err(|e| {
                error!(error = %e, "remote query failed");
                CoreError::Backend(format!(
                    "remote model {} failed: {e}. Check your network connection and API credentials.",
                    self.model
                ))
            })?;

        if messages
            .iter()
            .any(|msg| matches!(msg, Message::Result(result) if result.is_error))
        {
            return Err(CoreError::Backend(format!(
                "remote model {} reported an error",
                self.model
            )));
        }

        Ok(reply_text(&messages))
    }
}

/// The reply's primary content: the final result text, or failing that the
/// text of the last assistant message. Earlier turns are never included.
fn reply_text(messages: &[Message]) -> String {
    let result = messages.iter().rev().find_map(|msg| match msg {
        Message::Result(result) => result.result.clone(),
        _ => None,
    });
    let last_assistant = messages.iter().rev().find_map(|msg| match msg {
        Message::Assistant(assistant) => Some(text_blocks(&assistant.message.content)),
        _ => None,
    });
    primary_reply(result, last_assistant)
}

fn text_blocks(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn primary_reply(result: Option<String>, last_assistant: Option<String>) -> String {
    result
        .filter(|text| !text.trim().is_empty())
        .or(last_assistant)
        .unwrap_or_default()
}

// ── Local ────────────────────────────────────────────────────

/// Local inference backend.
///
/// Runs the configured engine binary once per request:
/// `<binary> -m <model> -p <prompt> -n <max_tokens> --temp 0 -r <stop>
/// --no-display-prompt -no-cnv`, and returns its output up to the first stop
/// sequence.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    binary: String,
    model_path: PathBuf,
    max_tokens: u32,
    stop: String,
}

impl LocalBackend {
    pub fn new(config: &LocalConfig, model_path: PathBuf) -> Self {
        Self {
            binary: config.binary.clone(),
            model_path,
            max_tokens: config.max_tokens,
            stop: config.stop.clone(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Command-line arguments for one completion.
    fn args(&self, prompt: &str) -> Vec<String> {
        vec![
            "-m".to_owned(),
            self.model_path.display().to_string(),
            "-p".to_owned(),
            prompt.to_owned(),
            "-n".to_owned(),
            self.max_tokens.to_string(),
            "--temp".to_owned(),
            "0".to_owned(),
            "-r".to_owned(),
            self.stop.clone(),
            "--no-display-prompt".to_owned(),
            "-no-cnv".to_owned(),
        ]
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    #[instrument(skip(self, request), fields(model = %self.model_path.display()))]
    async fn complete(&self, request: &PatchRequest) -> Result<String, CoreError> {
        debug!(binary = %self.binary, max_tokens = self.max_tokens, "running local inference");

        let output = tokio::process::Command::new(&self.binary)
            .args(self.args(&request.prompt))
            .output()
            .await
            .map_err(|e| {
                error!(binary = %self.binary, error = %e, "failed to spawn inference engine");
                if e.kind() == io::ErrorKind::NotFound {
                    CoreError::Backend(format!(
                        "local inference engine {} is not installed or not found in PATH",
                        self.binary
                    ))
                } else {
                    CoreError::Backend(format!("failed to run {}: {e}", self.binary))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Backend(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(truncate_at_stop(&stdout, &self.stop).to_owned())
    }
}

/// Cut `text` at the first occurrence of `stop`.
fn truncate_at_stop<'a>(text: &'a str, stop: &str) -> &'a str {
    if stop.is_empty() {
        return text;
    }
    text.find(stop).map_or(text, |end| &text[..end])
}

// ── Selection ────────────────────────────────────────────────

/// The configured backend.
#[derive(Debug, Clone)]
pub enum ModelBackend {
    Remote(RemoteBackend),
    Local(LocalBackend),
}

impl ModelBackend {
    /// Build the backend selected by `project.backend`.
    ///
    /// The local variant resolves its model file first, which may prompt the
    /// user through `io`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` if the local model path cannot be resolved.
    pub async fn from_config<I: Interaction>(
        config: &EngineConfig,
        project: &ProjectConfig,
        io: &mut I,
    ) -> Result<Self, CoreError> {
        let backend = match project.backend {
            BackendKind::Remote => Self::Remote(RemoteBackend::new(
                project.remote.model.clone(),
                config.repo_path().clone(),
            )),
            BackendKind::Local => {
                let model_path = resolve_model_path(config, io).await?;
                Self::Local(LocalBackend::new(&project.local, model_path))
            }
        };
        info!(backend = backend.name(), "model backend ready");
        Ok(backend)
    }
}

impl Backend for ModelBackend {
    fn name(&self) -> &str {
        match self {
            Self::Remote(backend) => backend.name(),
            Self::Local(backend) => backend.name(),
        }
    }

    async fn complete(&self, request: &PatchRequest) -> Result<String, CoreError> {
        match self {
            Self::Remote(backend) => backend.complete(request).await,
            Self::Local(backend) => backend.complete(request).await,
        }
    }
}
