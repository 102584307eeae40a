//! Patch generation.
//!
//! Renders the patch request from prompt templates and hands it to a
//! [`Backend`]. The backend's answer comes back untouched as a [`Patch`];
//! deciding what an empty answer means is left to the caller.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::json;
use skye_pm::PromptManager;
use tracing::{debug, instrument};

use crate::backend::Backend;
use crate::error::CoreError;
use crate::reload::{ModuleRegistry, module_identifier};

/// A rendered request, in both shapes a backend may want.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRequest {
    /// Fixed system instruction.
    pub system: String,
    /// User message naming the targets and the instruction.
    pub user: String,
    /// Single-string prompt combining both, for completion-style engines.
    pub prompt: String,
}

/// Model output expected to be a unified diff. Not validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch(String);

impl Patch {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the model produced nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds patch requests and submits them to a backend.
pub struct PatchGenerator<B> {
    backend: B,
    prompts: PromptManager,
    /// Project root; target paths are shown relative to it when possible.
    root: PathBuf,
    /// Stop sequence announced in the single-string prompt.
    stop: String,
}

impl<B: Backend> PatchGenerator<B> {
    pub fn new(backend: B, prompts: PromptManager, root: PathBuf, stop: impl Into<String>) -> Self {
        Self {
            backend,
            prompts,
            root,
            stop: stop.into(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Render the request for `targets` and `instruction`.
    ///
    /// Targets loaded in `registry` contribute their current source.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Session` for an empty target list and
    /// `CoreError::Prompt` if a template fails to render.
    pub fn build_request(
        &self,
        targets: &[PathBuf],
        instruction: &str,
        registry: &ModuleRegistry,
    ) -> Result<PatchRequest, CoreError> {
        if targets.is_empty() {
            return Err(CoreError::Session("no target files selected".to_owned()));
        }

        let names: Vec<String> = targets.iter().map(|t| t.display().to_string()).collect();
        let sources: Vec<_> = targets
            .iter()
            .filter_map(|target| {
                let id = module_identifier(target, &self.root)?;
                let module = registry.get(&id)?;
                Some(json!({
                    "path": display_relative(target, &self.root),
                    "source": module.source,
                }))
            })
            .collect();

        let system = self.prompts.render("patch/system", &json!({}))?;
        let user = self.prompts.render(
            "patch/request",
            &json!({
                "targets": names,
                "instruction": instruction,
                "sources": sources,
            }),
        )?;
        let prompt = self.prompts.render(
            "patch/local",
            &json!({
                "system": system,
                "request": user,
                "stop": self.stop,
            }),
        )?;

        Ok(PatchRequest {
            system,
            user,
            prompt,
        })
    }

    /// Ask the backend for a patch touching only `targets`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`build_request`](Self::build_request) and any
    /// `CoreError::Backend` raised by the backend.
    #[instrument(skip(self, targets, instruction, registry), fields(backend = self.backend.name(), targets = targets.len()))]
    pub async fn generate(
        &self,
        targets: &[PathBuf],
        instruction: &str,
        registry: &ModuleRegistry,
    ) -> Result<Patch, CoreError> {
        let request = self.build_request(targets, instruction, registry)?;
        let text = self.backend.complete(&request).await?;
        debug!(bytes = text.len(), "backend responded");
        Ok(Patch::new(text))
    }
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Backend replaying canned responses and recording requests.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedBackend {
        responses: Mutex<VecDeque<Result<String, String>>>,
        pub(crate) requests: Mutex<Vec<PatchRequest>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(responses: Vec<Result<&str, &str>>) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(str::to_owned).map_err(str::to_owned))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().expect("lock should not be poisoned").len()
        }
    }

    impl Backend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &PatchRequest) -> Result<String, CoreError> {
            self.requests
                .lock()
                .expect("lock should not be poisoned")
                .push(request.clone());
            let next = self
                .responses
                .lock()
                .expect("lock should not be poisoned")
                .pop_front();
            match next {
                Some(Ok(text)) => Ok(text),
                Some(Err(e)) => Err(CoreError::Backend(e)),
                None => Err(CoreError::Backend("no scripted response left".to_owned())),
            }
        }
    }
}
