//! Core library for skye: project loading, static analysis, patch generation
//! and the interactive improvement loop.

pub mod analyzer;
pub mod backend;
pub mod config;
mod engine;
mod error;
pub mod generator;
pub mod git;
pub mod interact;
pub mod loader;
mod model_path;
pub mod reload;
pub mod session;

pub use analyzer::{Analyzer, Finding};
pub use backend::{Backend, LocalBackend, ModelBackend, RemoteBackend};
pub use config::{BackendKind, EngineConfig, MODEL_PATH_ENV, ProjectConfig};
pub use engine::Engine;
pub use error::CoreError;
pub use generator::{Patch, PatchGenerator, PatchRequest};
pub use git::{ApplyOutcome, GitOps};
pub use interact::Interaction;
pub use model_path::resolve_model_path;
pub use reload::{ModuleRegistry, ReloadOutcome};
pub use session::ImproveSession;
