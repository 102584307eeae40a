use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};
use tracing::debug;

use crate::error::PmError;
use crate::template::PromptTemplate;

/// Template extensions recognized by [`PromptManager::load_dir`].
const TEMPLATE_EXTENSIONS: &[&str] = &["j2", "jinja"];

/// Built-in templates, embedded at compile time.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("patch/system", include_str!("../templates/patch/system.j2")),
    ("patch/request", include_str!("../templates/patch/request.j2")),
    ("patch/local", include_str!("../templates/patch/local.j2")),
];

/// Manages prompt templates and renders them with context variables.
///
/// A new manager always carries the built-in `patch/*` templates. Templates
/// registered later under the same name replace them, which is how project
/// overrides from [`load_dir`](Self::load_dir) take effect.
pub struct PromptManager {
    env: Environment<'static>,
    names: BTreeSet<String>,
}

impl PromptManager {
    /// Create a PromptManager with the built-in templates registered.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if a built-in template fails to parse.
    pub fn new() -> Result<Self, PmError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        let mut pm = Self {
            env,
            names: BTreeSet::new(),
        };
        for (name, source) in BUILTIN_TEMPLATES {
            pm.add_template(PromptTemplate::new(*name, *source))?;
        }
        Ok(pm)
    }

    /// Load all `.j2` / `.jinja` templates from a directory.
    ///
    /// Templates are named by their path relative to `dir`, without the
    /// extension and with `/` separators, so `dir/patch/request.j2` registers
    /// as `patch/request`.
    ///
    /// # Errors
    ///
    /// Returns `PmError::Io` if the directory cannot be read and
    /// `PmError::InvalidTemplate` if a template fails to parse.
    pub fn load_dir(&mut self, dir: &Path) -> Result<(), PmError> {
        self.load_dir_recursive(dir, dir)
    }

    /// Register a single template, replacing any template with the same name.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if the source fails to parse.
    pub fn add_template(&mut self, template: PromptTemplate) -> Result<(), PmError> {
        let PromptTemplate { name, source } = template;
        self.env
            .add_template_owned(name.clone(), source)
            .map_err(|e| PmError::InvalidTemplate(format!("{name}: {e}")))?;
        debug!(template = %name, "registered template");
        self.names.insert(name);
        Ok(())
    }

    /// Render a template by name with the given context.
    ///
    /// # Errors
    ///
    /// Returns `PmError::TemplateNotFound` for an unknown name and
    /// `PmError::RenderError` if rendering fails (including undefined variables).
    pub fn render(&self, name: &str, ctx: &serde_json::Value) -> Result<String, PmError> {
        let template = self.env.get_template(name)?;
        Ok(template.render(ctx)?)
    }

    /// Names of all registered templates, sorted.
    pub fn list_templates(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    fn load_dir_recursive(&mut self, base: &Path, dir: &Path) -> Result<(), PmError> {
        let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                self.load_dir_recursive(base, &path)?;
                continue;
            }

            let is_template = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext));
            if !is_template {
                continue;
            }

            let Ok(relative) = path.with_extension("").strip_prefix(base).map(Path::to_path_buf)
            else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let source = fs::read_to_string(&path)?;
            self.add_template(PromptTemplate::new(name, source))?;
        }

        Ok(())
    }
}
