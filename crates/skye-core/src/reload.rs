//! Module registry and reloading.
//!
//! The registry maps module identifiers (`pkg.sub.mod`) to the live contents
//! of each loaded code unit. It is owned by the improve session and passed
//! explicitly to whoever needs it. After a patch is applied, the changed
//! units are reloaded in place from disk so later requests see the new code.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::loader::SOURCE_EXTENSION;

/// Map a source file to its module identifier.
///
/// The path is made relative to `root`, its components are joined with `.`,
/// and the `.py` suffix is stripped, so root `/p` and file `/p/a/b.py` give
/// `a.b`. Returns `None` for paths outside `root`, without the suffix, or
/// with a `.` left in any directory name or stem, so distinct paths never
/// share an identifier.
pub fn module_identifier(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }

    let last = parts.pop()?;
    let stem = last.strip_suffix(&format!(".{SOURCE_EXTENSION}"))?;
    parts.push(stem.to_owned());
    if parts.iter().any(|part| part.is_empty() || part.contains('.')) {
        return None;
    }
    Some(parts.join("."))
}

/// A code unit currently loaded in the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    /// File the unit was loaded from.
    pub path: PathBuf,
    /// Source text as of the last (re)load.
    pub source: String,
    /// Number of times the unit has been reloaded.
    pub generation: u64,
}

/// What happened to one changed path during [`reload_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The unit was re-read and its contents replaced.
    Reloaded(String),
    /// The unit could not be re-read; its previous contents are kept.
    Failed { module: String, reason: String },
}

/// Explicit registry of loaded code units, keyed by module identifier.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, LoadedModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file in `files` that maps to an identifier under `root`.
    ///
    /// Unreadable files are left out of the registry.
    #[instrument(skip(files), fields(files = files.len()))]
    pub fn load(root: &Path, files: &[PathBuf]) -> Self {
        let mut registry = Self::new();
        for path in files {
            let Some(id) = module_identifier(path, root) else {
                continue;
            };
            match fs::read_to_string(path) {
                Ok(source) => registry.insert(id, path.clone(), source),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to load module"),
            }
        }
        debug!(modules = registry.len(), "module registry loaded");
        registry
    }

    /// Register (or replace) a unit.
    pub fn insert(&mut self, id: impl Into<String>, path: PathBuf, source: String) {
        self.modules.insert(
            id.into(),
            LoadedModule {
                path,
                source,
                generation: 0,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<&LoadedModule> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Re-read one unit from disk, overwriting its contents.
    fn reload(&mut self, id: &str) -> Option<ReloadOutcome> {
        let module = self.modules.get_mut(id)?;
        let outcome = match fs::read_to_string(&module.path) {
            Ok(source) => {
                module.source = source;
                module.generation += 1;
                ReloadOutcome::Reloaded(id.to_owned())
            }
            Err(e) => ReloadOutcome::Failed {
                module: id.to_owned(),
                reason: e.to_string(),
            },
        };
        Some(outcome)
    }
}

/// Reload the loaded units corresponding to `changed`.
///
/// Paths with no loaded counterpart are skipped. Dependents are not
/// reloaded.
#[instrument(skip(registry, changed), fields(changed = changed.len()))]
pub fn reload_changed(
    registry: &mut ModuleRegistry,
    changed: &[PathBuf],
    root: &Path,
) -> Vec<ReloadOutcome> {
    let mut outcomes = Vec::new();
    for path in changed {
        let Some(id) = module_identifier(path, root) else {
            continue;
        };
        match registry.reload(&id) {
            Some(outcome) => {
                if let ReloadOutcome::Failed { reason, .. } = &outcome {
                    warn!(module = %id, reason = %reason, "module reload failed");
                }
                outcomes.push(outcome);
            }
            None => debug!(module = %id, "module not loaded, skipping"),
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_should_map_nested_path_to_dotted_identifier() {
        assert_eq!(
            module_identifier(Path::new("/p/a/b.py"), Path::new("/p")),
            Some("a.b".to_owned())
        );
        assert_eq!(
            module_identifier(Path::new("/p/main.py"), Path::new("/p")),
            Some("main".to_owned())
        );
    }

    #[test]
    fn test_should_map_relative_root_paths() {
        assert_eq!(
            module_identifier(Path::new("./pkg/mod.py"), Path::new(".")),
            Some("pkg.mod".to_owned())
        );
        assert_eq!(
            module_identifier(Path::new("proj/pkg/__init__.py"), Path::new("proj")),
            Some("pkg.__init__".to_owned())
        );
    }

    #[test]
    fn test_should_strip_only_the_source_suffix() {
        assert_eq!(
            module_identifier(Path::new("/p/a/b.py.py"), Path::new("/p")),
            None
        );
        assert_eq!(module_identifier(Path::new("/p/a/b.pyc"), Path::new("/p")), None);
        assert_eq!(module_identifier(Path::new("/p/a/b"), Path::new("/p")), None);
    }

    #[test]
    fn test_should_reject_paths_outside_root() {
        assert_eq!(module_identifier(Path::new("/q/a.py"), Path::new("/p")), None);
    }

    #[test]
    fn test_should_map_distinct_paths_to_distinct_identifiers() {
        let root = Path::new("/p");
        let paths = ["/p/a.py", "/p/a/b.py", "/p/a/c.py", "/p/b/a.py", "/p/ab.py"];
        let ids: HashSet<_> = paths
            .iter()
            .filter_map(|p| module_identifier(Path::new(p), root))
            .collect();
        assert_eq!(ids.len(), paths.len());

        // Dotted names would collide with nested ones, so they get no name.
        let dotted = [
            ("/p/a.b.py", "/p/a/b.py"),
            ("/p/a/b.py.py", "/p/a/b/py.py"),
            ("/p/a.b/c.py", "/p/a/b/c.py"),
        ];
        for (dotted, nested) in dotted {
            assert_eq!(module_identifier(Path::new(dotted), root), None, "{dotted}");
            assert!(module_identifier(Path::new(nested), root).is_some(), "{nested}");
        }
        assert_eq!(module_identifier(Path::new("/p/.hidden.py"), root), None);
    }

    #[test]
    fn test_should_not_confuse_dotted_file_with_nested_module() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let root = dir.path();
        fs::create_dir_all(root.join("a")).expect("should create dir");
        fs::write(root.join("a.b.py"), "dotted = 1\n").expect("should write");
        fs::write(root.join("a/b.py"), "nested = 1\n").expect("should write");

        let files = vec![root.join("a.b.py"), root.join("a/b.py")];
        let mut registry = ModuleRegistry::load(root, &files);

        assert_eq!(registry.len(), 1);
        let module = registry.get("a.b").expect("nested module should be loaded");
        assert_eq!(module.path, root.join("a/b.py"));

        fs::write(root.join("a.b.py"), "dotted = 2\n").expect("should rewrite");
        let outcomes = reload_changed(&mut registry, &[root.join("a.b.py")], root);

        assert!(outcomes.is_empty());
        let module = registry.get("a.b").expect("nested module should stay loaded");
        assert_eq!(module.source, "nested = 1\n");
        assert_eq!(module.generation, 0);
    }

    #[test]
    fn test_should_load_registry_from_files() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).expect("should create pkg");
        fs::write(root.join("pkg/mod.py"), "x = 1\n").expect("should write");

        let files = vec![root.join("pkg/mod.py"), root.join("pkg/missing.py")];
        let registry = ModuleRegistry::load(root, &files);

        assert_eq!(registry.len(), 1);
        let module = registry.get("pkg.mod").expect("module should be loaded");
        assert_eq!(module.source, "x = 1\n");
        assert_eq!(module.generation, 0);
        assert!(!registry.contains("pkg.missing"));
    }

    #[test]
    fn test_should_reload_changed_module_in_place() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let root = dir.path();
        let path = root.join("mod.py");
        fs::write(&path, "x = 1\n").expect("should write");

        let mut registry = ModuleRegistry::load(root, &[path.clone()]);
        fs::write(&path, "x = 2\n").expect("should rewrite");

        let outcomes = reload_changed(&mut registry, &[path], root);

        assert_eq!(outcomes, vec![ReloadOutcome::Reloaded("mod".to_owned())]);
        let module = registry.get("mod").expect("module should be loaded");
        assert_eq!(module.source, "x = 2\n");
        assert_eq!(module.generation, 1);
    }

    #[test]
    fn test_should_skip_paths_not_loaded() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let root = dir.path();
        fs::write(root.join("other.py"), "").expect("should write");

        let mut registry = ModuleRegistry::new();
        let outcomes = reload_changed(
            &mut registry,
            &[root.join("other.py"), PathBuf::from("/elsewhere/x.py")],
            root,
        );
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_should_keep_old_contents_when_reload_fails() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let root = dir.path();
        let path = root.join("gone.py");
        fs::write(&path, "y = 1\n").expect("should write");

        let mut registry = ModuleRegistry::load(root, &[path.clone()]);
        fs::remove_file(&path).expect("should remove");

        let outcomes = reload_changed(&mut registry, &[path], root);

        assert!(matches!(
            outcomes.as_slice(),
            [ReloadOutcome::Failed { module, .. }] if module == "gone"
        ));
        let module = registry.get("gone").expect("module should stay loaded");
        assert_eq!(module.source, "y = 1\n");
        assert_eq!(module.generation, 0);
    }
}
