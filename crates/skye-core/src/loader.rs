//! Project loading.
//!
//! Walks a project directory and collects the Python source files the other
//! components operate on. Housekeeping directories (version control metadata,
//! virtual environments, bytecode caches) are skipped at any depth.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::CoreError;

/// Directories never descended into.
pub const IGNORED_DIRS: &[&str] = &[".git", "venv", ".venv", "__pycache__"];

/// Extension of the source files collected by [`load_project`].
pub const SOURCE_EXTENSION: &str = "py";

/// Collect all source files under `root`.
///
/// Entries are visited in name order; a directory's own files come before the
/// files of its subdirectories. Returned paths are `root` joined with the
/// relative path, so a relative root yields relative paths.
///
/// # Errors
///
/// Returns `CoreError::Io` if `root` cannot be read. Unreadable
/// subdirectories are skipped.
#[instrument]
pub fn load_project(root: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let mut files = Vec::new();
    walk(root, true, &mut files)?;
    debug!(count = files.len(), "loaded project files");
    Ok(files)
}

fn walk(dir: &Path, is_root: bool, files: &mut Vec<PathBuf>) -> Result<(), CoreError> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if is_root => return Err(CoreError::Io(e)),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return Ok(());
        }
    };

    let mut entries: Vec<_> = read.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry.path();
        // Symlinked directories are not followed, symlinked files are kept.
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            let name = entry.file_name();
            if !IGNORED_DIRS.contains(&name.to_string_lossy().as_ref()) {
                subdirs.push(path);
            }
            continue;
        }

        let is_file = file_type.is_file() || (file_type.is_symlink() && path.is_file());
        if is_file && is_source_file(&path) {
            files.push(path);
        }
    }

    for subdir in subdirs {
        walk(&subdir, false, files)?;
    }

    Ok(())
}

fn is_source_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION)
}
