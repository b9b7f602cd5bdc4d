//! Atomic writes for keystores, certificates, CSRs and the repository.
//!
//! Bytes go to a temporary file in the target directory which is then
//! renamed into place, so an interrupted write never leaves a truncated
//! artifact behind.

use crate::error::{CaError, Result};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with `AlreadyExists` if the target exists
    CreateNew,
    /// Replace any existing target
    Replace,
}

pub fn write_artifact(path: &Path, bytes: &[u8], mode: WriteMode) -> Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(directory).map_err(|e| CaError::io(directory, e))?;
    temp.write_all(bytes).map_err(|e| CaError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| CaError::io(temp.path(), e))?;

    let persisted = match mode {
        WriteMode::CreateNew => temp.persist_noclobber(path),
        WriteMode::Replace => temp.persist(path),
    };
    persisted.map_err(|e| CaError::io(path, e.error))?;
    Ok(())
}

/// Absolute form of `path` used to tell whether two paths name the same
/// file. Existing paths are canonicalized; a path that does not exist yet is
/// keyed by its canonical parent, or resolved lexically when the parent is
/// missing too.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(parent) = parent.canonicalize() {
            return parent.join(name);
        }
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(current) => current.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
