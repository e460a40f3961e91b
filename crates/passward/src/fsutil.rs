//! Filesystem helpers for vault directories

use crate::error::{PasswardError, Result};
use std::fs::{self, File, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Marker file keeping otherwise-empty directories under version control
pub(crate) const PLACEHOLDER: &str = ".placeholder";

/// Create a directory (and parents) readable only by the owner
pub(crate) fn create_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    fs::set_permissions(path, Permissions::from_mode(0o700))?;
    Ok(())
}

/// Create `dir` with a placeholder file if it does not exist yet
pub(crate) fn ensure_tracked_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        create_private_dir(dir)?;
        write_private(&dir.join(PLACEHOLDER), b"")?;
    }
    Ok(())
}

/// Remove a directory left behind by a failed operation
pub(crate) fn discard_dir(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        tracing::warn!("could not remove {}: {}", dir.display(), e);
    }
}

/// Write a file readable only by the owner.
///
/// The content goes to a temporary sibling first and is renamed into place,
/// so an interrupted write never leaves a truncated file behind.
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = File::create(&tmp)?;
    fs::set_permissions(&tmp, Permissions::from_mode(0o600))?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Names of the visible (non-dot) subdirectories of `dir`, sorted
pub(crate) fn visible_subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = vec![];
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !entry.file_type()?.is_dir() {
            continue;
        }
        dirs.push((name, entry.path()));
    }
    dirs.sort();
    Ok(dirs)
}

/// Names of the visible (non-dot) regular files in `dir`, sorted
pub(crate) fn visible_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = vec![];
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !entry.file_type()?.is_file() {
            continue;
        }
        files.push((name, entry.path()));
    }
    files.sort();
    Ok(files)
}

/// Validate a name that becomes a single path component
pub(crate) fn validate_name(what: &'static str, name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.chars().any(|c| c == '/' || c == '\\' || c == '\0');

    if invalid {
        return Err(PasswardError::InvalidName {
            what,
            name: name.to_string(),
        });
    }
    Ok(())
}
