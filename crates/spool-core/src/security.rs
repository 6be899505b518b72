//! Path safety checks for extraction

use crate::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error};

/// Resolve an entry name to a path inside `base`.
///
/// Leading `/` and `.` components are dropped so names stored as `/a.txt`
/// land at `base/a.txt`. Parent-directory components and drive prefixes are
/// rejected, as are names without any normal component.
pub fn sanitize_entry_name(base: &Path, name: &str) -> Result<PathBuf> {
    let untrusted = Path::new(name);
    let mut result = base.to_path_buf();
    let mut depth = 0usize;

    for component in untrusted.components() {
        match component {
            Component::Normal(part) => {
                result.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::RootDir => {
                debug!(entry = %name, "stripping leading separator from entry name");
            }
            Component::ParentDir => {
                error!(entry = %name, "Entry name contains parent directory component");
                return Err(Error::InvalidPath(format!(
                    "Path traversal attempt detected: {:?}",
                    name
                )));
            }
            Component::Prefix(_) => {
                error!(entry = %name, "Entry name contains a path prefix");
                return Err(Error::InvalidPath(format!(
                    "Path prefix not allowed: {:?}",
                    name
                )));
            }
        }
    }

    if depth == 0 {
        return Err(Error::InvalidPath(format!(
            "Entry name does not name a file: {:?}",
            name
        )));
    }

    Ok(result)
}

/// Verify that `path` stays below `root` once symlinks are resolved.
///
/// `root` must be canonical. The check runs against the deepest ancestor of
/// `path` that already exists, so it holds before any missing directories
/// are created.
pub fn ensure_within(root: &Path, path: &Path) -> Result<()> {
    let mut existing = path;
    while fs::symlink_metadata(existing).is_err() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => break,
        }
    }

    let resolved = existing
        .canonicalize()
        .map_err(|e| Error::filesystem("resolving", existing, e))?;
    if !resolved.starts_with(root) {
        error!(root = ?root, path = ?path, resolved = ?resolved, "Path escapes base directory");
        return Err(Error::InvalidPath(format!(
            "Path would escape extraction directory: {:?}",
            path
        )));
    }
    Ok(())
}
