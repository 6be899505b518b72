//! Common assertions for spool testing

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// Collects every regular file below `dir` as `relative/path -> content`.
///
/// Directories are left out, so trees differing only in empty directories
/// compare equal.
pub fn collect_files(dir: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.insert(relative, std::fs::read(entry.path())?);
    }
    Ok(files)
}

/// Asserts that two trees hold the same set of files with the same contents.
///
/// Order of traversal is not compared.
pub fn assert_same_files(expected: &Path, actual: &Path) -> Result<()> {
    let expected_files = collect_files(expected)?;
    let actual_files = collect_files(actual)?;

    let expected_names: Vec<_> = expected_files.keys().collect();
    let actual_names: Vec<_> = actual_files.keys().collect();
    assert_eq!(expected_names, actual_names, "Different file sets");

    for (name, content) in &expected_files {
        assert_eq!(
            content, &actual_files[name],
            "Content mismatch for {:?}",
            name
        );
    }
    Ok(())
}

/// Asserts that a file has specific permissions (Unix only)
#[cfg(unix)]
pub fn assert_file_permissions(path: &Path, expected: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
    assert_eq!(
        mode, expected,
        "Permission mismatch for {:?}: expected {:o}, got {:o}",
        path, expected, mode
    );
    Ok(())
}
