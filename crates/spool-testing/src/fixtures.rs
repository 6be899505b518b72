//! Common test fixtures for spool testing

use crate::TestDir;
use anyhow::Result;

/// Creates the minimal tree used by round-trip tests:
/// `a.txt` (3 bytes), `sub/b.txt` (empty) and the empty directory `sub/empty`
pub fn create_sample_tree(test_dir: &TestDir) -> Result<()> {
    test_dir.create_file("a.txt", b"abc")?;
    test_dir.create_file("sub/b.txt", b"")?;
    test_dir.create_dir("sub/empty")?;
    Ok(())
}

/// Creates a broader tree with nested directories, binary data and a
/// payload spanning many blocks
pub fn create_project_tree(test_dir: &TestDir) -> Result<()> {
    test_dir.create_file("README.md", b"# Sample\n\nSample project tree.\n")?;
    test_dir.create_file(".gitignore", b"target/\n*.tmp\n")?;
    test_dir.create_file("src/main.rs", b"fn main() {}\n")?;
    test_dir.create_file("src/modules/mod.rs", b"pub mod utils;\n")?;
    test_dir.create_file("assets/logo.bin", &[0x89, 0x50, 0x4E, 0x47, 0x00, 0xFF])?;

    // Large file
    let large_content = "spool ".repeat(200 * 1024);
    test_dir.create_file("logs/large.log", large_content.as_bytes())?;
    Ok(())
}

/// Creates a symlink structure next to regular files (Unix only)
#[cfg(unix)]
pub fn create_symlink_structure(test_dir: &TestDir) -> Result<()> {
    use std::os::unix::fs::symlink;

    let file1 = test_dir.create_file("file1.txt", b"Original file")?;
    test_dir.create_dir("subdir")?;

    symlink(&file1, test_dir.path().join("link_to_file1.txt"))?;
    symlink(
        "../file1.txt",
        test_dir.path().join("subdir/link_to_parent_file.txt"),
    )?;
    Ok(())
}
