//! Filesystem extractor: drains an archive reader onto disk

use super::format::EntryHeader;
use super::reader::ArchiveReader;
use crate::config::ExtractOptions;
use crate::security::{ensure_within, sanitize_entry_name};
use crate::{Error, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Totals for a completed extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Regular files written
    pub files: u64,
    /// Payload bytes written
    pub bytes: u64,
    /// Entries of other kinds that were skipped
    pub skipped: u64,
}

/// Write every regular-file entry of `reader` below `dest`.
///
/// Entries of other kinds are skipped. The first failure aborts; files
/// written before it stay on disk.
pub fn extract_archive<R: Read>(
    reader: &mut ArchiveReader<R>,
    dest: &Path,
    options: &ExtractOptions,
) -> Result<ExtractStats> {
    info!("Extracting archive to {:?}", dest);
    fs::create_dir_all(dest).map_err(|e| Error::filesystem("creating", dest, e))?;
    let root = dest
        .canonicalize()
        .map_err(|e| Error::filesystem("resolving", dest, e))?;

    let mut buf = vec![0u8; options.buffer_size.max(1)];
    let mut stats = ExtractStats::default();

    while let Some(header) = reader.next_entry()? {
        if !header.kind.is_regular() {
            debug!(name = %header.name, kind = ?header.kind, "skipping non-regular entry");
            stats.skipped += 1;
            continue;
        }
        extract_file(reader, &header, &root, options, &mut buf)?;
        stats.files += 1;
        stats.bytes += header.size;
    }

    info!(
        files = stats.files,
        bytes = stats.bytes,
        skipped = stats.skipped,
        "Extracted archive to {:?}",
        dest
    );
    Ok(stats)
}

fn extract_file<R: Read>(
    reader: &mut ArchiveReader<R>,
    header: &EntryHeader,
    root: &Path,
    options: &ExtractOptions,
    buf: &mut [u8],
) -> Result<()> {
    let target = sanitize_entry_name(root, &header.name)?;
    debug!(name = %header.name, size = header.size, "extracting to {:?}", target);

    if let Some(parent) = target.parent() {
        ensure_within(root, parent)?;
        fs::create_dir_all(parent).map_err(|e| Error::filesystem("creating", parent, e))?;
    }
    // A link left at the target would redirect the write
    if matches!(fs::symlink_metadata(&target), Ok(m) if m.file_type().is_symlink()) {
        debug!("replacing symlink {:?}", target);
        fs::remove_file(&target).map_err(|e| Error::filesystem("removing", &target, e))?;
    }

    {
        let mut file = File::create(&target).map_err(|e| Error::filesystem("creating", &target, e))?;
        loop {
            let n = reader.read_payload(buf)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .map_err(|e| Error::filesystem("writing", &target, e))?;
        }
        file.flush()
            .map_err(|e| Error::filesystem("writing", &target, e))?;
    }

    // Metadata goes on after the handle is closed so the mtime sticks
    if options.preserve_permissions {
        apply_permissions(&target, header.mode)?;
    }
    if options.preserve_timestamps {
        match i64::try_from(header.mtime) {
            Ok(secs) if secs > 0 => {
                let mtime = filetime::FileTime::from_unix_time(secs, 0);
                filetime::set_file_mtime(&target, mtime)
                    .map_err(|e| Error::filesystem("setting mtime of", &target, e))?;
            }
            Ok(_) => {}
            Err(_) => {
                warn!(entry = %header.name, mtime = header.mtime, "mtime out of range, not applied")
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn apply_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    // setuid, setgid and sticky bits are not restored
    let mode = mode & 0o777;
    if mode == 0 {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::filesystem("setting permissions of", path, e))
}

#[cfg(not(unix))]
fn apply_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
