//! Directory packer: walks a tree and writes one entry per regular file

use super::format::EntryHeader;
use super::writer::ArchiveWriter;
use crate::config::PackOptions;
use crate::{Error, Result};
use std::fs::{File, Metadata};
use std::io::{BufReader, Write};
use std::path::{Component, Path};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Totals for a completed pack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackStats {
    /// Regular files written
    pub files: u64,
    /// Payload bytes written
    pub bytes: u64,
    /// Symlinks and special files left out
    pub skipped: u64,
}

/// Pack every regular file below `root` into `writer`.
///
/// Stored names are relative to `root` and use `/` separators. Directories
/// produce no entries. If `root` is itself a file it is stored under its
/// file name.
pub fn pack_directory<W: Write>(
    writer: &mut ArchiveWriter<W>,
    root: &Path,
    options: &PackOptions,
) -> Result<PackStats> {
    info!(
        "Packing {:?} (follow_symlinks: {})",
        root, options.follow_symlinks
    );

    let walker = WalkDir::new(root)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name();

    let mut stats = PackStats::default();
    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            // With follow_links set, walkdir already resolved links to their targets
            warn!("Skipping non-regular file: {:?}", path);
            stats.skipped += 1;
            continue;
        }

        let name = if entry.depth() == 0 {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| Error::InvalidPath(format!("{:?} has no UTF-8 file name", path)))?
        } else {
            archive_name(root, path)?
        };

        let size = pack_file(writer, path, &name, options.buffer_size)?;
        stats.files += 1;
        stats.bytes += size;
    }

    info!(
        files = stats.files,
        bytes = stats.bytes,
        skipped = stats.skipped,
        "Packed {:?}",
        root
    );
    Ok(stats)
}

/// Open one file and append it; the handle is closed when this returns
fn pack_file<W: Write>(
    writer: &mut ArchiveWriter<W>,
    path: &Path,
    name: &str,
    buffer_size: usize,
) -> Result<u64> {
    let file = File::open(path).map_err(|e| Error::filesystem("opening", path, e))?;
    let metadata = file
        .metadata()
        .map_err(|e| Error::filesystem("reading metadata of", path, e))?;

    let header = header_for(name, &metadata);
    debug!("Adding file: {:?} as {}", path, name);
    let source = BufReader::with_capacity(buffer_size.max(1), file);
    writer.append_with(&header, source, |e| Error::filesystem("reading", path, e))?;
    Ok(header.size)
}

fn header_for(name: &str, metadata: &Metadata) -> EntryHeader {
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let (uid, gid) = owner_of(metadata);
    EntryHeader::regular(name, mode_of(metadata), metadata.len())
        .with_mtime(mtime)
        .with_owner(uid, gid)
}

#[cfg(unix)]
fn mode_of(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(unix)]
fn owner_of(metadata: &Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (u64::from(metadata.uid()), u64::from(metadata.gid()))
}

#[cfg(not(unix))]
fn owner_of(_metadata: &Metadata) -> (u64, u64) {
    (0, 0)
}

/// Compute the stored name of `path`: relative to `root`, `/`-separated
fn archive_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| Error::InvalidPath(format!("Failed to strip prefix from {:?}", path)))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                Error::InvalidPath(format!("{:?} is not valid UTF-8", path))
            })?),
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidPath(format!(
                    "Unexpected component in {:?}",
                    relative
                )))
            }
        }
    }
    Ok(parts.join("/"))
}
