//! Archive operations module
//!
//! An archive is a gzip stream wrapping a sequence of tar records. The
//! [`framing`] stage handles records and the gzip stage compression; the
//! [`ArchiveWriter`] and [`ArchiveReader`] stack the two. [`pack_directory`]
//! and [`extract_archive`] connect them to the filesystem.

pub mod extractor;
pub mod format;
pub mod framing;
pub mod packer;
pub mod reader;
pub mod writer;

pub use extractor::{extract_archive, ExtractStats};
pub use format::{EntryHeader, EntryKind};
pub use packer::{pack_directory, PackStats};
pub use reader::ArchiveReader;
pub use writer::ArchiveWriter;

use crate::config::Config;
use crate::Result;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Pack `root` into a new archive written to `output`, returning the stream
/// once the archive is complete
pub fn pack<W: Write>(root: &Path, output: W, config: &Config) -> Result<W> {
    let mut writer = ArchiveWriter::with_config(output, &config.compression)?;
    pack_directory(&mut writer, root, &config.pack)?;
    writer.finish()
}

/// Extract the archive read from `input` into `dest`
pub fn extract<R: Read>(input: R, dest: &Path, config: &Config) -> Result<ExtractStats> {
    let mut reader = ArchiveReader::new(input)?;
    extract_archive(&mut reader, dest, &config.extract)
}

/// Inspect archive contents without extracting
pub fn list_entries<R: Read>(reader: &mut ArchiveReader<R>) -> Result<Vec<EntryHeader>> {
    let mut entries = Vec::new();
    while let Some(header) = reader.next_entry()? {
        entries.push(header);
    }
    info!("Archive holds {} entries", entries.len());
    Ok(entries)
}
