//! Spool - streaming gzip-compressed tar archives
//!
//! This library packs a directory tree (or any sequence of byte streams) into
//! one compressed archive stream and unpacks such a stream onto a filesystem,
//! without holding whole payloads in memory.

pub mod archive;
pub mod config;
pub mod error;
pub mod security;

pub use error::{Error, Result};

// Re-export commonly used types
pub use archive::{
    extract, extract_archive, list_entries, pack, pack_directory, ArchiveReader, ArchiveWriter,
    EntryHeader, EntryKind, ExtractStats, PackStats,
};
pub use config::{Config, ExtractOptions, PackOptions};
