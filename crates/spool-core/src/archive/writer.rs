//! Archive writer: record framing stacked on a gzip encoder

use super::format::EntryHeader;
use super::framing::RecordWriter;
use crate::config::CompressionConfig;
use crate::{Error, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};
use tracing::debug;

/// Serializes entries into a single gzip-compressed stream.
///
/// Call [`ArchiveWriter::finish`] when done. Dropping the writer still closes
/// both layers but discards any error.
#[derive(Debug)]
pub struct ArchiveWriter<W: Write> {
    records: RecordWriter<GzEncoder<W>>,
}

impl<W: Write> ArchiveWriter<W> {
    /// Create a writer with the default compression level
    pub fn new(output: W) -> Self {
        Self::with_compression(output, Compression::default())
    }

    /// Create a writer using the given compression settings
    pub fn with_config(output: W, config: &CompressionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_compression(output, Compression::new(config.level)))
    }

    fn with_compression(output: W, level: Compression) -> Self {
        Self {
            records: RecordWriter::new(GzEncoder::new(output, level)),
        }
    }

    /// Write an entry whose payload is read from `data`.
    ///
    /// `data` must yield exactly `header.size` bytes; a shorter or longer
    /// source fails with [`Error::SizeMismatch`] and leaves the archive
    /// unusable.
    pub fn append<R: Read>(&mut self, header: &EntryHeader, data: R) -> Result<()> {
        self.append_with(header, data, Error::Io)
    }

    /// Like [`ArchiveWriter::append`], with read failures of `data` mapped by
    /// `read_error` so callers can tell them apart from output failures.
    pub(crate) fn append_with<R, F>(&mut self, header: &EntryHeader, data: R, read_error: F) -> Result<()>
    where
        R: Read,
        F: Fn(io::Error) -> Error,
    {
        debug!(entry = %header.name, kind = ?header.kind, size = header.size, "adding entry");
        self.records.append_with(header, data, read_error)
    }

    /// Write an entry whose payload is already in memory
    pub fn append_data(&mut self, header: &EntryHeader, data: &[u8]) -> Result<()> {
        if data.len() as u64 != header.size {
            return Err(Error::SizeMismatch {
                name: header.name.clone(),
                declared: header.size,
                actual: data.len() as u64,
            });
        }
        self.append(header, data)
    }

    /// Number of entries written so far
    pub fn entry_count(&self) -> u64 {
        self.records.entry_count()
    }

    /// Get a reference to the output stream
    pub fn get_ref(&self) -> &W {
        self.records.get_ref().get_ref()
    }

    /// Close the framing layer, then the compression layer, and return the
    /// output stream.
    ///
    /// The compression layer is closed even when closing the framing layer
    /// fails; the first error is returned.
    pub fn finish(mut self) -> Result<W> {
        let framed = self.records.finish();
        let compressed = self.records.get_mut().try_finish();
        let entries = self.records.entry_count();
        let encoder = self.records.into_inner()?;

        framed?;
        compressed?;
        let output = encoder.finish()?;
        debug!(entries, "archive finished");
        Ok(output)
    }
}
