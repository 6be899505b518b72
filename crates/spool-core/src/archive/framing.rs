//! Record framing stage: entry headers and payloads over a plain byte stream
//!
//! This layer knows nothing about compression. [`RecordWriter`] drives a
//! [`tar::Builder`], which lays out header blocks, GNU long-name records,
//! padding and the end-of-archive marker. [`RecordReader`] pulls records one
//! block at a time so the caller streams each payload itself, and a stream
//! that stops inside a record is reported instead of read as a short entry.

use super::format::{
    decode_header, encode_header, long_name_from_payload, validate_link_name, validate_name,
    EntryHeader, Extensions, BLOCK_SIZE, MAX_EXTENSION_SIZE,
};
use crate::{Error, Result};
use std::fmt;
use std::io::{self, Read, Write};
use tar::{Builder, EntryType, Header};
use tracing::{debug, trace};

const ZERO_BLOCK: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// Writes entry records to an underlying stream.
///
/// After an error the stream holds a partial record and should be discarded.
pub struct RecordWriter<W: Write> {
    builder: Builder<W>,
    entries: u64,
}

impl<W: Write> RecordWriter<W> {
    /// Create a record writer over `inner`
    pub fn new(inner: W) -> Self {
        Self {
            builder: Builder::new(inner),
            entries: 0,
        }
    }

    /// Write one entry: its metadata record followed by exactly
    /// `entry.size` bytes read from `data`.
    ///
    /// Link entries carry no payload and `data` is not read.
    pub fn append<R: Read>(&mut self, entry: &EntryHeader, data: R) -> Result<()> {
        self.append_with(entry, data, Error::Io)
    }

    /// Like [`RecordWriter::append`], with read failures of `data` mapped by
    /// `read_error` so they stay apart from output failures.
    pub(crate) fn append_with<R, F>(&mut self, entry: &EntryHeader, data: R, read_error: F) -> Result<()>
    where
        R: Read,
        F: Fn(io::Error) -> Error,
    {
        validate_name(&entry.name)?;
        let mut header = encode_header(entry);

        match &entry.link_name {
            Some(target) => {
                validate_link_name(target)?;
                if entry.size != 0 {
                    return Err(Error::SizeMismatch {
                        name: entry.name.clone(),
                        declared: entry.size,
                        actual: 0,
                    });
                }
                self.builder.append_link(&mut header, &entry.name, target)?;
            }
            None => {
                let mut payload = SizedPayload::new(entry, data, read_error);
                if let Err(e) = self.builder.append_data(&mut header, &entry.name, &mut payload) {
                    return Err(payload.failure.take().unwrap_or(Error::Io(e)));
                }
            }
        }

        self.entries += 1;
        trace!(entry = %entry.name, size = entry.size, "wrote entry record");
        Ok(())
    }

    /// Number of entries written so far
    pub fn entry_count(&self) -> u64 {
        self.entries
    }

    /// Write the end-of-archive marker.
    ///
    /// Calling this more than once is a no-op.
    pub fn finish(&mut self) -> Result<()> {
        self.builder.finish()?;
        Ok(())
    }

    /// Get a reference to the underlying stream
    pub fn get_ref(&self) -> &W {
        self.builder.get_ref()
    }

    /// Get a mutable reference to the underlying stream
    pub fn get_mut(&mut self) -> &mut W {
        self.builder.get_mut()
    }

    /// Write the end-of-archive marker if still missing and unwrap the
    /// underlying stream
    pub fn into_inner(self) -> Result<W> {
        Ok(self.builder.into_inner()?)
    }
}

impl<W: Write> fmt::Debug for RecordWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordWriter")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

/// Payload source held to the size its header declares.
///
/// The builder copies until end of stream, so a source that ends early or
/// still has bytes once the declared size is reached fails the copy. The
/// typed error is kept for the caller.
struct SizedPayload<'a, R, F> {
    name: &'a str,
    declared: u64,
    read: u64,
    inner: R,
    read_error: F,
    failure: Option<Error>,
}

impl<'a, R, F> SizedPayload<'a, R, F> {
    fn new(entry: &'a EntryHeader, inner: R, read_error: F) -> Self {
        Self {
            name: &entry.name,
            declared: entry.size,
            read: 0,
            inner,
            read_error,
            failure: None,
        }
    }

    fn fail(&mut self, err: Error) -> io::Error {
        let io_err = io::Error::new(io::ErrorKind::Other, err.to_string());
        self.failure = Some(err);
        io_err
    }

    fn mismatch(&mut self, actual: u64) -> io::Error {
        let err = Error::SizeMismatch {
            name: self.name.to_string(),
            declared: self.declared,
            actual,
        };
        self.fail(err)
    }
}

impl<R: Read, F: Fn(io::Error) -> Error> Read for SizedPayload<'_, R, F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let remaining = self.declared - self.read;
        // Once the declared size is reached, ask for one more byte to
        // catch sources that run long
        let want = if remaining == 0 {
            1
        } else {
            buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX))
        };
        let n = loop {
            match self.inner.read(&mut buf[..want]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let err = (self.read_error)(e);
                    return Err(self.fail(err));
                }
            }
        };
        match (n, remaining) {
            (0, 0) => Ok(0),
            (0, _) => Err(self.mismatch(self.read)),
            (_, 0) => Err(self.mismatch(self.read + n as u64)),
            _ => {
                self.read += n as u64;
                Ok(n)
            }
        }
    }
}

/// Reads entry records from an underlying stream
#[derive(Debug)]
pub struct RecordReader<R: Read> {
    inner: R,
    current: Option<String>,
    remaining: u64,
    padding: usize,
    finished: bool,
}

impl<R: Read> RecordReader<R> {
    /// Create a record reader over `inner`
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            current: None,
            remaining: 0,
            padding: 0,
            finished: false,
        }
    }

    /// Advance to the next entry, skipping whatever is left of the current one.
    ///
    /// Returns `Ok(None)` once the end of the archive is reached.
    pub fn next_header(&mut self) -> Result<Option<EntryHeader>> {
        if self.finished {
            return Ok(None);
        }
        self.skip_current()?;

        let mut ext = Extensions::default();
        let mut block = [0u8; BLOCK_SIZE];
        loop {
            if !self.read_block(&mut block)? {
                if !ext.is_empty() {
                    return Err(Error::Format(
                        "archive ends after an extension record".to_string(),
                    ));
                }
                debug!("archive ended without an end-of-archive marker");
                self.finished = true;
                return Ok(None);
            }
            if block == ZERO_BLOCK {
                if !ext.is_empty() {
                    return Err(Error::Format(
                        "end-of-archive marker after an extension record".to_string(),
                    ));
                }
                self.finished = true;
                return Ok(None);
            }

            let header = Header::from_byte_slice(&block);
            check_checksum(header)?;

            match header.entry_type() {
                EntryType::GNULongName => {
                    let data = self.read_extension(header)?;
                    ext.name = Some(long_name_from_payload(&data, "long entry name")?);
                }
                EntryType::GNULongLink => {
                    let data = self.read_extension(header)?;
                    ext.link_name = Some(long_name_from_payload(&data, "long link name")?);
                }
                EntryType::XHeader => {
                    let data = self.read_extension(header)?;
                    ext.apply_pax(&data)?;
                }
                EntryType::XGlobalHeader => {
                    // Global defaults are not applied
                    let data = self.read_extension(header)?;
                    trace!(len = data.len(), "skipped PAX global header");
                }
                _ => {
                    let entry = decode_header(header, ext)?;
                    self.current = Some(entry.name.clone());
                    self.remaining = entry.size;
                    self.padding = padding_for(entry.size);
                    trace!(entry = %entry.name, size = entry.size, "read entry header");
                    return Ok(Some(entry));
                }
            }
        }
    }

    /// Read payload bytes of the current entry.
    ///
    /// Never reads past the entry's declared size; returns `Ok(0)` once the
    /// payload is exhausted.
    pub fn read_payload(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = loop {
            match self.inner.read(&mut buf[..max]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(stream_error(e)),
            }
        };
        if n == 0 {
            return Err(Error::Format(format!(
                "payload of {} truncated: {} bytes missing",
                self.current.as_deref().unwrap_or("<unknown>"),
                self.remaining
            )));
        }
        self.remaining -= n as u64;
        Ok(n)
    }

    /// Payload bytes not yet read from the current entry
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Whether the end of the archive has been reached
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Get a mutable reference to the underlying stream
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwrap the underlying stream
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn skip_current(&mut self) -> Result<()> {
        let mut scratch = [0u8; 8 * 1024];
        while self.remaining > 0 {
            self.read_payload(&mut scratch)?;
        }
        if self.padding > 0 {
            let padding = self.padding;
            self.read_exact_or_truncated(&mut scratch[..padding], "entry padding")?;
            self.padding = 0;
        }
        self.current = None;
        Ok(())
    }

    fn read_extension(&mut self, header: &Header) -> Result<Vec<u8>> {
        let size = header
            .entry_size()
            .map_err(|e| Error::Format(format!("invalid extension record size: {}", e)))?;
        if size > MAX_EXTENSION_SIZE {
            return Err(Error::Format(format!(
                "extension record of {} bytes exceeds the {} byte limit",
                size, MAX_EXTENSION_SIZE
            )));
        }
        let mut data = vec![0u8; size as usize];
        self.read_exact_or_truncated(&mut data, "extension record")?;
        let mut padding = [0u8; BLOCK_SIZE];
        self.read_exact_or_truncated(&mut padding[..padding_for(size)], "extension padding")?;
        Ok(data)
    }

    /// Read one header block. Returns `Ok(false)` on a clean end of stream
    /// before the first byte of the block.
    fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> Result<bool> {
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.inner.read(&mut block[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(Error::Format(format!(
                        "truncated header block: {} of {} bytes",
                        filled, BLOCK_SIZE
                    )))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(stream_error(e)),
            }
        }
        Ok(true)
    }

    fn read_exact_or_truncated(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::Format(format!("truncated {}", what))
            } else {
                stream_error(e)
            }
        })
    }
}

/// Compare the stored header checksum with one recomputed by `tar`
fn check_checksum(header: &Header) -> Result<()> {
    let stored = header
        .cksum()
        .map_err(|e| Error::Format(format!("unreadable header checksum: {}", e)))?;
    let mut recomputed = header.clone();
    recomputed.set_cksum();
    match recomputed.cksum() {
        Ok(expected) if expected == stored => Ok(()),
        _ => Err(Error::Format(format!(
            "header checksum mismatch for {:?}",
            String::from_utf8_lossy(&header.path_bytes())
        ))),
    }
}

/// Zero bytes that follow a payload of `size` bytes in the stream
fn padding_for(size: u64) -> usize {
    (BLOCK_SIZE - (size % BLOCK_SIZE as u64) as usize) % BLOCK_SIZE
}

/// Classify an error from the stream beneath the framing layer.
///
/// Decoders report corrupt or truncated input through these kinds; anything
/// else is a transport failure.
pub(crate) fn stream_error(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            Error::Format(err.to_string())
        }
        _ => Error::Io(err),
    }
}
