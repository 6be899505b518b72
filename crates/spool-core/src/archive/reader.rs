//! Archive reader: gzip decoder beneath the record framing

use super::format::EntryHeader;
use super::framing::{stream_error, RecordReader};
use crate::{Error, Result};
use flate2::read::GzDecoder;
use std::io::{self, Read};
use tracing::{debug, trace};

/// Deserializes entries from a gzip-compressed stream
#[derive(Debug)]
pub struct ArchiveReader<R: Read> {
    records: RecordReader<GzDecoder<R>>,
    current: Option<EntryHeader>,
    trailer_checked: bool,
}

impl<R: Read> ArchiveReader<R> {
    /// Wrap `input` with a gzip decoder.
    ///
    /// The gzip header is parsed immediately. Input that does not start with
    /// a valid header is a format error; a failing `input` is reported as
    /// [`Error::Io`].
    pub fn new(input: R) -> Result<Self> {
        let mut decoder = GzDecoder::new(input);
        if decoder.header().is_none() {
            // The decoder keeps the header failure until the first read
            decoder.read(&mut []).map_err(stream_error)?;
            if decoder.header().is_none() {
                return Err(Error::Format(
                    "input is not a gzip stream or its header is corrupt".to_string(),
                ));
            }
        }
        Ok(Self {
            records: RecordReader::new(decoder),
            current: None,
            trailer_checked: false,
        })
    }

    /// Advance to the next entry.
    ///
    /// Unread payload of the current entry is skipped. Returns `Ok(None)` at
    /// the end of the archive, and keeps doing so on later calls.
    pub fn next_entry(&mut self) -> Result<Option<EntryHeader>> {
        self.current = None;
        match self.records.next_header()? {
            Some(header) => {
                trace!(name = %header.name, "next entry");
                self.current = Some(header.clone());
                Ok(Some(header))
            }
            None => {
                self.check_trailer()?;
                Ok(None)
            }
        }
    }

    /// Read payload bytes of the current entry into `buf`.
    ///
    /// Returns `Ok(0)` once the payload is exhausted; call
    /// [`ArchiveReader::next_entry`] to move on.
    pub fn read_payload(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.records.read_payload(buf)
    }

    /// Metadata of the entry being read, if any
    pub fn current(&self) -> Option<&EntryHeader> {
        self.current.as_ref()
    }

    /// Payload bytes not yet read from the current entry
    pub fn remaining(&self) -> u64 {
        self.records.remaining()
    }

    /// Consume whatever follows the end marker so the gzip trailer and its
    /// CRC are verified.
    fn check_trailer(&mut self) -> Result<()> {
        if self.trailer_checked {
            return Ok(());
        }
        self.trailer_checked = true;
        let drained = io::copy(self.records.get_mut(), &mut io::sink()).map_err(stream_error)?;
        debug!(trailing_bytes = drained, "reached end of archive");
        Ok(())
    }
}

impl<R: Read> Read for ArchiveReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_payload(buf).map_err(io::Error::from)
    }
}
