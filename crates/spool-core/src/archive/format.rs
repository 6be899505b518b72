//! Entry metadata and its mapping onto tar header blocks
//!
//! Every record on the wire is a 512-byte header block followed by the
//! payload, zero-padded to the next block boundary. Headers are written in
//! GNU layout by [`tar::Builder`]. On the read side GNU long-name/long-link
//! records and PAX extended headers are understood so archives produced by
//! other tar implementations decode correctly.

use crate::{Error, Result};
use std::borrow::Cow;
use std::path::{Component, Path};
use tar::{EntryType, Header, PaxExtension, PaxExtensions};

/// Size of a tar block in bytes
pub const BLOCK_SIZE: usize = 512;

/// Upper bound for extension record payloads held in memory
pub(crate) const MAX_EXTENSION_SIZE: u64 = 1024 * 1024;

/// Kind of an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file with a payload
    Regular,
    /// Directory marker
    Directory,
    /// Symbolic link; the target is in `link_name`
    Symlink,
    /// Hard link; the target is in `link_name`
    HardLink,
    /// Any other type flag, carried through untouched
    Other(u8),
}

impl EntryKind {
    /// Whether entries of this kind are materialized as files on extraction
    pub fn is_regular(self) -> bool {
        self == EntryKind::Regular
    }

    pub(crate) fn to_entry_type(self) -> EntryType {
        match self {
            EntryKind::Regular => EntryType::Regular,
            EntryKind::Directory => EntryType::Directory,
            EntryKind::Symlink => EntryType::Symlink,
            EntryKind::HardLink => EntryType::Link,
            EntryKind::Other(byte) => EntryType::new(byte),
        }
    }

    pub(crate) fn from_entry_type(entry_type: EntryType) -> Self {
        match entry_type {
            EntryType::Regular | EntryType::Continuous => EntryKind::Regular,
            EntryType::Directory => EntryKind::Directory,
            EntryType::Symlink => EntryKind::Symlink,
            EntryType::Link => EntryKind::HardLink,
            other => EntryKind::Other(other.as_byte()),
        }
    }
}

/// Metadata record describing one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Forward-slash separated path relative to the packed root
    pub name: String,
    /// Entry type
    pub kind: EntryKind,
    /// Permission bits
    pub mode: u32,
    /// Exact payload length in bytes
    pub size: u64,
    /// Modification time in seconds since the Unix epoch
    pub mtime: u64,
    /// Owner user id
    pub uid: u64,
    /// Owner group id
    pub gid: u64,
    /// Link target for symlinks and hard links
    pub link_name: Option<String>,
}

impl EntryHeader {
    /// Create a header of the given kind with zeroed auxiliary fields
    pub fn new(name: impl Into<String>, kind: EntryKind, mode: u32, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            mode,
            size,
            mtime: 0,
            uid: 0,
            gid: 0,
            link_name: None,
        }
    }

    /// Create a header for a regular file
    pub fn regular(name: impl Into<String>, mode: u32, size: u64) -> Self {
        Self::new(name, EntryKind::Regular, mode, size)
    }

    /// Create a header for a symbolic link, which carries no payload
    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut header = Self::new(name, EntryKind::Symlink, 0o777, 0);
        header.link_name = Some(target.into());
        header
    }

    /// Set the modification time
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Set the owner ids
    pub fn with_owner(mut self, uid: u64, gid: u64) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }
}

/// Check an entry name before it is written.
///
/// Names must be relative, free of `..` components and NUL bytes, and name
/// at least one path component.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    check_bytes(name, "entry name")?;
    let mut normal = false;
    for component in Path::new(name).components() {
        match component {
            Component::Normal(_) => normal = true,
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidPath(format!(
                    "entry name must be relative without '..': {:?}",
                    name
                )))
            }
        }
    }
    if !normal {
        return Err(Error::InvalidPath(format!(
            "entry name does not name a file: {:?}",
            name
        )));
    }
    Ok(())
}

/// Link targets are stored as given; they only need to be encodable
pub(crate) fn validate_link_name(target: &str) -> Result<()> {
    check_bytes(target, "link name")
}

fn check_bytes(name: &str, what: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidPath(format!("empty {}", what)));
    }
    if name.as_bytes().contains(&0) {
        return Err(Error::InvalidPath(format!(
            "{} contains a NUL byte: {:?}",
            what, name
        )));
    }
    Ok(())
}

/// Build the header block for an entry.
///
/// Name and link name are left to the builder, which also emits GNU
/// long-name records and the checksum.
pub(crate) fn encode_header(entry: &EntryHeader) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry.kind.to_entry_type());
    header.set_mode(entry.mode);
    header.set_size(entry.size);
    header.set_mtime(entry.mtime);
    header.set_uid(entry.uid);
    header.set_gid(entry.gid);
    header
}

/// Overrides collected from extension records preceding an entry
#[derive(Debug, Default)]
pub(crate) struct Extensions {
    pub name: Option<String>,
    pub link_name: Option<String>,
    pub size: Option<u64>,
    pub mtime: Option<u64>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
}

impl Extensions {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.link_name.is_none()
            && self.size.is_none()
            && self.mtime.is_none()
            && self.uid.is_none()
            && self.gid.is_none()
    }

    /// Apply the records of a PAX extended header
    pub fn apply_pax(&mut self, data: &[u8]) -> Result<()> {
        for extension in PaxExtensions::new(data) {
            let extension = extension
                .map_err(|e| Error::Format(format!("malformed PAX header: {}", e)))?;
            let Ok(key) = extension.key() else {
                continue;
            };
            match key {
                "path" => self.name = Some(pax_value(&extension, key)?.to_string()),
                "linkpath" => self.link_name = Some(pax_value(&extension, key)?.to_string()),
                "size" => self.size = Some(pax_number(&extension, key)?),
                "uid" => self.uid = Some(pax_number(&extension, key)?),
                "gid" => self.gid = Some(pax_number(&extension, key)?),
                "mtime" => self.mtime = Some(pax_number(&extension, key)?),
                _ => {}
            }
        }
        Ok(())
    }
}

fn pax_value<'a>(extension: &PaxExtension<'a>, key: &str) -> Result<&'a str> {
    extension
        .value()
        .map_err(|_| Error::Format(format!("PAX {} value is not UTF-8", key)))
}

/// Numeric PAX value; sub-second precision is dropped
fn pax_number(extension: &PaxExtension<'_>, key: &str) -> Result<u64> {
    let value = pax_value(extension, key)?;
    let whole = value.split('.').next().unwrap_or(value);
    whole
        .parse()
        .map_err(|_| Error::Format(format!("invalid PAX {} value: {:?}", key, value)))
}

/// Decode a header block into entry metadata, applying pending extensions
pub(crate) fn decode_header(header: &Header, ext: Extensions) -> Result<EntryHeader> {
    let name = match ext.name {
        Some(name) => name,
        None => bytes_to_string(header.path_bytes(), "entry name")?,
    };
    let link_name = match ext.link_name {
        Some(link) => Some(link),
        None => header
            .link_name_bytes()
            .map(|bytes| bytes_to_string(bytes, "link name"))
            .transpose()?,
    };
    let size = match ext.size {
        Some(size) => size,
        None => header
            .entry_size()
            .map_err(|e| Error::Format(format!("invalid size field for {}: {}", name, e)))?,
    };
    let mode = header
        .mode()
        .map_err(|e| Error::Format(format!("invalid mode field for {}: {}", name, e)))?;
    let mtime = match ext.mtime {
        Some(mtime) => mtime,
        None => header.mtime().unwrap_or(0),
    };
    let uid = ext.uid.unwrap_or_else(|| header.uid().unwrap_or(0));
    let gid = ext.gid.unwrap_or_else(|| header.gid().unwrap_or(0));

    Ok(EntryHeader {
        name,
        kind: EntryKind::from_entry_type(header.entry_type()),
        mode,
        size,
        mtime,
        uid,
        gid,
        link_name,
    })
}

/// Strip the NUL terminator of a long-name payload and decode it
pub(crate) fn long_name_from_payload(data: &[u8], what: &str) -> Result<String> {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    bytes_to_string(Cow::Borrowed(&data[..end]), what)
}

fn bytes_to_string(bytes: Cow<'_, [u8]>, what: &str) -> Result<String> {
    String::from_utf8(bytes.into_owned())
        .map_err(|e| Error::Format(format!("{} is not valid UTF-8: {:?}", what, e.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(entry: &EntryHeader) -> Header {
        let mut header = encode_header(entry);
        header.set_path(&entry.name).unwrap();
        header.set_cksum();
        header
    }

    #[test]
    fn test_encode_decode_header() {
        let entry = EntryHeader::regular("dir/file.txt", 0o640, 1234)
            .with_mtime(1_700_000_000)
            .with_owner(1000, 100);
        let decoded = decode_header(&encoded(&entry), Extensions::default()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_unknown_type_flag_is_preserved() {
        let entry = EntryHeader::new("fifo", EntryKind::Other(b'6'), 0o600, 0);
        let decoded = decode_header(&encoded(&entry), Extensions::default()).unwrap();
        assert_eq!(decoded.kind, EntryKind::Other(b'6'));
    }

    #[test]
    fn test_pax_records_override_header() {
        let mut ext = Extensions::default();
        ext.apply_pax(b"30 path=some/much/longer/name\n22 mtime=1700000000.5\n")
            .unwrap();
        assert_eq!(ext.name.as_deref(), Some("some/much/longer/name"));
        assert_eq!(ext.mtime, Some(1_700_000_000));

        let header = encoded(&EntryHeader::regular("short", 0o644, 0));
        let decoded = decode_header(&header, ext).unwrap();
        assert_eq!(decoded.name, "some/much/longer/name");
    }

    #[test]
    fn test_unknown_pax_keys_ignored() {
        let mut ext = Extensions::default();
        ext.apply_pax(b"20 comment=whatever\n").unwrap();
        assert!(ext.is_empty());
    }

    #[test]
    fn test_malformed_pax_record() {
        let mut ext = Extensions::default();
        assert!(ext.apply_pax(b"99 path=x\n").unwrap_err().is_format());
        assert!(ext.apply_pax(b"nonsense").unwrap_err().is_format());
        assert!(ext.apply_pax(b"12 size=abc\n").unwrap_err().is_format());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("a/b.txt").is_ok());
        assert!(validate_name("./a.txt").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a\0b").is_err());
        assert!(validate_name("../a.txt").is_err());
        assert!(validate_name("a/../../b").is_err());
        assert!(validate_name("/etc/passwd").is_err());
        assert!(validate_name(".").is_err());
    }

    #[test]
    fn test_link_names_may_point_upwards() {
        assert!(validate_link_name("../shared/lib.so").is_ok());
        assert!(validate_link_name("").is_err());
    }
}
