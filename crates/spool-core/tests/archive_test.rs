use rand::{Rng, SeedableRng};
use spool_core::archive::framing::RecordWriter;
use spool_core::{list_entries, ArchiveReader, ArchiveWriter, EntryHeader, EntryKind, Error};
use std::io::{Cursor, Read, Write};

fn build_archive(entries: &[(&str, u32, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ArchiveWriter::new(Vec::new());
    for (name, mode, content) in entries {
        writer
            .append(
                &EntryHeader::regular(*name, *mode, content.len() as u64),
                content.as_slice(),
            )
            .unwrap();
    }
    writer.finish().unwrap()
}

fn read_all(bytes: Vec<u8>) -> Vec<(String, u32, Vec<u8>)> {
    let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
    let mut out = Vec::new();
    while let Some(header) = reader.next_entry().unwrap() {
        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        out.push((header.name, header.mode, content));
    }
    out
}

#[test]
fn test_round_trip_preserves_order_and_content() {
    spool_testing::init_logging();
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut random = vec![0u8; 70_000];
    rng.fill(random.as_mut_slice());

    let entries = vec![
        ("zeta.txt", 0o644, b"last letter first".to_vec()),
        ("alpha/beta.bin", 0o600, random),
        ("empty", 0o444, Vec::new()),
        ("exact-block", 0o755, vec![b'x'; 512]),
        ("alpha/gamma.txt", 0o640, b"gamma".to_vec()),
    ];
    let decoded = read_all(build_archive(&entries));

    let expected: Vec<_> = entries
        .into_iter()
        .map(|(name, mode, content)| (name.to_string(), mode, content))
        .collect();
    assert_eq!(decoded, expected);
}

#[test]
fn test_empty_archive_yields_end_immediately() {
    let bytes = ArchiveWriter::new(Vec::new()).finish().unwrap();
    let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
    assert!(reader.next_entry().unwrap().is_none());
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_read_payload_never_exceeds_size() {
    let bytes = build_archive(&[
        ("first", 0o644, b"12345".to_vec()),
        ("second", 0o644, b"67890".to_vec()),
    ]);
    let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
    reader.next_entry().unwrap().unwrap();

    let mut buf = [0u8; 4096];
    let mut total = 0;
    loop {
        let n = reader.read_payload(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        total += n;
    }
    assert_eq!(total, 5);
    assert_eq!(reader.read_payload(&mut buf).unwrap(), 0);

    let second = reader.next_entry().unwrap().unwrap();
    assert_eq!(second.name, "second");
    let n = reader.read_payload(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"67890");
}

/// Gzip already-framed tar bytes
fn gzip(framed: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(framed).unwrap();
    encoder.finish().unwrap()
}

fn framed(entries: &[(EntryHeader, &[u8])]) -> Vec<u8> {
    let mut records = RecordWriter::new(Vec::new());
    for (header, payload) in entries {
        records.append(header, *payload).unwrap();
    }
    records.into_inner().unwrap()
}

#[test]
fn test_truncated_payload_is_format_error() {
    // Compress the framed bytes ourselves so the cut lands mid-payload
    // with a well-formed gzip stream around it.
    let payload = vec![b'p'; 4000];
    let mut bytes = framed(&[(EntryHeader::regular("big.bin", 0o644, 4000), &payload)]);
    bytes.truncate(512 + 1000);

    let mut reader = ArchiveReader::new(Cursor::new(gzip(&bytes))).unwrap();
    let header = reader.next_entry().unwrap().unwrap();
    assert_eq!(header.size, 4000);

    let mut buf = [0u8; 1024];
    let mut read = 0;
    let err = loop {
        match reader.read_payload(&mut buf) {
            Ok(0) => panic!("short payload reported as complete after {} bytes", read),
            Ok(n) => read += n,
            Err(e) => break e,
        }
    };
    assert_eq!(read, 1000);
    assert!(matches!(err, Error::Format(_)), "unexpected error: {:?}", err);
}

#[test]
fn test_corrupted_header_checksum_is_format_error() {
    let mut bytes = framed(&[
        (EntryHeader::regular("first.txt", 0o644, 5), b"first"),
        (EntryHeader::regular("second.txt", 0o644, 6), b"second"),
    ]);
    // Flip a name byte of the second header, leaving its checksum stale
    bytes[2 * 512 + 3] ^= 0x20;

    let mut reader = ArchiveReader::new(Cursor::new(gzip(&bytes))).unwrap();
    assert_eq!(reader.next_entry().unwrap().unwrap().name, "first.txt");
    let err = reader.next_entry().unwrap_err();
    assert!(matches!(err, Error::Format(_)), "unexpected error: {:?}", err);
}

#[test]
fn test_failing_transport_is_io_error() {
    // Serves a valid archive prefix, then the connection drops
    struct Dropped {
        data: Cursor<Vec<u8>>,
    }
    impl Read for Dropped {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                )),
                n => Ok(n),
            }
        }
    }

    let bytes = build_archive(&[("data.bin", 0o644, vec![3u8; 50_000])]);
    let cut = bytes[..bytes.len() / 2].to_vec();
    let mut reader = ArchiveReader::new(Dropped {
        data: Cursor::new(cut),
    })
    .unwrap();
    let result = (|| -> spool_core::Result<()> {
        while reader.next_entry()?.is_some() {
            let mut buf = [0u8; 8192];
            while reader.read_payload(&mut buf)? > 0 {}
        }
        Ok(())
    })();
    match result {
        Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
        other => panic!("expected io error, got {:?}", other),
    }
}

#[test]
fn test_truncated_compressed_stream_is_format_error() {
    let bytes = build_archive(&[("data.bin", 0o644, vec![7u8; 100_000])]);
    let cut = bytes[..bytes.len() / 2].to_vec();

    let mut reader = ArchiveReader::new(Cursor::new(cut)).unwrap();
    let result = (|| -> spool_core::Result<()> {
        while reader.next_entry()?.is_some() {
            let mut buf = [0u8; 8192];
            while reader.read_payload(&mut buf)? > 0 {}
        }
        Ok(())
    })();
    assert!(result.unwrap_err().is_format());
}

#[test]
fn test_skipping_payload_advances_to_next_entry() {
    let bytes = build_archive(&[
        ("skip-me", 0o644, vec![1u8; 10_000]),
        ("read-me", 0o644, b"hello".to_vec()),
    ]);
    let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.next_entry().unwrap().unwrap().name, "skip-me");
    let mut partial = [0u8; 10];
    reader.read_payload(&mut partial).unwrap();

    let next = reader.next_entry().unwrap().unwrap();
    assert_eq!(next.name, "read-me");
    let mut content = String::new();
    reader.read_to_string(&mut content).unwrap();
    assert_eq!(content, "hello");
}

#[test]
fn test_chained_sources_match_declared_size() {
    let mut writer = ArchiveWriter::new(Vec::new());
    writer
        .append(
            &EntryHeader::regular("streamed.txt", 0o644, 11),
            (&b"hello "[..]).chain(&b"world"[..]),
        )
        .unwrap();
    let bytes = writer.finish().unwrap();

    assert_eq!(
        read_all(bytes),
        vec![("streamed.txt".to_string(), 0o644, b"hello world".to_vec())]
    );
}

#[test]
fn test_long_names_round_trip() {
    let name = format!("{}/{}", "directory".repeat(12), "file-with-a-long-name.txt");
    assert!(name.len() > 100);
    let decoded = read_all(build_archive(&[(name.as_str(), 0o644, b"long".to_vec())]));
    assert_eq!(decoded[0].0, name);
}

#[test]
fn test_metadata_fields_round_trip() {
    let header = EntryHeader::regular("meta.txt", 0o640, 4)
        .with_mtime(1_650_000_000)
        .with_owner(1234, 5678);
    let mut writer = ArchiveWriter::new(Vec::new());
    writer.append_data(&header, b"meta").unwrap();
    writer
        .append_data(&EntryHeader::symlink("link", "meta.txt"), b"")
        .unwrap();
    let bytes = writer.finish().unwrap();

    let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
    let entries = list_entries(&mut reader).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0], header);
    assert_eq!(entries[1].kind, EntryKind::Symlink);
    assert_eq!(entries[1].link_name.as_deref(), Some("meta.txt"));
}

#[test]
fn test_invalid_names_rejected_by_writer() {
    let mut writer = ArchiveWriter::new(Vec::new());
    assert!(matches!(
        writer.append_data(&EntryHeader::regular("", 0o644, 0), b""),
        Err(Error::InvalidPath(_))
    ));
    assert!(matches!(
        writer.append_data(&EntryHeader::regular("a\0b", 0o644, 0), b""),
        Err(Error::InvalidPath(_))
    ));
    assert!(matches!(
        writer.append_data(&EntryHeader::regular("../up.txt", 0o644, 0), b""),
        Err(Error::InvalidPath(_))
    ));
    assert!(matches!(
        writer.append_data(&EntryHeader::regular("/abs.txt", 0o644, 0), b""),
        Err(Error::InvalidPath(_))
    ));
    assert_eq!(writer.entry_count(), 0);
}

#[test]
fn test_reads_archive_from_tar_crate() {
    // Archives written by the tar crate's Builder decode as well
    let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
        Vec::new(),
        flate2::Compression::fast(),
    ));
    let mut header = tar::Header::new_gnu();
    header.set_size(6);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "from/tar.txt", &b"tar ok"[..])
        .unwrap();
    let bytes = builder.into_inner().unwrap().finish().unwrap();

    assert_eq!(
        read_all(bytes),
        vec![("from/tar.txt".to_string(), 0o644, b"tar ok".to_vec())]
    );
}

#[test]
fn test_pax_path_from_tar_crate_overrides_header() {
    let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
        Vec::new(),
        flate2::Compression::fast(),
    ));
    builder
        .append_pax_extensions([
            ("path", &b"pax/chosen/name.txt"[..]),
            ("mtime", &b"1600000000.25"[..]),
        ])
        .unwrap();
    let mut header = tar::Header::new_ustar();
    header.set_size(3);
    header.set_mode(0o600);
    header.set_mtime(1);
    builder
        .append_data(&mut header, "short.txt", &b"pax"[..])
        .unwrap();
    let bytes = builder.into_inner().unwrap().finish().unwrap();

    let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.name, "pax/chosen/name.txt");
    assert_eq!(entry.mtime, 1_600_000_000);
    assert_eq!(entry.mode, 0o600);
    let mut content = String::new();
    reader.read_to_string(&mut content).unwrap();
    assert_eq!(content, "pax");
    assert!(reader.next_entry().unwrap().is_none());
}
