use std::io::Cursor;

use zipdelta_zip::{data::CompressionMethod, parse_entries, CancelToken, ZipBuilder};

fn init() {
    let _ = env_logger::try_init();
}

#[test]
fn parses_stored_and_deflated_entries() {
    init();
    let mut builder = ZipBuilder::new();
    builder
        .add_entry("a.txt", b"hello world", CompressionMethod::Stored)
        .unwrap();
    builder
        .add_entry(
            "b.txt",
            b"some deflate-compressible content, repeated repeated repeated",
            CompressionMethod::Deflate,
        )
        .unwrap();
    let archive_bytes = builder.finish().unwrap();

    let mut cursor = Cursor::new(archive_bytes);
    let entries = parse_entries(&mut cursor, &CancelToken::new()).unwrap();

    assert_eq!(entries.len(), 2);
    let a = entries.iter().find(|e| e.path == b"a.txt").unwrap();
    assert!(a.is_stored());
    assert_eq!(a.uncompressed_len, 11);

    let b = entries.iter().find(|e| e.path == b"b.txt").unwrap();
    assert!(b.is_deflated());
}

#[test]
fn rejects_truncated_file() {
    init();
    let mut cursor = Cursor::new(vec![0u8; 4]);
    let result = parse_entries(&mut cursor, &CancelToken::new());
    assert!(result.is_err());
}

#[test]
fn empty_archive_round_trips_structure() {
    init();
    let archive_bytes = ZipBuilder::new().finish().unwrap();
    let mut cursor = Cursor::new(archive_bytes);
    let entries = parse_entries(&mut cursor, &CancelToken::new()).unwrap();
    assert!(entries.is_empty());
}

#[test]
fn cancellation_token_stops_parsing() {
    init();
    let mut builder = ZipBuilder::new();
    builder
        .add_entry("a.txt", b"hello", CompressionMethod::Stored)
        .unwrap();
    let archive_bytes = builder.finish().unwrap();

    let mut cursor = Cursor::new(archive_bytes);
    let token = CancelToken::new();
    token.cancel();
    let result = parse_entries(&mut cursor, &token);
    assert!(matches!(result, Err(zipdelta_zip::Error::Cancelled)));
}
