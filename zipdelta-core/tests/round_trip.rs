//! End-to-end scenarios from spec.md §8, exercising the full
//! `generate_delta` / `apply_delta` pipeline against synthetic archives
//! built with `zipdelta_zip::ZipBuilder`.

use std::fs;

use tempfile::TempDir;
use zipdelta_core::{apply_delta, generate_delta, ApplyOptions, Error, GenerateOptions};
use zipdelta_zip::{CompressionMethod, ZipBuilder};

fn init() {
    let _ = env_logger::try_init();
}

fn write_archive(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn run_round_trip(old_bytes: &[u8], new_bytes: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let dir = TempDir::new().unwrap();
    let old_path = write_archive(&dir, "old.zip", old_bytes);
    let new_path = write_archive(&dir, "new.zip", new_bytes);
    let patch_path = dir.path().join("patch.bin");
    let out_path = dir.path().join("out.zip");

    let mut patch_bytes = Vec::new();
    generate_delta(&old_path, &new_path, &mut patch_bytes, &GenerateOptions::default()).unwrap();
    fs::write(&patch_path, &patch_bytes).unwrap();

    apply_delta(&old_path, &patch_bytes[..], &out_path, &ApplyOptions::default()).unwrap();
    let produced = fs::read(&out_path).unwrap();
    assert_eq!(produced, new_bytes, "apply(old, generate(old, new)) must equal new");

    (patch_bytes, produced)
}

/// Scenario 1 (spec.md §8): an archive exercising every branch of the §4.3
/// decision table, plus rename-shaped old-only/new-only entries.
#[test]
fn exercises_every_plan_decision_and_round_trips() {
    init();

    let mut old = ZipBuilder::new();
    old.add_entry("stored_unchanged.bin", b"store me, unchanged", CompressionMethod::Stored)
        .unwrap();
    old.add_entry("stored_changed.bin", b"store me, will change", CompressionMethod::Stored)
        .unwrap();
    old.add_entry(
        "deflate_unchanged.bin",
        b"deflate content that stays the same across versions, repeated repeated repeated",
        CompressionMethod::Deflate,
    )
    .unwrap();
    old.add_entry(
        "stored_to_deflate.bin",
        b"will go from stored to deflated, needs to be long enough to compress well yes",
        CompressionMethod::Stored,
    )
    .unwrap();
    old.add_entry(
        "deflate_to_stored.bin",
        b"will go from deflated to stored, needs to be long enough to compress well yes",
        CompressionMethod::Deflate,
    )
    .unwrap();
    old.add_entry(
        "both_deflate_changed.bin",
        b"version one of some deflate-compressed content that will change a fair bit",
        CompressionMethod::Deflate,
    )
    .unwrap();
    old.add_raw_entry("bzip2.bin", b"not-really-bzip2-bytes-v1", 0, 25, CompressionMethod::Unsupported(12))
        .unwrap();
    old.add_entry("old_only.bin", b"renamed away in the new archive", CompressionMethod::Stored)
        .unwrap();
    let old_bytes = old.finish().unwrap();

    let mut new = ZipBuilder::new();
    new.add_entry("stored_unchanged.bin", b"store me, unchanged", CompressionMethod::Stored)
        .unwrap();
    new.add_entry("stored_changed.bin", b"store me, changed now!", CompressionMethod::Stored)
        .unwrap();
    new.add_entry(
        "deflate_unchanged.bin",
        b"deflate content that stays the same across versions, repeated repeated repeated",
        CompressionMethod::Deflate,
    )
    .unwrap();
    new.add_entry(
        "stored_to_deflate.bin",
        b"will go from stored to deflated, needs to be long enough to compress well yes",
        CompressionMethod::Deflate,
    )
    .unwrap();
    new.add_entry(
        "deflate_to_stored.bin",
        b"will go from deflated to stored, needs to be long enough to compress well yes",
        CompressionMethod::Stored,
    )
    .unwrap();
    new.add_entry(
        "both_deflate_changed.bin",
        b"version two of some deflate-compressed content that has changed quite a bit now",
        CompressionMethod::Deflate,
    )
    .unwrap();
    new.add_raw_entry("bzip2.bin", b"not-really-bzip2-bytes-v2!", 0, 26, CompressionMethod::Unsupported(12))
        .unwrap();
    new.add_entry("new_only.bin", b"freshly added in the new archive", CompressionMethod::Stored)
        .unwrap();
    let new_bytes = new.finish().unwrap();

    let (patch_bytes, _produced) = run_round_trip(&old_bytes, &new_bytes);
    assert!(
        patch_bytes.len() < new_bytes.len(),
        "patch ({} bytes) should be smaller than the new archive ({} bytes)",
        patch_bytes.len(),
        new_bytes.len()
    );
}

/// Scenario 2: empty new archive vs. non-empty old.
#[test]
fn empty_new_archive_round_trips() {
    init();
    let mut old = ZipBuilder::new();
    old.add_entry("a.bin", b"some content that used to exist", CompressionMethod::Stored)
        .unwrap();
    let old_bytes = old.finish().unwrap();
    let new_bytes = ZipBuilder::new().finish().unwrap();

    run_round_trip(&old_bytes, &new_bytes);
}

/// Scenario 3: old archive is exactly the new archive.
#[test]
fn identical_archives_produce_a_tiny_patch_and_apply_is_a_fixpoint() {
    init();
    let mut builder = ZipBuilder::new();
    for i in 0..20 {
        builder
            .add_entry(
                &format!("file_{i}.txt"),
                format!("repeated content block number {i} ").repeat(64).as_bytes(),
                CompressionMethod::Deflate,
            )
            .unwrap();
    }
    let archive_bytes = builder.finish().unwrap();

    let (patch_bytes, produced) = run_round_trip(&archive_bytes, &archive_bytes);
    assert_eq!(produced, archive_bytes);
    assert!(
        patch_bytes.len() < archive_bytes.len() / 4,
        "identical inputs should produce a patch much smaller than the archive itself"
    );
}

/// Scenario 4: an entry using an unsupported compression method (standing
/// in for BZIP2) is marked UNSUITABLE by the planner; its raw bytes flow
/// through the binary delta untouched and round-trip still succeeds.
#[test]
fn unsupported_compression_method_round_trips_via_raw_bytes() {
    init();
    let mut old = ZipBuilder::new();
    old.add_raw_entry("weird.bin", b"original-bzip2-shaped-bytes", 0, 28, CompressionMethod::Unsupported(12))
        .unwrap();
    let old_bytes = old.finish().unwrap();

    let mut new = ZipBuilder::new();
    new.add_raw_entry("weird.bin", b"changed--bzip2-shaped-bytes!", 0, 29, CompressionMethod::Unsupported(12))
        .unwrap();
    let new_bytes = new.finish().unwrap();

    run_round_trip(&old_bytes, &new_bytes);
}

/// Scenario 5: a patch truncated by one byte is rejected as PATCH_CORRUPT
/// and leaves no output file behind.
#[test]
fn truncated_patch_is_rejected_and_leaves_no_output() {
    init();
    let dir = TempDir::new().unwrap();

    let mut old = ZipBuilder::new();
    old.add_entry("a.bin", b"hello world, this is version one", CompressionMethod::Stored)
        .unwrap();
    let old_bytes = old.finish().unwrap();
    let old_path = write_archive(&dir, "old.zip", &old_bytes);

    let mut new = ZipBuilder::new();
    new.add_entry("a.bin", b"hello there, this is version two", CompressionMethod::Stored)
        .unwrap();
    let new_bytes = new.finish().unwrap();
    let new_path = write_archive(&dir, "new.zip", &new_bytes);

    let mut patch_bytes = Vec::new();
    generate_delta(&old_path, &new_path, &mut patch_bytes, &GenerateOptions::default()).unwrap();

    let truncated = &patch_bytes[..patch_bytes.len() - 1];
    let out_path = dir.path().join("out.zip");

    let result = apply_delta(&old_path, truncated, &out_path, &ApplyOptions::default());
    assert!(matches!(result, Err(Error::PatchCorrupt { .. }) | Err(Error::Io(_))));
    assert!(!out_path.exists(), "no output file should be left behind on failure");
}

/// Plan determinism (spec.md §8): two independent generate runs over the
/// same inputs produce byte-identical patches.
#[test]
fn generate_is_deterministic_across_runs() {
    init();
    let dir = TempDir::new().unwrap();

    let mut old = ZipBuilder::new();
    old.add_entry("a.bin", b"some reasonably compressible content here", CompressionMethod::Deflate)
        .unwrap();
    old.add_entry("b.bin", b"unrelated stored content", CompressionMethod::Stored)
        .unwrap();
    let old_bytes = old.finish().unwrap();
    let old_path = write_archive(&dir, "old.zip", &old_bytes);

    let mut new = ZipBuilder::new();
    new.add_entry("a.bin", b"some reasonably compressible CONTENT here", CompressionMethod::Deflate)
        .unwrap();
    new.add_entry("b.bin", b"unrelated stored content, slightly longer now", CompressionMethod::Stored)
        .unwrap();
    let new_bytes = new.finish().unwrap();
    let new_path = write_archive(&dir, "new.zip", &new_bytes);

    let mut first = Vec::new();
    generate_delta(&old_path, &new_path, &mut first, &GenerateOptions::default()).unwrap();
    let mut second = Vec::new();
    generate_delta(&old_path, &new_path, &mut second, &GenerateOptions::default()).unwrap();

    assert_eq!(first, second);
}

/// Reordering insensitivity (spec.md §8): reversing central-directory
/// order in the new archive doesn't affect round-trip correctness, since
/// the planner pairs entries by path, not position.
#[test]
fn reordered_entries_still_round_trip() {
    init();
    let mut old = ZipBuilder::new();
    old.add_entry("first.bin", b"first file content, unchanged across versions here", CompressionMethod::Stored)
        .unwrap();
    old.add_entry("second.bin", b"second file content, will change in the new archive", CompressionMethod::Deflate)
        .unwrap();
    let old_bytes = old.finish().unwrap();

    let mut new = ZipBuilder::new();
    new.add_entry("second.bin", b"second file content, has now changed in the new archive!", CompressionMethod::Deflate)
        .unwrap();
    new.add_entry("first.bin", b"first file content, unchanged across versions here", CompressionMethod::Stored)
        .unwrap();
    let new_bytes = new.finish().unwrap();

    run_round_trip(&old_bytes, &new_bytes);
}
