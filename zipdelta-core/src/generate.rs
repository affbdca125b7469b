//! Top-level pipeline for `generate_delta` (spec.md §6, §2 "Data flow"):
//! `(old, new) -> ZIP parse -> planner -> materialise both delta-friendly
//! blobs -> BSDIFF on blobs -> wrap (plan + delta) in patch container`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{info, warn};
use zipdelta_zip::{parse_entries, ByteRange, RangeSource};

use crate::blob::{build_new_blob, build_old_blob};
use crate::bsdiff;
use crate::container::{DeltaDescriptor, DeltaFormat, PatchContainer};
use crate::deflate::{CompatibilityWindow, ParamCache};
use crate::error::{Error, Result};
use crate::options::GenerateOptions;
use crate::plan::{build_plan, ArchiveEntrySource};

/// Generates a patch transforming `old_path` into `new_path`, writing the
/// container format (spec.md §4.6) to `patch_out`.
///
/// Each stage that needs random access to an archive re-opens it rather
/// than sharing one `File` handle, since the planner's `EntrySource` (random
/// access, inflate-on-demand) and the blob builder's raw byte source
/// (sequential copy) are both `&mut` views that would otherwise alias the
/// same handle.
pub fn generate_delta(
    old_path: impl AsRef<Path>,
    new_path: impl AsRef<Path>,
    patch_out: impl Write,
    options: &GenerateOptions,
) -> Result<()> {
    let old_path = old_path.as_ref();
    let new_path = new_path.as_ref();

    if !options.allowed_delta_formats.contains(&DeltaFormat::Bsdiff) {
        return Err(Error::InvalidInput(
            "BSDIFF is the only delta format this engine can emit, but it was excluded from allowed_delta_formats".into(),
        ));
    }

    info!("parsing old and new archives");
    let old_entries = {
        let mut f = File::open(old_path)?;
        parse_entries(&mut f, &options.cancel)?
    };
    let new_entries = {
        let mut f = File::open(new_path)?;
        parse_entries(&mut f, &options.cancel)?
    };

    let window = CompatibilityWindow::probe();
    if !window.is_compatible() {
        warn!("DEFLATE compatibility probe failed; every entry will plan as DEFLATE_UNSUITABLE");
    }
    let mut cache = ParamCache::new();

    info!("building pre-diff plan");
    let plan = {
        let mut old_f = File::open(old_path)?;
        let mut new_f = File::open(new_path)?;
        let old_source = ArchiveEntrySource::new(&mut old_f);
        let new_source = ArchiveEntrySource::new(&mut new_f);
        build_plan(
            &old_entries,
            &new_entries,
            &old_source,
            &new_source,
            &window,
            &mut cache,
            &options.modifiers,
        )?
    };

    info!("materialising delta-friendly blobs");
    let (old_blob, uncompress_ranges) = {
        let mut raw = File::open(old_path)?;
        let archive_len = RangeSource::len(&mut raw)?;
        let mut ent_f = File::open(old_path)?;
        let entry_source = ArchiveEntrySource::new(&mut ent_f);
        build_old_blob(&mut raw, archive_len, &old_entries, &plan, &entry_source)?
    };
    let (new_blob, recompress_ranges) = {
        let mut raw = File::open(new_path)?;
        let archive_len = RangeSource::len(&mut raw)?;
        let mut ent_f = File::open(new_path)?;
        let entry_source = ArchiveEntrySource::new(&mut ent_f);
        build_new_blob(&mut raw, archive_len, &new_entries, &plan, &entry_source)?
    };

    info!(
        "running bsdiff over delta-friendly blobs ({} -> {} bytes)",
        old_blob.len(),
        new_blob.len()
    );
    let delta_bytes = bsdiff::generate(&old_blob, &new_blob, &options.cancel)?;

    let container = PatchContainer {
        delta_friendly_old_file_size: old_blob.len() as u64,
        uncompress_ranges,
        recompress_ranges,
        deltas: vec![DeltaDescriptor {
            format: DeltaFormat::Bsdiff,
            old_blob_range: ByteRange::new(0, old_blob.len() as u64),
            new_blob_range: ByteRange::new(0, new_blob.len() as u64),
            delta_bytes,
        }],
    };

    let mut writer = BufWriter::new(patch_out);
    container.write(&mut writer)?;
    writer.flush()?;

    info!(
        "patch generated: {} delta bytes for a {} byte new archive",
        container.deltas[0].delta_bytes.len(),
        new_blob.len()
    );
    Ok(())
}
