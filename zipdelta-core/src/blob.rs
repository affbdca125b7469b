//! The delta-friendly blob builder (spec.md §4.4): walks an archive's byte
//! range in order, copying bytes straight through except where the plan
//! says to inflate a payload in place, exposing cross-version similarity to
//! the BSDIFF engine in `bsdiff`.

use std::collections::HashMap;

use zipdelta_zip::{ByteRange, MinimalZipEntry, RangeSource};

use crate::deflate::DeflateParams;
use crate::error::{Error, Result};
use crate::plan::{EntrySource, Plan, UncompressOption};

/// One entry of the patch container's uncompress-range list (spec.md
/// §3/§4.6): an old-archive byte range paired with the length it inflates
/// to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UncompressRange {
    pub archive_range: ByteRange,
    pub inflated_len: u64,
}

/// One entry of the patch container's recompress-range list: a region of
/// the delta-friendly *new* blob that must be re-deflated with
/// `deflate_params` to reproduce the new archive's compressed bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecompressRange {
    pub blob_range: ByteRange,
    pub deflate_params: DeflateParams,
}

fn copy_gap(source: &mut impl RangeSource, blob: &mut Vec<u8>, start: u64, end: u64) -> Result<()> {
    if end > start {
        blob.extend_from_slice(&source.read_range(ByteRange::new(start, end - start))?);
    }
    Ok(())
}

/// Copies `archive_len` bytes from `raw_source` into a fresh blob, except
/// that each entry in `targets` has its payload range replaced by
/// `entry_source.uncompressed(entry)`. `targets` is sorted by payload
/// offset internally; callers need not pre-sort.
///
/// Returns the blob plus, for each target (in payload-offset order), the
/// `ByteRange` within the blob its inflated content landed at.
fn materialise<'e>(
    raw_source: &mut impl RangeSource,
    archive_len: u64,
    mut targets: Vec<&'e MinimalZipEntry>,
    entry_source: &impl EntrySource,
) -> Result<(Vec<u8>, Vec<(&'e MinimalZipEntry, ByteRange)>)> {
    targets.sort_by_key(|e| e.payload_range.offset);

    let mut blob = Vec::with_capacity(archive_len as usize);
    let mut placed = Vec::with_capacity(targets.len());
    let mut cursor = 0u64;

    for entry in targets {
        let range = entry.payload_range;
        if range.offset < cursor {
            return Err(Error::InvalidInput(
                "overlapping payload ranges while materialising delta-friendly blob".into(),
            ));
        }
        copy_gap(raw_source, &mut blob, cursor, range.offset)?;

        let inflated = entry_source.uncompressed(entry)?;
        let blob_start = blob.len() as u64;
        blob.extend_from_slice(&inflated);
        placed.push((entry, ByteRange::new(blob_start, inflated.len() as u64)));

        cursor = range.end();
    }

    copy_gap(raw_source, &mut blob, cursor, archive_len)?;
    Ok((blob, placed))
}

fn paths_wanting(plan: &Plan, wants: fn(UncompressOption) -> bool) -> HashMap<&[u8], ()> {
    plan.entries
        .iter()
        .filter(|e| wants(e.option))
        .map(|e| (e.path.as_slice(), ()))
        .collect()
}

/// Builds the old-side delta-friendly blob for `generate_delta`: every
/// entry the plan marks `Old` or `Both` is inflated in place. Returns the
/// blob plus the uncompress-range list the patch container records
/// (spec.md §4.6), in archive order.
pub fn build_old_blob(
    raw_source: &mut impl RangeSource,
    archive_len: u64,
    old_entries: &[MinimalZipEntry],
    plan: &Plan,
    entry_source: &impl EntrySource,
) -> Result<(Vec<u8>, Vec<UncompressRange>)> {
    let wanted = paths_wanting(plan, |o| {
        matches!(o, UncompressOption::Old | UncompressOption::Both)
    });
    let targets: Vec<&MinimalZipEntry> = old_entries
        .iter()
        .filter(|e| wanted.contains_key(e.path.as_slice()))
        .collect();

    let (blob, placed) = materialise(raw_source, archive_len, targets, entry_source)?;

    let ranges = placed
        .into_iter()
        .map(|(entry, blob_range)| UncompressRange {
            archive_range: entry.payload_range,
            inflated_len: blob_range.len,
        })
        .collect();

    Ok((blob, ranges))
}

/// Builds the new-side delta-friendly blob for `generate_delta`: every
/// entry the plan marks `New` or `Both` is inflated in place. Returns the
/// blob plus the recompress-range list (spec.md §4.6), each paired with the
/// DEFLATE parameters `build_plan` already discovered for that entry.
pub fn build_new_blob(
    raw_source: &mut impl RangeSource,
    archive_len: u64,
    new_entries: &[MinimalZipEntry],
    plan: &Plan,
    entry_source: &impl EntrySource,
) -> Result<(Vec<u8>, Vec<RecompressRange>)> {
    let params_by_path: HashMap<&[u8], DeflateParams> = plan
        .entries
        .iter()
        .filter_map(|e| e.new_deflate_params.map(|p| (e.path.as_slice(), p)))
        .collect();

    let wanted = paths_wanting(plan, |o| {
        matches!(o, UncompressOption::New | UncompressOption::Both)
    });
    let targets: Vec<&MinimalZipEntry> = new_entries
        .iter()
        .filter(|e| wanted.contains_key(e.path.as_slice()))
        .collect();

    let (blob, placed) = materialise(raw_source, archive_len, targets, entry_source)?;

    let mut ranges = Vec::with_capacity(placed.len());
    for (entry, blob_range) in placed {
        let deflate_params = *params_by_path.get(entry.path.as_slice()).ok_or_else(|| {
            Error::InvalidInput(format!(
                "{}: planned for recompression but no DEFLATE parameters were recorded",
                entry.path_lossy()
            ))
        })?;
        ranges.push(RecompressRange {
            blob_range,
            deflate_params,
        });
    }

    Ok((blob, ranges))
}

/// Rebuilds the old-side delta-friendly blob on the applier, from the
/// uncompress-range list read out of the patch container rather than a
/// freshly computed plan (spec.md: the applier does not re-run the
/// planner, it replays exactly the ranges the generator recorded).
pub fn rebuild_old_blob(
    raw_source: &mut impl RangeSource,
    archive_len: u64,
    old_entries: &[MinimalZipEntry],
    uncompress_ranges: &[UncompressRange],
    entry_source: &impl EntrySource,
) -> Result<Vec<u8>> {
    let entries_by_offset: HashMap<u64, &MinimalZipEntry> = old_entries
        .iter()
        .map(|e| (e.payload_range.offset, e))
        .collect();

    let mut targets = Vec::with_capacity(uncompress_ranges.len());
    for range in uncompress_ranges {
        let entry = entries_by_offset.get(&range.archive_range.offset).ok_or_else(|| {
            Error::patch_corrupt(
                range.archive_range.offset,
                "uncompress range does not match any old-archive entry payload",
            )
        })?;
        targets.push(*entry);
    }

    let (blob, _) = materialise(raw_source, archive_len, targets, entry_source)?;
    Ok(blob)
}
