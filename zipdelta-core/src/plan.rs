use std::cell::RefCell;
use std::collections::HashMap;

use log::debug;
use zipdelta_zip::data::CompressionMethod;
use zipdelta_zip::{MinimalZipEntry, RangeSource};

use crate::deflate::{self, CompatibilityWindow, DeflateParams, ParamCache};
use crate::error::{Error, Result};

/// Which side(s) of a matched (old, new) entry pair should be uncompressed
/// before the binary delta runs (spec.md §3 "PreDiffPlanEntry").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UncompressOption {
    Neither,
    Old,
    New,
    Both,
}

/// Why a `PreDiffPlanEntry` chose the option it did (spec.md §3/§4.3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlanReason {
    CompressedBytesIdentical,
    BothUncompressed,
    CompressedChangedToUncompressed,
    UncompressedChangedToCompressed,
    CompressedBytesChanged,
    DeflateUnsuitable,
    Unsuitable,
}

/// The plan entry for one path present in both the old and new archive.
#[derive(Clone, Debug)]
pub struct PreDiffPlanEntry {
    pub path: Vec<u8>,
    pub option: UncompressOption,
    pub reason: PlanReason,
    /// DEFLATE parameters required to re-compress the new side at apply
    /// time, present iff `option` is `New` or `Both`.
    pub new_deflate_params: Option<DeflateParams>,
}

/// The full plan: one entry per path present in both archives. Paths only
/// in old or only in new are not planned (spec.md §4.3); their bytes flow
/// through the binary delta untouched.
pub struct Plan {
    pub entries: Vec<PreDiffPlanEntry>,
}

/// A post-processing hook that may downgrade plan entries to `Neither`
/// after the table-driven pass (spec.md §4.3 "External modifiers ... may
/// post-process the plan"). The planner itself imposes no such policy.
pub trait PlanModifier {
    fn apply(&self, entry: &mut PreDiffPlanEntry, old: &MinimalZipEntry, new: &MinimalZipEntry);
}

/// Downgrades small entries to `Neither`: below `min_uncompressed_size`
/// bytes, the DEFLATE round-trip cost at apply time outweighs the delta
/// savings. Mirrors the kind of size-threshold modifier spec.md §4.3
/// reserves the hook for.
pub struct MinUncompressedSizeModifier {
    pub min_uncompressed_size: u64,
}

impl PlanModifier for MinUncompressedSizeModifier {
    fn apply(&self, entry: &mut PreDiffPlanEntry, old: &MinimalZipEntry, new: &MinimalZipEntry) {
        if entry.option == UncompressOption::Neither {
            return;
        }
        if old.uncompressed_len < self.min_uncompressed_size
            && new.uncompressed_len < self.min_uncompressed_size
        {
            entry.option = UncompressOption::Neither;
            entry.reason = PlanReason::Unsuitable;
            entry.new_deflate_params = None;
        }
    }
}

/// Gives the planner access to an archive's entry bytes without it needing
/// to know whether that archive lives in a file, a `Vec<u8>`, or anywhere
/// else. `raw_payload` returns the bytes exactly as stored in the archive
/// (compressed, if DEFLATE); `uncompressed` returns the inflated content.
pub trait EntrySource {
    fn raw_payload(&self, entry: &MinimalZipEntry) -> Result<Vec<u8>>;
    fn uncompressed(&self, entry: &MinimalZipEntry) -> Result<Vec<u8>>;
}

/// The concrete `EntrySource` backed by a real archive: reads payload bytes
/// by range and, when asked for uncompressed content, inflates and checks
/// both the declared uncompressed length and the entry's recorded CRC-32
/// (spec.md §7 "any inflate that fails to produce the expected
/// uncompressed-size bytes, or whose CRC-32 mismatches ... is an error").
/// `RangeSource::read_range` needs `&mut self`, so the byte source is kept
/// behind a `RefCell` to satisfy `EntrySource`'s `&self` methods.
pub struct ArchiveEntrySource<'a, S: RangeSource + ?Sized> {
    source: RefCell<&'a mut S>,
}

impl<'a, S: RangeSource + ?Sized> ArchiveEntrySource<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        Self {
            source: RefCell::new(source),
        }
    }
}

impl<'a, S: RangeSource + ?Sized> EntrySource for ArchiveEntrySource<'a, S> {
    fn raw_payload(&self, entry: &MinimalZipEntry) -> Result<Vec<u8>> {
        Ok(self.source.borrow_mut().read_range(entry.payload_range)?)
    }

    fn uncompressed(&self, entry: &MinimalZipEntry) -> Result<Vec<u8>> {
        let raw = self.raw_payload(entry)?;
        let content = if entry.is_stored() {
            raw
        } else {
            deflate::inflate(&raw, entry.uncompressed_len)?
        };

        if content.len() as u64 != entry.uncompressed_len {
            return Err(Error::InvalidInput(format!(
                "{}: inflated length {} does not match declared length {}",
                entry.path_lossy(),
                content.len(),
                entry.uncompressed_len
            )));
        }
        if deflate::crc32(&content) != entry.crc32 {
            return Err(Error::InvalidInput(format!(
                "{}: inflated content does not match recorded CRC-32",
                entry.path_lossy()
            )));
        }
        Ok(content)
    }
}

/// A pair whose DEFLATE reproducibility still needs to be decided (rules 3-5
/// of spec.md §4.3's table) once the cheap, sequential rules (both stored,
/// byte-identical, unsupported method) have been ruled out.
enum PendingKind {
    /// Rule 3: old stored, new deflated. Only the new side needs checking.
    NewBecameCompressed { new_content: Vec<u8> },
    /// Rule 4: old deflated, new stored. Only the old side needs checking.
    OldBecameUncompressed { old_content: Vec<u8> },
    /// Rule 5: both deflated. Both sides need checking.
    BothCompressedChanged {
        old_content: Vec<u8>,
        new_content: Vec<u8>,
    },
}

struct PendingPair<'e> {
    old: &'e MinimalZipEntry,
    new: &'e MinimalZipEntry,
    old_bytes: Vec<u8>,
    new_bytes: Vec<u8>,
    kind: PendingKind,
}

/// Builds a plan pairing every path common to `old_entries` and
/// `new_entries`, following the decision table in spec.md §4.3 top to
/// bottom (first match wins), then running `modifiers` over the result.
///
/// The cheap rules (both stored, byte-identical, unsupported method) are
/// decided in one sequential pass. Every remaining pair needs a DEFLATE
/// reproducibility check, which is independent per entry (spec.md §5) — those
/// checks are batched into a single [`deflate::find_params_parallel`] call
/// fanned out across the pairs that need it, rather than brute-forced one
/// entry at a time.
pub fn build_plan(
    old_entries: &[MinimalZipEntry],
    new_entries: &[MinimalZipEntry],
    old_source: &impl EntrySource,
    new_source: &impl EntrySource,
    window: &CompatibilityWindow,
    cache: &mut ParamCache,
    modifiers: &[Box<dyn PlanModifier>],
) -> Result<Plan> {
    let old_by_path: HashMap<&[u8], &MinimalZipEntry> =
        old_entries.iter().map(|e| (e.path.as_slice(), e)).collect();

    let mut slots: Vec<Option<PreDiffPlanEntry>> = Vec::new();
    let mut pairs: Vec<(&MinimalZipEntry, &MinimalZipEntry)> = Vec::new();
    let mut pending: Vec<(usize, PendingPair)> = Vec::new();

    for new_entry in new_entries {
        let Some(&old_entry) = old_by_path.get(new_entry.path.as_slice()) else {
            continue;
        };
        let path = new_entry.path.clone();
        let slot_index = slots.len();

        // Rule 1: both stored.
        if old_entry.is_stored() && new_entry.is_stored() {
            slots.push(Some(PreDiffPlanEntry {
                path,
                option: UncompressOption::Neither,
                reason: PlanReason::BothUncompressed,
                new_deflate_params: None,
            }));
            pairs.push((old_entry, new_entry));
            continue;
        }

        // Rule 2: compressed bytes byte-identical.
        let old_bytes = old_source.raw_payload(old_entry)?;
        let new_bytes = new_source.raw_payload(new_entry)?;
        if old_entry.compression_method == new_entry.compression_method && old_bytes == new_bytes {
            slots.push(Some(PreDiffPlanEntry {
                path,
                option: UncompressOption::Neither,
                reason: PlanReason::CompressedBytesIdentical,
                new_deflate_params: None,
            }));
            pairs.push((old_entry, new_entry));
            continue;
        }

        let old_supported = matches!(
            old_entry.compression_method,
            CompressionMethod::Stored | CompressionMethod::Deflate
        );
        let new_supported = matches!(
            new_entry.compression_method,
            CompressionMethod::Stored | CompressionMethod::Deflate
        );
        if !old_supported || !new_supported {
            slots.push(Some(PreDiffPlanEntry {
                path,
                option: UncompressOption::Neither,
                reason: PlanReason::Unsuitable,
                new_deflate_params: None,
            }));
            pairs.push((old_entry, new_entry));
            continue;
        }

        let kind = if old_entry.is_stored() && new_entry.is_deflated() {
            // Rule 3.
            PendingKind::NewBecameCompressed {
                new_content: new_source.uncompressed(new_entry)?,
            }
        } else if old_entry.is_deflated() && new_entry.is_stored() {
            // Rule 4.
            PendingKind::OldBecameUncompressed {
                old_content: old_source.uncompressed(old_entry)?,
            }
        } else if old_entry.is_deflated() && new_entry.is_deflated() {
            // Rule 5.
            PendingKind::BothCompressedChanged {
                old_content: old_source.uncompressed(old_entry)?,
                new_content: new_source.uncompressed(new_entry)?,
            }
        } else {
            // Every (stored/deflate) x (stored/deflate) combination is
            // handled above; anything else falls through as unsuitable.
            slots.push(Some(PreDiffPlanEntry {
                path,
                option: UncompressOption::Neither,
                reason: PlanReason::Unsuitable,
                new_deflate_params: None,
            }));
            pairs.push((old_entry, new_entry));
            continue;
        };

        slots.push(None);
        pairs.push((old_entry, new_entry));
        pending.push((
            slot_index,
            PendingPair {
                old: old_entry,
                new: new_entry,
                old_bytes,
                new_bytes,
                kind,
            },
        ));
    }

    resolve_pending(&mut slots, pending, window, cache)?;

    let mut entries: Vec<PreDiffPlanEntry> = slots
        .into_iter()
        .map(|s| s.expect("every slot is decided after resolve_pending"))
        .collect();

    for (plan_entry, (old_entry, new_entry)) in entries.iter_mut().zip(pairs.iter()) {
        for modifier in modifiers {
            modifier.apply(plan_entry, old_entry, new_entry);
        }
        debug!(
            "plan {:?}: {:?} ({:?})",
            plan_entry.path.as_slice(),
            plan_entry.option,
            plan_entry.reason
        );
    }

    Ok(Plan { entries })
}

/// Which side of a pending pair a discovery job's result belongs to.
enum Side {
    Old,
    New,
}

/// Runs the DEFLATE reproducibility oracle for every pending pair in one
/// batched, parallel pass (spec.md §5), then fills in `slots` with the
/// resulting decision for each pair.
fn resolve_pending(
    slots: &mut [Option<PreDiffPlanEntry>],
    pending: Vec<(usize, PendingPair)>,
    window: &CompatibilityWindow,
    cache: &mut ParamCache,
) -> Result<()> {
    let mut jobs: Vec<(String, Vec<u8>, Vec<u8>)> = Vec::new();
    let mut job_owner: Vec<(usize, Side)> = Vec::new();

    for (pending_idx, (_slot, pair)) in pending.iter().enumerate() {
        match &pair.kind {
            PendingKind::NewBecameCompressed { new_content } => {
                jobs.push((pair.new.path_lossy(), new_content.clone(), pair.new_bytes.clone()));
                job_owner.push((pending_idx, Side::New));
            }
            PendingKind::OldBecameUncompressed { old_content } => {
                jobs.push((pair.old.path_lossy(), old_content.clone(), pair.old_bytes.clone()));
                job_owner.push((pending_idx, Side::Old));
            }
            PendingKind::BothCompressedChanged {
                old_content,
                new_content,
            } => {
                jobs.push((pair.old.path_lossy(), old_content.clone(), pair.old_bytes.clone()));
                job_owner.push((pending_idx, Side::Old));
                jobs.push((pair.new.path_lossy(), new_content.clone(), pair.new_bytes.clone()));
                job_owner.push((pending_idx, Side::New));
            }
        }
    }

    let results = deflate::find_params_parallel(&jobs, window);

    let mut old_params: Vec<Option<DeflateParams>> = vec![None; pending.len()];
    let mut new_params: Vec<Option<DeflateParams>> = vec![None; pending.len()];
    for ((pending_idx, side), result) in job_owner.into_iter().zip(results.into_iter()) {
        // Prime the per-extension cache so any later sequential caller of
        // `ParamCache::find_params` still benefits from this pass's work.
        if let Some(params) = result {
            let path = match side {
                Side::Old => pending[pending_idx].1.old.path_lossy(),
                Side::New => pending[pending_idx].1.new.path_lossy(),
            };
            cache.remember(&path, params);
        }
        match side {
            Side::Old => old_params[pending_idx] = result,
            Side::New => new_params[pending_idx] = result,
        }
    }

    for (pending_idx, (slot_index, pair)) in pending.into_iter().enumerate() {
        let path = pair.new.path.clone();
        let decided = match pair.kind {
            PendingKind::NewBecameCompressed { .. } => match new_params[pending_idx] {
                Some(params) => PreDiffPlanEntry {
                    path,
                    option: UncompressOption::New,
                    reason: PlanReason::UncompressedChangedToCompressed,
                    new_deflate_params: Some(params),
                },
                None => PreDiffPlanEntry {
                    path,
                    option: UncompressOption::Neither,
                    reason: PlanReason::DeflateUnsuitable,
                    new_deflate_params: None,
                },
            },
            PendingKind::OldBecameUncompressed { .. } => match old_params[pending_idx] {
                Some(_) => PreDiffPlanEntry {
                    path,
                    option: UncompressOption::Old,
                    reason: PlanReason::CompressedChangedToUncompressed,
                    new_deflate_params: None,
                },
                None => PreDiffPlanEntry {
                    path,
                    option: UncompressOption::Neither,
                    reason: PlanReason::DeflateUnsuitable,
                    new_deflate_params: None,
                },
            },
            PendingKind::BothCompressedChanged { .. } => {
                match (old_params[pending_idx], new_params[pending_idx]) {
                    (Some(_), Some(new_params)) => PreDiffPlanEntry {
                        path,
                        option: UncompressOption::Both,
                        reason: PlanReason::CompressedBytesChanged,
                        new_deflate_params: Some(new_params),
                    },
                    _ => PreDiffPlanEntry {
                        path,
                        option: UncompressOption::Neither,
                        reason: PlanReason::DeflateUnsuitable,
                        new_deflate_params: None,
                    },
                }
            }
        };
        slots[slot_index] = Some(decided);
    }

    Ok(())
}
