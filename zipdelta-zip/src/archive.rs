use byteorder::{ReadBytesExt, LE};
use log::debug;
use std::io::{Seek, SeekFrom};

use crate::cancel::CancelToken;
use crate::data::{CentDirHeader, EndOfCentDir, LocalFileHeader};
use crate::entry::MinimalZipEntry;
use crate::error::{Error, Result};
use crate::range::ByteRange;
use crate::source::RangeSource;

const UINT16_MAX_VALUE: u64 = 0xffff;

/// Parses every local entry in `source`'s central directory into a
/// `MinimalZipEntry`, in central-directory order (spec.md §4.1, §5
/// "Ordering guarantees").
///
/// Locates the EOCD by scanning backwards from the end of the file (§4.1
/// step i), then walks the central directory (step ii), resolving each
/// entry's local header to find the true payload start, since the local
/// header's filename/extra-field lengths may differ from the central
/// directory's (step iii/iv, and design note "Cyclic metadata").
pub fn parse_entries(
    source: &mut (impl RangeSource + ?Sized),
    cancel: &CancelToken,
) -> Result<Vec<MinimalZipEntry>> {
    let eocd_pos = locate_eocd(source)?;
    source.seek(SeekFrom::Start(eocd_pos))?;
    let eocd = EndOfCentDir::read(source)?;

    source.seek(SeekFrom::Start(eocd.cent_dir_offset as u64))?;

    let mut cd_records = Vec::with_capacity(eocd.cent_dir_records as usize);
    for _ in 0..eocd.cent_dir_records {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        cd_records.push(CentDirHeader::read(source)?);
    }

    let mut entries = Vec::with_capacity(cd_records.len());
    for cd in cd_records {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        entries.push(resolve_entry(source, cd)?);
    }

    debug!("parsed {} entries from archive", entries.len());
    Ok(entries)
}

/// Scans the last `64KiB + EOCD size` bytes of the archive for the EOCD
/// signature, verifying at each candidate position that the recorded
/// comment length agrees with how far back the scan had to go — the same
/// self-check `mbf-zip::ZipFile::open` performs, which disambiguates a
/// spurious signature occurring inside a comment from the real EOCD.
fn locate_eocd(source: &mut (impl RangeSource + ?Sized)) -> Result<u64> {
    let archive_size = source.seek(SeekFrom::End(0))?;
    if archive_size < EndOfCentDir::MIN_SIZE {
        return Err(Error::MalformedArchive(
            "file too small to be a valid ZIP archive".into(),
        ));
    }

    let max_comment_len = std::cmp::min(archive_size - EndOfCentDir::MIN_SIZE, UINT16_MAX_VALUE);
    let eocd_empty_comment_pos = archive_size - EndOfCentDir::MIN_SIZE;

    for expected_comment_len in 0..=max_comment_len {
        let eocd_pos = eocd_empty_comment_pos - expected_comment_len;
        source.seek(SeekFrom::Start(eocd_pos))?;

        if source.read_u32::<LE>()? != EndOfCentDir::HEADER {
            continue;
        }

        source.seek(SeekFrom::Start(
            eocd_pos + EndOfCentDir::COMMENT_LENGTH_FIELD_OFFSET,
        ))?;
        let actual_comment_len = source.read_u16::<LE>()? as u64;

        if actual_comment_len == expected_comment_len {
            return Ok(eocd_pos);
        }
    }

    Err(Error::MalformedArchive(
        "no end-of-central-directory record found".into(),
    ))
}

fn resolve_entry(
    source: &mut (impl RangeSource + ?Sized),
    cd: CentDirHeader,
) -> Result<MinimalZipEntry> {
    if cd.local_header_offset as u64 == CentDirHeader::ZIP64_SENTINEL as u64 {
        return Err(Error::UnsupportedArchive("ZIP64 entries".into()));
    }

    source.seek(SeekFrom::Start(cd.local_header_offset as u64))?;
    let lfh_start = source.stream_position()?;
    let lfh = LocalFileHeader::read(source)?;
    let payload_start = source.stream_position()?;

    if lfh.flags.has_data_descriptor() {
        return Err(Error::UnsupportedArchive(format!(
            "entry {:?} uses a trailing data descriptor (general purpose bit 3)",
            String::from_utf8_lossy(&lfh.file_name)
        )));
    }

    // Central directory sizes are authoritative for CRC/size checks; the
    // local header's own (possibly zero, if a data descriptor were used)
    // sizes only locate where the payload starts.
    let payload_range = ByteRange::new(payload_start, cd.compressed_len as u64);
    let local_header_range = ByteRange::new(lfh_start, payload_start - lfh_start);

    Ok(MinimalZipEntry {
        path: cd.file_name,
        compression_method: cd.compression_method,
        flags: cd.flags,
        crc32: cd.crc32,
        compressed_len: cd.compressed_len as u64,
        uncompressed_len: cd.uncompressed_len as u64,
        local_header_offset: cd.local_header_offset as u64,
        local_header_range,
        payload_range,
    })
}

/// Returns the absolute offset of the first byte not covered by any local
/// entry (i.e. where the central directory begins on disk today). Useful
/// for test fixtures and for sanity-checking that entry ranges don't run
/// past the start of the central directory.
pub fn end_of_entries_offset(source: &mut (impl RangeSource + ?Sized)) -> Result<u64> {
    let eocd_pos = locate_eocd(source)?;
    source.seek(SeekFrom::Start(eocd_pos))?;
    let eocd = EndOfCentDir::read(source)?;
    Ok(eocd.cent_dir_offset as u64)
}
