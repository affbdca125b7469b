//! BSDIFF delta application (spec.md §4.5 "Apply"): replays the control
//! triples a matching `generate` call produced, reconstructing `new` from
//! `old` plus the diff/extra byte streams.

use std::io::{Cursor, Read};

use zipdelta_zip::CancelToken;

use super::varint::read_signed;
use crate::error::{Error, Result};

fn corrupt_at(cursor: &Cursor<&[u8]>, reason: &str) -> Error {
    Error::patch_corrupt(cursor.position(), reason)
}

/// Applies `delta` (as produced by [`super::generate`]) to `old`,
/// reconstructing exactly `new_len` bytes. Any underrun, overrun, or
/// out-of-range control record is `PATCH_CORRUPT` (spec.md §4.5 "Edge
/// cases").
pub fn apply(old: &[u8], delta: &[u8], new_len: u64, cancel: &CancelToken) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(new_len as usize);
    let mut cursor = Cursor::new(delta);
    let mut old_pos: i64 = 0;

    while (out.len() as u64) < new_len {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let lenf = read_signed(&mut cursor)
            .map_err(|_| corrupt_at(&cursor, "bsdiff stream truncated reading control triple"))?;
        let gap = read_signed(&mut cursor)
            .map_err(|_| corrupt_at(&cursor, "bsdiff stream truncated reading control triple"))?;
        let delta_off = read_signed(&mut cursor)
            .map_err(|_| corrupt_at(&cursor, "bsdiff stream truncated reading control triple"))?;

        if lenf < 0 || gap < 0 {
            return Err(corrupt_at(&cursor, "negative bsdiff record length"));
        }
        if old_pos < 0 || old_pos as u64 + lenf as u64 > old.len() as u64 {
            return Err(corrupt_at(&cursor, "bsdiff diff range runs past old blob"));
        }
        if out.len() as u64 + lenf as u64 + gap as u64 > new_len {
            return Err(corrupt_at(&cursor, "bsdiff record overruns declared output length"));
        }

        let mut diff_bytes = vec![0u8; lenf as usize];
        cursor
            .read_exact(&mut diff_bytes)
            .map_err(|_| corrupt_at(&cursor, "bsdiff stream truncated in diff bytes"))?;
        for (i, byte) in diff_bytes.iter().enumerate() {
            out.push(old[old_pos as usize + i].wrapping_add(*byte));
        }

        let mut extra_bytes = vec![0u8; gap as usize];
        cursor
            .read_exact(&mut extra_bytes)
            .map_err(|_| corrupt_at(&cursor, "bsdiff stream truncated in extra bytes"))?;
        out.extend_from_slice(&extra_bytes);

        old_pos += lenf + delta_off;
    }

    if out.len() as u64 != new_len {
        return Err(corrupt_at(&cursor, "bsdiff output length mismatch"));
    }

    Ok(out)
}
