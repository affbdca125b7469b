//! BSDIFF delta generation (spec.md §4.5 "Generate"): scans the new blob
//! left to right, finding the longest match against the old blob's suffix
//! array at each position, extending matches forward/backward across
//! commit boundaries, and emitting one control triple plus its diff/extra
//! bytes per committed match.

use zipdelta_zip::CancelToken;

use super::suffix::SuffixArray;
use super::varint::write_signed;
use crate::error::{Error, Result};

/// Runs bsdiff over `old` and `new`, returning the delta stream: repeating
/// records of `(lenf, gap, delta)` sign-magnitude triples followed by
/// `lenf` diff bytes and `gap` extra bytes.
pub fn generate(old: &[u8], new: &[u8], cancel: &CancelToken) -> Result<Vec<u8>> {
    if old.len() > i32::MAX as usize || new.len() > i32::MAX as usize {
        return Err(Error::InvalidInput(
            "bsdiff inputs above 2^31 bytes are not supported".into(),
        ));
    }

    let sa = SuffixArray::build(old);
    let oldsize = old.len() as i64;
    let newsize = new.len() as i64;

    let mut out = Vec::new();

    let mut scan: i64 = 0;
    let mut len: i64 = 0;
    let mut pos: i64 = 0;
    let mut lastscan: i64 = 0;
    let mut lastpos: i64 = 0;
    let mut lastoffset: i64 = 0;

    while scan < newsize {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut oldscore: i64 = 0;
        scan += len;
        let mut scsc = scan;

        while scan < newsize {
            let (found_len, found_pos) = sa.search(old, &new[scan as usize..]);
            len = found_len;
            pos = found_pos;

            while scsc < scan + len {
                let old_idx = scsc + lastoffset;
                if old_idx >= 0 && old_idx < oldsize && old[old_idx as usize] == new[scsc as usize]
                {
                    oldscore += 1;
                }
                scsc += 1;
            }

            if (len == oldscore && len != 0) || len > oldscore + 8 {
                break;
            }

            let cur_idx = scan + lastoffset;
            if cur_idx >= 0 && cur_idx < oldsize && old[cur_idx as usize] == new[scan as usize] {
                oldscore -= 1;
            }

            scan += 1;
        }

        if len != oldscore || scan == newsize {
            // Forward extension: how far can the previous commit's match
            // keep agreeing with `old` past `lastscan`?
            let mut forward_score: i64 = 0;
            let mut forward_len: i64 = 0;
            let mut s: i64 = 0;
            let mut i: i64 = 0;
            while lastscan + i < scan && lastpos + i < oldsize {
                if old[(lastpos + i) as usize] == new[(lastscan + i) as usize] {
                    s += 1;
                }
                i += 1;
                if s * 2 - i > forward_score * 2 - forward_len {
                    forward_score = s;
                    forward_len = i;
                }
            }

            // Backward extension: how far can the new match back up into
            // `scan` and still agree with `old`?
            let mut lenb: i64 = 0;
            if scan < newsize {
                let mut backward_score: i64 = 0;
                let mut s: i64 = 0;
                let mut i: i64 = 1;
                while scan >= lastscan + i && pos >= i {
                    if old[(pos - i) as usize] == new[(scan - i) as usize] {
                        s += 1;
                    }
                    if s * 2 - i > backward_score * 2 - lenb {
                        backward_score = s;
                        lenb = i;
                    }
                    i += 1;
                }
            }

            let mut lenf = forward_len;

            // The two extensions may overlap; split at the position that
            // maximises agreeing bytes on either side of the split.
            if lastscan + lenf > scan - lenb {
                let overlap = (lastscan + lenf) - (scan - lenb);
                let mut s: i64 = 0;
                let mut best_s: i64 = 0;
                let mut lens: i64 = 0;
                for i in 0..overlap {
                    if new[(lastscan + lenf - overlap + i) as usize]
                        == old[(lastpos + lenf - overlap + i) as usize]
                    {
                        s += 1;
                    }
                    if new[(scan - lenb + i) as usize] == old[(pos - lenb + i) as usize] {
                        s -= 1;
                    }
                    if s > best_s {
                        best_s = s;
                        lens = i + 1;
                    }
                }
                lenf += lens - overlap;
                lenb -= lens;
            }

            let gap = (scan - lenb) - (lastscan + lenf);
            let delta = (pos - lenb) - (lastpos + lenf);

            write_signed(&mut out, lenf)?;
            write_signed(&mut out, gap)?;
            write_signed(&mut out, delta)?;

            for i in 0..lenf {
                out.push(new[(lastscan + i) as usize].wrapping_sub(old[(lastpos + i) as usize]));
            }
            for i in 0..gap {
                out.push(new[(lastscan + lenf + i) as usize]);
            }

            lastscan = scan - lenb;
            lastpos = pos - lenb;
            lastoffset = pos - scan;
        }
    }

    Ok(out)
}
