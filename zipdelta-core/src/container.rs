//! The patch container format (spec.md §4.6): the framed binary envelope
//! carrying a `PatchApplyPlan` plus inline delta bytes. Big-endian
//! throughout, deliberately distinct from the little-endian ZIP format it
//! wraps, so the two are never confused by a byte-level inspection.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use zipdelta_zip::ByteRange;

use crate::blob::{RecompressRange, UncompressRange};
use crate::deflate::DeflateParams;
use crate::error::{Error, Result};

pub const MAGIC: &[u8; 8] = b"GFbFv1_0";

/// `deltaFormatTag` byte (spec.md §4.6). `FileByFile` is a reserved,
/// never-emitted value: the original design's nested delta format is
/// dormant (spec.md §9 Open Questions), so this engine only ever writes
/// `Bsdiff` and rejects `FileByFile` on read.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeltaFormat {
    Bsdiff,
    FileByFile,
}

impl DeltaFormat {
    fn to_tag(self) -> u8 {
        match self {
            DeltaFormat::Bsdiff => 0,
            DeltaFormat::FileByFile => 1,
        }
    }

    fn from_tag(tag: u8, offset: u64) -> Result<Self> {
        match tag {
            0 => Ok(DeltaFormat::Bsdiff),
            1 => Err(Error::patch_corrupt(
                offset,
                "FILE_BY_FILE delta format is reserved and not supported by this engine",
            )),
            other => Err(Error::patch_corrupt(
                offset,
                format!("unknown delta format tag {other}"),
            )),
        }
    }
}

/// One `DeltaDescriptor` (spec.md §3): a region of the delta-friendly old
/// blob paired with a region of the delta-friendly new blob, plus the
/// delta bytes that transform the former into the latter.
#[derive(Clone, Debug)]
pub struct DeltaDescriptor {
    pub format: DeltaFormat,
    pub old_blob_range: ByteRange,
    pub new_blob_range: ByteRange,
    pub delta_bytes: Vec<u8>,
}

/// The full `PatchApplyPlan` as carried inside a patch (spec.md §3/§4.6).
#[derive(Clone, Debug)]
pub struct PatchContainer {
    pub delta_friendly_old_file_size: u64,
    pub uncompress_ranges: Vec<UncompressRange>,
    pub recompress_ranges: Vec<RecompressRange>,
    pub deltas: Vec<DeltaDescriptor>,
}

fn write_range(w: &mut impl Write, range: ByteRange) -> Result<()> {
    w.write_u64::<BE>(range.offset)?;
    w.write_u64::<BE>(range.len)?;
    Ok(())
}

fn read_range(r: &mut impl Read) -> Result<ByteRange> {
    let offset = r.read_u64::<BE>()?;
    let len = r.read_u64::<BE>()?;
    Ok(ByteRange::new(offset, len))
}

impl PatchContainer {
    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        w.write_all(MAGIC)?;
        w.write_u32::<BE>(0)?; // flags, reserved
        w.write_u64::<BE>(self.delta_friendly_old_file_size)?;

        w.write_u32::<BE>(self.uncompress_ranges.len() as u32)?;
        for range in &self.uncompress_ranges {
            write_range(w, range.archive_range)?;
            w.write_u64::<BE>(range.inflated_len)?;
        }

        w.write_u32::<BE>(self.recompress_ranges.len() as u32)?;
        for range in &self.recompress_ranges {
            write_range(w, range.blob_range)?;
            w.write_all(&range.deflate_params.to_byte_triple())?;
        }

        w.write_u32::<BE>(self.deltas.len() as u32)?;
        for delta in &self.deltas {
            w.write_u8(delta.format.to_tag())?;
            write_range(w, delta.old_blob_range)?;
            write_range(w, delta.new_blob_range)?;
            w.write_u64::<BE>(delta.delta_bytes.len() as u64)?;
            w.write_all(&delta.delta_bytes)?;
        }

        Ok(())
    }

    pub fn read(r: &mut impl Read) -> Result<Self> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)
            .map_err(|_| Error::patch_corrupt(0, "truncated before magic"))?;
        if &magic != MAGIC {
            return Err(Error::patch_corrupt(0, "bad magic"));
        }

        let _flags = r.read_u32::<BE>()?;
        let delta_friendly_old_file_size = r.read_u64::<BE>()?;

        let num_uncompress = r.read_u32::<BE>()?;
        let mut uncompress_ranges = Vec::with_capacity(num_uncompress as usize);
        for _ in 0..num_uncompress {
            let archive_range = read_range(r)?;
            let inflated_len = r.read_u64::<BE>()?;
            uncompress_ranges.push(UncompressRange {
                archive_range,
                inflated_len,
            });
        }

        let num_recompress = r.read_u32::<BE>()?;
        let mut recompress_ranges = Vec::with_capacity(num_recompress as usize);
        for _ in 0..num_recompress {
            let blob_range = read_range(r)?;
            let mut params_bytes = [0u8; 4];
            r.read_exact(&mut params_bytes)?;
            let deflate_params = DeflateParams::from_byte_triple(params_bytes)
                .ok_or_else(|| Error::patch_corrupt(blob_range.offset, "invalid deflateParams"))?;
            recompress_ranges.push(RecompressRange {
                blob_range,
                deflate_params,
            });
        }

        let num_deltas = r.read_u32::<BE>()?;
        let mut deltas = Vec::with_capacity(num_deltas as usize);
        let mut expected_new_offset = 0u64;
        for _ in 0..num_deltas {
            let format_offset = 0u64; // offset tracking is best-effort; exact position not retained over `Read`
            let format = DeltaFormat::from_tag(r.read_u8()?, format_offset)?;
            let old_blob_range = read_range(r)?;
            let new_blob_range = read_range(r)?;
            let delta_len = r.read_u64::<BE>()?;
            let mut delta_bytes = vec![0u8; delta_len as usize];
            r.read_exact(&mut delta_bytes)
                .map_err(|_| Error::patch_corrupt(new_blob_range.offset, "truncated delta bytes"))?;

            if new_blob_range.offset != expected_new_offset {
                return Err(Error::patch_corrupt(
                    new_blob_range.offset,
                    "delta descriptors must be contiguous and ordered by new-blob offset",
                ));
            }
            expected_new_offset = new_blob_range.end();

            deltas.push(DeltaDescriptor {
                format,
                old_blob_range,
                new_blob_range,
                delta_bytes,
            });
        }

        Ok(Self {
            delta_friendly_old_file_size,
            uncompress_ranges,
            recompress_ranges,
            deltas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deflate::Strategy;

    fn sample() -> PatchContainer {
        PatchContainer {
            delta_friendly_old_file_size: 128,
            uncompress_ranges: vec![UncompressRange {
                archive_range: ByteRange::new(10, 20),
                inflated_len: 40,
            }],
            recompress_ranges: vec![RecompressRange {
                blob_range: ByteRange::new(0, 40),
                deflate_params: DeflateParams {
                    level: 6,
                    strategy: Strategy::Default,
                    nowrap: true,
                },
            }],
            deltas: vec![DeltaDescriptor {
                format: DeltaFormat::Bsdiff,
                old_blob_range: ByteRange::new(0, 128),
                new_blob_range: ByteRange::new(0, 40),
                delta_bytes: vec![1, 2, 3, 4],
            }],
        }
    }

    #[test]
    fn round_trips_through_bytes() {
        let container = sample();
        let mut bytes = Vec::new();
        container.write(&mut bytes).unwrap();
        assert_eq!(&bytes[0..8], MAGIC);

        let parsed = PatchContainer::read(&mut std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(parsed.delta_friendly_old_file_size, 128);
        assert_eq!(parsed.uncompress_ranges.len(), 1);
        assert_eq!(parsed.deltas.len(), 1);
        assert_eq!(parsed.deltas[0].delta_bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 32];
        assert!(PatchContainer::read(&mut std::io::Cursor::new(bytes)).is_err());
    }

    #[test]
    fn rejects_non_contiguous_deltas() {
        let mut container = sample();
        container.deltas.push(DeltaDescriptor {
            format: DeltaFormat::Bsdiff,
            old_blob_range: ByteRange::new(128, 10),
            new_blob_range: ByteRange::new(50, 10), // gap: should start at 40
            delta_bytes: vec![9],
        });
        let mut bytes = Vec::new();
        container.write(&mut bytes).unwrap();
        assert!(PatchContainer::read(&mut std::io::Cursor::new(bytes)).is_err());
    }
}
