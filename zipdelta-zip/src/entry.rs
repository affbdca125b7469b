use crate::data::{CompressionMethod, GeneralPurposeFlags};
use crate::range::ByteRange;

/// The minimal per-entry fingerprint described in spec.md §3: just enough
/// metadata to reproduce compressed bytes and pair entries across archives
/// without holding the whole archive in memory.
#[derive(Clone, Debug)]
pub struct MinimalZipEntry {
    pub path: Vec<u8>,
    pub compression_method: CompressionMethod,
    pub flags: GeneralPurposeFlags,
    pub crc32: u32,
    pub compressed_len: u64,
    pub uncompressed_len: u64,
    pub local_header_offset: u64,

    /// Absolute byte range of the local file header (signature through the
    /// end of the extra field), in the archive this entry was parsed from.
    pub local_header_range: ByteRange,
    /// Absolute byte range of the compressed/stored payload.
    pub payload_range: ByteRange,
}

impl MinimalZipEntry {
    pub fn path_lossy(&self) -> String {
        String::from_utf8_lossy(&self.path).into_owned()
    }

    pub fn is_stored(&self) -> bool {
        matches!(self.compression_method, CompressionMethod::Stored)
    }

    pub fn is_deflated(&self) -> bool {
        matches!(self.compression_method, CompressionMethod::Deflate)
    }
}
