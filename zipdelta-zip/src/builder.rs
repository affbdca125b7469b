use byteorder::WriteBytesExt;
use std::io::{Cursor, Write};

use crate::crc::crc_bytes;
use crate::data::{CentDirHeader, CompressionMethod, EndOfCentDir, GeneralPurposeFlags, LocalFileHeader};
use crate::error::Result;

const VERSION_NEEDED_TO_EXTRACT: u16 = 0x0014;

/// A minimal in-memory ZIP writer, used to build the synthetic archives in
/// this crate's and `zipdelta-core`'s test suites. Mirrors `mbf-zip`'s
/// `write_file`/`save` pair, stripped of the APK-specific store alignment
/// and V2 signing it layers on top (those are APK-packaging concerns, not
/// part of this spec).
#[derive(Default)]
pub struct ZipBuilder {
    out: Vec<u8>,
    cd_headers: Vec<CentDirHeader>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a file entry with the given raw bytes, compressing with
    /// DEFLATE unless `method` is `Stored`.
    pub fn add_entry(&mut self, name: &str, contents: &[u8], method: CompressionMethod) -> Result<()> {
        self.add_entry_with_flags(name, contents, method, GeneralPurposeFlags(0))
    }

    pub fn add_entry_with_flags(
        &mut self,
        name: &str,
        contents: &[u8],
        method: CompressionMethod,
        flags: GeneralPurposeFlags,
    ) -> Result<()> {
        let lfh_offset = self.out.len() as u32;
        let crc32 = crc_bytes(contents);
        let compressed = compress(contents, method);

        let lfh = LocalFileHeader {
            version_needed: VERSION_NEEDED_TO_EXTRACT,
            flags,
            compression_method: method,
            last_modified: 0,
            crc32,
            compressed_len: compressed.len() as u32,
            uncompressed_len: contents.len() as u32,
            file_name: name.as_bytes().to_vec(),
            extra_field: Vec::new(),
        };

        lfh.write(&mut self.out)?;
        self.out.write_all(&compressed)?;

        self.cd_headers.push(CentDirHeader {
            version_needed: VERSION_NEEDED_TO_EXTRACT,
            flags,
            compression_method: method,
            last_modified: 0,
            crc32,
            compressed_len: compressed.len() as u32,
            uncompressed_len: contents.len() as u32,
            local_header_offset: lfh_offset,
            file_name: name.as_bytes().to_vec(),
            extra_field: Vec::new(),
            comment: Vec::new(),
        });

        Ok(())
    }

    /// Appends a file entry with pre-compressed bytes, trusting the caller
    /// to have supplied a `crc32`/`uncompressed_len` that actually match.
    /// Used by tests that need fine control over the compressed byte stream
    /// (e.g. to construct a non-reproducible DEFLATE entry).
    pub fn add_raw_entry(
        &mut self,
        name: &str,
        compressed: &[u8],
        crc32: u32,
        uncompressed_len: u32,
        method: CompressionMethod,
    ) -> Result<()> {
        let lfh_offset = self.out.len() as u32;
        let flags = GeneralPurposeFlags(0);

        let lfh = LocalFileHeader {
            version_needed: VERSION_NEEDED_TO_EXTRACT,
            flags,
            compression_method: method,
            last_modified: 0,
            crc32,
            compressed_len: compressed.len() as u32,
            uncompressed_len,
            file_name: name.as_bytes().to_vec(),
            extra_field: Vec::new(),
        };
        lfh.write(&mut self.out)?;
        self.out.write_all(compressed)?;

        self.cd_headers.push(CentDirHeader {
            version_needed: VERSION_NEEDED_TO_EXTRACT,
            flags,
            compression_method: method,
            last_modified: 0,
            crc32,
            compressed_len: compressed.len() as u32,
            uncompressed_len,
            local_header_offset: lfh_offset,
            file_name: name.as_bytes().to_vec(),
            extra_field: Vec::new(),
            comment: Vec::new(),
        });

        Ok(())
    }

    /// Finalises the archive: writes the central directory and EOCD, and
    /// returns the full archive bytes.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let cd_offset = self.out.len() as u32;

        let mut cd_bytes = Cursor::new(Vec::new());
        for header in &self.cd_headers {
            header.write(&mut cd_bytes)?;
        }
        let cd_bytes = cd_bytes.into_inner();

        self.out.write_all(&cd_bytes)?;

        let eocd = EndOfCentDir {
            cent_dir_records: self.cd_headers.len() as u16,
            cent_dir_size: cd_bytes.len() as u32,
            cent_dir_offset: cd_offset,
            comment: Vec::new(),
        };
        eocd.write(&mut self.out)?;

        Ok(self.out)
    }
}

fn compress(contents: &[u8], method: CompressionMethod) -> Vec<u8> {
    match method {
        CompressionMethod::Stored => contents.to_vec(),
        CompressionMethod::Deflate => {
            use flate2::write::DeflateEncoder;
            use flate2::Compression;
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(6));
            encoder.write_all(contents).expect("in-memory write");
            encoder.finish().expect("in-memory deflate")
        }
        CompressionMethod::Unsupported(_) => contents.to_vec(),
    }
}
