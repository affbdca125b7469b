use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{Read, Write};

use crate::error::{Error, Result};

/// The compression method of a ZIP entry, which may be one this crate
/// doesn't know how to decode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unsupported(u16),
}

impl From<u16> for CompressionMethod {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::Stored,
            8 => Self::Deflate,
            other => Self::Unsupported(other),
        }
    }
}

impl From<CompressionMethod> for u16 {
    fn from(value: CompressionMethod) -> Self {
        match value {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unsupported(other) => other,
        }
    }
}

/// General-purpose bit flag accessors (ZIP appnote 4.4.4).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GeneralPurposeFlags(pub u16);

impl GeneralPurposeFlags {
    /// Bit 3: sizes/CRC were unknown when the local header was written and
    /// are instead carried in a trailing data descriptor. spec.md §9 says a
    /// port should fail fast on this rather than silently mis-parse.
    pub fn has_data_descriptor(&self) -> bool {
        self.0 & 0x0008 != 0
    }

    /// Bits 1-2, meaningful only for DEFLATE: the four "compression level
    /// hints" a compressor may record (0 = normal, 1 = maximum, 2 = fast,
    /// 3 = super fast). Informational only; the reproducibility oracle does
    /// its own brute-force search rather than trusting this hint.
    pub fn deflate_level_hint(&self) -> u8 {
        ((self.0 >> 1) & 0b11) as u8
    }
}

// ZIP end-of-central-directory record.
#[derive(Clone, Debug)]
pub struct EndOfCentDir {
    pub cent_dir_records: u16,
    pub cent_dir_size: u32,
    pub cent_dir_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentDir {
    pub const HEADER: u32 = 0x06054b50;
    pub const MIN_SIZE: u64 = 22;
    pub const COMMENT_LENGTH_FIELD_OFFSET: u64 = 20;

    pub fn read(data: &mut impl Read) -> Result<Self> {
        if data.read_u32::<LE>()? != Self::HEADER {
            return Err(Error::MalformedArchive("invalid EOCD signature".into()));
        }

        let disk_num = data.read_u16::<LE>()?;
        let start_of_cd_disk = data.read_u16::<LE>()?;
        let cd_records_on_disk = data.read_u16::<LE>()?;

        let mut result = Self {
            cent_dir_records: data.read_u16::<LE>()?,
            cent_dir_size: data.read_u32::<LE>()?,
            cent_dir_offset: data.read_u32::<LE>()?,
            comment: vec![0u8; data.read_u16::<LE>()? as usize],
        };
        data.read_exact(&mut result.comment)?;

        if result.cent_dir_records != cd_records_on_disk || start_of_cd_disk != 0 || disk_num != 0
        {
            return Err(Error::UnsupportedArchive("multi-disk archives".into()));
        }

        Ok(result)
    }

    pub fn write(&self, data: &mut impl Write) -> Result<()> {
        data.write_u32::<LE>(Self::HEADER)?;
        data.write_u16::<LE>(0)?;
        data.write_u16::<LE>(0)?;
        data.write_u16::<LE>(self.cent_dir_records)?;
        data.write_u16::<LE>(self.cent_dir_records)?;
        data.write_u32::<LE>(self.cent_dir_size)?;
        data.write_u32::<LE>(self.cent_dir_offset)?;
        data.write_u16::<LE>(self.comment.len() as u16)?;
        data.write_all(&self.comment)?;
        Ok(())
    }
}

// ZIP central directory file header.
#[derive(Clone, Debug)]
pub struct CentDirHeader {
    pub version_needed: u16,
    pub flags: GeneralPurposeFlags,
    pub compression_method: CompressionMethod,
    pub last_modified: u32,
    pub crc32: u32,
    pub compressed_len: u32,
    pub uncompressed_len: u32,
    pub local_header_offset: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentDirHeader {
    pub const HEADER: u32 = 0x02014b50;
    pub const ZIP64_SENTINEL: u32 = 0xFFFFFFFF;

    pub fn read(data: &mut impl Read) -> Result<Self> {
        if data.read_u32::<LE>()? != Self::HEADER {
            return Err(Error::MalformedArchive(
                "invalid central directory header signature".into(),
            ));
        }

        let _version_made_by = data.read_u16::<LE>()?;
        let version_needed = data.read_u16::<LE>()?;
        let flags = GeneralPurposeFlags(data.read_u16::<LE>()?);
        let compression_method = CompressionMethod::from(data.read_u16::<LE>()?);
        let last_modified = data.read_u32::<LE>()?;
        let crc32 = data.read_u32::<LE>()?;
        let compressed_len = data.read_u32::<LE>()?;
        let uncompressed_len = data.read_u32::<LE>()?;

        if compressed_len == Self::ZIP64_SENTINEL || uncompressed_len == Self::ZIP64_SENTINEL {
            return Err(Error::UnsupportedArchive("ZIP64 entries".into()));
        }

        let mut file_name = vec![0u8; data.read_u16::<LE>()? as usize];
        let mut extra_field = vec![0u8; data.read_u16::<LE>()? as usize];
        let mut comment = vec![0u8; data.read_u16::<LE>()? as usize];

        if data.read_u16::<LE>()? != 0 {
            return Err(Error::UnsupportedArchive("multi-disk archives".into()));
        }
        let _internal_attrs = data.read_u16::<LE>()?;
        let _external_attrs = data.read_u32::<LE>()?;
        let local_header_offset = data.read_u32::<LE>()?;

        if local_header_offset == Self::ZIP64_SENTINEL {
            return Err(Error::UnsupportedArchive("ZIP64 entries".into()));
        }

        data.read_exact(&mut file_name)?;
        data.read_exact(&mut extra_field)?;
        data.read_exact(&mut comment)?;

        Ok(Self {
            version_needed,
            flags,
            compression_method,
            last_modified,
            crc32,
            compressed_len,
            uncompressed_len,
            local_header_offset,
            file_name,
            extra_field,
            comment,
        })
    }

    pub fn write(&self, data: &mut impl Write) -> Result<()> {
        data.write_u32::<LE>(Self::HEADER)?;
        data.write_u16::<LE>(0)?; // version made by: no host-specific attributes recorded
        data.write_u16::<LE>(self.version_needed)?;
        data.write_u16::<LE>(self.flags.0)?;
        data.write_u16::<LE>(self.compression_method.into())?;
        data.write_u32::<LE>(self.last_modified)?;
        data.write_u32::<LE>(self.crc32)?;
        data.write_u32::<LE>(self.compressed_len)?;
        data.write_u32::<LE>(self.uncompressed_len)?;
        data.write_u16::<LE>(self.file_name.len() as u16)?;
        data.write_u16::<LE>(self.extra_field.len() as u16)?;
        data.write_u16::<LE>(self.comment.len() as u16)?;
        data.write_u16::<LE>(0)?; // disk number
        data.write_u16::<LE>(0)?; // internal attrs
        data.write_u32::<LE>(0)?; // external attrs
        data.write_u32::<LE>(self.local_header_offset)?;
        data.write_all(&self.file_name)?;
        data.write_all(&self.extra_field)?;
        data.write_all(&self.comment)?;
        Ok(())
    }
}

// ZIP local file header.
#[derive(Clone, Debug)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: GeneralPurposeFlags,
    pub compression_method: CompressionMethod,
    pub last_modified: u32,
    pub crc32: u32,
    pub compressed_len: u32,
    pub uncompressed_len: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
}

impl LocalFileHeader {
    pub const HEADER: u32 = 0x04034b50;

    pub fn read(data: &mut impl Read) -> Result<Self> {
        if data.read_u32::<LE>()? != Self::HEADER {
            return Err(Error::MalformedArchive(
                "invalid local file header signature".into(),
            ));
        }

        let version_needed = data.read_u16::<LE>()?;
        let flags = GeneralPurposeFlags(data.read_u16::<LE>()?);
        let compression_method = CompressionMethod::from(data.read_u16::<LE>()?);
        let last_modified = data.read_u32::<LE>()?;
        let crc32 = data.read_u32::<LE>()?;
        let compressed_len = data.read_u32::<LE>()?;
        let uncompressed_len = data.read_u32::<LE>()?;

        let mut file_name = vec![0u8; data.read_u16::<LE>()? as usize];
        let mut extra_field = vec![0u8; data.read_u16::<LE>()? as usize];
        data.read_exact(&mut file_name)?;
        data.read_exact(&mut extra_field)?;

        Ok(Self {
            version_needed,
            flags,
            compression_method,
            last_modified,
            crc32,
            compressed_len,
            uncompressed_len,
            file_name,
            extra_field,
        })
    }

    pub fn write(&self, data: &mut impl Write) -> Result<()> {
        data.write_u32::<LE>(Self::HEADER)?;
        data.write_u16::<LE>(self.version_needed)?;
        data.write_u16::<LE>(self.flags.0)?;
        data.write_u16::<LE>(self.compression_method.into())?;
        data.write_u32::<LE>(self.last_modified)?;
        data.write_u32::<LE>(self.crc32)?;
        data.write_u32::<LE>(self.compressed_len)?;
        data.write_u32::<LE>(self.uncompressed_len)?;
        data.write_u16::<LE>(self.file_name.len() as u16)?;
        data.write_u16::<LE>(self.extra_field.len() as u16)?;
        data.write_all(&self.file_name)?;
        data.write_all(&self.extra_field)?;
        Ok(())
    }
}
