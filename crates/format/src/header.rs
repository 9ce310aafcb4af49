//! File header at logical offset 0.
//!
//! # Layout (48 bytes, little-endian)
//!
//! ```text
//! ┌──────────────┬────────────┬────────────┬──────────────┬──────────────┬──────────────┬────────────┐
//! │ "ASTM-E57"(8)│ major (4)  │ minor (4)  │ physical (8) │ xml off (8)  │ xml len (8)  │ page sz (8)│
//! └──────────────┴────────────┴────────────┴──────────────┴──────────────┴──────────────┴────────────┘
//! ```
//!
//! The remainder of the first page's payload is reserved and written as
//! zeros. The XML offset is *logical* (unchecksummed coordinate space); the
//! file length is *physical*.

use crate::paged::{PAGE_SIZE, PAYLOAD_PER_PAGE};
use e57_core::{Error, ErrorKind, Result};

/// Signature bytes at the start of every file: `ASTM-E57`.
pub const FILE_SIGNATURE: [u8; 8] = *b"ASTM-E57";

/// Major version written and accepted by this implementation.
pub const VERSION_MAJOR: u32 = 1;

/// Minor version written by this implementation.
pub const VERSION_MINOR: u32 = 0;

/// Serialized header size in bytes.
pub const FILE_HEADER_SIZE: usize = 48;

/// Parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Major format version.
    pub version_major: u32,
    /// Minor format version.
    pub version_minor: u32,
    /// Total physical file length in bytes (whole pages).
    pub physical_length: u64,
    /// Logical offset of the XML section.
    pub xml_logical_offset: u64,
    /// Byte length of the XML section.
    pub xml_logical_length: u64,
    /// Physical page size used by the file.
    pub page_size: u64,
}

impl FileHeader {
    /// Header written at file creation, before the XML section exists.
    ///
    /// The XML offset and length are zero until `close` patches them.
    pub fn placeholder() -> Self {
        FileHeader {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            physical_length: PAGE_SIZE as u64,
            xml_logical_offset: 0,
            xml_logical_length: 0,
            page_size: PAGE_SIZE as u64,
        }
    }

    /// Serialize to the fixed 48-byte layout.
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        bytes[0..8].copy_from_slice(&FILE_SIGNATURE);
        bytes[8..12].copy_from_slice(&self.version_major.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.version_minor.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.physical_length.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.xml_logical_offset.to_le_bytes());
        bytes[32..40].copy_from_slice(&self.xml_logical_length.to_le_bytes());
        bytes[40..48].copy_from_slice(&self.page_size.to_le_bytes());
        bytes
    }

    /// Deserialize from the fixed layout, checking signature and version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(Error::new(
                ErrorKind::BadFileLength,
                format!("header needs {FILE_HEADER_SIZE} bytes, have {}", bytes.len()),
            ));
        }
        if bytes[0..8] != FILE_SIGNATURE {
            return Err(Error::new(
                ErrorKind::BadFileSignature,
                "file does not start with \"ASTM-E57\"",
            ));
        }
        let header = FileHeader {
            version_major: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            version_minor: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
            physical_length: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            xml_logical_offset: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
            xml_logical_length: u64::from_le_bytes(bytes[32..40].try_into().unwrap()),
            page_size: u64::from_le_bytes(bytes[40..48].try_into().unwrap()),
        };
        if header.version_major != VERSION_MAJOR {
            return Err(Error::new(
                ErrorKind::UnknownFileVersion,
                format!(
                    "file is version {}.{}, reader supports major version {VERSION_MAJOR}",
                    header.version_major, header.version_minor
                ),
            ));
        }
        Ok(header)
    }

    /// Validate recorded values against the actual file.
    ///
    /// Checked on open-for-read: page size power of two, recorded physical
    /// length matching the file, XML section page-aligned and inside the
    /// logical space.
    pub fn validate(&self, actual_physical_length: u64) -> Result<()> {
        if !self.page_size.is_power_of_two() || self.page_size != PAGE_SIZE as u64 {
            return Err(Error::new(
                ErrorKind::BadConfiguration,
                format!("unsupported page size {}", self.page_size),
            ));
        }
        if self.physical_length != actual_physical_length {
            return Err(Error::new(
                ErrorKind::BadFileLength,
                format!(
                    "header records {} physical bytes, file has {actual_physical_length}",
                    self.physical_length
                ),
            ));
        }
        if self.xml_logical_offset % PAYLOAD_PER_PAGE as u64 != 0 {
            return Err(Error::new(
                ErrorKind::BadFileLength,
                format!(
                    "XML offset {} is not page-aligned",
                    self.xml_logical_offset
                ),
            ));
        }
        let page_count = self.physical_length / PAGE_SIZE as u64;
        let logical_capacity = page_count * PAYLOAD_PER_PAGE as u64;
        let xml_end = self
            .xml_logical_offset
            .checked_add(self.xml_logical_length)
            .ok_or_else(|| Error::new(ErrorKind::BadFileLength, "XML section overflows"))?;
        if self.xml_logical_length == 0 || xml_end > logical_capacity {
            return Err(Error::new(
                ErrorKind::BadFileLength,
                format!(
                    "XML section [{}, {xml_end}) outside logical capacity {logical_capacity}",
                    self.xml_logical_offset
                ),
            ));
        }
        Ok(())
    }
}
