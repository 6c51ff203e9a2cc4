//! MMDB-specific Type Definitions

use crate::error::{GeoIpError, Result};

/// MMDB metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// The metadata block must start within this many bytes of the end of file
pub const METADATA_SEARCH_WINDOW: usize = 128 * 1024;

/// Gap between the search tree and the data section
pub const DATA_SECTION_SEPARATOR_SIZE: usize = 16;

/// IP version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    /// IPv4 only
    V4,
    /// IPv6 (IPv4 addresses live under the `::/96` prefix)
    V6,
}

impl IpVersion {
    /// Create from the metadata `ip_version` value
    pub fn from_number(version: u64) -> Result<Self> {
        match version {
            4 => Ok(IpVersion::V4),
            6 => Ok(IpVersion::V6),
            _ => Err(GeoIpError::Format(format!(
                "unsupported ip_version: {}",
                version
            ))),
        }
    }

    /// 4 or 6
    pub fn number(self) -> u8 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }

    /// Width of an address in this tree, in bits
    pub fn bit_len(self) -> usize {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }
}

/// Record size in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    Bits24 = 24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28 = 28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32 = 32,
}

impl RecordSize {
    /// Get the size of a node (2 records) in bytes
    pub fn node_bytes(self) -> usize {
        self.bits() / 4
    }

    /// Record width in bits
    pub fn bits(self) -> usize {
        self as usize
    }

    /// Create from bit size
    pub fn from_bits(bits: u64) -> Result<Self> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(GeoIpError::Format(format!(
                "unsupported record size: {} bits",
                bits
            ))),
        }
    }
}
