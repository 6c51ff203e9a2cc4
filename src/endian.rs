//! Big-endian unpacking and IP address packing
//!
//! Every multi-byte integer in an mmdb file is big-endian, and many of them
//! are stored in fewer bytes than their type (a `uint32` may occupy 0..=4
//! bytes, a 24-bit tree record 3). The helpers here left-pad short inputs
//! with zeroes before interpreting them, which is how the format defines them.
//!
//! Addresses are packed into their raw network-order bytes so the search
//! tree can read them bit by bit, most significant bit first.
//!
//! ```rust
//! use geoip::endian::{be_uint, pack_ip};
//!
//! assert_eq!(be_uint(&[0x01, 0x02]), 0x0102);
//! let packed = pack_ip("192.0.2.1")?;
//! assert_eq!(packed.bit_len(), 32);
//! assert_eq!(packed.bit(0), 1);
//! # Ok::<(), geoip::GeoIpError>(())
//! ```

use crate::error::{GeoIpError, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Interpret up to 16 bytes as a big-endian unsigned integer.
///
/// Callers are responsible for rejecting longer inputs; extra leading bytes
/// would otherwise be shifted out.
#[inline]
pub fn be_uint(bytes: &[u8]) -> u128 {
    bytes
        .iter()
        .fold(0u128, |acc, &b| (acc << 8) | u128::from(b))
}

/// Big-endian `u32` from at most 4 bytes, zero-padded on the left
#[inline]
pub fn be_u32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

/// Big-endian `i32` from at most 4 bytes, zero-padded on the left
#[inline]
pub fn be_i32(bytes: &[u8]) -> i32 {
    be_u32(bytes) as i32
}

/// Big-endian IEEE754 double from exactly 8 bytes
#[inline]
pub fn be_f64(bytes: [u8; 8]) -> f64 {
    f64::from_be_bytes(bytes)
}

/// Big-endian IEEE754 float from exactly 4 bytes
#[inline]
pub fn be_f32(bytes: [u8; 4]) -> f32 {
    f32::from_be_bytes(bytes)
}

/// An address in raw network byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackedAddress {
    /// 4 bytes, 32 bits to walk
    V4([u8; 4]),
    /// 16 bytes, 128 bits to walk
    V6([u8; 16]),
}

impl PackedAddress {
    /// The packed bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PackedAddress::V4(b) => b,
            PackedAddress::V6(b) => b,
        }
    }

    /// Number of address bits (32 or 128)
    pub fn bit_len(&self) -> usize {
        self.as_bytes().len() * 8
    }

    /// True for the 4-byte form
    pub fn is_v4(&self) -> bool {
        matches!(self, PackedAddress::V4(_))
    }

    /// Bit `index`, counting from the most significant bit of the first byte
    #[inline]
    pub fn bit(&self, index: usize) -> u8 {
        let byte = self.as_bytes()[index >> 3];
        (byte >> (7 - (index & 7))) & 1
    }
}

impl From<IpAddr> for PackedAddress {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => v4.into(),
            IpAddr::V6(v6) => v6.into(),
        }
    }
}

impl From<Ipv4Addr> for PackedAddress {
    fn from(addr: Ipv4Addr) -> Self {
        PackedAddress::V4(addr.octets())
    }
}

impl From<Ipv6Addr> for PackedAddress {
    fn from(addr: Ipv6Addr) -> Self {
        PackedAddress::V6(addr.octets())
    }
}

/// Pack an IP string into 4 or 16 raw bytes.
///
/// IPv4 is tried first, then IPv6. Anything else is
/// [`GeoIpError::InvalidIp`].
pub fn pack_ip(ip: &str) -> Result<PackedAddress> {
    if let Ok(v4) = ip.parse::<Ipv4Addr>() {
        return Ok(v4.into());
    }
    if let Ok(v6) = ip.parse::<Ipv6Addr>() {
        return Ok(v6.into());
    }
    Err(GeoIpError::InvalidIp(format!(
        "malformed IP address: {:?}",
        ip
    )))
}
