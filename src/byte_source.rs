//! Read-only byte storage for database files.
//!
//! A database is backed either by a memory-mapped file or by an owned buffer
//! (files read eagerly, or bytes handed in by tests). Both expose the same
//! bounds-checked read primitive, which every decoder path goes through so
//! that a corrupt offset becomes a [`GeoIpError::Format`] instead of a panic.
//!
//! # Example
//!
//! ```no_run
//! use geoip::byte_source::ByteSource;
//!
//! let source = ByteSource::open("GeoLite2-City.mmdb", true)?;
//! let head = source.read_bytes(0, 6)?;
//! println!("First node: {:02x?} ({} bytes total)", head, source.len());
//! # Ok::<(), geoip::GeoIpError>(())
//! ```

use crate::error::{GeoIpError, Result};
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::path::Path;

/// Storage for database bytes - either owned or memory-mapped
pub enum ByteSource {
    /// Bytes held in memory
    Owned(Vec<u8>),
    /// Read-only mapping of a file
    Mmap(Mmap),
}

impl ByteSource {
    /// Open a file, mapping it read-only when `use_mmap` is set and reading it
    /// into memory otherwise.
    pub fn open<P: AsRef<Path>>(path: P, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        if !use_mmap {
            return Ok(ByteSource::Owned(std::fs::read(path)?));
        }

        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and never handed out mutably. A
        // concurrent writer truncating the file is outside what we can guard.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(ByteSource::Mmap(mmap))
    }

    /// Wrap an in-memory buffer
    pub fn from_vec(data: Vec<u8>) -> Self {
        ByteSource::Owned(data)
    }

    /// The full byte view
    pub fn as_slice(&self) -> &[u8] {
        match self {
            ByteSource::Owned(v) => v.as_slice(),
            ByteSource::Mmap(m) => &m[..],
        }
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True if the source holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when backed by a file mapping
    pub fn is_mapped(&self) -> bool {
        matches!(self, ByteSource::Mmap(_))
    }

    /// Bounds-checked sub-slice
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&[u8]> {
        read_bytes(self.as_slice(), offset, len)
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSource")
            .field("size", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

/// Return `len` bytes starting at `offset`, or a format error if that range
/// is not entirely inside `buf`.
#[inline]
pub fn read_bytes(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .map(|end| &buf[offset..end])
        .ok_or_else(|| {
            GeoIpError::Format(format!(
                "read of {} bytes at offset {} exceeds buffer size {}",
                len,
                offset,
                buf.len()
            ))
        })
}

/// Single byte at `offset`, bounds-checked
#[inline]
pub fn read_u8(buf: &[u8], offset: usize) -> Result<u8> {
    buf.get(offset).copied().ok_or_else(|| {
        GeoIpError::Format(format!(
            "read at offset {} exceeds buffer size {}",
            offset,
            buf.len()
        ))
    })
}
