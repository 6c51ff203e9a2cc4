//! MaxMind DB (MMDB) Reader
//!
//! This module provides the pieces needed to read MaxMind DB files:
//!
//! - **types**: MMDB-specific constants, record widths and IP versions
//! - **format**: metadata marker search and metadata decoding
//! - **tree**: search tree traversal for IP lookups
//!
//! Data decoding is shared with `crate::data_section::DataDecoder`; the
//! metadata block is encoded in the same format as record data.

pub mod format;
pub mod tree;
pub mod types;

pub use format::{find_metadata_marker, DatabaseMetadata};
pub use tree::{Ipv4StartCache, SearchTree};
pub use types::{IpVersion, RecordSize, METADATA_MARKER};
