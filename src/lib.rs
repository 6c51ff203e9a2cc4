//! GeoIP - MaxMind DB Reader
//!
//! A read-only reader for MaxMind DB (`.mmdb`) files such as GeoLite2-City
//! and GeoLite2-Country. Given an IPv4 or IPv6 address it walks the file's
//! binary search tree and decodes the geographic record stored for the
//! network containing that address.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use geoip::open_database;
//!
//! let db = open_database("GeoLite2-City.mmdb")?;
//!
//! if let Some(info) = db.lookup("81.2.69.142")? {
//!     println!("country:   {:?}", info.country());
//!     println!("continent: {:?}", info.continent());
//!     println!("location:  {:?}", info.location());
//! }
//!
//! let meta = db.get_metadata()?;
//! println!("{} nodes, {}-bit records", meta.node_count, meta.record_size.bits());
//! # Ok::<(), geoip::GeoIpError>(())
//! ```
//!
//! # Key Features
//!
//! - **Zero-Copy Loading**: files are memory-mapped by default
//! - **Full Type Coverage**: every mmdb data type, including 128-bit integers
//! - **Corruption Tolerant**: a damaged record fails only the lookup that reaches it
//! - **Lazy Databases**: packaged databases are opened on first use
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  MaxMind DB File                     │
//! ├──────────────────────────────────────┤
//! │  1. Search Tree (binary trie)        │
//! │  2. 16-byte separator                │
//! │  3. Data Section (tagged values)     │
//! │  4. Metadata marker + metadata map   │
//! └──────────────────────────────────────┘
//!          ↓ mmap() or read()
//! ┌──────────────────────────────────────┐
//! │  ByteSource → SearchTree → Decoder   │
//! │             → IpInfo                 │
//! └──────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Owned or memory-mapped database bytes
pub mod byte_source;
/// Reader configuration
pub mod config;
/// Data section decoding
pub mod data_section;
/// Database handles
pub mod database;
/// Big-endian helpers and address packing
pub mod endian;
/// Error types
pub mod error;
/// MMDB metadata and search tree
pub mod mmdb;
/// Lazily loaded databases
pub mod packaged;
/// Lookup results
pub mod record;

// Re-exports for Rust consumers

pub use crate::config::GeoIpConfig;
pub use crate::data_section::{DataMap, DataValue};
pub use crate::database::{open_database, Database, DatabaseInfo, MaxMindDatabase, OpenOptions};
pub use crate::error::{GeoIpError, Result};
pub use crate::mmdb::DatabaseMetadata;
pub use crate::packaged::LazyDatabase;
pub use crate::record::{IpInfo, IpInfoSummary};

// Version information
/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library major version
pub const VERSION_MAJOR: u32 = 0;

/// Library minor version
pub const VERSION_MINOR: u32 = 3;

/// Library patch version
pub const VERSION_PATCH: u32 = 0;
