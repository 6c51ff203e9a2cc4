//! Database API
//!
//! [`MaxMindDatabase`] is a single opened mmdb file: it owns the bytes,
//! the decoded metadata and the cached IPv4 start node, and answers
//! lookups by walking the search tree and decoding the record it lands on.
//!
//! [`Database`] is the handle most callers hold. It is either a file that
//! was opened eagerly or a [`LazyDatabase`] that opens its file on first use;
//! both answer the same calls.

use crate::byte_source::ByteSource;
use crate::data_section::{DataDecoder, DataValue, DEFAULT_MAX_DEPTH};
use crate::endian::{pack_ip, PackedAddress};
use crate::error::{GeoIpError, Result};
use crate::mmdb::{DatabaseMetadata, Ipv4StartCache, SearchTree};
use crate::packaged::LazyDatabase;
use crate::record::IpInfo;
use chrono::{DateTime, Utc};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Provider name reported for mmdb files
pub const MAXMIND_PROVIDER: &str = "maxmind";

/// How a database file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Map the file instead of reading it into memory
    pub use_mmap: bool,
    /// Ceiling on nested maps/arrays and pointer hops while decoding
    pub max_decode_depth: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            use_mmap: true,
            max_decode_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Descriptive information about a database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// File backing the database, if any
    pub filename: Option<PathBuf>,
    /// Build date from `build_epoch`
    pub date: Option<DateTime<Utc>>,
    /// Provider's database type, e.g. "GeoLite2-City"
    pub internal_name: Option<String>,
    /// Who produced the data
    pub provider: Option<String>,
}

/// An opened MaxMind DB file
pub struct MaxMindDatabase {
    filename: Option<PathBuf>,
    /// `None` once closed
    source: Option<ByteSource>,
    metadata: DatabaseMetadata,
    ipv4_start: Ipv4StartCache,
    max_decode_depth: usize,
}

impl MaxMindDatabase {
    /// Open a database file with default options (memory-mapped)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, &OpenOptions::default())
    }

    /// Open a database file
    ///
    /// Fails with [`GeoIpError::Io`] if the file can't be read or mapped and
    /// with [`GeoIpError::Format`] if its metadata is missing or invalid. No
    /// handle is returned for a file with bad metadata.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Opening database {}", path.display());
        let source = ByteSource::open(path, options.use_mmap)?;
        Self::from_source(source, Some(path.to_path_buf()), options)
    }

    /// Create a database from raw bytes
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_source(ByteSource::from_vec(data), None, &OpenOptions::default())
    }

    fn from_source(
        source: ByteSource,
        filename: Option<PathBuf>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let metadata = DatabaseMetadata::from_buffer(source.as_slice())?;
        log::debug!(
            "Loaded {} bytes: {} nodes, {}-bit records, IPv{}",
            source.len(),
            metadata.node_count,
            metadata.record_size.bits(),
            metadata.ip_version.number(),
        );

        Ok(Self {
            filename,
            source: Some(source),
            metadata,
            ipv4_start: Ipv4StartCache::new(),
            max_decode_depth: options.max_decode_depth,
        })
    }

    /// Look up an IP address given as a string
    ///
    /// Returns `Ok(None)` when the database has no entry for the address.
    /// A string that isn't an IPv4 or IPv6 address is
    /// [`GeoIpError::InvalidIp`]; nothing is read from the tree in that case.
    /// A well-formed IPv6 address against an IPv4-only database is
    /// [`GeoIpError::Lookup`].
    pub fn lookup(&self, ip: &str) -> Result<Option<IpInfo>> {
        let data = self.buffer()?;
        let packed = pack_ip(ip)?;
        self.lookup_packed(data, ip.to_string(), &packed)
    }

    /// Look up a parsed IP address
    pub fn lookup_addr(&self, addr: IpAddr) -> Result<Option<IpInfo>> {
        let data = self.buffer()?;
        self.lookup_packed(data, addr.to_string(), &PackedAddress::from(addr))
    }

    fn lookup_packed(
        &self,
        data: &[u8],
        ip: String,
        packed: &PackedAddress,
    ) -> Result<Option<IpInfo>> {
        let tree = SearchTree::new(data, &self.metadata, &self.ipv4_start);
        let offset = match tree.lookup(packed)? {
            Some(offset) => offset,
            None => return Ok(None),
        };

        let decoder = DataDecoder::new(data, self.metadata.tree_size())
            .with_max_depth(self.max_decode_depth);
        match decoder.decode(offset) {
            Ok(DataValue::Map(map)) => Ok(Some(IpInfo::new(ip, map))),
            Ok(other) => Err(GeoIpError::Format(format!(
                "record for {} at offset {} is not a map: {:?}",
                ip, offset, other
            ))),
            Err(e) => {
                log::warn!("Failed to decode record for {} at offset {}: {}", ip, offset, e);
                Err(e)
            }
        }
    }

    /// The decoded metadata
    pub fn get_metadata(&self) -> &DatabaseMetadata {
        &self.metadata
    }

    /// Filename, build date, database type and provider
    pub fn get_info(&self) -> DatabaseInfo {
        DatabaseInfo {
            filename: self.filename.clone(),
            date: self
                .metadata
                .build_epoch
                .and_then(|epoch| i64::try_from(epoch).ok())
                .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0)),
            internal_name: self.metadata.database_type.clone(),
            provider: Some(MAXMIND_PROVIDER.to_string()),
        }
    }

    /// File backing this database, if any
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Release the underlying bytes. Later lookups fail with
    /// [`GeoIpError::Closed`].
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            log::debug!("Closed database {:?}", self.filename);
        }
    }

    /// True once [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    fn buffer(&self) -> Result<&[u8]> {
        self.source
            .as_ref()
            .map(ByteSource::as_slice)
            .ok_or(GeoIpError::Closed)
    }
}

impl fmt::Debug for MaxMindDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaxMindDatabase")
            .field("filename", &self.filename)
            .field("source", &self.source)
            .field("node_count", &self.metadata.node_count)
            .field("record_size", &self.metadata.record_size)
            .field("ip_version", &self.metadata.ip_version)
            .finish()
    }
}

/// A database handle: either an opened file or one loaded on first use
///
/// # Examples
///
/// ```no_run
/// use geoip::open_database;
///
/// let db = open_database("GeoLite2-City.mmdb")?;
/// if let Some(info) = db.lookup("8.8.8.8")? {
///     println!("{:?} {:?}", info.country(), info.location());
/// }
/// # Ok::<(), geoip::GeoIpError>(())
/// ```
#[derive(Debug)]
pub enum Database {
    /// A file opened up front
    FileBacked(MaxMindDatabase),
    /// A database opened by its loader on first use
    Lazy(LazyDatabase),
}

impl Database {
    /// Open an mmdb file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        MaxMindDatabase::open(path).map(Database::FileBacked)
    }

    /// Look up an IP address given as a string
    pub fn lookup(&self, ip: &str) -> Result<Option<IpInfo>> {
        match self {
            Database::FileBacked(db) => db.lookup(ip),
            Database::Lazy(db) => db.lookup(ip),
        }
    }

    /// Look up a parsed IP address
    pub fn lookup_addr(&self, addr: IpAddr) -> Result<Option<IpInfo>> {
        match self {
            Database::FileBacked(db) => db.lookup_addr(addr),
            Database::Lazy(db) => db.lookup_addr(addr),
        }
    }

    /// The decoded metadata (loads a lazy database)
    pub fn get_metadata(&self) -> Result<&DatabaseMetadata> {
        match self {
            Database::FileBacked(db) => Ok(db.get_metadata()),
            Database::Lazy(db) => db.get_metadata(),
        }
    }

    /// Filename, build date, database type and provider (loads a lazy database)
    pub fn get_info(&self) -> Result<DatabaseInfo> {
        match self {
            Database::FileBacked(db) => Ok(db.get_info()),
            Database::Lazy(db) => db.get_info(),
        }
    }

    /// Close the handle. A lazy database ignores this.
    pub fn close(&mut self) {
        match self {
            Database::FileBacked(db) => db.close(),
            Database::Lazy(db) => db.close(),
        }
    }

    /// True if lookups will fail with [`GeoIpError::Closed`]
    pub fn is_closed(&self) -> bool {
        match self {
            Database::FileBacked(db) => db.is_closed(),
            Database::Lazy(_) => false,
        }
    }
}

impl From<MaxMindDatabase> for Database {
    fn from(db: MaxMindDatabase) -> Self {
        Database::FileBacked(db)
    }
}

impl From<LazyDatabase> for Database {
    fn from(db: LazyDatabase) -> Self {
        Database::Lazy(db)
    }
}

/// Open a MaxMind DB file
pub fn open_database<P: AsRef<Path>>(path: P) -> Result<Database> {
    Database::open(path)
}
