//! Databases opened on first use
//!
//! A [`LazyDatabase`] holds a loader instead of an open file. The first
//! call that needs data runs the loader under a mutex; afterwards every call
//! goes straight to the loaded database without locking. A failed load is
//! reported to that caller and retried by the next one.
//!
//! ```no_run
//! use geoip::packaged::LazyDatabase;
//!
//! let geolite2 = LazyDatabase::from_path("geolite2", "/usr/share/GeoIP/GeoLite2-City.mmdb");
//! // Nothing has been opened yet
//! assert!(!geolite2.is_loaded());
//! let hit = geolite2.lookup("8.8.8.8")?;
//! # Ok::<(), geoip::GeoIpError>(())
//! ```

use crate::database::{DatabaseInfo, MaxMindDatabase};
use crate::error::{GeoIpError, Result};
use crate::mmdb::DatabaseMetadata;
use crate::record::IpInfo;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

type Loader = Box<dyn Fn() -> Result<MaxMindDatabase> + Send + Sync>;

/// A database whose file is opened by `loader` the first time it's needed
pub struct LazyDatabase {
    name: String,
    loader: Loader,
    loaded: OnceLock<MaxMindDatabase>,
    load_lock: Mutex<()>,
}

impl LazyDatabase {
    /// Create a lazy database named `name` that calls `loader` on first use
    pub fn new<F>(name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Result<MaxMindDatabase> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            loader: Box::new(loader),
            loaded: OnceLock::new(),
            load_lock: Mutex::new(()),
        }
    }

    /// Lazy database backed by a file on disk
    pub fn from_path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(name, move || MaxMindDatabase::open(&path))
    }

    /// Name given at construction
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the loader has succeeded
    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// The loaded database, running the loader if needed
    pub fn get(&self) -> Result<&MaxMindDatabase> {
        if let Some(db) = self.loaded.get() {
            return Ok(db);
        }

        // A panicking loader leaves nothing half-initialised behind the lock
        let _guard = self
            .load_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(db) = self.loaded.get() {
            return Ok(db);
        }

        log::debug!("Loading packaged database {:?}", self.name);
        let db = (self.loader)()
            .map_err(|e| GeoIpError::Load(format!("{}: {}", self.name, e)))?;
        Ok(self.loaded.get_or_init(|| db))
    }

    /// Look up an IP address given as a string
    pub fn lookup(&self, ip: &str) -> Result<Option<IpInfo>> {
        self.get()?.lookup(ip)
    }

    /// Look up a parsed IP address
    pub fn lookup_addr(&self, addr: IpAddr) -> Result<Option<IpInfo>> {
        self.get()?.lookup_addr(addr)
    }

    /// Metadata of the loaded database
    pub fn get_metadata(&self) -> Result<&DatabaseMetadata> {
        Ok(self.get()?.get_metadata())
    }

    /// Info of the loaded database
    pub fn get_info(&self) -> Result<DatabaseInfo> {
        Ok(self.get()?.get_info())
    }

    /// Packaged databases stay open for the life of the handle
    pub fn close(&mut self) {}
}

impl fmt::Debug for LazyDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyDatabase")
            .field("name", &self.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
