//! Reader configuration
//!
//! Configuration is read from TOML. Every key is optional:
//!
//! ```toml
//! database_path = "/usr/share/GeoIP/GeoLite2-City.mmdb"
//! use_mmap = true
//! max_decode_depth = 128
//! ```
//!
//! When `database_path` is missing or empty, [`GeoIpConfig::open`] returns
//! `Ok(None)`: no database is configured and lookups are simply unavailable.

use crate::data_section::DEFAULT_MAX_DEPTH;
use crate::database::{Database, MaxMindDatabase, OpenOptions};
use crate::error::{GeoIpError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// GeoIP reader configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeoIpConfig {
    /// mmdb file to open; unset or empty means no database
    pub database_path: Option<PathBuf>,
    /// Map the file instead of reading it into memory
    pub use_mmap: bool,
    /// Ceiling on nested maps/arrays and pointer hops while decoding
    pub max_decode_depth: usize,
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            use_mmap: true,
            max_decode_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl GeoIpConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: GeoIpConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            GeoIpError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.max_decode_depth == 0 {
            return Err(GeoIpError::Config(
                "max_decode_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured path, with an empty string treated as unset
    pub fn database_path(&self) -> Option<&Path> {
        self.database_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Open options derived from this configuration
    pub fn options(&self) -> OpenOptions {
        OpenOptions {
            use_mmap: self.use_mmap,
            max_decode_depth: self.max_decode_depth,
        }
    }

    /// Open the configured database, or `Ok(None)` if none is configured
    pub fn open(&self) -> Result<Option<Database>> {
        let Some(path) = self.database_path() else {
            log::debug!("No GeoIP database configured");
            return Ok(None);
        };
        let db = MaxMindDatabase::open_with_options(path, &self.options())?;
        Ok(Some(Database::FileBacked(db)))
    }
}
