//! Error types for the geoip reader

use thiserror::Error;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, GeoIpError>;

/// Main error type for database operations
///
/// Errors raised while opening a database (`Io`, `Format`) mean no handle was
/// produced. Errors raised by a single lookup (`Format` from a corrupt data
/// section, `Lookup`, `InvalidIp`) leave the database usable for other
/// addresses.
#[derive(Debug, Error)]
pub enum GeoIpError {
    /// The file could not be opened, read or mapped
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or truncated database contents
    #[error("Format error: {0}")]
    Format(String),

    /// The search tree could not be walked (e.g. it contains a cycle)
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// The query string is neither an IPv4 nor an IPv6 address
    #[error("Invalid IP address: {0}")]
    InvalidIp(String),

    /// The database handle was closed
    #[error("Database is closed")]
    Closed,

    /// A packaged database loader failed
    #[error("Failed to load database: {0}")]
    Load(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GeoIpError {
    /// True for corruption in the file itself
    pub fn is_format(&self) -> bool {
        matches!(self, GeoIpError::Format(_))
    }

    /// True for failures walking the search tree
    pub fn is_lookup(&self) -> bool {
        matches!(self, GeoIpError::Lookup(_))
    }

    /// True when the caller passed something that is not an IP address
    pub fn is_invalid_ip(&self) -> bool {
        matches!(self, GeoIpError::InvalidIp(_))
    }
}

impl From<toml::de::Error> for GeoIpError {
    fn from(err: toml::de::Error) -> Self {
        GeoIpError::Config(err.to_string())
    }
}
