//! MMDB Binary Format Parsing
//!
//! Locates the metadata block at the tail of the file and decodes it into
//! [`DatabaseMetadata`]. The metadata is what sizes everything else: the
//! node count and record width give the search tree size, and the data
//! section starts right after the tree plus the 16-byte separator.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! [ search tree: node_count * node_size bytes ]
//! [ 16-byte separator                          ]
//! [ data section                               ]
//! [ "\xAB\xCD\xEFMaxMind.com" ][ metadata map  ]
//! ```

use super::types::{
    IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER, METADATA_SEARCH_WINDOW,
};
use crate::data_section::{DataDecoder, DataMap, DataValue};
use crate::error::{GeoIpError, Result};

/// Decoded database metadata
///
/// The typed fields are the ones the reader needs; everything else the
/// provider put in the map (description, languages, format version, ...)
/// stays reachable through [`DatabaseMetadata::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseMetadata {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28, or 32)
    pub record_size: RecordSize,
    /// IP version (4 or 6)
    pub ip_version: IpVersion,
    /// Provider's name for the database, e.g. "GeoLite2-City"
    pub database_type: Option<String>,
    /// Build time in unix seconds
    pub build_epoch: Option<u64>,
    raw: DataMap,
}

impl DatabaseMetadata {
    /// Find the metadata marker in `buffer` and decode the map after it.
    ///
    /// Fails with a format error if the marker is missing, the map is
    /// malformed, a required key is absent or mistyped, or the search tree
    /// it describes would not fit in the buffer.
    pub fn from_buffer(buffer: &[u8]) -> Result<Self> {
        let marker_offset = find_metadata_marker(buffer)?;
        let start = marker_offset + METADATA_MARKER.len();

        // Pointers inside the metadata are relative to the byte after the marker
        let value = DataDecoder::new(buffer, start)
            .decode(start)
            .map_err(|e| GeoIpError::Format(format!("failed to decode metadata: {}", e)))?;

        let raw = match value {
            DataValue::Map(map) => map,
            other => {
                return Err(GeoIpError::Format(format!(
                    "metadata is not a map: {:?}",
                    other
                )))
            }
        };

        let node_count = required_uint(&raw, "node_count")?;
        let node_count = u32::try_from(node_count).map_err(|_| {
            GeoIpError::Format(format!("node_count {} does not fit in a record", node_count))
        })?;
        let record_size = RecordSize::from_bits(required_uint(&raw, "record_size")?)?;
        let ip_version = IpVersion::from_number(required_uint(&raw, "ip_version")?)?;

        let database_type = match raw.get("database_type") {
            None => None,
            Some(DataValue::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(GeoIpError::Format(format!(
                    "database_type is not a string: {:?}",
                    other
                )))
            }
        };
        let build_epoch = match raw.get("build_epoch") {
            None => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| {
                GeoIpError::Format(format!("build_epoch is not an unsigned integer: {:?}", v))
            })?),
        };

        let metadata = DatabaseMetadata {
            node_count,
            record_size,
            ip_version,
            database_type,
            build_epoch,
            raw,
        };

        let data_start = metadata.data_section_start();
        if data_start > marker_offset {
            return Err(GeoIpError::Format(format!(
                "search tree of {} bytes overlaps metadata at offset {}",
                metadata.tree_size(),
                marker_offset
            )));
        }

        Ok(metadata)
    }

    /// Bytes per node (two records)
    pub fn node_size(&self) -> usize {
        self.record_size.node_bytes()
    }

    /// Size of the search tree in bytes
    pub fn tree_size(&self) -> usize {
        self.node_count as usize * self.node_size()
    }

    /// Absolute offset of the first data section byte
    pub fn data_section_start(&self) -> usize {
        self.tree_size() + DATA_SECTION_SEPARATOR_SIZE
    }

    /// Any metadata key, typed or not
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.raw.get(key)
    }

    /// The full metadata map in file order
    pub fn as_map(&self) -> &DataMap {
        &self.raw
    }

    /// `languages` as a list of locale codes
    pub fn languages(&self) -> Vec<&str> {
        self.raw
            .get("languages")
            .and_then(DataValue::as_array)
            .map(|langs| langs.iter().filter_map(DataValue::as_str).collect())
            .unwrap_or_default()
    }

    /// `description` in the given language
    pub fn description(&self, language: &str) -> Option<&str> {
        self.raw
            .get("description")
            .and_then(|d| d.get(language))
            .and_then(DataValue::as_str)
    }

    /// `binary_format_major_version` and `binary_format_minor_version`
    pub fn binary_format_version(&self) -> Option<(u64, u64)> {
        let major = self.raw.get("binary_format_major_version")?.as_u64()?;
        let minor = self.raw.get("binary_format_minor_version")?.as_u64()?;
        Some((major, minor))
    }
}

/// Find the metadata marker in an MMDB buffer.
///
/// The marker must appear within the last 128KB of the file; if there are
/// several, the last one wins. Returns the offset of the marker itself.
pub fn find_metadata_marker(buffer: &[u8]) -> Result<usize> {
    let search_start = buffer.len().saturating_sub(METADATA_SEARCH_WINDOW);
    memchr::memmem::rfind(&buffer[search_start..], METADATA_MARKER)
        .map(|pos| search_start + pos)
        .ok_or_else(|| GeoIpError::Format("metadata not found".to_string()))
}

fn required_uint(map: &DataMap, key: &str) -> Result<u64> {
    match map.get(key) {
        Some(value) => value.as_u64().ok_or_else(|| {
            GeoIpError::Format(format!("field '{}' is not an unsigned integer", key))
        }),
        None => Err(GeoIpError::Format(format!(
            "required field '{}' not found",
            key
        ))),
    }
}
