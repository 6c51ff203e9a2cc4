//! Lookup results
//!
//! [`IpInfo`] wraps the map decoded for a matched address and exposes the
//! handful of geographic fields callers usually want. Every accessor returns
//! `None` (or an empty set) when the database doesn't carry the field, so a
//! record from a country-only database degrades instead of failing.

use crate::data_section::{DataMap, DataValue};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Information about a looked-up IP address
#[derive(Debug, Clone, PartialEq)]
pub struct IpInfo {
    ip: String,
    data: DataMap,
}

/// Plain summary of an [`IpInfo`], see [`IpInfo::to_dict`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpInfoSummary {
    /// The address that was looked up
    pub ip: String,
    /// ISO country code
    pub country: Option<String>,
    /// Continent code
    pub continent: Option<String>,
    /// Subdivision ISO codes
    pub subdivisions: BTreeSet<String>,
    /// IANA time zone name
    pub timezone: Option<String>,
    /// `(latitude, longitude)`
    pub location: Option<(f64, f64)>,
}

impl IpInfo {
    /// Wrap a decoded record
    pub fn new(ip: impl Into<String>, data: DataMap) -> Self {
        Self {
            ip: ip.into(),
            data,
        }
    }

    /// The address that was looked up
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// `country.iso_code`
    pub fn country(&self) -> Option<&str> {
        self.nested_str("country", "iso_code")
    }

    /// `continent.code`
    pub fn continent(&self) -> Option<&str> {
        self.nested_str("continent", "code")
    }

    /// ISO codes of all `subdivisions` that have one
    pub fn subdivisions(&self) -> BTreeSet<String> {
        self.data
            .get("subdivisions")
            .and_then(DataValue::as_array)
            .map(|subs| {
                subs.iter()
                    .filter_map(|s| s.get("iso_code"))
                    .filter_map(DataValue::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `location.time_zone`
    pub fn timezone(&self) -> Option<&str> {
        self.nested_str("location", "time_zone")
    }

    /// `(latitude, longitude)` when both are present and numeric
    pub fn location(&self) -> Option<(f64, f64)> {
        let location = self.data.get("location")?;
        let lat = location.get("latitude")?.as_f64()?;
        let lon = location.get("longitude")?.as_f64()?;
        Some((lat, lon))
    }

    /// Summary with the same fields as the accessors
    pub fn to_dict(&self) -> IpInfoSummary {
        IpInfoSummary {
            ip: self.ip.clone(),
            country: self.country().map(str::to_string),
            continent: self.continent().map(str::to_string),
            subdivisions: self.subdivisions(),
            timezone: self.timezone().map(str::to_string),
            location: self.location(),
        }
    }

    /// The full decoded record
    pub fn get_info_dict(&self) -> &DataMap {
        &self.data
    }

    /// Consume into the decoded record
    pub fn into_data(self) -> DataMap {
        self.data
    }

    fn nested_str(&self, outer: &str, inner: &str) -> Option<&str> {
        self.data.get(outer)?.get(inner)?.as_str()
    }
}

impl fmt::Display for IpInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<IpInfo ip={:?} country={:?} continent={:?} subdivisions={:?} timezone={:?} location={:?}>",
            self.ip,
            self.country(),
            self.continent(),
            self.subdivisions(),
            self.timezone(),
            self.location()
        )
    }
}
