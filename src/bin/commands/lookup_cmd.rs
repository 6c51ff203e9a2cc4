use anyhow::{Context, Result};
use clap::ValueEnum;
use geoip::{MaxMindDatabase, OpenOptions};
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LookupFormat {
    /// The full decoded record
    Record,
    /// Country, continent, subdivisions, time zone and location only
    Summary,
}

pub fn cmd_lookup(
    database: PathBuf,
    ips: Vec<String>,
    format: LookupFormat,
    use_mmap: bool,
    quiet: bool,
) -> Result<()> {
    let options = OpenOptions {
        use_mmap,
        ..OpenOptions::default()
    };
    let db = MaxMindDatabase::open_with_options(&database, &options)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let mut results = Vec::with_capacity(ips.len());
    let mut found = false;
    for ip in &ips {
        let info = db
            .lookup(ip)
            .with_context(|| format!("Lookup failed for: {}", ip))?;
        let entry = match info {
            Some(info) => {
                found = true;
                match format {
                    LookupFormat::Record => json!({ "ip": ip, "data": info.get_info_dict() }),
                    LookupFormat::Summary => serde_json::to_value(info.to_dict())?,
                }
            }
            None => json!({ "ip": ip, "data": null }),
        };
        results.push(entry);
    }

    if !quiet {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    std::process::exit(if found { 0 } else { 1 });
}
