use anyhow::{Context, Result};
use geoip::MaxMindDatabase;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::format_data_value;

pub fn cmd_info(database: PathBuf, json_output: bool, verbose: bool) -> Result<()> {
    let db = MaxMindDatabase::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let info = db.get_info();
    let meta = db.get_metadata();

    if json_output {
        let mut output = json!({
            "file": database.display().to_string(),
            "provider": info.provider,
            "database_type": info.internal_name,
            "build_date": info.date.map(|d| d.to_rfc3339()),
            "node_count": meta.node_count,
            "record_size": meta.record_size.bits(),
            "ip_version": meta.ip_version.number(),
        });
        if verbose {
            output["metadata"] = serde_json::to_value(meta.as_map())?;
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Database: {}", database.display());
    if let Some(provider) = &info.provider {
        println!("Provider:        {}", provider);
    }
    if let Some(db_type) = &info.internal_name {
        println!("Database type:   {}", db_type);
    }
    if let Some(date) = info.date {
        println!(
            "Build time:      {} ({})",
            date.format("%Y-%m-%d %H:%M:%S UTC"),
            date.timestamp()
        );
    }
    println!("IP version:      IPv{}", meta.ip_version.number());
    println!("Node count:      {}", meta.node_count);
    println!("Record size:     {} bits", meta.record_size.bits());
    if let Some((major, minor)) = meta.binary_format_version() {
        println!("Format version:  {}.{}", major, minor);
    }
    let languages = meta.languages();
    if !languages.is_empty() {
        println!("Languages:       {}", languages.join(", "));
    }
    if let Some(desc) = meta.description("en") {
        println!("Description:     {}", desc);
    }

    if verbose {
        println!();
        println!("Full metadata:");
        for (key, value) in meta.as_map().iter() {
            println!("  {}: {}", key, format_data_value(value, "  "));
        }
    }

    Ok(())
}
