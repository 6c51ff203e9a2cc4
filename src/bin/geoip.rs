mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{cmd_info, cmd_lookup, LookupFormat};

#[derive(Parser)]
#[command(name = "geoip")]
#[command(
    about = "Look up IP addresses in MaxMind DB (mmdb) files",
    long_about = "geoip - Reader for MaxMind DB (mmdb) geolocation databases\n\n\
    Looks up IPv4 and IPv6 addresses in GeoLite2/GeoIP2 style databases and\n\
    prints the matching record as JSON. Files are memory-mapped by default.\n\n\
    Examples:\n\
      geoip lookup GeoLite2-City.mmdb 81.2.69.142\n\
      geoip lookup GeoLite2-City.mmdb 8.8.8.8 2001:4860:4860::8888 --format summary\n\
      geoip info GeoLite2-City.mmdb --json\n\n\
    Set RUST_LOG=debug for diagnostics."
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up one or more IP addresses
    Lookup {
        /// Path to the database (.mmdb file)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// IPv4 or IPv6 addresses to look up
        #[arg(value_name = "IP", required = true)]
        ips: Vec<String>,

        /// Output format: record (full decoded record, default) or summary
        #[arg(long, value_enum, default_value_t = LookupFormat::Record)]
        format: LookupFormat,

        /// Read the file into memory instead of mapping it
        #[arg(long)]
        no_mmap: bool,

        /// Quiet mode - no output, only exit code (0 = any found, 1 = none found)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show database information and metadata
    Info {
        /// Path to the database (.mmdb file)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Include the full metadata map
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Lookup {
            database,
            ips,
            format,
            no_mmap,
            quiet,
        } => cmd_lookup(database, ips, format, !no_mmap, quiet),
        Commands::Info {
            database,
            json,
            verbose,
        } => cmd_info(database, json, verbose),
    }
}
