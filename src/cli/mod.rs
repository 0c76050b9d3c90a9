//! Command-line interface

use crate::models::OutputMode;
use clap::{ArgAction, Parser};
use std::net::IpAddr;
use std::path::PathBuf;

/// Network Speed Tester - measures latency, jitter, download and upload speed
/// against LibreSpeed servers
#[derive(Parser, Debug, Clone)]
#[command(name = "nst")]
#[command(version, about, long_about = None)]
#[command(after_long_help = crate::config::EnvManager::display_env_help())]
pub struct Cli {
    /// Force IPv4 connections
    #[arg(short = '4', long = "ipv4")]
    pub ipv4: bool,

    /// Force IPv6 connections
    #[arg(short = '6', long = "ipv6")]
    pub ipv6: bool,

    /// Skip the download test
    #[arg(long)]
    pub no_download: bool,

    /// Skip the upload test
    #[arg(long)]
    pub no_upload: bool,

    /// Use HTTP instead of ICMP for the latency test
    #[arg(long)]
    pub no_icmp: bool,

    /// Number of concurrent connections per phase [default: 3]
    #[arg(long, value_name = "N")]
    pub concurrent: Option<usize>,

    /// Duration of each throughput test in seconds [default: 15]
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub duration: Option<u64>,

    /// Chunks requested per download request [default: 100]
    #[arg(long, value_name = "N")]
    pub chunks: Option<u32>,

    /// Upload payload size in KiB [default: 1024]
    #[arg(long, value_name = "KIB")]
    pub upload_size: Option<u32>,

    /// Regenerate the upload payload for every request instead of sharing one buffer
    #[arg(long)]
    pub no_pre_allocate: bool,

    /// HTTP timeout in seconds [default: 15]
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub timeout: Option<u64>,

    /// Initial part of each throughput test ignored in the result, in milliseconds [default: 1000]
    #[arg(long, value_name = "MS")]
    pub ramp_up: Option<u64>,

    /// Use HTTPS for servers listed with scheme-relative URLs
    #[arg(long)]
    pub secure: bool,

    /// Additional PEM bundle to trust
    #[arg(long, value_name = "PATH")]
    pub ca_cert: Option<PathBuf>,

    /// Do not verify TLS certificates
    #[arg(long)]
    pub skip_cert_verify: bool,

    /// Source address to bind to
    #[arg(long, value_name = "IP")]
    pub source: Option<IpAddr>,

    /// Network interface to bind to (Linux only)
    #[arg(long, value_name = "NAME", env = "SPEEDTEST_INTERFACE")]
    pub interface: Option<String>,

    /// User agent sent with every request
    #[arg(long, value_name = "STRING")]
    pub user_agent: Option<String>,

    /// Only test against this server id (can be used multiple times)
    #[arg(long = "server", value_name = "ID", action = ArgAction::Append)]
    pub servers: Vec<i64>,

    /// Never test against this server id (can be used multiple times)
    #[arg(long = "exclude", value_name = "ID", action = ArgAction::Append)]
    pub excludes: Vec<i64>,

    /// Fetch the server list from this URL
    #[arg(long, value_name = "URL", env = "SPEEDTEST_SERVER_JSON")]
    pub server_json: Option<String>,

    /// Read the server list from a local file, or "-" for standard input
    #[arg(long, value_name = "PATH")]
    pub local_json: Option<String>,

    /// List available servers and exit
    #[arg(long)]
    pub list: bool,

    /// Submit the result to the telemetry server and print a share link
    #[arg(long)]
    pub share: bool,

    /// Consolidated telemetry settings file; overrides the other telemetry options
    #[arg(long, value_name = "PATH", env = "SPEEDTEST_TELEMETRY_JSON")]
    pub telemetry_json: Option<PathBuf>,

    /// Telemetry level: disabled, basic, full or debug
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,

    /// Telemetry server base URL
    #[arg(long, value_name = "URL")]
    pub telemetry_server: Option<String>,

    /// Telemetry submission path
    #[arg(long, value_name = "PATH")]
    pub telemetry_path: Option<String>,

    /// Telemetry share-link path
    #[arg(long, value_name = "PATH")]
    pub telemetry_share: Option<String>,

    /// Free-text message submitted with the result
    #[arg(long, value_name = "TEXT")]
    pub telemetry_extra: Option<String>,

    /// Only print ping, jitter and rates
    #[arg(long)]
    pub simple: bool,

    /// Print the result as CSV
    #[arg(long)]
    pub csv: bool,

    /// Single-character CSV delimiter
    #[arg(long, value_name = "CHAR", default_value_t = ',')]
    pub csv_delimiter: char,

    /// Print the CSV header row (alone, it prints the header and exits)
    #[arg(long)]
    pub csv_header: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Report rates in bytes per second instead of bits
    #[arg(long)]
    pub bytes: bool,

    /// Use 1024-based prefixes instead of 1000
    #[arg(long)]
    pub mebibytes: bool,

    /// Distance unit for the server distance: km, mi or NM
    #[arg(long, value_name = "UNIT", default_value = "km")]
    pub distance: String,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Check flag combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.ipv4 && self.ipv6 {
            return Err("Cannot specify both --ipv4 and --ipv6".to_string());
        }

        let modes = [self.simple, self.csv, self.json].iter().filter(|&&set| set).count();
        if modes > 1 {
            return Err("Only one of --simple, --csv and --json may be given".to_string());
        }

        if self.server_json.is_some() && self.local_json.is_some() {
            return Err("Cannot specify both --server-json and --local-json".to_string());
        }

        if !self.servers.is_empty() && !self.excludes.is_empty() {
            return Err("--server and --exclude are mutually exclusive".to_string());
        }

        Ok(())
    }

    /// Output mode selected by --simple/--csv/--json
    pub fn output_mode(&self) -> OutputMode {
        if self.csv {
            OutputMode::Csv
        } else if self.json {
            OutputMode::Json
        } else if self.simple {
            OutputMode::Simple
        } else {
            OutputMode::Human
        }
    }

    /// `--csv-header` given without `--csv`: print the header and exit
    pub fn wants_header_only(&self) -> bool {
        self.csv_header && !self.csv
    }

    /// Whether any telemetry option was given, which implies sharing
    pub fn telemetry_requested(&self) -> bool {
        self.share
            || self.telemetry_json.is_some()
            || self.telemetry_level.is_some()
            || self.telemetry_server.is_some()
            || self.telemetry_path.is_some()
            || self.telemetry_share.is_some()
            || self.telemetry_extra.is_some()
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        !self.no_color && self.output_mode() == OutputMode::Human
    }
}

/// Parse a whole number of seconds between 1 and 300
fn parse_seconds(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Duration must be greater than 0".to_string())
            } else if secs > 300 {
                Err("Duration cannot exceed 300 seconds".to_string())
            } else {
                Ok(secs)
            }
        })
}
