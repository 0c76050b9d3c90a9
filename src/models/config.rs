//! Configuration data model and validation

use crate::types::{AppError, DistanceUnit, NetworkFamily, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Immutable measurement configuration, built once from validated options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    /// IP family preference for every connection
    #[serde(default)]
    pub network_family: NetworkFamily,

    /// Source address to bind outgoing connections to
    #[serde(default)]
    pub source_address: Option<IpAddr>,

    /// Network interface to bind outgoing connections to (Linux only)
    #[serde(default)]
    pub interface: Option<String>,

    /// HTTP timeout for individual requests and probes
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub enable_download: bool,

    #[serde(default = "default_true")]
    pub enable_upload: bool,

    /// Try ICMP echo before HTTP ping
    #[serde(default = "default_true")]
    pub enable_icmp: bool,

    /// Whether the latency phase runs at all
    #[serde(default = "default_true")]
    pub probe_latency: bool,

    /// Number of concurrent transfer workers per phase
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Wall-clock duration of each throughput phase
    #[serde(default = "default_duration_secs")]
    pub duration_seconds: u64,

    /// Chunk count requested from the download endpoint
    #[serde(default = "default_chunks")]
    pub chunks: u32,

    /// Upload payload size per request in KiB
    #[serde(default = "default_upload_size_kib")]
    pub upload_size_kib: u32,

    /// Build the upload payload once and share it between requests
    #[serde(default = "default_true")]
    pub pre_allocate: bool,

    /// Initial part of each throughput phase excluded from the rate
    #[serde(default = "default_ramp_up_ms")]
    pub ramp_up_ms: u64,

    /// Probes sent by the latency prober
    #[serde(default = "default_probe_count")]
    pub probe_count: u32,

    /// Resolve scheme-relative server URLs to https
    #[serde(default)]
    pub secure: bool,

    /// Extra PEM bundle trusted for TLS
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,

    #[serde(default)]
    pub skip_cert_verify: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Distance unit requested from the IP-info endpoint
    #[serde(default)]
    pub distance: DistanceUnit,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            network_family: NetworkFamily::Auto,
            source_address: None,
            interface: None,
            timeout_seconds: default_timeout_secs(),
            enable_download: true,
            enable_upload: true,
            enable_icmp: true,
            probe_latency: true,
            concurrency: default_concurrency(),
            duration_seconds: default_duration_secs(),
            chunks: default_chunks(),
            upload_size_kib: default_upload_size_kib(),
            pre_allocate: true,
            ramp_up_ms: default_ramp_up_ms(),
            probe_count: default_probe_count(),
            secure: false,
            ca_cert: None,
            skip_cert_verify: false,
            user_agent: default_user_agent(),
            distance: DistanceUnit::default(),
        }
    }
}

impl TestConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Get phase duration as Duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds)
    }

    /// Ramp-up window applied to each throughput phase
    ///
    /// A window that would cover the whole phase is disabled.
    pub fn ramp_up(&self) -> Duration {
        if self.ramp_up_covers_duration() {
            Duration::ZERO
        } else {
            Duration::from_millis(self.ramp_up_ms)
        }
    }

    /// Whether the configured ramp-up is not shorter than the phase
    pub fn ramp_up_covers_duration(&self) -> bool {
        self.ramp_up_ms > 0 && self.ramp_up_ms >= self.duration_seconds.saturating_mul(1000)
    }

    /// Upload payload size in bytes
    pub fn upload_size_bytes(&self) -> usize {
        self.upload_size_kib as usize * 1024
    }

    /// Whether any throughput phase will run
    pub fn runs_throughput(&self) -> bool {
        self.enable_download || self.enable_upload
    }

    /// Validate the configuration and return the first violated invariant
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(AppError::config("Concurrency must be at least 1"));
        }

        if self.concurrency > 64 {
            return Err(AppError::config("Concurrency cannot exceed 64"));
        }

        if self.runs_throughput() && self.duration_seconds == 0 {
            return Err(AppError::config("Duration must be greater than 0 when a throughput test is enabled"));
        }

        if self.duration_seconds > 300 {
            return Err(AppError::config("Duration cannot exceed 300 seconds"));
        }

        if self.chunks == 0 {
            return Err(AppError::config("Chunk count must be at least 1"));
        }

        if self.upload_size_kib == 0 {
            return Err(AppError::config("Upload size must be at least 1 KiB"));
        }

        if self.timeout_seconds == 0 {
            return Err(AppError::config("Timeout must be greater than 0"));
        }

        if self.timeout_seconds > 300 {
            return Err(AppError::config("Timeout cannot exceed 300 seconds"));
        }

        if self.probe_count == 0 {
            return Err(AppError::config("Probe count must be at least 1"));
        }

        if self.user_agent.trim().is_empty() {
            return Err(AppError::config("User agent cannot be empty"));
        }

        if let Some(interface) = &self.interface {
            if interface.trim().is_empty() {
                return Err(AppError::config("Interface name cannot be empty"));
            }
        }

        if let Some(source) = self.source_address {
            match (self.network_family, source) {
                (NetworkFamily::V4Only, IpAddr::V6(_)) => {
                    return Err(AppError::config(format!("Source address {} is not IPv4", source)));
                }
                (NetworkFamily::V6Only, IpAddr::V4(_)) => {
                    return Err(AppError::config(format!("Source address {} is not IPv6", source)));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_lookup(|key| std::env::var(key).ok())
    }

    /// Merge `SPEEDTEST_*` overrides resolved through `lookup`
    pub fn merge_from_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SPEEDTEST_CONCURRENT") {
            self.concurrency = parse_env("SPEEDTEST_CONCURRENT", &value)?;
        }

        if let Some(value) = lookup("SPEEDTEST_DURATION") {
            self.duration_seconds = parse_env("SPEEDTEST_DURATION", &value)?;
        }

        if let Some(value) = lookup("SPEEDTEST_CHUNKS") {
            self.chunks = parse_env("SPEEDTEST_CHUNKS", &value)?;
        }

        if let Some(value) = lookup("SPEEDTEST_UPLOAD_SIZE") {
            self.upload_size_kib = parse_env("SPEEDTEST_UPLOAD_SIZE", &value)?;
        }

        if let Some(value) = lookup("SPEEDTEST_TIMEOUT") {
            self.timeout_seconds = parse_env("SPEEDTEST_TIMEOUT", &value)?;
        }

        if let Some(value) = lookup("SPEEDTEST_RAMP_UP") {
            self.ramp_up_ms = parse_env("SPEEDTEST_RAMP_UP", &value)?;
        }

        if let Some(value) = lookup("SPEEDTEST_SECURE") {
            self.secure = parse_env("SPEEDTEST_SECURE", &value)?;
        }

        if let Some(value) = lookup("SPEEDTEST_NO_ICMP") {
            let no_icmp: bool = parse_env("SPEEDTEST_NO_ICMP", &value)?;
            self.enable_icmp = !no_icmp;
        }

        if let Some(value) = lookup("SPEEDTEST_USER_AGENT") {
            if !value.trim().is_empty() {
                self.user_agent = value.trim().to_string();
            }
        }

        if let Some(value) = lookup("SPEEDTEST_CA_CERT") {
            if !value.trim().is_empty() {
                self.ca_cert = Some(PathBuf::from(value.trim()));
            }
        }

        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_TIMEOUT.as_secs()
}

fn default_concurrency() -> usize {
    crate::defaults::DEFAULT_CONCURRENCY
}

fn default_duration_secs() -> u64 {
    crate::defaults::DEFAULT_DURATION.as_secs()
}

fn default_chunks() -> u32 {
    crate::defaults::DEFAULT_CHUNKS
}

fn default_upload_size_kib() -> u32 {
    crate::defaults::DEFAULT_UPLOAD_SIZE_KIB
}

fn default_ramp_up_ms() -> u64 {
    crate::defaults::DEFAULT_RAMP_UP.as_millis() as u64
}

fn default_probe_count() -> u32 {
    crate::defaults::DEFAULT_PROBE_COUNT
}

fn default_user_agent() -> String {
    crate::defaults::DEFAULT_USER_AGENT.to_string()
}

/// Where the candidate list comes from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServerSource {
    /// The public server list
    #[default]
    Default,
    /// A server list fetched from this URL
    Remote(String),
    /// A local JSON file
    Local(PathBuf),
    /// JSON read from standard input
    Stdin,
}

/// Candidate source plus include/exclude filtering
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerSelection {
    pub source: ServerSource,
    /// Only these ids are eligible
    pub include: Vec<i64>,
    /// These ids are never eligible
    pub exclude: Vec<i64>,
}

impl ServerSelection {
    pub fn validate(&self) -> Result<()> {
        if !self.include.is_empty() && !self.exclude.is_empty() {
            return Err(AppError::config("--server and --exclude are mutually exclusive"));
        }
        Ok(())
    }
}

/// How the final result is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    #[default]
    Human,
    Simple,
    Csv,
    Json,
}

impl OutputMode {
    /// Machine-readable modes keep stdout free of progress text
    pub fn is_quiet(&self) -> bool {
        !matches!(self, Self::Human)
    }
}

/// Rendering and unit options consumed by the formatters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputOptions {
    pub mode: OutputMode,
    pub csv_delimiter: char,
    pub csv_header: bool,
    /// Report rates in bytes instead of bits
    pub bytes: bool,
    /// Use binary (1024) prefixes instead of SI
    pub mebibytes: bool,
    pub enable_color: bool,
    pub debug: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            mode: OutputMode::Human,
            csv_delimiter: ',',
            csv_header: false,
            bytes: false,
            mebibytes: false,
            enable_color: crate::defaults::DEFAULT_ENABLE_COLOR,
            debug: false,
        }
    }
}

/// Telemetry submission options, present only when sharing is requested
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryOptions {
    pub settings: crate::telemetry::TelemetrySettings,
    /// Free-text message sent along with the results
    pub extra: Option<String>,
}

/// Top-level action requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunAction {
    #[default]
    SpeedTest,
    /// Print the candidate list and exit
    ListServers,
    /// Print the CSV header and exit
    CsvHeader,
}

/// Everything the application needs for one invocation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppConfig {
    pub action: RunAction,
    pub test: TestConfig,
    pub servers: ServerSelection,
    pub output: OutputOptions,
    pub telemetry: Option<TelemetryOptions>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.servers.validate()?;
        self.test.validate()?;
        let delimiter = self.output.csv_delimiter;
        if !delimiter.is_ascii() || delimiter == '\n' || delimiter == '\r' || delimiter == '"' {
            return Err(AppError::config(
                "CSV delimiter must be a single ASCII character other than a newline or a quote",
            ));
        }
        Ok(())
    }

    pub fn share_requested(&self) -> bool {
        self.telemetry.is_some()
    }
}
