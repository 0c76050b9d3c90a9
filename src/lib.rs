//! Network Speed Tester
//!
//! Measures latency, jitter, download and upload throughput against servers
//! speaking the LibreSpeed HTTP backend protocol, and optionally submits the
//! result to a telemetry server for a shareable link.

pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod ipinfo;
pub mod logging;
pub mod models;
pub mod output;
pub mod servers;
pub mod stats;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use engine::{EngineState, RunOutcome, SpeedTestEngine};
pub use error::{AppError, Result};
pub use models::{AppConfig, LatencyMetric, Sample, SpeedTestResult, TestConfig, ThroughputMetric};
pub use output::{OutputCoordinator, OutputFormatter, OutputFormatterFactory};
pub use stats::{reduce_latency, reduce_throughput, SampleSink};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Version plus build metadata recorded by the build script
pub fn build_info() -> String {
    let target = env!("TARGET_TRIPLE");
    match option_env!("GIT_COMMIT") {
        Some(commit) => format!("{} v{} ({}, {}, built {})", PKG_NAME, VERSION, commit, target, env!("BUILD_TIME")),
        None => format!("{} v{} ({}, built {})", PKG_NAME, VERSION, target, env!("BUILD_TIME")),
    }
}

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_CONCURRENCY: usize = 3;
    pub const DEFAULT_DURATION: Duration = Duration::from_secs(15);
    pub const DEFAULT_CHUNKS: u32 = 100;
    pub const DEFAULT_UPLOAD_SIZE_KIB: u32 = 1024;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
    pub const DEFAULT_RAMP_UP: Duration = Duration::from_millis(1000);
    pub const DEFAULT_PROBE_COUNT: u32 = 10;
    pub const DEFAULT_ENABLE_COLOR: bool = true;
    pub const DEFAULT_USER_AGENT: &str = concat!("librespeed-cli/", env!("CARGO_PKG_VERSION"));

    pub const DEFAULT_SERVER_LIST_URL: &str = "https://librespeed.org/backend-servers/servers.php";

    pub const DEFAULT_TELEMETRY_SERVER: &str = "https://librespeed.org";
    pub const DEFAULT_TELEMETRY_PATH: &str = "/results/telemetry.php";
    pub const DEFAULT_TELEMETRY_SHARE: &str = "/results/";

    /// Failed attempts a transfer worker tolerates before giving up
    pub const MAX_WORKER_RETRIES: u32 = 3;
    pub const RETRY_BACKOFF: Duration = Duration::from_millis(200);
    /// How long workers may overrun the phase deadline before they are aborted
    pub const WORKER_GRACE_PERIOD: Duration = Duration::from_secs(2);
    /// Upload bodies are streamed in pieces of this size
    pub const UPLOAD_PIECE_SIZE: usize = 64 * 1024;
}
