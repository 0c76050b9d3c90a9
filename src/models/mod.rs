//! Data models and structures for the network speed tester

pub mod config;
pub mod metrics;
pub mod result;

// Re-export main model types
pub use config::{AppConfig, OutputMode, OutputOptions, RunAction, ServerSelection, ServerSource, TelemetryOptions, TestConfig};
pub use metrics::{LatencyMetric, Sample, ThroughputMetric};
pub use result::{ClientIdentity, ServerIdentity, SpeedTestResult};
