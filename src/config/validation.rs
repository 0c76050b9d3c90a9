//! Configuration validation utilities and rules
//!
//! `AppConfig::validate` rejects configurations that cannot run. The checks
//! here accept the configuration but point out settings likely to produce
//! misleading measurements.

use crate::{
    error::Result,
    models::{AppConfig, OutputMode, ServerSource, TestConfig},
    telemetry::TelemetryLevel,
};
use colored::*;
use std::net::IpAddr;

/// Largest `ckSize` LibreSpeed backends honour; bigger requests are clamped server-side
const MAX_SERVER_CHUNKS: u32 = 1024;

/// Configuration validator with advisory rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration and collect warnings
    pub fn validate_comprehensive(config: &AppConfig) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(Self::validate_transport(&config.test));
        warnings.extend(Self::validate_measurement(&config.test));
        warnings.extend(Self::validate_output(config));
        warnings.extend(Self::validate_telemetry(config));
        Ok(warnings)
    }

    fn validate_transport(test: &TestConfig) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if test.skip_cert_verify {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "TLS certificate verification is disabled".to_string(),
            ));
            if test.ca_cert.is_some() {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Info,
                    "--ca-cert has no effect while certificate verification is skipped".to_string(),
                ));
            }
        }

        if let Some(source) = test.source_address {
            let loopback = match source {
                IpAddr::V4(ip) => ip.is_loopback(),
                IpAddr::V6(ip) => ip.is_loopback(),
            };
            if loopback {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!("Source address {} is a loopback address", source),
                ));
            }
        }

        if test.interface.is_some() && !cfg!(target_os = "linux") {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "--interface is only supported on Linux and will be ignored".to_string(),
            ));
        }

        warnings
    }

    fn validate_measurement(test: &TestConfig) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if test.chunks > MAX_SERVER_CHUNKS {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Chunk count {} exceeds {}, most servers will send fewer chunks",
                    test.chunks, MAX_SERVER_CHUNKS
                ),
            ));
        }

        if test.runs_throughput() {
            if test.duration_seconds < 5 {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Info,
                    format!(
                        "Test duration of {}s may be too short for TCP to reach full speed",
                        test.duration_seconds
                    ),
                ));
            }

            if test.ramp_up_covers_duration() {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!(
                        "Ramp-up of {}ms is not shorter than the {}s test and is disabled",
                        test.ramp_up_ms, test.duration_seconds
                    ),
                ));
            } else if test.ramp_up_ms.saturating_mul(2) > test.duration_seconds.saturating_mul(1000) {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!(
                        "Ramp-up of {}ms discards more than half of each {}s test",
                        test.ramp_up_ms, test.duration_seconds
                    ),
                ));
            }
        }

        if test.concurrency > 16 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("{} concurrent connections may saturate the server rather than the link", test.concurrency),
            ));
        }

        if !test.enable_download && !test.enable_upload {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Both throughput tests are disabled, only latency will be measured".to_string(),
            ));
        }

        warnings
    }

    fn validate_output(config: &AppConfig) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let output = &config.output;

        if (output.bytes || output.mebibytes) && matches!(output.mode, OutputMode::Csv | OutputMode::Json) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "--bytes and --mebibytes only affect human-readable output".to_string(),
            ));
        }

        if let ServerSource::Remote(url) = &config.servers.source {
            if url.starts_with("http://") {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Info,
                    format!("Server list '{}' is fetched over plain HTTP", url),
                ));
            }
        }

        warnings
    }

    fn validate_telemetry(config: &AppConfig) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let Some(telemetry) = &config.telemetry else {
            return warnings;
        };

        match telemetry.settings.level {
            TelemetryLevel::Disabled => warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "Telemetry level is 'disabled', no share link will be produced".to_string(),
            )),
            TelemetryLevel::Debug => warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Telemetry level 'debug' submits the run log along with the result".to_string(),
            )),
            _ => {}
        }

        if telemetry.settings.server.starts_with("http://") {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("Telemetry server '{}' does not use HTTPS", telemetry.settings.server),
            ));
        }

        warnings
    }
}

/// Validation warning levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
}

impl ValidationLevel {
    /// Get display string for level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }

    /// Get color for terminal display
    pub fn color(&self) -> Color {
        match self {
            Self::Info => Color::Blue,
            Self::Warning => Color::Yellow,
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    /// Create a new validation warning
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        let tag = format!("[{}]", self.level.as_str());
        if use_color {
            format!("{} {}", tag.color(self.level.color()), self.message)
        } else {
            format!("{} {}", tag, self.message)
        }
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &AppConfig) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}
