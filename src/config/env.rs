//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load `.env` from the current directory if it exists
    ///
    /// Variables already set in the process environment are kept.
    pub fn load_env_file() -> Result<Option<PathBuf>> {
        Self::load_env_file_from(Path::new(".env"))
    }

    pub fn load_env_file_from(path: &Path) -> Result<Option<PathBuf>> {
        if !path.exists() {
            return Ok(None);
        }

        dotenv::from_path(path)
            .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;
        Ok(Some(path.to_path_buf()))
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("SPEEDTEST_CONCURRENT", "Concurrent connections per phase (1-64)", "3"),
            ("SPEEDTEST_DURATION", "Duration of each throughput test in seconds", "15"),
            ("SPEEDTEST_CHUNKS", "Chunks requested per download request", "100"),
            ("SPEEDTEST_UPLOAD_SIZE", "Upload payload size in KiB", "1024"),
            ("SPEEDTEST_TIMEOUT", "HTTP timeout in seconds (1-300)", "15"),
            ("SPEEDTEST_RAMP_UP", "Ramp-up window in milliseconds", "1000"),
            ("SPEEDTEST_SECURE", "Use HTTPS for scheme-relative server URLs", "false"),
            ("SPEEDTEST_NO_ICMP", "Skip ICMP and ping over HTTP", "false"),
            ("SPEEDTEST_USER_AGENT", "User agent sent with every request", "librespeed-cli"),
            ("SPEEDTEST_CA_CERT", "Additional PEM bundle to trust", "/etc/ssl/extra.pem"),
            ("SPEEDTEST_INTERFACE", "Network interface to bind to", "eth0"),
            ("SPEEDTEST_SERVER_JSON", "URL of the server list", "https://example.com/servers.json"),
            ("SPEEDTEST_TELEMETRY_JSON", "Consolidated telemetry settings file", "telemetry.json"),
            ("SPEEDTEST_LOG_FORMAT", "Log format: console, json or compact", "console"),
        ]
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "SPEEDTEST_CONCURRENT" => {
                let n: usize = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if n == 0 || n > 64 {
                    return Err(AppError::config(format!("{} must be between 1 and 64, got: {}", key, n)));
                }
            }
            "SPEEDTEST_TIMEOUT" => {
                let secs: u64 = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if secs == 0 || secs > 300 {
                    return Err(AppError::config(format!("{} must be between 1 and 300, got: {}", key, secs)));
                }
            }
            "SPEEDTEST_DURATION" | "SPEEDTEST_RAMP_UP" => {
                value
                    .parse::<u64>()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            "SPEEDTEST_CHUNKS" | "SPEEDTEST_UPLOAD_SIZE" => {
                let n: u32 = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if n == 0 {
                    return Err(AppError::config(format!("{} must be at least 1", key)));
                }
            }
            "SPEEDTEST_SECURE" | "SPEEDTEST_NO_ICMP" => {
                value
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            "SPEEDTEST_SERVER_JSON" => {
                url::Url::parse(value)
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            "SPEEDTEST_LOG_FORMAT" => {
                if !matches!(value.to_lowercase().as_str(), "console" | "json" | "compact") {
                    return Err(AppError::config(format!(
                        "Invalid {} value '{}': expected console, json or compact",
                        key, value
                    )));
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::validate_with_lookup(|key| std::env::var(key).ok())
    }

    pub fn validate_with_lookup<F>(lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(key, _, _)| {
                let value = lookup(key)?;
                Self::validate_env_var(key, &value).err().map(|e| e.to_string())
            })
            .collect()
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<26} {}\n", var, description));
            help.push_str(&format!("  {:<26} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }
}
