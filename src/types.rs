//! Type definitions shared across the engine and its collaborators

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// IP family preference for every connection made during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkFamily {
    /// Let the resolver pick
    #[default]
    Auto,
    /// Force IPv4 connections
    V4Only,
    /// Force IPv6 connections
    V6Only,
}

impl NetworkFamily {
    /// Build from the mutually exclusive --ipv4/--ipv6 flags
    pub fn from_flags(ipv4: bool, ipv6: bool) -> Result<Self> {
        match (ipv4, ipv6) {
            (true, true) => Err(AppError::config("--ipv4 and --ipv6 are mutually exclusive")),
            (true, false) => Ok(Self::V4Only),
            (false, true) => Ok(Self::V6Only),
            (false, false) => Ok(Self::Auto),
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::V4Only => "IPv4 only",
            Self::V6Only => "IPv6 only",
        }
    }
}

/// Direction of a throughput phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one measurement phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    /// Phase ran and produced samples past the ramp-up window
    Completed,
    /// Phase produced zero or partial samples
    Degraded,
    /// No worker produced a single sample
    Failed,
    /// Phase disabled by configuration
    Skipped,
}

impl PhaseStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Completed | Self::Degraded)
    }
}

/// Distance unit reported by the IP-info endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceUnit {
    #[default]
    #[serde(rename = "km")]
    Kilometers,
    #[serde(rename = "mi")]
    Miles,
    #[serde(rename = "NM")]
    NauticalMiles,
}

impl DistanceUnit {
    /// Query value understood by the getIP endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kilometers => "km",
            Self::Miles => "mi",
            Self::NauticalMiles => "NM",
        }
    }
}

impl FromStr for DistanceUnit {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "km" | "KM" | "Km" => Ok(Self::Kilometers),
            "mi" | "MI" | "Mi" => Ok(Self::Miles),
            "NM" | "nm" | "Nm" => Ok(Self::NauticalMiles),
            other => Err(AppError::config(format!(
                "Invalid distance unit '{}': expected km, mi or NM",
                other
            ))),
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
