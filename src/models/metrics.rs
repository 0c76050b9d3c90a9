//! Raw samples and the phase metrics derived from them

use crate::types::PhaseStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One observation recorded during a phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// A successful round trip
    RoundTrip {
        /// Offset from the phase start at which the reply arrived
        offset: Duration,
        rtt: Duration,
    },
    /// One read or write performed by a transfer worker
    Transfer {
        /// Offset from the phase start at which the read/write completed
        offset: Duration,
        worker: usize,
        /// Bytes moved by this read/write
        bytes: u64,
        /// Bytes moved by this worker so far, including this read/write
        cumulative: u64,
    },
}

impl Sample {
    /// Create a round-trip sample
    pub fn round_trip(offset: Duration, rtt: Duration) -> Self {
        Self::RoundTrip { offset, rtt }
    }

    /// Create a transfer sample
    pub fn transfer(offset: Duration, worker: usize, bytes: u64, cumulative: u64) -> Self {
        Self::Transfer { offset, worker, bytes, cumulative }
    }

    /// Offset from the phase start
    pub fn offset(&self) -> Duration {
        match self {
            Self::RoundTrip { offset, .. } | Self::Transfer { offset, .. } => *offset,
        }
    }

    /// Round-trip time in milliseconds, if this is a round-trip sample
    pub fn rtt_ms(&self) -> Option<f64> {
        match self {
            Self::RoundTrip { rtt, .. } => Some(rtt.as_secs_f64() * 1000.0),
            Self::Transfer { .. } => None,
        }
    }

    /// Bytes moved, zero for round-trip samples
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Transfer { bytes, .. } => *bytes,
            Self::RoundTrip { .. } => 0,
        }
    }
}

/// Latency and jitter derived from one probe burst
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetric {
    /// Minimum observed round trip
    pub latency_ms: f64,
    /// Mean absolute difference of consecutive round trips
    pub jitter_ms: f64,
    /// Probes that answered
    pub samples: usize,
    /// Probes that timed out or failed
    pub dropped: usize,
}

impl LatencyMetric {
    pub fn format_latency(&self) -> String {
        format!("{:.2}ms", self.latency_ms)
    }

    pub fn format_jitter(&self) -> String {
        format!("{:.2}ms", self.jitter_ms)
    }
}

/// Throughput derived from one download or upload phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputMetric {
    /// Bytes counted toward the rate (ramp-up excluded)
    pub bytes: u64,
    /// Every byte moved during the phase, ramp-up included
    pub total_bytes: u64,
    /// Measurement window in milliseconds (ramp-up excluded)
    pub window_ms: f64,
    /// Rate in bits per second
    pub rate_bps: f64,
    pub status: PhaseStatus,
}

impl ThroughputMetric {
    /// Metric for a phase that did not run
    pub fn skipped() -> Self {
        Self {
            bytes: 0,
            total_bytes: 0,
            window_ms: 0.0,
            rate_bps: 0.0,
            status: PhaseStatus::Skipped,
        }
    }

    /// Metric for a phase in which no worker produced a sample
    pub fn failed(window: Duration) -> Self {
        Self {
            bytes: 0,
            total_bytes: 0,
            window_ms: window.as_secs_f64() * 1000.0,
            rate_bps: 0.0,
            status: PhaseStatus::Failed,
        }
    }

    /// Rate in megabits per second
    pub fn mbps(&self) -> f64 {
        self.rate_bps / 1_000_000.0
    }
}
