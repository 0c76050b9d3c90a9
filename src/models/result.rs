//! Final result of one speed test run

use crate::models::metrics::{LatencyMetric, ThroughputMetric};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of the server the run was measured against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIdentity {
    pub name: String,
    pub url: String,
}

/// Client identity as reported by the IP-info endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientIdentity {
    pub ip: String,
    pub hostname: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub loc: String,
    pub org: String,
    pub postal: String,
    pub timezone: String,
}

impl ClientIdentity {
    /// Identity carrying only an address
    pub fn from_ip<S: Into<String>>(ip: S) -> Self {
        Self { ip: ip.into(), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Measured values for one run, in canonical units (bytes, bit/s, ms)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestResult {
    pub timestamp: DateTime<Utc>,
    pub server: ServerIdentity,
    pub client: ClientIdentity,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Latency in ms, `None` when unavailable
    pub ping: Option<f64>,
    /// Jitter in ms, `None` when unavailable
    pub jitter: Option<f64>,
    /// Upload rate in bit/s
    pub upload: f64,
    /// Download rate in bit/s
    pub download: f64,
    /// Share link, empty when sharing is unavailable
    pub share: String,
}

impl SpeedTestResult {
    /// Create an empty result stamped with the current time
    pub fn new() -> Self {
        Self::with_timestamp(Utc::now())
    }

    pub fn with_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            server: ServerIdentity::default(),
            client: ClientIdentity::default(),
            bytes_sent: 0,
            bytes_received: 0,
            ping: None,
            jitter: None,
            upload: 0.0,
            download: 0.0,
            share: String::new(),
        }
    }

    pub fn apply_latency(&mut self, metric: Option<LatencyMetric>) {
        self.ping = metric.map(|m| m.latency_ms);
        self.jitter = metric.map(|m| m.jitter_ms);
    }

    pub fn apply_download(&mut self, metric: &ThroughputMetric) {
        self.download = metric.rate_bps;
        self.bytes_received = metric.total_bytes;
    }

    pub fn apply_upload(&mut self, metric: &ThroughputMetric) {
        self.upload = metric.rate_bps;
        self.bytes_sent = metric.total_bytes;
    }

    /// Latency formatted for display, "n/a" when unavailable
    pub fn format_ping(&self) -> String {
        format_optional_ms(self.ping)
    }

    /// Jitter formatted for display, "n/a" when unavailable
    pub fn format_jitter(&self) -> String {
        format_optional_ms(self.jitter)
    }

    /// Same metrics, ignoring timestamp and share link
    pub fn same_metrics(&self, other: &Self) -> bool {
        self.server == other.server
            && self.client == other.client
            && self.bytes_sent == other.bytes_sent
            && self.bytes_received == other.bytes_received
            && self.ping == other.ping
            && self.jitter == other.jitter
            && self.upload == other.upload
            && self.download == other.download
    }
}

impl Default for SpeedTestResult {
    fn default() -> Self {
        Self::new()
    }
}

fn format_optional_ms(value: Option<f64>) -> String {
    match value {
        Some(ms) => format!("{:.2}", ms),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PhaseStatus;

    #[test]
    fn test_new_result_is_empty() {
        let result = SpeedTestResult::new();
        assert!(result.client.is_empty());
        assert_eq!(result.ping, None);
        assert_eq!(result.share, "");
        assert_eq!(result.format_ping(), "n/a");
    }

    #[test]
    fn test_apply_metrics() {
        let mut result = SpeedTestResult::new();
        result.apply_latency(Some(LatencyMetric {
            latency_ms: 20.0,
            jitter_ms: 1.5,
            samples: 5,
            dropped: 5,
        }));
        result.apply_download(&ThroughputMetric {
            bytes: 90,
            total_bytes: 100,
            window_ms: 1000.0,
            rate_bps: 720.0,
            status: PhaseStatus::Completed,
        });

        assert_eq!(result.ping, Some(20.0));
        assert_eq!(result.format_jitter(), "1.50");
        assert_eq!(result.bytes_received, 100);
        assert_eq!(result.download, 720.0);
    }

    #[test]
    fn test_json_keys_are_snake_case() {
        let result = SpeedTestResult::new();
        let json = serde_json::to_value(&result).unwrap();
        for key in ["timestamp", "server", "client", "bytes_sent", "bytes_received", "ping", "jitter", "upload", "download", "share"] {
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
        assert!(json["ping"].is_null());
    }

    #[test]
    fn test_same_metrics_ignores_timestamp_and_share() {
        let a = SpeedTestResult::new();
        let mut b = SpeedTestResult::with_timestamp(a.timestamp + chrono::Duration::seconds(5));
        b.share = "https://example.com/results/?id=abc".to_string();
        assert!(a.same_metrics(&b));

        b.download = 1.0;
        assert!(!a.same_metrics(&b));
    }
}
