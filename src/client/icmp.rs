//! ICMP echo through the system `ping` utility
//!
//! Raw sockets need privileges the tester usually does not have, so echoes are
//! delegated to the platform `ping` binary and its reply line is parsed.

use crate::{
    error::{AppError, Result},
    types::NetworkFamily,
};
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs single echoes against a host
#[derive(Debug, Clone)]
pub struct IcmpPinger {
    family: NetworkFamily,
    interface: Option<String>,
    timeout: Duration,
}

impl IcmpPinger {
    pub fn new(family: NetworkFamily, interface: Option<String>, timeout: Duration) -> Self {
        Self { family, interface, timeout }
    }

    /// Send one echo to `host` and return the round trip reported by `ping`
    ///
    /// Returns `IcmpUnavailable` when the utility is missing or refuses to run
    /// (no privilege, raw sockets disabled) and `Timeout` when the echo got no
    /// reply.
    pub async fn echo(&self, host: &str) -> Result<Duration> {
        let output = Command::new("ping")
            .args(self.arguments(host))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AppError::icmp_unavailable("ping utility not found"),
                std::io::ErrorKind::PermissionDenied => {
                    AppError::icmp_unavailable("not permitted to run the ping utility")
                }
                _ => AppError::icmp_unavailable(format!("failed to run ping: {}", e)),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if let Some(rtt) = parse_reply_time(&stdout) {
            return Ok(rtt);
        }

        if refuses_raw_sockets(&stderr) || refuses_raw_sockets(&stdout) {
            return Err(AppError::icmp_unavailable(stderr.trim().to_string()));
        }

        Err(AppError::timeout(format!("no ICMP echo reply from {}", host)))
    }

    fn arguments(&self, host: &str) -> Vec<String> {
        let mut args = Vec::new();

        if cfg!(windows) {
            args.extend(["-n".to_string(), "1".to_string()]);
            args.extend(["-w".to_string(), self.timeout.as_millis().to_string()]);
        } else {
            let wait_secs = self.timeout.as_secs().max(1);
            args.extend(["-c".to_string(), "1".to_string()]);
            if cfg!(target_os = "macos") {
                args.extend(["-t".to_string(), wait_secs.to_string()]);
            } else {
                args.extend(["-W".to_string(), wait_secs.to_string()]);
            }
            if let Some(interface) = &self.interface {
                args.extend(["-I".to_string(), interface.clone()]);
            }
        }

        match self.family {
            NetworkFamily::V4Only => args.push("-4".to_string()),
            NetworkFamily::V6Only => args.push("-6".to_string()),
            NetworkFamily::Auto => {}
        }

        args.push(host.to_string());
        args
    }
}

/// Extract the round trip from `ping` output
///
/// Handles `time=12.3 ms` (Unix), `time=14ms` and `time<1ms` (Windows).
pub fn parse_reply_time(output: &str) -> Option<Duration> {
    let pattern = Regex::new(r"(?i)time\s*([=<])\s*([0-9]+(?:[.,][0-9]+)?)\s*ms").ok()?;
    let captures = pattern.captures(output)?;
    let value: f64 = captures.get(2)?.as_str().replace(',', ".").parse().ok()?;
    let ms = if &captures[1] == "<" { value.min(1.0) } else { value };
    Some(Duration::from_secs_f64(ms / 1000.0))
}

fn refuses_raw_sockets(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("operation not permitted")
        || lower.contains("permission denied")
        || lower.contains("socket: ")
        || lower.contains("requires administrator")
        || lower.contains("unknown host")
        || lower.contains("name or service not known")
}
