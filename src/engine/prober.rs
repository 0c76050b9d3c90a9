//! Latency and jitter probing with ICMP to HTTP fallback

use crate::{
    client::Transport,
    error::{AppError, Result},
    logging::{Logger, NetworkLogger},
    models::{LatencyMetric, TestConfig},
    servers::ServerEndpoints,
    stats::{reduce_latency, sample_channel},
};
use reqwest::Url;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// How round trips are measured, chosen once per burst
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeMethod {
    /// Echo requests through the system `ping` utility
    Icmp { host: String },
    /// GET against the server's ping endpoint
    Http { url: Url },
}

impl ProbeMethod {
    pub fn kind(&self) -> ProbeKind {
        match self {
            Self::Icmp { .. } => ProbeKind::Icmp,
            Self::Http { .. } => ProbeKind::Http,
        }
    }

    fn target(&self) -> &str {
        match self {
            Self::Icmp { host } => host,
            Self::Http { url } => url.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Icmp,
    Http,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Icmp => write!(f, "ICMP"),
            Self::Http => write!(f, "HTTP"),
        }
    }
}

/// Result of a probe burst
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub method: ProbeKind,
    pub metric: LatencyMetric,
    /// Fallbacks taken along the way
    pub warnings: Vec<String>,
}

pub struct LatencyProber<'a> {
    transport: &'a dyn Transport,
    config: &'a TestConfig,
    logger: Logger,
}

impl<'a> LatencyProber<'a> {
    pub fn new(transport: &'a dyn Transport, config: &'a TestConfig, logger: &Logger) -> Self {
        Self {
            transport,
            config,
            logger: logger.child("PROBE"),
        }
    }

    /// Measure latency and jitter against `server`
    pub async fn probe(&self, server: &ServerEndpoints) -> Result<ProbeReport> {
        let mut warnings = Vec::new();
        let http = ProbeMethod::Http { url: server.ping.clone() };

        let method = match self.select_method(server).await {
            Ok(method) => method,
            Err(reason) => {
                if self.config.enable_icmp {
                    self.warn(&mut warnings, format!("ICMP unavailable ({}), using HTTP", reason)).await;
                }
                http.clone()
            }
        };

        if let Some(metric) = self.burst(&method).await {
            return Ok(self.report(method.kind(), metric, warnings));
        }

        if method.kind() == ProbeKind::Icmp {
            self.warn(&mut warnings, "every ICMP probe was dropped, retrying over HTTP".to_string())
                .await;
            if let Some(metric) = self.burst(&http).await {
                return Ok(self.report(ProbeKind::Http, metric, warnings));
            }
        }

        Err(AppError::probe_degraded(format!(
            "all {} latency probes to {} were dropped",
            self.config.probe_count,
            http.target()
        )))
    }

    /// ICMP when enabled and one capability echo gets through
    async fn select_method(&self, server: &ServerEndpoints) -> std::result::Result<ProbeMethod, String> {
        if !self.config.enable_icmp {
            return Err("disabled".to_string());
        }
        let host = server.host().map_err(|e| e.to_string())?;
        match timeout(self.config.timeout(), self.transport.icmp_echo(&host)).await {
            Ok(Ok(_)) => Ok(ProbeMethod::Icmp { host }),
            Ok(Err(error)) => Err(error.to_string()),
            Err(_) => Err("capability check timed out".to_string()),
        }
    }

    /// Run `probe_count` sequential probes, `None` if all of them dropped
    async fn burst(&self, method: &ProbeMethod) -> Option<LatencyMetric> {
        let net = NetworkLogger::new(&self.logger);
        let (sink, collector) = sample_channel(Instant::now());
        let mut dropped = 0;

        for _ in 0..self.config.probe_count {
            let rtt = self.probe_once(method).await;
            net.log_probe(&method.kind().to_string(), method.target(), rtt.map(|d| d.as_secs_f64() * 1000.0))
                .await;
            match rtt {
                Some(rtt) => sink.record_rtt(rtt),
                None => dropped += 1,
            }
        }
        drop(sink);

        reduce_latency(&collector.drain(), dropped)
    }

    async fn probe_once(&self, method: &ProbeMethod) -> Option<Duration> {
        let start = Instant::now();
        match method {
            ProbeMethod::Icmp { host } => match timeout(self.config.timeout(), self.transport.icmp_echo(host)).await {
                Ok(Ok(rtt)) => Some(rtt),
                _ => None,
            },
            ProbeMethod::Http { url } => match timeout(self.config.timeout(), self.transport.ping(url)).await {
                Ok(Ok(())) => Some(start.elapsed()),
                _ => None,
            },
        }
    }

    async fn warn(&self, warnings: &mut Vec<String>, message: String) {
        self.logger.warn(&message).log().await;
        warnings.push(message);
    }

    fn report(&self, method: ProbeKind, metric: LatencyMetric, warnings: Vec<String>) -> ProbeReport {
        ProbeReport { method, metric, warnings }
    }
}
