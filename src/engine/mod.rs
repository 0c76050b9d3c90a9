//! Speed test engine
//!
//! The controller walks one run through its states:
//!
//! ```text
//! SelectingServer -> ProbingLatency -> TestingDownload -> TestingUpload -> Finalizing -> Done
//!        \______________________________________________________________________/
//!                                        Aborted
//! ```
//!
//! Only configuration errors, an exhausted candidate list and TLS trust failures
//! abort a run. Everything else is recorded as a degradation and the run continues.

pub mod driver;
pub mod prober;
pub mod worker;

#[cfg(test)]
pub(crate) mod mock;


pub use driver::{PhaseOutcome, ThroughputDriver};
pub use prober::{LatencyProber, ProbeKind, ProbeMethod, ProbeReport};
pub use worker::{TransferWorker, WorkerReport};

use crate::{
    client::Transport,
    error::{AppError, Result},
    ipinfo::{IpInfo, IpInfoProvider},
    logging::Logger,
    models::{ServerIdentity, SpeedTestResult, TelemetryOptions, TestConfig, ThroughputMetric},
    servers::{ServerCandidate, ServerEndpoints},
    telemetry::TelemetryReporter,
    types::{Direction, PhaseStatus},
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::time::timeout;

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    SelectingServer,
    ProbingLatency,
    TestingDownload,
    TestingUpload,
    Finalizing,
    Done,
    Aborted,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::SelectingServer => "selecting server",
            Self::ProbingLatency => "probing latency",
            Self::TestingDownload => "testing download",
            Self::TestingUpload => "testing upload",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Everything a completed run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub result: SpeedTestResult,
    pub server: ServerCandidate,
    pub ip_info: Option<IpInfo>,
    pub latency: Option<ProbeReport>,
    pub download: ThroughputMetric,
    pub upload: ThroughputMetric,
    /// Recoverable failures absorbed during the run
    pub degradations: Vec<AppError>,
    /// Non-error notices such as probe fallbacks
    pub warnings: Vec<String>,
    pub transitions: Vec<EngineState>,
}

impl RunOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// Degradations and warnings as log lines
    pub fn log_lines(&self) -> Vec<String> {
        self.warnings
            .iter()
            .cloned()
            .chain(self.degradations.iter().map(|e| e.to_string()))
            .collect()
    }
}

/// Drives one speed test run over a [`Transport`]
pub struct SpeedTestEngine {
    config: Arc<TestConfig>,
    transport: Arc<dyn Transport>,
    ip_info: Option<Arc<dyn IpInfoProvider>>,
    telemetry: Option<TelemetryOptions>,
    logger: Logger,
    state: EngineState,
    transitions: Vec<EngineState>,
}

impl SpeedTestEngine {
    pub fn new(config: TestConfig, transport: Arc<dyn Transport>, logger: &Logger) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            ip_info: None,
            telemetry: None,
            logger: logger.child("ENGINE"),
            state: EngineState::Idle,
            transitions: Vec::new(),
        }
    }

    pub fn with_ip_info(mut self, provider: Arc<dyn IpInfoProvider>) -> Self {
        self.ip_info = Some(provider);
        self
    }

    /// Submit results and request a share link when the run finishes
    pub fn with_telemetry(mut self, options: TelemetryOptions) -> Self {
        self.telemetry = Some(options);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Run a full test against the first reachable candidate
    pub async fn run(&mut self, candidates: &[ServerCandidate]) -> Result<RunOutcome> {
        self.transitions.clear();
        match self.execute(candidates).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.transition(EngineState::Aborted).await;
                self.logger.fatal("Run aborted").error_info(&error).log().await;
                Err(error)
            }
        }
    }

    async fn execute(&mut self, candidates: &[ServerCandidate]) -> Result<RunOutcome> {
        self.config.validate()?;

        self.transition(EngineState::SelectingServer).await;
        let (server, endpoints) = self.select_server(candidates).await?;
        let endpoints = Arc::new(endpoints);

        let mut result = SpeedTestResult::new();
        result.server = ServerIdentity {
            name: server.name.clone(),
            url: server.display_url(self.config.secure),
        };

        let mut degradations = Vec::new();
        let mut warnings = Vec::new();

        let ip_info = match &self.ip_info {
            Some(provider) => match provider.lookup(&endpoints).await {
                Ok(info) => {
                    result.client = info.client.clone();
                    Some(info)
                }
                Err(error) => {
                    self.logger.warn("Client identity lookup failed").error_info(&error).log().await;
                    degradations.push(error.prefixed("IP info"));
                    None
                }
            },
            None => None,
        };

        let latency = if self.config.probe_latency {
            self.transition(EngineState::ProbingLatency).await;
            match LatencyProber::new(self.transport.as_ref(), &self.config, &self.logger)
                .probe(&endpoints)
                .await
            {
                Ok(report) => {
                    result.apply_latency(Some(report.metric));
                    warnings.extend(report.warnings.iter().cloned());
                    Some(report)
                }
                Err(error) => {
                    result.apply_latency(None);
                    degradations.push(error);
                    None
                }
            }
        } else {
            None
        };

        let download = if self.config.enable_download {
            self.transition(EngineState::TestingDownload).await;
            let metric = self.run_phase(Direction::Download, &endpoints, &mut degradations).await?;
            result.apply_download(&metric);
            metric
        } else {
            ThroughputMetric::skipped()
        };

        let upload = if self.config.enable_upload {
            self.transition(EngineState::TestingUpload).await;
            let metric = self.run_phase(Direction::Upload, &endpoints, &mut degradations).await?;
            result.apply_upload(&metric);
            metric
        } else {
            ThroughputMetric::skipped()
        };

        self.transition(EngineState::Finalizing).await;
        if let Some(options) = self.telemetry.clone() {
            if options.settings.level.is_enabled() {
                let log: Vec<String> = warnings
                    .iter()
                    .cloned()
                    .chain(degradations.iter().map(|e: &AppError| e.to_string()))
                    .collect();
                match TelemetryReporter::new(self.transport.clone())
                    .submit(&result, options.extra.as_deref(), &options.settings, &log)
                    .await
                {
                    Ok(share) => {
                        self.logger.info("Result shared").field("share", &share).log().await;
                        result.share = share;
                    }
                    Err(error) => {
                        self.logger.warn("Telemetry submission failed").error_info(&error).log().await;
                        degradations.push(error);
                    }
                }
            } else {
                self.logger.debug("Telemetry disabled, not submitting").log().await;
            }
        }

        self.transition(EngineState::Done).await;

        Ok(RunOutcome {
            result,
            server,
            ip_info,
            latency,
            download,
            upload,
            degradations,
            warnings,
            transitions: self.transitions.clone(),
        })
    }

    /// First candidate answering one HTTP ping within the timeout
    async fn select_server(&self, candidates: &[ServerCandidate]) -> Result<(ServerCandidate, ServerEndpoints)> {
        for candidate in candidates {
            let endpoints = match candidate.endpoints(self.config.secure) {
                Ok(endpoints) => endpoints,
                Err(error) => {
                    self.logger
                        .warn(&format!("Skipping server {}", candidate.id))
                        .error_info(&error)
                        .log()
                        .await;
                    continue;
                }
            };

            match timeout(self.config.timeout(), self.transport.ping(&endpoints.ping)).await {
                Ok(Ok(())) => {
                    self.logger
                        .info(&format!("Selected server {} ({})", candidate.name, candidate.id))
                        .field("url", endpoints.base.as_str())
                        .log()
                        .await;
                    return Ok((candidate.clone(), endpoints));
                }
                Ok(Err(error @ AppError::FatalTransport(_))) => return Err(error),
                Ok(Err(error)) => {
                    self.logger
                        .debug(&format!("Server {} unreachable", candidate.id))
                        .error_info(&error)
                        .log()
                        .await;
                }
                Err(_) => {
                    self.logger
                        .debug(&format!("Server {} timed out", candidate.id))
                        .log()
                        .await;
                }
            }
        }

        Err(AppError::server_unreachable(format!(
            "none of the {} candidate server(s) responded",
            candidates.len()
        )))
    }

    async fn run_phase(
        &self,
        direction: Direction,
        endpoints: &Arc<ServerEndpoints>,
        degradations: &mut Vec<AppError>,
    ) -> Result<ThroughputMetric> {
        let outcome = ThroughputDriver::new(self.transport.clone(), self.config.clone(), &self.logger)
            .run_phase(direction, endpoints.clone())
            .await?;

        match outcome.metric.status {
            PhaseStatus::Completed | PhaseStatus::Skipped => {}
            PhaseStatus::Degraded => degradations.push(AppError::phase_degraded(format!(
                "{} completed with errors ({} worker(s) affected)",
                direction,
                outcome.workers.iter().filter(|w| w.error.is_some()).count() + outcome.aborted_workers
            ))),
            PhaseStatus::Failed => degradations.push(AppError::phase_degraded(format!(
                "{} failed: no worker transferred any data",
                direction
            ))),
        }

        Ok(outcome.metric)
    }

    async fn transition(&mut self, next: EngineState) {
        self.logger
            .debug(&format!("State {} -> {}", self.state, next))
            .field("from", self.state)
            .field("to", next)
            .log()
            .await;
        self.state = next;
        self.transitions.push(next);
    }
}
