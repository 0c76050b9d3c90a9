//! Throughput phase driver
//!
//! Spawns the configured number of transfer workers against one server, stops
//! them at the phase deadline and reduces their samples into a rate.

use crate::{
    client::Transport,
    defaults::{UPLOAD_PIECE_SIZE, WORKER_GRACE_PERIOD},
    engine::worker::{generate_piece, TransferWorker, WorkerReport},
    error::{AppError, Result},
    logging::Logger,
    models::{Sample, TestConfig, ThroughputMetric},
    servers::ServerEndpoints,
    stats::{active_workers, reduce_throughput, sample_channel},
    types::{Direction, PhaseStatus},
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

/// Everything a finished phase produced
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub metric: ThroughputMetric,
    pub workers: Vec<WorkerReport>,
    /// Workers still running at the end of the grace period
    pub aborted_workers: usize,
}

pub struct ThroughputDriver {
    transport: Arc<dyn Transport>,
    config: Arc<TestConfig>,
    logger: Logger,
}

impl ThroughputDriver {
    pub fn new(transport: Arc<dyn Transport>, config: Arc<TestConfig>, logger: &Logger) -> Self {
        Self {
            transport,
            config,
            logger: logger.child("DRIVER"),
        }
    }

    /// Run one download or upload phase against `server`
    ///
    /// Fails only on `FatalTransport`; every other worker failure lowers the
    /// phase status instead.
    pub async fn run_phase(&self, direction: Direction, server: Arc<ServerEndpoints>) -> Result<PhaseOutcome> {
        let concurrency = self.config.concurrency.max(1);
        let start = Instant::now();
        let deadline = start + self.config.duration();
        let (sink, collector) = sample_channel(start);

        let payload = (direction == Direction::Upload && self.config.pre_allocate)
            .then(|| generate_piece(UPLOAD_PIECE_SIZE, 0x5eed));

        self.logger
            .info(&format!("Starting {} phase", direction))
            .field("workers", concurrency)
            .field("duration_s", self.config.duration_seconds)
            .log()
            .await;

        let mut handles = Vec::with_capacity(concurrency);
        for id in 0..concurrency {
            let mut worker = TransferWorker::new(
                id,
                self.transport.clone(),
                server.clone(),
                self.config.clone(),
                sink.clone(),
                deadline,
            );
            if let Some(payload) = &payload {
                worker = worker.with_payload(payload.clone());
            }
            handles.push(tokio::spawn(worker.run(direction)));
        }
        drop(sink);

        let (reports, aborted_workers) = collect_reports(handles, deadline + WORKER_GRACE_PERIOD).await;

        if aborted_workers > 0 {
            self.logger
                .warn(&format!("{} worker(s) did not stop within the grace period", aborted_workers))
                .field("direction", direction.as_str())
                .log()
                .await;
        }

        let end = Instant::now().min(deadline);
        let samples = collector.drain();
        let metric = self.reduce(&samples, end - start, &reports);

        for report in &reports {
            if let Some(error) = &report.error {
                self.logger
                    .debug(&format!("Worker {} stopped early", report.id))
                    .field("attempts", report.attempts)
                    .error_info(error)
                    .log()
                    .await;
            }
        }

        if let Some(fatal) = reports.iter().find(|report| report.is_fatal()) {
            return Err(fatal.error.clone().unwrap_or_else(|| AppError::fatal_transport("transport failure")));
        }

        self.logger
            .info(&format!("Finished {} phase", direction))
            .throughput(&metric)
            .field("active_workers", active_workers(&samples))
            .log()
            .await;

        Ok(PhaseOutcome {
            metric,
            workers: reports,
            aborted_workers,
        })
    }

    fn reduce(&self, samples: &[Sample], window: std::time::Duration, reports: &[WorkerReport]) -> ThroughputMetric {
        if active_workers(samples) == 0 {
            return ThroughputMetric::failed(window);
        }

        let mut metric = reduce_throughput(samples, window, self.config.ramp_up());
        let any_failed = reports.iter().any(|report| report.error.is_some());
        if metric.status == PhaseStatus::Completed && any_failed {
            metric.status = PhaseStatus::Degraded;
        }
        metric
    }
}

/// Await every worker until `until`, aborting the ones still running
///
/// Reports of workers that finished are kept. The count of workers that
/// were aborted or panicked is returned alongside.
async fn collect_reports(handles: Vec<JoinHandle<WorkerReport>>, until: Instant) -> (Vec<WorkerReport>, usize) {
    let mut reports = Vec::with_capacity(handles.len());
    let mut lost = 0;
    for mut handle in handles {
        match timeout_at(until, &mut handle).await {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(_)) => lost += 1,
            Err(_) => {
                handle.abort();
                lost += 1;
            }
        }
    }
    (reports, lost)
}
