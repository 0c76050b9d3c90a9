//! Sample collection and statistical reduction for speed test phases
//!
//! Workers and the latency prober write [`Sample`]s into a [`SampleSink`];
//! once every writer of a phase has finished the [`SampleCollector`] is drained
//! exactly once and the samples are reduced into a phase metric.

use crate::{
    models::metrics::{LatencyMetric, Sample, ThroughputMetric},
    types::PhaseStatus,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;


/// Write side of a phase's sample channel
///
/// Cloned into every worker. Sends never block and never fail the writer; a
/// sample sent after the collector is gone is discarded.
#[derive(Debug, Clone)]
pub struct SampleSink {
    tx: mpsc::UnboundedSender<Sample>,
    phase_start: Instant,
}

/// Read side of a phase's sample channel
#[derive(Debug)]
pub struct SampleCollector {
    rx: mpsc::UnboundedReceiver<Sample>,
}

/// Create the sink/collector pair for a phase starting at `phase_start`
pub fn sample_channel(phase_start: Instant) -> (SampleSink, SampleCollector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SampleSink { tx, phase_start }, SampleCollector { rx })
}

impl SampleSink {
    /// Instant the phase started at
    pub fn phase_start(&self) -> Instant {
        self.phase_start
    }

    /// Offset of `now` from the phase start
    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.phase_start)
    }

    /// Record a successful round trip that completed now
    pub fn record_rtt(&self, rtt: Duration) {
        let _ = self.tx.send(Sample::round_trip(self.elapsed(), rtt));
    }

    /// Record one read/write of `bytes` by `worker`
    pub fn record_transfer(&self, worker: usize, bytes: u64, cumulative: u64) {
        let _ = self.tx.send(Sample::transfer(self.elapsed(), worker, bytes, cumulative));
    }

    /// Record a pre-built sample
    pub fn record(&self, sample: Sample) {
        let _ = self.tx.send(sample);
    }
}

impl SampleCollector {
    /// Take every sample written so far, consuming the collector
    pub fn drain(mut self) -> Vec<Sample> {
        let mut samples = Vec::new();
        while let Ok(sample) = self.rx.try_recv() {
            samples.push(sample);
        }
        samples
    }
}

/// Mean absolute difference between consecutive values
///
/// Returns 0 for fewer than two values.
pub fn mean_abs_consecutive_diff(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum: f64 = values.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    sum / (values.len() - 1) as f64
}

/// Reduce round-trip samples to latency (minimum) and jitter
///
/// Samples are ordered by arrival offset before jitter is computed. `dropped`
/// is carried into the metric unchanged. Returns `None` when no round trip
/// was recorded.
pub fn reduce_latency(samples: &[Sample], dropped: usize) -> Option<LatencyMetric> {
    let mut arrivals: Vec<(Duration, f64)> = samples
        .iter()
        .filter_map(|s| s.rtt_ms().map(|rtt| (s.offset(), rtt)))
        .collect();

    if arrivals.is_empty() {
        return None;
    }

    arrivals.sort_by_key(|(offset, _)| *offset);
    let rtts: Vec<f64> = arrivals.iter().map(|(_, rtt)| *rtt).collect();
    let latency_ms = rtts.iter().copied().fold(f64::INFINITY, f64::min);

    Some(LatencyMetric {
        latency_ms,
        jitter_ms: mean_abs_consecutive_diff(&rtts),
        samples: rtts.len(),
        dropped,
    })
}

/// Reduce transfer samples recorded over `window` into a rate
///
/// Bytes recorded before `ramp_up` are excluded and the denominator becomes
/// `window - ramp_up`. When `ramp_up >= window` nothing is excluded.
pub fn reduce_throughput(samples: &[Sample], window: Duration, ramp_up: Duration) -> ThroughputMetric {
    let total_bytes: u64 = samples.iter().map(Sample::bytes).sum();

    let (bytes, effective_window) = if ramp_up < window {
        let counted = samples
            .iter()
            .filter(|s| s.offset() >= ramp_up)
            .map(Sample::bytes)
            .sum();
        (counted, window - ramp_up)
    } else {
        (total_bytes, window)
    };

    let seconds = effective_window.as_secs_f64();
    let rate_bps = if seconds > 0.0 {
        (bytes as f64 * 8.0 / seconds).max(0.0)
    } else {
        0.0
    };

    let status = if bytes == 0 || rate_bps == 0.0 {
        PhaseStatus::Degraded
    } else {
        PhaseStatus::Completed
    };

    ThroughputMetric {
        bytes,
        total_bytes,
        window_ms: seconds * 1000.0,
        rate_bps,
        status,
    }
}

/// Number of distinct workers that recorded at least one transfer
pub fn active_workers(samples: &[Sample]) -> usize {
    let mut workers: Vec<usize> = samples
        .iter()
        .filter_map(|s| match s {
            Sample::Transfer { worker, .. } => Some(*worker),
            Sample::RoundTrip { .. } => None,
        })
        .collect();
    workers.sort_unstable();
    workers.dedup();
    workers.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtt(offset_ms: u64, rtt_ms: u64) -> Sample {
        Sample::round_trip(Duration::from_millis(offset_ms), Duration::from_millis(rtt_ms))
    }

    fn transfer(offset_ms: u64, worker: usize, bytes: u64) -> Sample {
        Sample::transfer(Duration::from_millis(offset_ms), worker, bytes, bytes)
    }

    #[test]
    fn test_latency_is_minimum_and_jitter_is_mean_abs_diff() {
        let samples = vec![rtt(0, 20), rtt(30, 24), rtt(60, 22), rtt(90, 30)];
        let metric = reduce_latency(&samples, 0).unwrap();

        assert_eq!(metric.latency_ms, 20.0);
        // |24-20| + |22-24| + |30-22| = 14 over 3 deltas
        assert!((metric.jitter_ms - 14.0 / 3.0).abs() < 1e-9);
        assert_eq!(metric.samples, 4);
    }

    #[test]
    fn test_latency_orders_by_arrival() {
        let shuffled = vec![rtt(60, 22), rtt(0, 20), rtt(90, 30), rtt(30, 24)];
        let ordered = vec![rtt(0, 20), rtt(30, 24), rtt(60, 22), rtt(90, 30)];
        assert_eq!(reduce_latency(&shuffled, 0), reduce_latency(&ordered, 0));
    }

    #[test]
    fn test_single_sample_has_zero_jitter() {
        let metric = reduce_latency(&[rtt(0, 42)], 9).unwrap();
        assert_eq!(metric.latency_ms, 42.0);
        assert_eq!(metric.jitter_ms, 0.0);
        assert_eq!(metric.dropped, 9);
    }

    #[test]
    fn test_no_samples_is_unavailable() {
        assert!(reduce_latency(&[], 10).is_none());
        assert!(reduce_latency(&[transfer(0, 0, 100)], 0).is_none());
    }

    #[test]
    fn test_throughput_excludes_ramp_up() {
        // 1000 bytes every 100ms for 2s from one worker
        let samples: Vec<Sample> = (1..=20).map(|i| transfer(i * 100, 0, 1000)).collect();
        let metric = reduce_throughput(&samples, Duration::from_secs(2), Duration::from_secs(1));

        // Offsets 1000..=2000 => 11 samples over 1s
        assert_eq!(metric.bytes, 11_000);
        assert_eq!(metric.total_bytes, 20_000);
        assert_eq!(metric.window_ms, 1000.0);
        assert_eq!(metric.rate_bps, 88_000.0);
        assert_eq!(metric.status, PhaseStatus::Completed);
    }

    #[test]
    fn test_throughput_without_ramp_up() {
        let samples = vec![transfer(500, 0, 1_000_000), transfer(900, 1, 1_000_000)];
        let metric = reduce_throughput(&samples, Duration::from_secs(2), Duration::ZERO);
        assert_eq!(metric.rate_bps, 8_000_000.0);
    }

    #[test]
    fn test_ramp_up_longer_than_window_is_ignored() {
        let samples = vec![transfer(100, 0, 1000)];
        let metric = reduce_throughput(&samples, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(metric.bytes, 1000);
        assert_eq!(metric.rate_bps, 8000.0);
    }

    #[test]
    fn test_zero_bytes_is_degraded() {
        let metric = reduce_throughput(&[], Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(metric.rate_bps, 0.0);
        assert_eq!(metric.status, PhaseStatus::Degraded);
    }

    #[test]
    fn test_zero_window_yields_zero_rate() {
        let metric = reduce_throughput(&[transfer(0, 0, 500)], Duration::ZERO, Duration::ZERO);
        assert_eq!(metric.rate_bps, 0.0);
        assert_eq!(metric.total_bytes, 500);
    }

    #[test]
    fn test_active_workers() {
        let samples = vec![transfer(1, 0, 1), transfer(2, 2, 1), transfer(3, 0, 1), rtt(4, 1)];
        assert_eq!(active_workers(&samples), 2);
    }

    #[tokio::test]
    async fn test_sink_collects_from_many_writers() {
        let (sink, collector) = sample_channel(Instant::now());

        let mut handles = Vec::new();
        for worker in 0..4 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                for i in 1..=25u64 {
                    sink.record_transfer(worker, 10, i * 10);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        drop(sink);

        let samples = collector.drain();
        assert_eq!(samples.len(), 100);
        assert_eq!(samples.iter().map(Sample::bytes).sum::<u64>(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_offsets_follow_clock() {
        let (sink, collector) = sample_channel(Instant::now());
        tokio::time::sleep(Duration::from_millis(250)).await;
        sink.record_rtt(Duration::from_millis(20));
        drop(sink);

        let samples = collector.drain();
        assert_eq!(samples[0].offset(), Duration::from_millis(250));
    }
}
