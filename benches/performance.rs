//! Performance benchmarks for the network speed tester
//!
//! The reductions run once per phase on every sample a phase produced, so
//! they are measured at sample counts well beyond a typical run.

use clap::Parser;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use network_speed_tester::{
    cli::Cli,
    config::parser::ConfigParser,
    models::{Sample, TestConfig},
    output::UnitFormatter,
    stats::{active_workers, mean_abs_consecutive_diff, reduce_latency, reduce_throughput},
};
use std::hint::black_box;
use std::time::Duration;

/// Round trips wobbling between 18 and 30 ms
fn create_rtt_samples(count: usize) -> Vec<Sample> {
    (0..count)
        .map(|i| {
            Sample::round_trip(
                Duration::from_millis(i as u64 * 25),
                Duration::from_micros(18_000 + (i as u64 * 7_919) % 12_000),
            )
        })
        .collect()
}

/// 64 KiB reads spread across `workers` over a 15 s phase
fn create_transfer_samples(count: usize, workers: usize) -> Vec<Sample> {
    let step = 15_000_000 / count.max(1) as u64;
    let mut cumulative = vec![0u64; workers];
    (0..count)
        .map(|i| {
            let worker = i % workers;
            cumulative[worker] += 65_536;
            Sample::transfer(Duration::from_micros(i as u64 * step), worker, 65_536, cumulative[worker])
        })
        .collect()
}

/// Benchmark configuration parsing from CLI arguments
fn benchmark_config_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("config_parsing");

    let args = vec![
        "nst",
        "--concurrent", "6",
        "--duration", "10",
        "--server", "12",
        "--server", "31",
        "--csv",
        "--csv-delimiter", ";",
        "--telemetry-level", "full",
    ];

    group.bench_function("parse_cli_args", |b| {
        b.iter(|| {
            let cli = Cli::try_parse_from(black_box(&args)).unwrap();
            black_box(cli);
        });
    });

    group.bench_function("parse_from_cli", |b| {
        let cli = Cli::try_parse_from(&args).unwrap();
        b.iter(|| {
            let parser = ConfigParser::new(black_box(cli.clone()));
            let config = parser.parse_with_lookup(|_| None).unwrap();
            black_box(config);
        });
    });

    group.bench_function("validate_config", |b| {
        let config = TestConfig::default();
        b.iter(|| black_box(config.validate()));
    });

    group.finish();
}

/// Benchmark the latency and throughput reductions
fn benchmark_statistics_calculation(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics");

    for size in [10, 100, 1_000, 10_000].iter() {
        let rtts = create_rtt_samples(*size);
        group.bench_with_input(BenchmarkId::new("reduce_latency", size), size, |b, _| {
            b.iter(|| black_box(reduce_latency(black_box(&rtts), 0)));
        });

        let values: Vec<f64> = rtts.iter().filter_map(|s| s.rtt_ms()).collect();
        group.bench_with_input(BenchmarkId::new("jitter", size), size, |b, _| {
            b.iter(|| black_box(mean_abs_consecutive_diff(black_box(&values))));
        });
    }

    for size in [1_000, 10_000, 100_000].iter() {
        let transfers = create_transfer_samples(*size, 8);
        group.bench_with_input(BenchmarkId::new("reduce_throughput", size), size, |b, _| {
            b.iter(|| {
                black_box(reduce_throughput(
                    black_box(&transfers),
                    Duration::from_secs(15),
                    Duration::from_secs(1),
                ))
            });
        });
        group.bench_with_input(BenchmarkId::new("active_workers", size), size, |b, _| {
            b.iter(|| black_box(active_workers(black_box(&transfers))));
        });
    }

    group.finish();
}

/// Benchmark unit conversion used by the human-readable formatter
fn benchmark_result_formatting(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_formatting");

    let units = [
        UnitFormatter::new(false, false),
        UnitFormatter::new(true, false),
        UnitFormatter::new(true, true),
    ];
    group.bench_function("format_rate_and_size", |b| {
        b.iter(|| {
            for unit in &units {
                black_box(unit.format_rate(black_box(87_654_321.0)));
                black_box(unit.format_size(black_box(164_382_720)));
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_config_parsing,
    benchmark_statistics_calculation,
    benchmark_result_formatting
);

criterion_main!(benches);
