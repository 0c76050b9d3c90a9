//! Network Speed Tester - Main CLI Application
//!
//! Measures latency, jitter, download and upload throughput against
//! LibreSpeed servers.

use clap::Parser;
use network_speed_tester::{
    app::run_application,
    cli::Cli,
    config::EnvManager,
    error::{AppError, ErrorReporter},
    models::OutputMode,
};
use std::process;

#[tokio::main]
async fn main() {
    // Set up better panic handling
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        eprintln!("Please report this issue at: https://github.com/MaurUppi/network-speed-tester/issues");
        process::exit(99);
    }));

    // .env values must be visible before clap reads env-backed flags
    let env_file = match EnvManager::load_env_file() {
        Ok(path) => path,
        Err(e) => exit_with(&e, false, false),
    };

    let cli = Cli::parse();
    let use_color = cli.use_colors();
    let verbose = cli.debug && cli.output_mode() == OutputMode::Human;

    if let Err(e) = run_application(cli, env_file).await {
        exit_with(&e, use_color, verbose);
    }
}

fn exit_with(error: &AppError, use_color: bool, verbose: bool) -> ! {
    ErrorReporter::new(use_color, verbose).report_error(error);

    print_error_suggestions(error);
    process::exit(error.exit_code());
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Run with --help for the full list of options");
            eprintln!("  - Check SPEEDTEST_* variables in your environment or .env file");
            eprintln!("  - --server and --exclude cannot be combined");
        }
        AppError::ServerUnreachable(_) => {
            eprintln!();
            eprintln!("Server selection help:");
            eprintln!("  - Run with --list to see the available servers");
            eprintln!("  - Check that the ids given with --server exist");
            eprintln!("  - Try --secure if servers only answer over HTTPS");
        }
        AppError::FatalTransport(_) => {
            eprintln!();
            eprintln!("TLS troubleshooting:");
            eprintln!("  - Trust an additional CA bundle with --ca-cert");
            eprintln!("  - As a last resort, disable verification with --skip-cert-verify");
        }
        AppError::Network(_) | AppError::Timeout(_) => {
            eprintln!();
            eprintln!("Network troubleshooting:");
            eprintln!("  - Check your internet connection");
            eprintln!("  - Increase the timeout with --timeout");
            eprintln!("  - Force an address family with -4 or -6");
        }
        _ => {}
    }
}
