//! Core formatting trait and the plain-text implementation

use crate::{
    engine::RunOutcome,
    error::{AppError, Result},
    models::{OutputMode, OutputOptions, ThroughputMetric},
    servers::ServerCandidate,
    types::PhaseStatus,
};
use std::fmt::Write as _;

use super::units::UnitFormatter;

/// Renders run outcomes and server lists for stdout
pub trait OutputFormatter {
    /// Render the outcome of a completed run
    fn format_outcome(&self, outcome: &RunOutcome) -> Result<String>;

    /// Render the candidate list for `--list`
    fn format_server_list(&self, servers: &[ServerCandidate], secure: bool) -> Result<String>;

    /// Format error messages
    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("Error: {}", error))
    }

    /// Format warning messages
    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("Warning: {}", warning))
    }
}

/// Configuration options for human-readable formatting
#[derive(Debug, Clone, Default)]
pub struct FormattingOptions {
    pub enable_color: bool,
    /// Only ping, jitter and rates
    pub simple: bool,
    pub units: UnitFormatter,
}

impl FormattingOptions {
    pub fn from_output(options: &OutputOptions) -> Self {
        Self {
            enable_color: options.enable_color,
            simple: options.mode == OutputMode::Simple,
            units: UnitFormatter::from_options(options),
        }
    }
}

pub(crate) fn write_failed(e: std::fmt::Error) -> AppError {
    AppError::internal(format!("Failed to format output: {}", e))
}

/// Rate text for a phase, annotated when the phase did not complete cleanly
pub(crate) fn describe_rate(units: &UnitFormatter, metric: &ThroughputMetric) -> String {
    match metric.status {
        PhaseStatus::Completed => units.format_rate(metric.rate_bps),
        PhaseStatus::Degraded => format!("{} (degraded)", units.format_rate(metric.rate_bps)),
        PhaseStatus::Failed => format!("{} (failed)", units.format_rate(0.0)),
        PhaseStatus::Skipped => "skipped".to_string(),
    }
}

/// One line per candidate: `id: name (url) [Sponsor: name @ url]`
pub(crate) fn server_line(server: &ServerCandidate, secure: bool) -> String {
    let mut line = format!("{}: {} ({})", server.id, server.name, server.display_url(secure));
    if !server.sponsor_name.is_empty() {
        let _ = write!(line, " [Sponsor: {} @ {}]", server.sponsor_name, server.sponsor_url);
    }
    line
}

/// Plain text formatter
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    fn format_simple(&self, outcome: &RunOutcome) -> Result<String> {
        let result = &outcome.result;
        let units = &self.options.units;
        let mut output = String::new();

        writeln!(output, "Ping:\t{}\tJitter:\t{}", with_ms(&result.format_ping()), with_ms(&result.format_jitter()))
            .map_err(write_failed)?;
        if outcome.download.status != PhaseStatus::Skipped {
            writeln!(output, "Download rate:\t{}", describe_rate(units, &outcome.download)).map_err(write_failed)?;
        }
        if outcome.upload.status != PhaseStatus::Skipped {
            writeln!(output, "Upload rate:\t{}", describe_rate(units, &outcome.upload)).map_err(write_failed)?;
        }
        if !result.share.is_empty() {
            writeln!(output, "Share:\t{}", result.share).map_err(write_failed)?;
        }
        Ok(output)
    }
}

/// Append the unit to a formatted latency unless it is unavailable
pub(crate) fn with_ms(value: &str) -> String {
    if value == "n/a" {
        value.to_string()
    } else {
        format!("{} ms", value)
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_outcome(&self, outcome: &RunOutcome) -> Result<String> {
        if self.options.simple {
            return self.format_simple(outcome);
        }

        let result = &outcome.result;
        let units = &self.options.units;
        let mut output = String::new();

        writeln!(output, "Selected server: {} [{}]", result.server.name, result.server.url).map_err(write_failed)?;
        if !outcome.server.sponsor_name.is_empty() {
            writeln!(output, "Sponsored by: {} @ {}", outcome.server.sponsor_name, outcome.server.sponsor_url)
                .map_err(write_failed)?;
        }
        if let Some(info) = &outcome.ip_info {
            writeln!(output, "You're testing from: {}", info.summary).map_err(write_failed)?;
        }

        match &outcome.latency {
            Some(report) => writeln!(
                output,
                "Ping: {}\tJitter: {}\t({}, {} of {} probes answered)",
                with_ms(&result.format_ping()),
                with_ms(&result.format_jitter()),
                report.method,
                report.metric.samples,
                report.metric.samples + report.metric.dropped
            ),
            None => writeln!(output, "Ping: n/a\tJitter: n/a"),
        }
        .map_err(write_failed)?;

        writeln!(output, "Download rate:\t{}", describe_rate(units, &outcome.download)).map_err(write_failed)?;
        writeln!(output, "Upload rate:\t{}", describe_rate(units, &outcome.upload)).map_err(write_failed)?;
        writeln!(
            output,
            "Data used:\t{} received, {} sent",
            units.format_size(result.bytes_received),
            units.format_size(result.bytes_sent)
        )
        .map_err(write_failed)?;

        if !result.share.is_empty() {
            writeln!(output, "Share your result: {}", result.share).map_err(write_failed)?;
        }

        for warning in outcome.log_lines() {
            writeln!(output, "{}", self.format_warning(&warning)?).map_err(write_failed)?;
        }

        Ok(output)
    }

    fn format_server_list(&self, servers: &[ServerCandidate], secure: bool) -> Result<String> {
        let mut output = String::new();
        for server in servers {
            writeln!(output, "{}", server_line(server, secure)).map_err(write_failed)?;
        }
        Ok(output)
    }
}
