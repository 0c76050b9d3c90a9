//! Colored formatter implementation with terminal color support

use crate::{
    engine::RunOutcome,
    error::Result,
    models::ThroughputMetric,
    servers::ServerCandidate,
    types::PhaseStatus,
};
use colored::*;
use std::fmt::Write as _;

use super::formatter::{
    describe_rate, server_line, with_ms, write_failed, FormattingOptions, OutputFormatter, PlainFormatter,
};

/// Quality classification used to pick a color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl PerformanceLevel {
    /// Classify a round-trip latency
    pub fn from_latency(latency_ms: f64) -> Self {
        if latency_ms < 20.0 {
            Self::Excellent
        } else if latency_ms < 50.0 {
            Self::Good
        } else if latency_ms < 150.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    /// Classify a throughput in bit/s
    pub fn from_rate(rate_bps: f64) -> Self {
        let mbps = rate_bps / 1_000_000.0;
        if mbps >= 100.0 {
            Self::Excellent
        } else if mbps >= 25.0 {
            Self::Good
        } else if mbps >= 5.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Excellent => Color::Green,
            Self::Good => Color::Cyan,
            Self::Fair => Color::Yellow,
            Self::Poor => Color::Red,
        }
    }
}

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub label: Color,
    pub warning: Color,
    pub error: Color,
    pub highlight: Color,
    pub muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            label: Color::Blue,
            warning: Color::Yellow,
            error: Color::Red,
            highlight: Color::Magenta,
            muted: Color::BrightBlack,
        }
    }
}

/// Colored formatter implementation
pub struct ColoredFormatter {
    plain_formatter: PlainFormatter,
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self::with_color_scheme(options, ColorScheme::default())
    }

    pub fn with_color_scheme(options: FormattingOptions, color_scheme: ColorScheme) -> Self {
        Self {
            plain_formatter: PlainFormatter::new(options.clone()),
            options,
            color_scheme,
        }
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.options.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }

    fn label(&self, text: &str) -> ColoredString {
        if self.options.enable_color {
            text.bold().color(self.color_scheme.label)
        } else {
            text.normal()
        }
    }

    fn rate(&self, metric: &ThroughputMetric) -> ColoredString {
        let text = describe_rate(&self.options.units, metric);
        let color = match metric.status {
            PhaseStatus::Completed => PerformanceLevel::from_rate(metric.rate_bps).color(),
            PhaseStatus::Degraded => self.color_scheme.warning,
            PhaseStatus::Failed => self.color_scheme.error,
            PhaseStatus::Skipped => self.color_scheme.muted,
        };
        self.colorize(&text, color)
    }

    fn latency(&self, value: Option<f64>, formatted: &str) -> ColoredString {
        match value {
            Some(ms) => self.colorize(&with_ms(formatted), PerformanceLevel::from_latency(ms).color()),
            None => self.colorize("n/a", self.color_scheme.muted),
        }
    }

    /// Check if terminal supports colors
    pub fn supports_color() -> bool {
        std::env::var("NO_COLOR").is_err() && std::env::var("TERM").map(|term| term != "dumb").unwrap_or(true)
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_outcome(&self, outcome: &RunOutcome) -> Result<String> {
        if self.options.simple || !self.options.enable_color {
            return self.plain_formatter.format_outcome(outcome);
        }

        let result = &outcome.result;
        let units = &self.options.units;
        let mut output = String::new();

        writeln!(
            output,
            "{} {} [{}]",
            self.label("Selected server:"),
            self.colorize(&result.server.name, self.color_scheme.highlight),
            result.server.url
        )
        .map_err(write_failed)?;
        if !outcome.server.sponsor_name.is_empty() {
            writeln!(
                output,
                "{} {} @ {}",
                self.label("Sponsored by:"),
                outcome.server.sponsor_name,
                outcome.server.sponsor_url
            )
            .map_err(write_failed)?;
        }
        if let Some(info) = &outcome.ip_info {
            writeln!(output, "{} {}", self.label("You're testing from:"), info.summary).map_err(write_failed)?;
        }

        write!(
            output,
            "{} {}\t{} {}",
            self.label("Ping:"),
            self.latency(result.ping, &result.format_ping()),
            self.label("Jitter:"),
            self.latency(result.jitter, &result.format_jitter())
        )
        .map_err(write_failed)?;
        if let Some(report) = &outcome.latency {
            write!(
                output,
                "\t{}",
                self.colorize(
                    &format!(
                        "({}, {} of {} probes answered)",
                        report.method,
                        report.metric.samples,
                        report.metric.samples + report.metric.dropped
                    ),
                    self.color_scheme.muted
                )
            )
            .map_err(write_failed)?;
        }
        writeln!(output).map_err(write_failed)?;

        writeln!(output, "{}\t{}", self.label("Download rate:"), self.rate(&outcome.download)).map_err(write_failed)?;
        writeln!(output, "{}\t{}", self.label("Upload rate:"), self.rate(&outcome.upload)).map_err(write_failed)?;
        writeln!(
            output,
            "{}\t{}",
            self.label("Data used:"),
            self.colorize(
                &format!(
                    "{} received, {} sent",
                    units.format_size(result.bytes_received),
                    units.format_size(result.bytes_sent)
                ),
                self.color_scheme.muted
            )
        )
        .map_err(write_failed)?;

        if !result.share.is_empty() {
            writeln!(
                output,
                "{} {}",
                self.label("Share your result:"),
                self.colorize(&result.share, self.color_scheme.highlight).underline()
            )
            .map_err(write_failed)?;
        }

        for warning in outcome.log_lines() {
            writeln!(output, "{}", self.format_warning(&warning)?).map_err(write_failed)?;
        }

        Ok(output)
    }

    fn format_server_list(&self, servers: &[ServerCandidate], secure: bool) -> Result<String> {
        let mut output = String::new();
        for server in servers {
            let line = server_line(server, secure);
            match line.split_once(": ") {
                Some((id, rest)) => writeln!(output, "{}: {}", self.colorize(id, self.color_scheme.highlight), rest),
                None => writeln!(output, "{}", line),
            }
            .map_err(write_failed)?;
        }
        Ok(output)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        let prefix = if self.options.enable_color {
            "Error:".bold().color(self.color_scheme.error)
        } else {
            "Error:".normal()
        };
        Ok(format!("{} {}", prefix, error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("Warning:", self.color_scheme.warning), warning))
    }
}
