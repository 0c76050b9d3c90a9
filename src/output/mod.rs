//! Output formatting and display system
//!
//! Human-readable output (plain or colored, optionally in simple mode) converts
//! units as requested; CSV and JSON output report canonical units.

mod colored;
mod formatter;
mod machine;
mod units;

pub use colored::{ColorScheme, ColoredFormatter, PerformanceLevel};
pub use formatter::{FormattingOptions, OutputFormatter, PlainFormatter};
pub use machine::{CsvFormatter, JsonFormatter, CSV_COLUMNS};
pub use units::UnitFormatter;

use crate::{
    engine::RunOutcome,
    error::Result,
    models::{OutputMode, OutputOptions},
    servers::ServerCandidate,
};

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create the formatter for the configured output mode
    pub fn create_formatter(options: &OutputOptions) -> Result<Box<dyn OutputFormatter>> {
        Ok(match options.mode {
            OutputMode::Csv => Box::new(CsvFormatter::new(options.csv_delimiter, options.csv_header)?),
            OutputMode::Json => Box::new(JsonFormatter::new(false)),
            OutputMode::Human | OutputMode::Simple => {
                let formatting = FormattingOptions::from_output(options);
                if formatting.enable_color && ColoredFormatter::supports_color() {
                    Box::new(ColoredFormatter::new(formatting))
                } else {
                    Box::new(PlainFormatter::new(FormattingOptions {
                        enable_color: false,
                        ..formatting
                    }))
                }
            }
        })
    }
}

/// Writes results to stdout through the configured formatter
pub struct OutputCoordinator {
    formatter: Box<dyn OutputFormatter>,
}

impl OutputCoordinator {
    pub fn new(formatter: Box<dyn OutputFormatter>) -> Self {
        Self { formatter }
    }

    pub fn from_options(options: &OutputOptions) -> Result<Self> {
        Ok(Self::new(OutputFormatterFactory::create_formatter(options)?))
    }

    pub fn display_outcome(&self, outcome: &RunOutcome) -> Result<()> {
        print!("{}", self.formatter.format_outcome(outcome)?);
        Ok(())
    }

    pub fn display_server_list(&self, servers: &[ServerCandidate], secure: bool) -> Result<()> {
        print!("{}", self.formatter.format_server_list(servers, secure)?);
        Ok(())
    }

    /// Render a warning line for stderr
    pub fn render_warning(&self, warning: &str) -> Result<String> {
        self.formatter.format_warning(warning)
    }
}

#[cfg(test)]
mod tests {
    use super::formatter::test_support::outcome;
    use super::*;

    #[test]
    fn test_factory_picks_formatter_per_mode() {
        let run = outcome();

        let csv = OutputFormatterFactory::create_formatter(&OutputOptions {
            mode: OutputMode::Csv,
            csv_delimiter: '|',
            ..Default::default()
        })
        .unwrap();
        assert!(csv.format_outcome(&run).unwrap().contains("|80000000|"));

        let json = OutputFormatterFactory::create_formatter(&OutputOptions {
            mode: OutputMode::Json,
            ..Default::default()
        })
        .unwrap();
        assert!(json.format_outcome(&run).unwrap().starts_with('['));

        let simple = OutputFormatterFactory::create_formatter(&OutputOptions {
            mode: OutputMode::Simple,
            enable_color: false,
            bytes: true,
            ..Default::default()
        })
        .unwrap();
        assert!(simple.format_outcome(&run).unwrap().contains("Download rate:\t10.00 MB/s"));
    }

    #[test]
    fn test_factory_rejects_bad_delimiter() {
        let result = OutputFormatterFactory::create_formatter(&OutputOptions {
            mode: OutputMode::Csv,
            csv_delimiter: 'é',
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
