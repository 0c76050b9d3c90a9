//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    error::{AppError, Result},
    models::{AppConfig, OutputOptions, RunAction, ServerSelection, ServerSource, TelemetryOptions, TestConfig},
    telemetry::{TelemetryLevel, TelemetrySettings},
    types::{DistanceUnit, NetworkFamily},
};

/// Configuration parser that layers CLI arguments over environment variables
///
/// The `.env` file is loaded before the command line is parsed, so by the time
/// this runs its values are indistinguishable from the process environment.
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<AppConfig> {
        self.parse_with_lookup(|key| std::env::var(key).ok())
    }

    /// Parse with environment variables resolved through `lookup`
    pub fn parse_with_lookup<F>(&self, lookup: F) -> Result<AppConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.cli.validate().map_err(AppError::config)?;

        // Defaults, then SPEEDTEST_* overrides, then flags
        let mut test = TestConfig::default();
        test.merge_from_lookup(lookup)?;
        self.apply_cli_overrides(&mut test)?;

        let config = AppConfig {
            action: self.action(),
            test,
            servers: self.server_selection(),
            output: self.output_options(),
            telemetry: self.telemetry_options()?,
        };

        config.validate()?;
        Ok(config)
    }

    fn action(&self) -> RunAction {
        if self.cli.list {
            RunAction::ListServers
        } else if self.cli.wants_header_only() {
            RunAction::CsvHeader
        } else {
            RunAction::SpeedTest
        }
    }

    /// Apply CLI argument overrides to the measurement configuration
    fn apply_cli_overrides(&self, config: &mut TestConfig) -> Result<()> {
        let cli = &self.cli;

        config.network_family = NetworkFamily::from_flags(cli.ipv4, cli.ipv6)?;

        if cli.no_download {
            config.enable_download = false;
        }
        if cli.no_upload {
            config.enable_upload = false;
        }
        if cli.no_icmp {
            config.enable_icmp = false;
        }
        if cli.no_pre_allocate {
            config.pre_allocate = false;
        }
        if cli.secure {
            config.secure = true;
        }
        if cli.skip_cert_verify {
            config.skip_cert_verify = true;
        }

        if let Some(concurrent) = cli.concurrent {
            config.concurrency = concurrent;
        }
        if let Some(duration) = cli.duration {
            config.duration_seconds = duration;
        }
        if let Some(chunks) = cli.chunks {
            config.chunks = chunks;
        }
        if let Some(upload_size) = cli.upload_size {
            config.upload_size_kib = upload_size;
        }
        if let Some(timeout) = cli.timeout {
            config.timeout_seconds = timeout;
        }
        if let Some(ramp_up) = cli.ramp_up {
            config.ramp_up_ms = ramp_up;
        }

        if let Some(ref path) = cli.ca_cert {
            config.ca_cert = Some(path.clone());
        }
        if let Some(source) = cli.source {
            config.source_address = Some(source);
        }
        if let Some(ref interface) = cli.interface {
            config.interface = Some(interface.clone());
        }
        if let Some(ref agent) = cli.user_agent {
            config.user_agent = agent.clone();
        }

        config.distance = cli.distance.parse::<DistanceUnit>()?;

        Ok(())
    }

    fn server_selection(&self) -> ServerSelection {
        let source = match (&self.cli.local_json, &self.cli.server_json) {
            (Some(path), _) if path == "-" => ServerSource::Stdin,
            (Some(path), _) => ServerSource::Local(path.into()),
            (None, Some(url)) => ServerSource::Remote(url.clone()),
            (None, None) => ServerSource::Default,
        };

        ServerSelection {
            source,
            include: self.cli.servers.clone(),
            exclude: self.cli.excludes.clone(),
        }
    }

    fn output_options(&self) -> OutputOptions {
        OutputOptions {
            mode: self.cli.output_mode(),
            csv_delimiter: self.cli.csv_delimiter,
            csv_header: self.cli.csv_header,
            bytes: self.cli.bytes,
            mebibytes: self.cli.mebibytes,
            enable_color: self.cli.use_colors(),
            debug: self.cli.debug,
        }
    }

    /// Telemetry options; any telemetry flag implies sharing and the
    /// consolidated file wins over individual flags
    fn telemetry_options(&self) -> Result<Option<TelemetryOptions>> {
        let cli = &self.cli;
        if !cli.telemetry_requested() {
            return Ok(None);
        }

        let settings = match &cli.telemetry_json {
            Some(path) => TelemetrySettings::from_file(path)?,
            None => {
                let mut settings = TelemetrySettings::default();
                if let Some(ref level) = cli.telemetry_level {
                    settings.level = level.parse::<TelemetryLevel>()?;
                }
                if let Some(ref server) = cli.telemetry_server {
                    settings.server = server.clone();
                }
                if let Some(ref path) = cli.telemetry_path {
                    settings.path = path.clone();
                }
                if let Some(ref share) = cli.telemetry_share {
                    settings.share = share.clone();
                }
                settings.validate()?;
                settings
            }
        };

        Ok(Some(TelemetryOptions {
            settings,
            extra: cli.telemetry_extra.clone(),
        }))
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<AppConfig> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &AppConfig) -> String {
    let test = &config.test;
    let mut summary = Vec::new();

    summary.push(format!("Action: {:?}", config.action));
    summary.push(format!("Server source: {:?}", config.servers.source));
    if !config.servers.include.is_empty() {
        summary.push(format!("Only servers: {:?}", config.servers.include));
    }
    if !config.servers.exclude.is_empty() {
        summary.push(format!("Excluded servers: {:?}", config.servers.exclude));
    }
    summary.push(format!("Network family: {}", test.network_family.name()));
    summary.push(format!(
        "Phases: latency={} download={} upload={} icmp={}",
        test.probe_latency, test.enable_download, test.enable_upload, test.enable_icmp
    ));
    summary.push(format!(
        "Concurrency: {}, duration: {}s, ramp-up: {}ms",
        test.concurrency, test.duration_seconds, test.ramp_up_ms
    ));
    summary.push(format!(
        "Chunks: {}, upload size: {} KiB, pre-allocate: {}",
        test.chunks, test.upload_size_kib, test.pre_allocate
    ));
    summary.push(format!("Timeout: {}s", test.timeout_seconds));
    summary.push(format!("Output: {:?}", config.output.mode));
    match &config.telemetry {
        Some(telemetry) => summary.push(format!(
            "Telemetry: {} -> {}{}",
            telemetry.settings.level.as_str(),
            telemetry.settings.server,
            telemetry.settings.path
        )),
        None => summary.push("Telemetry: off".to_string()),
    }

    summary.join("\n")
}
