//! Main application orchestration and execution

use crate::{
    cli::Cli,
    client::{HttpTransport, Transport},
    config::{display_config_summary, load_config, validate_config, EnvManager},
    engine::SpeedTestEngine,
    error::{ErrorReporter, Result},
    ipinfo::HttpIpInfoProvider,
    logging::{Logger, LoggerFactory},
    models::{AppConfig, RunAction},
    output::{CsvFormatter, OutputCoordinator},
    servers::{rank_by_latency, ServerCandidate, ServerListLoader},
};
use std::path::PathBuf;
use std::sync::Arc;

/// Main application struct that coordinates all components
pub struct App {
    config: AppConfig,
    logger: Logger,
    env_file: Option<PathBuf>,
}

impl App {
    /// Build the configuration from CLI arguments and set up logging
    ///
    /// `env_file` is the `.env` file loaded before parsing, if any.
    pub async fn new(cli: Cli, env_file: Option<PathBuf>) -> Result<Self> {
        let config = load_config(cli)?;
        let logger = LoggerFactory::new(&config.output).create_logger("APP").await;
        Ok(Self {
            config,
            logger,
            env_file,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run the application
    pub async fn run(self) -> Result<()> {
        self.report_configuration().await?;

        match self.config.action {
            RunAction::CsvHeader => {
                let formatter = CsvFormatter::new(self.config.output.csv_delimiter, true)?;
                print!("{}", formatter.header_line()?);
                Ok(())
            }
            RunAction::ListServers => self.list_servers().await,
            RunAction::SpeedTest => self.speed_test().await,
        }
    }

    async fn report_configuration(&self) -> Result<()> {
        self.logger.debug(&crate::build_info()).log().await;

        if let Some(path) = &self.env_file {
            self.logger
                .debug("Loaded environment file")
                .field("path", path.display().to_string())
                .log()
                .await;
        }

        for problem in EnvManager::validate_current_env() {
            self.logger.warn(&problem).log().await;
        }

        if self.config.output.debug {
            for line in display_config_summary(&self.config).lines() {
                self.logger.debug(line).log().await;
            }
        }

        for warning in validate_config(&self.config)? {
            eprintln!("{}", warning.format(self.config.output.enable_color));
        }

        Ok(())
    }

    fn transport(&self) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(HttpTransport::new(&self.config.test, &self.logger)?))
    }

    async fn load_candidates(&self, transport: &dyn Transport) -> Result<Vec<ServerCandidate>> {
        let candidates = ServerListLoader::new(transport).load(&self.config.servers).await?;
        self.logger
            .debug(&format!("Loaded {} candidate server(s)", candidates.len()))
            .log()
            .await;
        Ok(candidates)
    }

    async fn list_servers(&self) -> Result<()> {
        let transport = self.transport()?;
        let candidates = self.load_candidates(transport.as_ref()).await?;
        let coordinator = OutputCoordinator::from_options(&self.config.output)?;
        coordinator.display_server_list(&candidates, self.config.test.secure)
    }

    async fn speed_test(&self) -> Result<()> {
        let operation = self.logger.start_operation("speed_test").await;
        let result = self.run_speed_test().await;
        self.logger
            .end_operation(&operation, "speed_test", result.is_ok())
            .await;
        result
    }

    async fn run_speed_test(&self) -> Result<()> {
        let test = &self.config.test;
        let coordinator = OutputCoordinator::from_options(&self.config.output)?;
        let transport = self.transport()?;

        let mut candidates = self.load_candidates(transport.as_ref()).await?;
        if self.config.servers.include.is_empty() && candidates.len() > 1 {
            self.logger.info("Ranking servers by latency").log().await;
            candidates = rank_by_latency(transport.as_ref(), candidates, test.secure, test.timeout()).await;
        }

        let ip_info = Arc::new(HttpIpInfoProvider::new(transport.clone(), test.distance));
        let mut engine = SpeedTestEngine::new(test.clone(), transport, &self.logger).with_ip_info(ip_info);
        if let Some(telemetry) = &self.config.telemetry {
            engine = engine.with_telemetry(telemetry.clone());
        }

        let outcome = engine.run(&candidates).await?;
        coordinator.display_outcome(&outcome)?;

        // Human output lists degradations inline; keep stdout parseable otherwise
        if outcome.is_degraded() && self.config.output.mode.is_quiet() {
            let reporter = ErrorReporter::new(false, true);
            eprintln!("{}", reporter.format_error_summary(&outcome.degradations));
        }

        Ok(())
    }
}

/// Parse configuration and run one invocation
pub async fn run_application(cli: Cli, env_file: Option<PathBuf>) -> Result<()> {
    App::new(cli, env_file).await?.run().await
}
