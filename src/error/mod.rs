//! Error handling for the network speed tester

use thiserror::Error;

/// Custom error types for the network speed tester
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// Invalid option combination or value, reported before any network activity
    #[error("Configuration error: {0}")]
    Config(String),

    /// No candidate server answered the reachability check
    #[error("Server unreachable: {0}")]
    ServerUnreachable(String),

    /// Latency/jitter could not be measured
    #[error("Latency probe degraded: {0}")]
    ProbeDegraded(String),

    /// A throughput phase produced zero or partial samples
    #[error("Phase degraded: {0}")]
    PhaseDegraded(String),

    /// Telemetry submission failed, sharing unavailable
    #[error("Telemetry failed: {0}")]
    TelemetryFailed(String),

    /// Transport failure that makes every further phase untrustworthy (e.g. TLS trust)
    #[error("Fatal transport error: {0}")]
    FatalTransport(String),

    /// Network connectivity errors
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// ICMP echo cannot be used on this host
    #[error("ICMP unavailable: {0}")]
    IcmpUnavailable(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (URLs, JSON, etc.)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new server unreachable error
    pub fn server_unreachable<S: Into<String>>(message: S) -> Self {
        Self::ServerUnreachable(message.into())
    }

    /// Create a new probe degraded error
    pub fn probe_degraded<S: Into<String>>(message: S) -> Self {
        Self::ProbeDegraded(message.into())
    }

    /// Create a new phase degraded error
    pub fn phase_degraded<S: Into<String>>(message: S) -> Self {
        Self::PhaseDegraded(message.into())
    }

    /// Create a new telemetry error
    pub fn telemetry_failed<S: Into<String>>(message: S) -> Self {
        Self::TelemetryFailed(message.into())
    }

    /// Create a new fatal transport error
    pub fn fatal_transport<S: Into<String>>(message: S) -> Self {
        Self::FatalTransport(message.into())
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    /// Create a new HTTP request error
    pub fn http_request<S: Into<String>>(message: S) -> Self {
        Self::HttpRequest(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new ICMP unavailable error
    pub fn icmp_unavailable<S: Into<String>>(message: S) -> Self {
        Self::IcmpUnavailable(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Same error with `context` prepended to its message
    pub fn prefixed(self, context: &str) -> Self {
        let wrap = |message: String| format!("{}: {}", context, message);
        match self {
            Self::Config(m) => Self::Config(wrap(m)),
            Self::ServerUnreachable(m) => Self::ServerUnreachable(wrap(m)),
            Self::ProbeDegraded(m) => Self::ProbeDegraded(wrap(m)),
            Self::PhaseDegraded(m) => Self::PhaseDegraded(wrap(m)),
            Self::TelemetryFailed(m) => Self::TelemetryFailed(wrap(m)),
            Self::FatalTransport(m) => Self::FatalTransport(wrap(m)),
            Self::Network(m) => Self::Network(wrap(m)),
            Self::HttpRequest(m) => Self::HttpRequest(wrap(m)),
            Self::Timeout(m) => Self::Timeout(wrap(m)),
            Self::IcmpUnavailable(m) => Self::IcmpUnavailable(wrap(m)),
            Self::Validation(m) => Self::Validation(wrap(m)),
            Self::Io(m) => Self::Io(wrap(m)),
            Self::Parse(m) => Self::Parse(wrap(m)),
            Self::Internal(m) => Self::Internal(wrap(m)),
        }
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::ServerUnreachable(_) => "SERVER",
            Self::ProbeDegraded(_) => "PROBE",
            Self::PhaseDegraded(_) => "PHASE",
            Self::TelemetryFailed(_) => "TELEMETRY",
            Self::FatalTransport(_) => "TRANSPORT",
            Self::Network(_) => "NETWORK",
            Self::HttpRequest(_) => "HTTP",
            Self::Timeout(_) => "TIMEOUT",
            Self::IcmpUnavailable(_) => "ICMP",
            Self::Validation(_) => "VALIDATION",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Check if error is recoverable (a retry or the next candidate may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) | Self::HttpRequest(_) | Self::Timeout(_) | Self::ServerUnreachable(_) => true,
            Self::ProbeDegraded(_) | Self::PhaseDegraded(_) | Self::TelemetryFailed(_) | Self::IcmpUnavailable(_) => true,
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) | Self::FatalTransport(_) => false,
            Self::Io(_) | Self::Internal(_) => false,
        }
    }

    /// Check if the error terminates a run instead of degrading it
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Validation(_) | Self::ServerUnreachable(_) | Self::FatalTransport(_)
        )
    }

    /// Check if the error only degrades a finished run
    pub fn is_degradation(&self) -> bool {
        matches!(
            self,
            Self::ProbeDegraded(_) | Self::PhaseDegraded(_) | Self::TelemetryFailed(_)
        )
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check your command line arguments or .env file.", msg)
            }
            Self::ServerUnreachable(msg) => {
                format!("No test server could be reached: {}\n\nSuggestion: Check your connection, try --server with a different id, or use --list to see available servers.", msg)
            }
            Self::ProbeDegraded(msg) => {
                format!("Latency could not be measured: {}\n\nSuggestion: Try --no-icmp or increase --timeout.", msg)
            }
            Self::PhaseDegraded(msg) => {
                format!("Throughput test incomplete: {}\n\nSuggestion: Try fewer --concurrent workers or a longer --duration.", msg)
            }
            Self::TelemetryFailed(msg) => {
                format!("Results could not be shared: {}\n\nSuggestion: Check --telemetry-server and --telemetry-path.", msg)
            }
            Self::FatalTransport(msg) => {
                format!("Connection to the test server cannot be trusted: {}\n\nSuggestion: Provide a CA bundle with --ca-cert or, for self-signed servers, --skip-cert-verify.", msg)
            }
            Self::Network(msg) => {
                format!("Network connectivity issue: {}\n\nSuggestion: Check your internet connection and try again.", msg)
            }
            Self::HttpRequest(msg) => {
                format!("HTTP request failed: {}\n\nSuggestion: The test server may be down or overloaded. Try another server.", msg)
            }
            Self::Timeout(msg) => {
                format!("Request timed out: {}\n\nSuggestion: Increase the timeout value using --timeout or check your network connection.", msg)
            }
            Self::IcmpUnavailable(msg) => {
                format!("ICMP echo is not available: {}\n\nSuggestion: HTTP ping is used instead; pass --no-icmp to skip the check.", msg)
            }
            Self::Validation(msg) => {
                format!("Invalid input: {}\n\nSuggestion: Check the format of your URLs, IP addresses, or other configuration values.", msg)
            }
            Self::Io(msg) => {
                format!("File operation failed: {}\n\nSuggestion: Check file paths and permissions.", msg)
            }
            Self::Parse(msg) => {
                format!("Failed to parse data: {}\n\nSuggestion: Check the format of your server list or telemetry settings file.", msg)
            }
            Self::Internal(msg) => {
                format!("Internal error: {}\n\nThis is likely a bug. Please report this issue with the error details.", msg)
            }
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => 1,
            Self::ServerUnreachable(_) | Self::Network(_) | Self::HttpRequest(_) => 2,
            Self::Timeout(_) => 3,
            Self::FatalTransport(_) => 4,
            Self::Io(_) => 5,
            Self::ProbeDegraded(_) | Self::PhaseDegraded(_) | Self::TelemetryFailed(_) | Self::IcmpUnavailable(_) => 6,
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::ServerUnreachable(_) | Self::Network(_) | Self::HttpRequest(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Timeout(_) | Self::IcmpUnavailable(_) => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::ProbeDegraded(_) | Self::PhaseDegraded(_) | Self::TelemetryFailed(_) => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Io(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::FatalTransport(_) | Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

/// Check whether an error chain describes a certificate trust failure
pub fn is_tls_trust_failure(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = current {
        let text = err.to_string().to_lowercase();
        if text.contains("certificate") || text.contains("unknownissuer") || text.contains("invalid peer") {
            return true;
        }
        current = err.source();
    }
    false
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<csv::Error> for AppError {
    fn from(error: csv::Error) -> Self {
        Self::io(format!("CSV error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if is_tls_trust_failure(&error) {
            Self::fatal_transport(error.to_string())
        } else if error.is_timeout() {
            Self::timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            Self::network(error.to_string())
        } else {
            Self::http_request(error.to_string())
        }
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::net::AddrParseError> for AppError {
    fn from(error: std::net::AddrParseError) -> Self {
        Self::parse(format!("IP address parse error: {}", error))
    }
}

// Anyhow integration
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error, keeping its category
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error
    fn context(self, message: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().prefixed(&f()))
    }

    fn context(self, message: &'static str) -> Result<T> {
        self.with_context(|| message.to_string())
    }
}

/// Error reporter for user feedback on fatal errors and recorded degradations
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    /// Create a new error reporter
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    /// Report an error to the user
    pub fn report_error(&self, error: &AppError) {
        eprintln!("{}", error.format_for_console(self.use_color));

        if self.verbose {
            eprintln!();
            eprintln!("{}", error.user_friendly_message());
        }
    }

    /// Get formatted error summary
    pub fn format_error_summary(&self, errors: &[AppError]) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        let mut summary = format!("Found {} error(s):", errors.len());

        // Group errors by category, keeping first-seen order
        let mut groups: Vec<(&'static str, Vec<&AppError>)> = Vec::new();
        for error in errors {
            match groups.iter_mut().find(|(category, _)| *category == error.category()) {
                Some((_, group)) => group.push(error),
                None => groups.push((error.category(), vec![error])),
            }
        }

        for (category, group_errors) in groups {
            summary.push_str(&format!("\n  {}: {} error(s)", category, group_errors.len()));
            if self.verbose {
                for error in group_errors {
                    summary.push_str(&format!("\n    - {}", error));
                }
            }
        }

        summary
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}
