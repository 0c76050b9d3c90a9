//! Structured logging for the network speed tester
//!
//! This module provides:
//! - Structured logging with multiple levels and contexts
//! - Operation correlation IDs for phases and requests
//! - Console, JSON and compact output formats
//!
//! Every entry is written to stderr so stdout carries only results.

use crate::error::{AppError, Result};
use crate::models::{LatencyMetric, OutputOptions, ThroughputMetric};
use chrono::{DateTime, Utc};
use colored::{Color, Colorize};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level - most detailed
    Trace = 0,
    /// Debug level - per-request and per-probe detail
    Debug = 1,
    /// Info level - phase transitions and results
    Info = 2,
    /// Warning level - degradations and fallbacks
    Warn = 3,
    /// Error level - failures the run survives
    Error = 4,
    /// Fatal level - failures that abort the run
    Fatal = 5,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    fn color(&self) -> Color {
        match self {
            LogLevel::Trace => Color::White,
            LogLevel::Debug => Color::Cyan,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
            LogLevel::Fatal => Color::Magenta,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// Log entry structure for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Timestamp when log entry was created
    pub timestamp: DateTime<Utc>,
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Logger name/component
    pub logger: String,
    /// Correlation ID for tracking related events
    pub correlation_id: Option<String>,
    /// Additional structured fields
    pub fields: HashMap<String, serde_json::Value>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for structured logging
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "console" => Ok(LogFormat::Console),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(AppError::parse(format!("Invalid log format: {}", s))),
        }
    }
}

/// Shared logging context for correlation and session tracking
#[derive(Debug, Default)]
struct LogContext {
    /// Correlation ID for the whole run
    session_id: Option<String>,
    /// Current operation correlation ID
    current_correlation_id: Option<String>,
}

/// Logger handle; clones and children share one context
#[derive(Debug, Clone)]
pub struct Logger {
    /// Minimum log level to output
    min_level: LogLevel,
    /// Whether to use colored output
    use_color: bool,
    /// Output format
    format: LogFormat,
    /// Logger name
    name: String,
    /// Shared context storage
    context: Arc<RwLock<LogContext>>,
}

impl Logger {
    /// Create a new logger
    pub fn new(name: String) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: true,
            format: LogFormat::Console,
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// Create a logger honouring `--debug`, quiet output modes and `--no-color`
    pub fn with_options(name: impl Into<String>, debug: bool, quiet: bool, use_color: bool) -> Self {
        let min_level = if debug {
            LogLevel::Debug
        } else if quiet {
            LogLevel::Warn
        } else {
            LogLevel::Info
        };

        Self {
            min_level,
            use_color,
            format: LogFormat::Console,
            name: name.into(),
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// A logger that discards everything below Fatal
    pub fn silent(name: impl Into<String>) -> Self {
        let mut logger = Self::with_options(name, false, true, false);
        logger.set_level(LogLevel::Fatal);
        logger
    }

    /// Logger for a sub-component sharing this logger's context and settings
    pub fn child(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    /// Logger name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current minimum level
    pub fn level(&self) -> LogLevel {
        self.min_level
    }

    /// Set minimum log level
    pub fn set_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Set output format
    pub fn set_format(&mut self, format: LogFormat) {
        self.format = format;
    }

    /// Set session correlation ID
    pub async fn set_session_id(&self, session_id: String) {
        let mut context = self.context.write().await;
        context.session_id = Some(session_id);
    }

    /// Start a correlated operation
    pub async fn start_operation(&self, operation_name: &str) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        {
            let mut context = self.context.write().await;
            context.current_correlation_id = Some(correlation_id.clone());
        }

        self.debug(&format!("Started operation: {}", operation_name))
            .correlation_id(&correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "start")
            .log()
            .await;

        correlation_id
    }

    /// End a correlated operation
    pub async fn end_operation(&self, correlation_id: &str, operation_name: &str, success: bool) {
        self.debug(&format!("Completed operation: {} (success: {})", operation_name, success))
            .correlation_id(correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "end")
            .field("success", success)
            .log()
            .await;

        let mut context = self.context.write().await;
        if context.current_correlation_id.as_deref() == Some(correlation_id) {
            context.current_correlation_id = None;
        }
    }

    /// Create a log entry builder
    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn fatal(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Fatal, message)
    }

    /// Check if a log level would be output
    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Write log entry to stderr
    async fn write_entry(&self, mut entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }

        let context = self.context.read().await;
        if let Some(session_id) = &context.session_id {
            entry.fields.insert("session_id".to_string(), serde_json::Value::String(session_id.clone()));
        }
        if entry.correlation_id.is_none() {
            entry.correlation_id = context.current_correlation_id.clone();
        }
        drop(context);

        let output = match self.format {
            LogFormat::Console => self.format_console(&entry),
            LogFormat::Json => self.format_json(&entry),
            LogFormat::Compact => self.format_compact(&entry),
        };

        let _ = writeln!(io::stderr(), "{}", output);
    }

    /// Format log entry for console output
    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = entry.level.as_str();

        let formatted_level = if self.use_color {
            format!("{:>5}", level_str).color(entry.level.color()).to_string()
        } else {
            format!("{:>5}", level_str)
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        if let Some(correlation_id) = &entry.correlation_id {
            let short: String = correlation_id.chars().take(8).collect();
            output.push_str(&format!(" [{}]", short));
        }

        if !entry.fields.is_empty() {
            let mut fields: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            fields.sort();
            output.push_str(&format!(" {{{}}}", fields.join(", ")));
        }

        output
    }

    /// Format log entry as JSON
    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!("{{\"error\": \"Failed to serialize log entry\", \"message\": \"{}\"}}", entry.message),
        }
    }

    /// Format log entry in compact format
    fn format_compact(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%H:%M:%S");
        format!(
            "{} {} {}: {}",
            timestamp,
            entry.level.as_str().chars().next().unwrap_or('?'),
            entry.logger,
            entry.message
        )
    }
}

/// Builder pattern for creating log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields: HashMap::new(),
            },
        }
    }

    /// Add a correlation ID
    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    /// Add a structured field
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    /// Add latency metric fields
    pub fn latency(self, metric: &LatencyMetric) -> Self {
        self.field("latency_ms", metric.latency_ms)
            .field("jitter_ms", metric.jitter_ms)
            .field("samples", metric.samples)
            .field("dropped", metric.dropped)
    }

    /// Add throughput metric fields
    pub fn throughput(self, metric: &ThroughputMetric) -> Self {
        self.field("bytes", metric.bytes)
            .field("total_bytes", metric.total_bytes)
            .field("window_ms", metric.window_ms)
            .field("rate_bps", metric.rate_bps)
            .field("status", metric.status)
    }

    /// Add error information
    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable())
            .field("error_exit_code", error.exit_code())
    }

    /// Finalize and write the log entry
    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }

    #[cfg(test)]
    fn into_entry(self) -> LogEntry {
        self.entry
    }
}

/// Specialized logger for network operations
#[derive(Debug, Clone)]
pub struct NetworkLogger {
    logger: Logger,
}

impl NetworkLogger {
    /// Create a network logger sharing `parent`'s context
    pub fn new(parent: &Logger) -> Self {
        Self {
            logger: parent.child("NET"),
        }
    }

    /// Log HTTP request
    pub async fn log_http_request(&self, url: &str, method: &str, status_code: Option<u16>, duration_ms: f64) {
        let success = status_code.is_some_and(|code| (200..400).contains(&code));
        let level = if success { LogLevel::Debug } else { LogLevel::Warn };

        let message = format!(
            "{} {} -> {} in {:.1}ms",
            method,
            url,
            status_code.map_or("FAILED".to_string(), |c| c.to_string()),
            duration_ms
        );

        self.logger
            .log(level, &message)
            .field("url", url)
            .field("method", method)
            .field("status_code", status_code)
            .field("success", success)
            .field("duration_ms", duration_ms)
            .log()
            .await;
    }

    /// Log a single latency probe
    pub async fn log_probe(&self, method: &str, target: &str, rtt_ms: Option<f64>) {
        let message = match rtt_ms {
            Some(rtt) => format!("{} probe to {}: {:.2}ms", method, target, rtt),
            None => format!("{} probe to {} dropped", method, target),
        };

        self.logger
            .debug(&message)
            .field("method", method)
            .field("target", target)
            .field("rtt_ms", rtt_ms)
            .log()
            .await;
    }
}

/// Logger construction for one invocation
pub struct LoggerFactory {
    options: OutputOptions,
    format: LogFormat,
    session_id: String,
}

impl LoggerFactory {
    /// Create a factory from output options; `SPEEDTEST_LOG_FORMAT` selects the format
    pub fn new(options: &OutputOptions) -> Self {
        let format = std::env::var("SPEEDTEST_LOG_FORMAT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(LogFormat::Console);

        Self {
            options: options.clone(),
            format,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a logger with a specific name
    pub async fn create_logger(&self, name: &str) -> Logger {
        let mut logger = Logger::with_options(
            name,
            self.options.debug,
            self.options.mode.is_quiet(),
            self.options.enable_color,
        );
        logger.set_format(self.format);
        if self.options.debug {
            logger.set_session_id(self.session_id.clone()).await;
        }
        logger
    }
}
