//! Telemetry submission and share-link construction

use crate::{
    client::Transport,
    error::{AppError, Result},
    models::SpeedTestResult,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// How much of the run is sent to the telemetry server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryLevel {
    /// Nothing is submitted
    Disabled,
    /// Metrics and server identity
    #[default]
    Basic,
    /// Basic plus client identity
    Full,
    /// Full plus the run's degradation log
    Debug,
}

impl TelemetryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Basic => "basic",
            Self::Full => "full",
            Self::Debug => "debug",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    fn includes_client(&self) -> bool {
        matches!(self, Self::Full | Self::Debug)
    }
}

impl FromStr for TelemetryLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "basic" => Ok(Self::Basic),
            "full" => Ok(Self::Full),
            "debug" => Ok(Self::Debug),
            other => Err(AppError::config(format!(
                "Invalid telemetry level '{}': expected disabled, basic, full or debug",
                other
            ))),
        }
    }
}

/// Where and how results are submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(rename = "telemetry_level", default)]
    pub level: TelemetryLevel,
    /// Base URL of the telemetry server
    #[serde(default = "default_server")]
    pub server: String,
    /// Submission path relative to `server`
    #[serde(default = "default_path")]
    pub path: String,
    /// Share-link path relative to `server`
    #[serde(default = "default_share")]
    pub share: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            level: TelemetryLevel::default(),
            server: default_server(),
            path: default_path(),
            share: default_share(),
        }
    }
}

fn default_server() -> String {
    crate::defaults::DEFAULT_TELEMETRY_SERVER.to_string()
}

fn default_path() -> String {
    crate::defaults::DEFAULT_TELEMETRY_PATH.to_string()
}

fn default_share() -> String {
    crate::defaults::DEFAULT_TELEMETRY_SHARE.to_string()
}

impl TelemetrySettings {
    /// Load the consolidated settings file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Cannot read telemetry settings '{}': {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(content)
            .map_err(|e| AppError::config(format!("Invalid telemetry settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.server_url()?;
        if base.cannot_be_a_base() {
            return Err(AppError::config(format!("Invalid telemetry server '{}'", self.server)));
        }
        Ok(())
    }

    fn server_url(&self) -> Result<Url> {
        Url::parse(&self.server)
            .map_err(|e| AppError::config(format!("Invalid telemetry server '{}': {}", self.server, e)))
    }

    /// Append `path` to the server URL, keeping any sub-path the server has
    fn resolve(&self, path: &str) -> Result<Url> {
        let mut url = self.server_url()?;
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), path.trim_start_matches('/'));
        url.set_path(&joined);
        url.set_query(None);
        Ok(url)
    }

    /// URL results are POSTed to
    pub fn submit_url(&self) -> Result<Url> {
        self.resolve(&self.path)
    }

    /// Share link for the result identified by `id`
    pub fn share_url(&self, id: &str) -> Result<Url> {
        let mut url = self.resolve(&self.share)?;
        url.query_pairs_mut().append_pair("id", id);
        Ok(url)
    }
}

/// Build the submission document for `level`
pub fn build_payload(result: &SpeedTestResult, extra: Option<&str>, level: TelemetryLevel, log: &[String]) -> Value {
    let client = if level.includes_client() {
        serde_json::to_value(&result.client).unwrap_or(Value::Null)
    } else {
        Value::Null
    };

    let log = if level == TelemetryLevel::Debug {
        Value::String(log.join("\n"))
    } else {
        Value::String(String::new())
    };

    json!({
        "server": {
            "name": result.server.name,
            "url": result.server.url,
        },
        "client": client,
        "metrics": {
            "download": result.download,
            "upload": result.upload,
            "ping": result.ping,
            "jitter": result.jitter,
            "bytes_sent": result.bytes_sent,
            "bytes_received": result.bytes_received,
        },
        "extra": extra.unwrap_or_default(),
        "log": log,
        "level": level.as_str(),
    })
}

/// Extract the result id from a telemetry response body
///
/// Accepts `{"id": "..."}` and the legacy plain-text `id <fragment>`.
pub fn parse_submission_id(body: &str) -> Result<String> {
    let trimmed = body.trim();

    if let Ok(document) = serde_json::from_str::<Value>(trimmed) {
        let id = match document.get("id") {
            Some(Value::String(id)) => id.trim().to_string(),
            Some(Value::Number(id)) => id.to_string(),
            _ => String::new(),
        };
        if id.is_empty() {
            return Err(AppError::telemetry_failed("response does not contain an id"));
        }
        return Ok(id);
    }

    match trimmed.strip_prefix("id ") {
        Some(id) if !id.trim().is_empty() && !id.trim().contains(char::is_whitespace) => Ok(id.trim().to_string()),
        _ => Err(AppError::telemetry_failed(format!("malformed response body: {:?}", trimmed))),
    }
}

/// Posts results to the telemetry endpoint
pub struct TelemetryReporter {
    transport: Arc<dyn Transport>,
}

impl TelemetryReporter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Submit `result` and return its share URL
    ///
    /// Every failure is reported as `TelemetryFailed`.
    pub async fn submit(
        &self,
        result: &SpeedTestResult,
        extra: Option<&str>,
        settings: &TelemetrySettings,
        log: &[String],
    ) -> Result<String> {
        let url = settings
            .submit_url()
            .map_err(|e| AppError::telemetry_failed(e.to_string()))?;
        let payload = build_payload(result, extra, settings.level, log);

        let response = self
            .transport
            .post_json(&url, &payload)
            .await
            .map_err(|e| AppError::telemetry_failed(e.to_string()))?;

        if !response.is_success() {
            return Err(AppError::telemetry_failed(format!(
                "telemetry endpoint returned HTTP {}",
                response.status_code
            )));
        }

        let id = parse_submission_id(&response.body)?;
        let share = settings
            .share_url(&id)
            .map_err(|e| AppError::telemetry_failed(e.to_string()))?;
        Ok(share.to_string())
    }
}
