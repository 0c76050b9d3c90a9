//! Server list loading, filtering and endpoint resolution
//!
//! Candidates come from the LibreSpeed server-list JSON format, either from the
//! public list, a remote URL, a local file or standard input.

use crate::{
    client::{HttpUtils, Transport},
    error::{AppError, ErrorContext, Result},
    models::{ServerSelection, ServerSource},
};
use futures::future::join_all;
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;

/// A server eligible for selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCandidate {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: i64,
    pub name: String,
    /// Base URL; may be scheme-relative (`//host/path/`)
    #[serde(rename = "server")]
    pub base_url: String,
    #[serde(rename = "dlURL")]
    pub download_path: String,
    #[serde(rename = "ulURL")]
    pub upload_path: String,
    #[serde(rename = "pingURL")]
    pub ping_path: String,
    #[serde(rename = "getIpURL")]
    pub getip_path: String,
    #[serde(rename = "sponsorName", default)]
    pub sponsor_name: String,
    #[serde(rename = "sponsorURL", default)]
    pub sponsor_url: String,
}

/// Absolute endpoint URLs of one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoints {
    pub base: Url,
    pub ping: Url,
    pub download: Url,
    pub upload: Url,
    pub getip: Url,
}

impl ServerEndpoints {
    /// Download URL asking the server for `chunks` chunks
    pub fn download_url(&self, chunks: u32) -> Url {
        let mut url = self.download.clone();
        url.query_pairs_mut().append_pair("ckSize", &chunks.to_string());
        url
    }

    /// getIP URL requesting ISP info with distances in `distance`
    pub fn getip_url(&self, distance: &str) -> Url {
        let mut url = self.getip.clone();
        url.query_pairs_mut()
            .append_pair("isp", "true")
            .append_pair("distance", distance);
        url
    }

    /// Host name used for ICMP echoes
    pub fn host(&self) -> Result<String> {
        HttpUtils::extract_host(&self.base)
    }
}

impl ServerCandidate {
    /// Base URL with a scheme, `//host` resolved to https when `secure`
    pub fn base(&self, secure: bool) -> Result<Url> {
        let raw = self.base_url.trim();
        let absolute = if raw.starts_with("//") {
            format!("{}:{}", if secure { "https" } else { "http" }, raw)
        } else {
            raw.to_string()
        };
        let with_slash = if absolute.ends_with('/') { absolute } else { format!("{}/", absolute) };

        HttpUtils::validate_url(&with_slash)
            .with_context(|| format!("Server {} ({}) has an invalid URL", self.id, self.name))
    }

    /// Resolve every endpoint against the base URL
    pub fn endpoints(&self, secure: bool) -> Result<ServerEndpoints> {
        let base = self.base(secure)?;
        let join = |path: &str| -> Result<Url> {
            base.join(path.trim()).map_err(|e| {
                AppError::parse(format!("Server {} has an invalid endpoint '{}': {}", self.id, path, e))
            })
        };

        Ok(ServerEndpoints {
            ping: join(&self.ping_path)?,
            download: join(&self.download_path)?,
            upload: join(&self.upload_path)?,
            getip: join(&self.getip_path)?,
            base,
        })
    }

    /// Display URL for result identity
    pub fn display_url(&self, secure: bool) -> String {
        self.base(secure).map(|url| url.to_string()).unwrap_or_else(|_| self.base_url.clone())
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Parse a LibreSpeed server-list document
pub fn parse_server_list(json: &str) -> Result<Vec<ServerCandidate>> {
    serde_json::from_str(json).with_context(|| "Failed to parse server list".to_string())
}

/// Keep the candidates allowed by the include/exclude lists, preserving order
pub fn filter_candidates(candidates: Vec<ServerCandidate>, selection: &ServerSelection) -> Result<Vec<ServerCandidate>> {
    selection.validate()?;

    if !selection.include.is_empty() {
        return Ok(candidates
            .into_iter()
            .filter(|c| selection.include.contains(&c.id))
            .collect());
    }

    Ok(candidates
        .into_iter()
        .filter(|c| !selection.exclude.contains(&c.id))
        .collect())
}

/// Fetches the candidate list from the configured source
pub struct ServerListLoader<'a> {
    transport: &'a dyn Transport,
}

impl<'a> ServerListLoader<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Load and filter candidates
    pub async fn load(&self, selection: &ServerSelection) -> Result<Vec<ServerCandidate>> {
        selection.validate()?;
        let document = self.fetch(&selection.source).await?;
        let candidates = parse_server_list(&document)?;
        filter_candidates(candidates, selection)
    }

    async fn fetch(&self, source: &ServerSource) -> Result<String> {
        match source {
            ServerSource::Default => self.fetch_remote(crate::defaults::DEFAULT_SERVER_LIST_URL).await,
            ServerSource::Remote(url) => self.fetch_remote(url).await,
            ServerSource::Local(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read server list '{}'", path.display())),
            ServerSource::Stdin => {
                let mut document = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut document)
                    .await
                    .context("Failed to read server list from standard input")?;
                Ok(document)
            }
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<String> {
        let url = HttpUtils::validate_url(url)?;
        let response = self.transport.get(&url).await?.error_for_status("server list")?;
        Ok(response.body)
    }
}

/// Order candidates by one HTTP ping each, unreachable candidates last
///
/// Pings run concurrently; ties keep list order.
pub async fn rank_by_latency(
    transport: &dyn Transport,
    candidates: Vec<ServerCandidate>,
    secure: bool,
    timeout: Duration,
) -> Vec<ServerCandidate> {
    let pings = candidates.iter().map(|candidate| async move {
        let endpoints = candidate.endpoints(secure).ok()?;
        let start = Instant::now();
        match tokio::time::timeout(timeout, transport.ping(&endpoints.ping)).await {
            Ok(Ok(())) => Some(start.elapsed()),
            _ => None,
        }
    });
    let rtts = join_all(pings).await;

    let mut ranked: Vec<(usize, Option<Duration>, ServerCandidate)> = candidates
        .into_iter()
        .zip(rtts)
        .enumerate()
        .map(|(index, (candidate, rtt))| (index, rtt, candidate))
        .collect();

    ranked.sort_by(|a, b| match (a.1, b.1) {
        (Some(x), Some(y)) => x.cmp(&y).then(a.0.cmp(&b.0)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.0.cmp(&b.0),
    });

    ranked.into_iter().map(|(_, _, candidate)| candidate).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::integration_tests::LibreSpeedMock;
    use crate::client::HttpTransport;
    use crate::logging::Logger;
    use crate::models::TestConfig;
    use std::io::Write;

    const SAMPLE_LIST: &str = r#"[
        {"id": 1, "name": "Amsterdam", "server": "//ams.example.com/backend/", "dlURL": "garbage.php",
         "ulURL": "empty.php", "pingURL": "empty.php", "getIpURL": "getIP.php",
         "sponsorName": "Example", "sponsorURL": "https://example.com"},
        {"id": "2", "name": "Berlin", "server": "https://ber.example.com/speed", "dlURL": "garbage.php",
         "ulURL": "empty.php", "pingURL": "empty.php", "getIpURL": "getIP.php"},
        {"id": 3, "name": "Chicago", "server": "http://chi.example.com/", "dlURL": "backend/garbage.php",
         "ulURL": "backend/empty.php", "pingURL": "backend/empty.php", "getIpURL": "backend/getIP.php"}
    ]"#;

    fn candidates() -> Vec<ServerCandidate> {
        parse_server_list(SAMPLE_LIST).unwrap()
    }

    #[test]
    fn test_parse_server_list() {
        let list = candidates();
        assert_eq!(list.len(), 3);
        assert_eq!(list[1].id, 2);
        assert_eq!(list[0].sponsor_name, "Example");
        assert_eq!(list[2].sponsor_url, "");
    }

    #[test]
    fn test_parse_invalid_list() {
        assert!(matches!(parse_server_list("{not json"), Err(AppError::Parse(_))));
    }

    #[test]
    fn test_scheme_relative_urls_honour_secure() {
        let list = candidates();
        assert_eq!(list[0].base(true).unwrap().as_str(), "https://ams.example.com/backend/");
        assert_eq!(list[0].base(false).unwrap().as_str(), "http://ams.example.com/backend/");
        assert_eq!(list[2].base(true).unwrap().as_str(), "http://chi.example.com/");
    }

    #[test]
    fn test_endpoint_resolution() {
        let list = candidates();
        let endpoints = list[1].endpoints(false).unwrap();
        assert_eq!(endpoints.ping.as_str(), "https://ber.example.com/speed/empty.php");
        assert_eq!(
            endpoints.download_url(100).as_str(),
            "https://ber.example.com/speed/garbage.php?ckSize=100"
        );
        assert_eq!(
            endpoints.getip_url("km").as_str(),
            "https://ber.example.com/speed/getIP.php?isp=true&distance=km"
        );
        assert_eq!(endpoints.host().unwrap(), "ber.example.com");

        let nested = list[2].endpoints(false).unwrap();
        assert_eq!(nested.upload.as_str(), "http://chi.example.com/backend/empty.php");
    }

    #[test]
    fn test_include_filter_keeps_list_order() {
        let selection = ServerSelection { include: vec![3, 1], ..Default::default() };
        let ids: Vec<i64> = filter_candidates(candidates(), &selection).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_exclude_filter() {
        let selection = ServerSelection { exclude: vec![2], ..Default::default() };
        let ids: Vec<i64> = filter_candidates(candidates(), &selection).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_unknown_include_yields_empty_list() {
        let selection = ServerSelection { include: vec![42], ..Default::default() };
        assert!(filter_candidates(candidates(), &selection).unwrap().is_empty());
    }

    #[test]
    fn test_include_and_exclude_rejected() {
        let selection = ServerSelection { include: vec![1], exclude: vec![2], ..Default::default() };
        assert!(matches!(filter_candidates(candidates(), &selection), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_load_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_LIST.as_bytes()).unwrap();

        let transport = HttpTransport::new(&TestConfig::default(), &Logger::silent("TEST")).unwrap();
        let selection = ServerSelection {
            source: ServerSource::Local(file.path().to_path_buf()),
            exclude: vec![1],
            ..Default::default()
        };

        let list = ServerListLoader::new(&transport).load(&selection).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Berlin");
    }

    #[tokio::test]
    async fn test_load_remote_list() {
        let mock = LibreSpeedMock::new().await;
        let document = serde_json::json!([mock.server_json(7, "Mock")]).to_string();
        mock.mock_raw("GET", "/servers.json", 200, &document).await;

        let transport = HttpTransport::new(&TestConfig::default(), &Logger::silent("TEST")).unwrap();
        let selection = ServerSelection {
            source: ServerSource::Remote(format!("{}/servers.json", mock.url())),
            ..Default::default()
        };

        let list = ServerListLoader::new(&transport).load(&selection).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, 7);
    }

    #[tokio::test]
    async fn test_rank_by_latency_puts_unreachable_last() {
        let fast = LibreSpeedMock::new().await;
        fast.mock_ping(None).await;
        let slow = LibreSpeedMock::new().await;
        slow.mock_ping(Some(200)).await;

        let mut dead = fast.server_json(1, "Dead");
        dead["server"] = serde_json::json!("http://127.0.0.1:9/backend/");
        let list: Vec<ServerCandidate> = serde_json::from_value(serde_json::json!([
            dead,
            slow.server_json(2, "Slow"),
            fast.server_json(3, "Fast"),
        ]))
        .unwrap();

        let transport = HttpTransport::new(&TestConfig::default(), &Logger::silent("TEST")).unwrap();
        let ranked = rank_by_latency(&transport, list, false, Duration::from_secs(2)).await;
        let ids: Vec<i64> = ranked.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
