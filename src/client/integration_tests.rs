//! Transport integration tests against a mock LibreSpeed backend
//!
//! [`LibreSpeedMock`] wraps a wiremock server exposing the backend endpoints
//! and is shared with the server-list, IP-info, telemetry and engine tests.

use super::*;
use crate::{error::AppError, logging::Logger, models::TestConfig};
use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub(crate) const PING_PATH: &str = "/backend/empty.php";
pub(crate) const DOWNLOAD_PATH: &str = "/backend/garbage.php";
pub(crate) const UPLOAD_PATH: &str = "/backend/empty.php";
pub(crate) const GETIP_PATH: &str = "/backend/getIP.php";

/// Mock LibreSpeed backend for controlled testing scenarios
pub(crate) struct LibreSpeedMock {
    server: MockServer,
}

impl LibreSpeedMock {
    /// Create a new mock backend with nothing mounted
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of the mock server
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Absolute URL for `request_path`
    pub fn endpoint(&self, request_path: &str) -> Url {
        Url::parse(&format!("{}{}", self.url(), request_path)).unwrap()
    }

    /// Server-list entry pointing at this mock
    pub fn server_json(&self, id: i64, name: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": name,
            "server": format!("{}/backend/", self.url()),
            "dlURL": "garbage.php",
            "ulURL": "empty.php",
            "pingURL": "empty.php",
            "getIpURL": "getIP.php",
            "sponsorName": "Mock Sponsor",
            "sponsorURL": "https://sponsor.example.com"
        })
    }

    /// GET ping endpoint answering after `delay_ms`
    pub async fn mock_ping(&self, delay_ms: Option<u64>) {
        let mut template = ResponseTemplate::new(200);
        if let Some(delay) = delay_ms {
            template = template.set_delay(Duration::from_millis(delay));
        }

        Mock::given(method("GET"))
            .and(path(PING_PATH))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    /// GET ping endpoint failing with `status_code`
    pub async fn mock_ping_error(&self, status_code: u16) {
        Mock::given(method("GET"))
            .and(path(PING_PATH))
            .respond_with(ResponseTemplate::new(status_code).set_body_string("Error"))
            .mount(&self.server)
            .await;
    }

    /// Download endpoint streaming `size` bytes
    pub async fn mock_download(&self, size: usize) {
        Mock::given(method("GET"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; size]))
            .mount(&self.server)
            .await;
    }

    /// Download endpoint failing with `status_code`
    pub async fn mock_download_error(&self, status_code: u16) {
        Mock::given(method("GET"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(ResponseTemplate::new(status_code))
            .mount(&self.server)
            .await;
    }

    /// Upload endpoint discarding the body
    pub async fn mock_upload(&self) {
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// getIP endpoint answering with `body`
    pub async fn mock_getip(&self, body: &str) {
        Mock::given(method("GET"))
            .and(path(GETIP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Any method on `request_path` answering `status_code` with `body`
    pub async fn mock_raw(&self, http_method: &str, request_path: &str, status_code: u16, body: &str) {
        Mock::given(method(http_method))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(status_code).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Requests received so far
    pub async fn received(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }
}

fn transport(timeout_seconds: u64) -> HttpTransport {
    let config = TestConfig {
        timeout_seconds,
        ..Default::default()
    };
    HttpTransport::new(&config, &Logger::silent("TEST")).unwrap()
}

mod transport_integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_success_appends_cache_buster() {
        let mock = LibreSpeedMock::new().await;
        mock.mock_ping(None).await;

        let transport = transport(5);
        transport.ping(&mock.endpoint(PING_PATH)).await.unwrap();
        transport.ping(&mock.endpoint(PING_PATH)).await.unwrap();

        let requests = mock.received().await;
        assert_eq!(requests.len(), 2);
        let queries: Vec<String> = requests.iter().map(|r| r.url.query().unwrap_or("").to_string()).collect();
        assert!(queries.iter().all(|q| q.starts_with("r=")));
        assert_ne!(queries[0], queries[1]);
    }

    #[tokio::test]
    async fn test_ping_error_status() {
        let mock = LibreSpeedMock::new().await;
        mock.mock_ping_error(503).await;

        let error = transport(5).ping(&mock.endpoint(PING_PATH)).await.unwrap_err();
        assert!(matches!(error, AppError::HttpRequest(_)));
    }

    #[tokio::test]
    async fn test_ping_timeout() {
        let mock = LibreSpeedMock::new().await;
        mock.mock_ping(Some(3000)).await;

        let error = transport(1).ping(&mock.endpoint(PING_PATH)).await.unwrap_err();
        assert!(matches!(error, AppError::Timeout(_)), "unexpected error: {:?}", error);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let url = Url::parse("http://127.0.0.1:9/empty.php").unwrap();
        let error = transport(2).ping(&url).await.unwrap_err();
        assert!(error.is_recoverable());
        assert!(!matches!(error, AppError::FatalTransport(_)));
    }

    #[tokio::test]
    async fn test_download_streams_whole_body() {
        let mock = LibreSpeedMock::new().await;
        mock.mock_download(256 * 1024).await;

        let mut url = mock.endpoint(DOWNLOAD_PATH);
        url.query_pairs_mut().append_pair("ckSize", "100");
        let mut stream = transport(5).download(&url).await.unwrap();

        let mut total = 0;
        while let Some(chunk) = stream.next().await {
            total += chunk.unwrap().len();
        }
        assert_eq!(total, 256 * 1024);

        let requests = mock.received().await;
        let query = requests[0].url.query().unwrap_or("");
        assert!(query.starts_with("ckSize=100&r="));
    }

    #[tokio::test]
    async fn test_download_error_status() {
        let mock = LibreSpeedMock::new().await;
        mock.mock_download_error(500).await;

        let result = transport(5).download(&mock.endpoint(DOWNLOAD_PATH)).await;
        assert!(matches!(result, Err(AppError::HttpRequest(_))));
    }

    #[tokio::test]
    async fn test_upload_sends_streamed_body() {
        let mock = LibreSpeedMock::new().await;
        mock.mock_upload().await;

        let pieces: Vec<std::result::Result<Bytes, std::io::Error>> =
            (0..4).map(|_| Ok(Bytes::from(vec![7u8; 1024]))).collect();
        let body: UploadBody = Box::pin(futures::stream::iter(pieces));

        transport(5).upload(&mock.endpoint(UPLOAD_PATH), body, 4096).await.unwrap();

        let requests = mock.received().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].body.len(), 4096);
    }

    #[tokio::test]
    async fn test_get_and_post_json() {
        let mock = LibreSpeedMock::new().await;
        mock.mock_getip("203.0.113.9").await;
        mock.mock_raw("POST", "/results/telemetry.php", 200, "{\"id\":\"abc\"}").await;

        let transport = transport(5);
        let response = transport.get(&mock.endpoint(GETIP_PATH)).await.unwrap();
        assert_eq!(response.body, "203.0.113.9");

        let payload = serde_json::json!({"metrics": {"download": 1.0}});
        let response = transport
            .post_json(&mock.endpoint("/results/telemetry.php"), &payload)
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.body, "{\"id\":\"abc\"}");

        let requests = mock.received().await;
        let posted: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(posted, payload);
    }
}
