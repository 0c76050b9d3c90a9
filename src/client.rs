//! Transport layer: the seam the measurement engine talks through
//!
//! [`Transport`] abstracts every network operation the engine performs so that
//! the engine can be driven by a deterministic in-memory implementation in
//! tests. [`HttpTransport`] is the production implementation on top of
//! reqwest plus the system `ping` utility.

pub mod icmp;

#[cfg(test)]
pub(crate) mod integration_tests;

use crate::{
    error::{is_tls_trust_failure, AppError, Result},
    logging::{Logger, NetworkLogger},
    models::TestConfig,
    types::NetworkFamily,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream::BoxStream, Stream, StreamExt};
use icmp::IcmpPinger;
use reqwest::{Client, Method, Url};
use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Streamed response body of a download
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Streamed request body of an upload
pub type UploadBody = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + Sync>>;

/// Network operations used by the engine, IP-info lookup and telemetry
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET the ping endpoint and read its small body
    async fn ping(&self, url: &Url) -> Result<()>;

    /// Send one ICMP echo to `host`
    async fn icmp_echo(&self, host: &str) -> Result<Duration>;

    /// Open a streaming GET against the download endpoint
    async fn download(&self, url: &Url) -> Result<ByteStream>;

    /// POST `body` to the upload endpoint and wait for the server to accept it
    async fn upload(&self, url: &Url, body: UploadBody, content_length: u64) -> Result<()>;

    /// GET a small document
    async fn get(&self, url: &Url) -> Result<HttpResponse>;

    /// POST a JSON document
    async fn post_json(&self, url: &Url, payload: &serde_json::Value) -> Result<HttpResponse>;
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: Url,
    pub method: Method,
    /// Whole-request timeout; `None` leaves the caller to bound the request
    pub timeout: Option<Duration>,
    pub headers: Vec<(String, String)>,
    pub cache_buster: bool,
}

impl HttpRequest {
    /// Create a new HTTP request
    pub fn new(url: Url, method: Method) -> Self {
        Self {
            url,
            method,
            timeout: None,
            headers: Vec::new(),
            cache_buster: false,
        }
    }

    /// Create a GET request
    pub fn get(url: Url) -> Self {
        Self::new(url, Method::GET)
    }

    /// Create a POST request
    pub fn post(url: Url) -> Self {
        Self::new(url, Method::POST)
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add custom header
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Append the `r=<n>` cache-busting parameter when sent
    pub fn with_cache_buster(mut self) -> Self {
        self.cache_buster = true;
        self
    }
}

/// Small HTTP response with its body read
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: String,
}

impl HttpResponse {
    /// Check if the response indicates success
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Fail with `HttpRequest` unless the status is 2xx
    pub fn error_for_status(self, what: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AppError::http_request(format!("{} returned HTTP {}", what, self.status_code)))
        }
    }
}

/// reqwest-backed transport honouring the TLS, bind and family options
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
    pinger: IcmpPinger,
    net_logger: NetworkLogger,
    request_counter: AtomicU64,
}

impl HttpTransport {
    /// Build the client for one run
    pub fn new(config: &TestConfig, logger: &Logger) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .use_rustls_tls();

        if let Some(address) = local_bind_address(config.network_family, config.source_address) {
            builder = builder.local_address(address);
        }

        if let Some(interface) = &config.interface {
            builder = bind_interface(builder, interface)?;
        }

        if let Some(path) = &config.ca_cert {
            let pem = std::fs::read(path)
                .map_err(|e| AppError::config(format!("Cannot read CA bundle '{}': {}", path.display(), e)))?;
            let certificates = reqwest::Certificate::from_pem_bundle(&pem)
                .map_err(|e| AppError::config(format!("Invalid CA bundle '{}': {}", path.display(), e)))?;
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }

        if config.skip_cert_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout: config.timeout(),
            pinger: IcmpPinger::new(config.network_family, config.interface.clone(), config.timeout()),
            net_logger: NetworkLogger::new(logger),
            request_counter: AtomicU64::new(0),
        })
    }

    /// Send a request and hand back the raw response
    async fn send(&self, request: HttpRequest, body: Option<reqwest::Body>) -> Result<reqwest::Response> {
        let url = if request.cache_buster {
            HttpUtils::with_cache_buster(&request.url, self.request_counter.fetch_add(1, Ordering::Relaxed))
        } else {
            request.url.clone()
        };

        let mut builder = self.client.request(request.method.clone(), url.clone());
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let start = Instant::now();
        match builder.send().await {
            Ok(response) => {
                self.net_logger
                    .log_http_request(
                        url.as_str(),
                        request.method.as_str(),
                        Some(response.status().as_u16()),
                        start.elapsed().as_secs_f64() * 1000.0,
                    )
                    .await;
                Ok(response)
            }
            Err(e) => {
                self.net_logger
                    .log_http_request(url.as_str(), request.method.as_str(), None, start.elapsed().as_secs_f64() * 1000.0)
                    .await;
                Err(classify_request_error(e))
            }
        }
    }

    async fn read_small(&self, request: HttpRequest, body: Option<reqwest::Body>) -> Result<HttpResponse> {
        let response = self.send(request, body).await?;
        let status_code = response.status().as_u16();
        let body = response.text().await.map_err(classify_request_error)?;
        Ok(HttpResponse { status_code, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn ping(&self, url: &Url) -> Result<()> {
        let request = HttpRequest::get(url.clone()).with_timeout(self.timeout).with_cache_buster();
        self.read_small(request, None).await?.error_for_status("ping endpoint")?;
        Ok(())
    }

    async fn icmp_echo(&self, host: &str) -> Result<Duration> {
        self.pinger.echo(host).await
    }

    async fn download(&self, url: &Url) -> Result<ByteStream> {
        let request = HttpRequest::get(url.clone()).with_cache_buster();
        let response = self.send(request, None).await?;
        if !response.status().is_success() {
            return Err(AppError::http_request(format!(
                "download endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(classify_request_error))
            .boxed())
    }

    async fn upload(&self, url: &Url, body: UploadBody, content_length: u64) -> Result<()> {
        let request = HttpRequest::post(url.clone())
            .with_cache_buster()
            .with_header("Content-Type", "application/octet-stream")
            .with_header("Content-Length", &content_length.to_string());
        let response = self.send(request, Some(reqwest::Body::wrap_stream(body))).await?;
        let status = response.status();
        let _ = response.bytes().await;
        if !status.is_success() {
            return Err(AppError::http_request(format!("upload endpoint returned HTTP {}", status.as_u16())));
        }
        Ok(())
    }

    async fn get(&self, url: &Url) -> Result<HttpResponse> {
        self.read_small(HttpRequest::get(url.clone()).with_timeout(self.timeout), None).await
    }

    async fn post_json(&self, url: &Url, payload: &serde_json::Value) -> Result<HttpResponse> {
        let request = HttpRequest::post(url.clone())
            .with_timeout(self.timeout)
            .with_header("Content-Type", "application/json");
        self.read_small(request, Some(reqwest::Body::from(payload.to_string()))).await
    }
}

/// Address outgoing sockets are bound to, if any
pub fn local_bind_address(family: NetworkFamily, source: Option<IpAddr>) -> Option<IpAddr> {
    match (source, family) {
        (Some(address), _) => Some(address),
        (None, NetworkFamily::V4Only) => Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        (None, NetworkFamily::V6Only) => Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
        (None, NetworkFamily::Auto) => None,
    }
}

#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
fn bind_interface(builder: reqwest::ClientBuilder, interface: &str) -> Result<reqwest::ClientBuilder> {
    Ok(builder.interface(interface))
}

#[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
fn bind_interface(_builder: reqwest::ClientBuilder, interface: &str) -> Result<reqwest::ClientBuilder> {
    Err(AppError::config(format!(
        "Binding to interface '{}' is not supported on this platform",
        interface
    )))
}

/// Map a reqwest error, treating certificate trust failures as fatal
fn classify_request_error(error: reqwest::Error) -> AppError {
    if is_tls_trust_failure(&error) {
        AppError::fatal_transport(format!("TLS certificate verification failed: {}", error))
    } else {
        AppError::from(error)
    }
}

/// Utility functions for HTTP operations
pub struct HttpUtils;

impl HttpUtils {
    /// Validate URL format
    pub fn validate_url(url: &str) -> Result<Url> {
        let parsed = Url::parse(url).map_err(|e| AppError::validation(format!("Invalid URL format: {}", e)))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => return Err(AppError::validation(format!("Unsupported URL scheme: {}", scheme))),
        }

        if parsed.host().is_none() {
            return Err(AppError::validation("URL must have a host"));
        }

        Ok(parsed)
    }

    /// Extract host from URL
    pub fn extract_host(url: &Url) -> Result<String> {
        url.host_str()
            .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| AppError::validation("URL must have a host"))
    }

    /// Copy of `url` with the `r=<n>` cache-busting parameter appended
    pub fn with_cache_buster(url: &Url, n: u64) -> Url {
        let mut busted = url.clone();
        busted.query_pairs_mut().append_pair("r", &n.to_string());
        busted
    }
}
