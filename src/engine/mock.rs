//! Scriptable in-memory transport for engine tests under a paused clock

use crate::{
    client::{ByteStream, HttpResponse, Transport, UploadBody},
    error::{AppError, Result},
    servers::{ServerCandidate, ServerEndpoints},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Url;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Outcome of one HTTP or ICMP probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PingBehavior {
    Reply(Duration),
    /// Never answers; the caller's timeout fires
    Hang,
    Fail,
    TlsFailure,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownloadBehavior {
    /// `pieces` reads of `piece_size` bytes, one every `interval`
    Stream {
        pieces: usize,
        piece_size: usize,
        interval: Duration,
    },
    FailConnect,
    TlsFailure,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UploadBehavior {
    /// Pull every piece, spending `per_piece` on each
    Accept { per_piece: Duration },
    Fail,
}

pub struct MockTransport {
    ping_script: Mutex<VecDeque<PingBehavior>>,
    default_ping: PingBehavior,
    icmp_script: Mutex<VecDeque<PingBehavior>>,
    icmp_available: bool,
    unreachable: HashSet<String>,
    download: DownloadBehavior,
    upload: UploadBehavior,
    post_response: HttpResponse,
    get_body: String,
    pings: AtomicUsize,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
    posts: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            ping_script: Mutex::new(VecDeque::new()),
            default_ping: PingBehavior::Reply(Duration::from_millis(10)),
            icmp_script: Mutex::new(VecDeque::new()),
            icmp_available: false,
            unreachable: HashSet::new(),
            download: DownloadBehavior::Stream {
                pieces: 100,
                piece_size: 1024,
                interval: Duration::from_millis(10),
            },
            upload: UploadBehavior::Accept {
                per_piece: Duration::from_millis(10),
            },
            post_response: HttpResponse {
                status_code: 200,
                body: r#"{"id": "mock-id"}"#.to_string(),
            },
            get_body: "192.0.2.10".to_string(),
            pings: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            posts: AtomicUsize::new(0),
        }
    }

    /// Scripted HTTP ping outcomes, consumed in order before `default_ping`
    pub fn with_ping_script(mut self, script: Vec<PingBehavior>) -> Self {
        self.ping_script = Mutex::new(script.into());
        self
    }

    pub fn with_default_ping(mut self, behavior: PingBehavior) -> Self {
        self.default_ping = behavior;
        self
    }

    /// Make ICMP available with scripted echo outcomes; replies default to 5 ms
    pub fn with_icmp(mut self, script: Vec<PingBehavior>) -> Self {
        self.icmp_available = true;
        self.icmp_script = Mutex::new(script.into());
        self
    }

    /// Every request to `host` fails with a network error
    pub fn with_unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    pub fn with_download(mut self, behavior: DownloadBehavior) -> Self {
        self.download = behavior;
        self
    }

    pub fn with_upload(mut self, behavior: UploadBehavior) -> Self {
        self.upload = behavior;
        self
    }

    pub fn with_post_response(mut self, status_code: u16, body: &str) -> Self {
        self.post_response = HttpResponse {
            status_code,
            body: body.to_string(),
        };
        self
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn downloads_started(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn uploads_started(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    /// Candidate served by `host` with the standard backend layout
    pub fn candidate(id: i64, host: &str) -> ServerCandidate {
        ServerCandidate {
            id,
            name: format!("Server {}", id),
            base_url: format!("http://{}/", host),
            download_path: "backend/garbage.php".to_string(),
            upload_path: "backend/empty.php".to_string(),
            ping_path: "backend/empty.php".to_string(),
            getip_path: "backend/getIP.php".to_string(),
            sponsor_name: String::new(),
            sponsor_url: String::new(),
        }
    }

    pub fn endpoints(host: &str) -> ServerEndpoints {
        match Self::candidate(0, host).endpoints(false) {
            Ok(endpoints) => endpoints,
            Err(e) => panic!("invalid mock host {}: {}", host, e),
        }
    }

    fn check_reachable(&self, url: &Url) -> Result<()> {
        match url.host_str() {
            Some(host) if self.unreachable.contains(host) => {
                Err(AppError::network(format!("connection refused by {}", host)))
            }
            _ => Ok(()),
        }
    }

    async fn play(behavior: PingBehavior) -> Result<Duration> {
        match behavior {
            PingBehavior::Reply(delay) => {
                tokio::time::sleep(delay).await;
                Ok(delay)
            }
            PingBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(AppError::timeout("mock probe never answered"))
            }
            PingBehavior::Fail => Err(AppError::network("mock probe failed")),
            PingBehavior::TlsFailure => Err(AppError::fatal_transport("invalid peer certificate: UnknownIssuer")),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn ping(&self, url: &Url) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.check_reachable(url)?;
        let behavior = self
            .ping_script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(self.default_ping);
        Self::play(behavior).await.map(|_| ())
    }

    async fn icmp_echo(&self, _host: &str) -> Result<Duration> {
        if !self.icmp_available {
            return Err(AppError::icmp_unavailable("ping: socket: Operation not permitted"));
        }
        let behavior = self
            .icmp_script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(PingBehavior::Reply(Duration::from_millis(5)));
        Self::play(behavior).await
    }

    async fn download(&self, url: &Url) -> Result<ByteStream> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.check_reachable(url)?;
        match self.download {
            DownloadBehavior::Stream {
                pieces,
                piece_size,
                interval,
            } => {
                let stream = futures::stream::unfold(0usize, move |sent| async move {
                    if sent >= pieces {
                        return None;
                    }
                    tokio::time::sleep(interval).await;
                    Some((Ok(Bytes::from(vec![0u8; piece_size])), sent + 1))
                });
                Ok(stream.boxed())
            }
            DownloadBehavior::FailConnect => Err(AppError::network("mock download refused")),
            DownloadBehavior::TlsFailure => Err(AppError::fatal_transport("invalid peer certificate: UnknownIssuer")),
        }
    }

    async fn upload(&self, url: &Url, mut body: UploadBody, _content_length: u64) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.check_reachable(url)?;
        match self.upload {
            UploadBehavior::Accept { per_piece } => {
                while let Some(piece) = body.next().await {
                    piece?;
                    tokio::time::sleep(per_piece).await;
                }
                Ok(())
            }
            UploadBehavior::Fail => Err(AppError::network("mock upload reset")),
        }
    }

    async fn get(&self, url: &Url) -> Result<HttpResponse> {
        self.check_reachable(url)?;
        Ok(HttpResponse {
            status_code: 200,
            body: self.get_body.clone(),
        })
    }

    async fn post_json(&self, url: &Url, _payload: &serde_json::Value) -> Result<HttpResponse> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        self.check_reachable(url)?;
        Ok(self.post_response.clone())
    }
}
