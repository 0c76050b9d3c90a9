//! Download and upload transfer workers
//!
//! A worker repeatedly opens transfers against the selected server until the
//! phase deadline, recording one sample per read (download) or per body piece
//! the transport has moved past (upload).

use crate::{
    client::{Transport, UploadBody},
    defaults::{MAX_WORKER_RETRIES, RETRY_BACKOFF, UPLOAD_PIECE_SIZE},
    error::AppError,
    models::TestConfig,
    servers::ServerEndpoints,
    stats::SampleSink,
    types::Direction,
};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep_until, timeout_at, Instant};

/// What a worker did before it stopped
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub id: usize,
    pub direction: Direction,
    /// Bytes moved across every attempt
    pub bytes: u64,
    /// Transfers opened, retries included
    pub attempts: u32,
    /// Error that ended the worker early, if any
    pub error: Option<AppError>,
}

impl WorkerReport {
    /// Whether the worker stopped on an error that must abort the run
    pub fn is_fatal(&self) -> bool {
        matches!(self.error, Some(AppError::FatalTransport(_)))
    }
}

/// One download or upload worker of a throughput phase
pub struct TransferWorker {
    id: usize,
    transport: Arc<dyn Transport>,
    server: Arc<ServerEndpoints>,
    config: Arc<TestConfig>,
    sink: SampleSink,
    deadline: Instant,
    payload: Option<Bytes>,
    moved: Arc<AtomicU64>,
    /// Upload piece handed to the transport but not yet followed by another pull
    in_flight: Arc<AtomicU64>,
    attempts: u32,
    failures: u32,
}

/// How a single transfer attempt ended
enum Attempt {
    /// Deadline reached or the server ran out of data
    Finished,
    /// Transfer completed; open another one
    Continue,
    Failed(AppError),
}

enum Next {
    Again,
    Stop(Option<AppError>),
}

impl TransferWorker {
    pub fn new(
        id: usize,
        transport: Arc<dyn Transport>,
        server: Arc<ServerEndpoints>,
        config: Arc<TestConfig>,
        sink: SampleSink,
        deadline: Instant,
    ) -> Self {
        Self {
            id,
            transport,
            server,
            config,
            sink,
            deadline,
            payload: None,
            moved: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            attempts: 0,
            failures: 0,
        }
    }

    /// Share a pre-allocated upload piece instead of generating pieces per request
    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = Some(payload);
        self
    }

    pub async fn run(self, direction: Direction) -> WorkerReport {
        match direction {
            Direction::Download => self.run_download().await,
            Direction::Upload => self.run_upload().await,
        }
    }

    /// Stream the download endpoint until the deadline or the end of data
    pub async fn run_download(mut self) -> WorkerReport {
        loop {
            let attempt = self.download_once().await;
            if let Next::Stop(error) = self.settle(attempt).await {
                return self.report(Direction::Download, error);
            }
        }
    }

    /// POST generated bodies to the upload endpoint until the deadline
    pub async fn run_upload(mut self) -> WorkerReport {
        loop {
            let attempt = self.upload_once().await;
            if let Next::Stop(error) = self.settle(attempt).await {
                return self.report(Direction::Upload, error);
            }
        }
    }

    /// Count failures and back off before the next attempt
    async fn settle(&mut self, attempt: Attempt) -> Next {
        match attempt {
            Attempt::Finished => Next::Stop(None),
            Attempt::Continue => Next::Again,
            Attempt::Failed(error @ AppError::FatalTransport(_)) => Next::Stop(Some(error)),
            Attempt::Failed(error) => {
                self.failures += 1;
                if self.failures > MAX_WORKER_RETRIES {
                    return Next::Stop(Some(error));
                }
                sleep_until((Instant::now() + RETRY_BACKOFF).min(self.deadline)).await;
                Next::Again
            }
        }
    }

    async fn download_once(&mut self) -> Attempt {
        if Instant::now() >= self.deadline {
            return Attempt::Finished;
        }
        self.attempts += 1;

        let url = self.server.download_url(self.config.chunks);
        let mut stream = match timeout_at(self.deadline, self.transport.download(&url)).await {
            Err(_) => return Attempt::Finished,
            Ok(Err(error)) => return Attempt::Failed(error),
            Ok(Ok(stream)) => stream,
        };

        loop {
            match timeout_at(self.deadline, stream.next()).await {
                Err(_) => return Attempt::Finished,
                Ok(None) => return Attempt::Finished,
                Ok(Some(Ok(chunk))) => record_sent(&self.sink, &self.moved, self.id, chunk.len() as u64),
                Ok(Some(Err(error))) => return Attempt::Failed(error),
            }
        }
    }

    async fn upload_once(&mut self) -> Attempt {
        if Instant::now() >= self.deadline {
            return Attempt::Finished;
        }
        self.attempts += 1;

        let size = self.config.upload_size_bytes();
        self.in_flight.store(0, Ordering::Relaxed);
        let body = self.upload_body(size);
        let attempt = match timeout_at(self.deadline, self.transport.upload(&self.server.upload, body, size as u64)).await {
            Err(_) => Attempt::Finished,
            Ok(Ok(())) => {
                // The last piece counts once the request completes
                let last = self.in_flight.swap(0, Ordering::Relaxed);
                if last > 0 {
                    record_sent(&self.sink, &self.moved, self.id, last);
                }
                Attempt::Continue
            }
            Ok(Err(error)) => Attempt::Failed(error),
        };
        self.in_flight.store(0, Ordering::Relaxed);
        attempt
    }

    /// Body of `size` bytes cut into pieces
    ///
    /// A piece is recorded when the transport pulls the one after it, so a
    /// piece cut off by the deadline is never counted.
    fn upload_body(&self, size: usize) -> UploadBody {
        let pieces = piece_lengths(size, UPLOAD_PIECE_SIZE);
        let payload = self.payload.clone();
        let seed = (self.id as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let sink = self.sink.clone();
        let moved = self.moved.clone();
        let in_flight = self.in_flight.clone();
        let id = self.id;

        let stream = futures::stream::iter(pieces.into_iter().enumerate()).map(move |(index, len)| {
            let piece = match &payload {
                Some(shared) => shared.slice(..len.min(shared.len())),
                None => generate_piece(len, seed ^ index as u64),
            };
            let previous = in_flight.swap(piece.len() as u64, Ordering::Relaxed);
            if previous > 0 {
                record_sent(&sink, &moved, id, previous);
            }
            Ok::<_, std::io::Error>(piece)
        });

        Box::pin(stream)
    }

    fn report(&self, direction: Direction, error: Option<AppError>) -> WorkerReport {
        WorkerReport {
            id: self.id,
            direction,
            bytes: self.moved.load(Ordering::Relaxed),
            attempts: self.attempts,
            error,
        }
    }
}

fn record_sent(sink: &SampleSink, moved: &AtomicU64, id: usize, bytes: u64) {
    let cumulative = moved.fetch_add(bytes, Ordering::Relaxed) + bytes;
    sink.record_transfer(id, bytes, cumulative);
}

/// Split `total` into pieces of at most `piece` bytes
pub fn piece_lengths(total: usize, piece: usize) -> Vec<usize> {
    if total == 0 || piece == 0 {
        return Vec::new();
    }
    let mut lengths = vec![piece; total / piece];
    if total % piece != 0 {
        lengths.push(total % piece);
    }
    lengths
}

/// Incompressible filler of `len` bytes
pub fn generate_piece(len: usize, seed: u64) -> Bytes {
    let mut state = seed | 1;
    let mut buffer = Vec::with_capacity(len);
    while buffer.len() < len {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let word = state.to_le_bytes();
        let take = (len - buffer.len()).min(word.len());
        buffer.extend_from_slice(&word[..take]);
    }
    Bytes::from(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{DownloadBehavior, MockTransport, UploadBehavior};
    use crate::stats::sample_channel;
    use std::time::Duration;

    fn endpoints() -> Arc<ServerEndpoints> {
        Arc::new(MockTransport::endpoints("a.test"))
    }

    fn config() -> Arc<TestConfig> {
        Arc::new(TestConfig {
            upload_size_kib: 256,
            ..Default::default()
        })
    }

    #[test]
    fn test_piece_lengths() {
        assert_eq!(piece_lengths(10, 4), vec![4, 4, 2]);
        assert_eq!(piece_lengths(8, 4), vec![4, 4]);
        assert!(piece_lengths(0, 4).is_empty());
    }

    #[test]
    fn test_generated_piece_length_and_variety() {
        let piece = generate_piece(1000, 7);
        assert_eq!(piece.len(), 1000);
        assert_ne!(piece[..8], piece[8..16]);
        assert_eq!(generate_piece(1000, 7), piece);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_worker_stops_at_stream_end() {
        let transport = Arc::new(MockTransport::new().with_download(DownloadBehavior::Stream {
            pieces: 10,
            piece_size: 1000,
            interval: Duration::from_millis(10),
        }));
        let start = Instant::now();
        let (sink, collector) = sample_channel(start);

        let worker = TransferWorker::new(0, transport, endpoints(), config(), sink, start + Duration::from_secs(5));
        let report = worker.run_download().await;

        assert_eq!(report.bytes, 10_000);
        assert_eq!(report.attempts, 1);
        assert!(report.error.is_none());
        assert_eq!(collector.drain().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_worker_stops_at_deadline() {
        let transport = Arc::new(MockTransport::new().with_download(DownloadBehavior::Stream {
            pieces: 1000,
            piece_size: 1000,
            interval: Duration::from_millis(100),
        }));
        let start = Instant::now();
        let (sink, collector) = sample_channel(start);

        let worker = TransferWorker::new(0, transport, endpoints(), config(), sink, start + Duration::from_secs(1));
        let report = worker.run_download().await;

        assert!(Instant::now() - start <= Duration::from_secs(1));
        let samples = collector.drain();
        assert!(samples.len() >= 9 && samples.len() <= 10);
        assert!(samples.iter().all(|s| s.offset() <= Duration::from_secs(1)));
        assert_eq!(report.bytes, samples.len() as u64 * 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_worker_gives_up_after_retries() {
        let transport = Arc::new(MockTransport::new().with_download(DownloadBehavior::FailConnect));
        let start = Instant::now();
        let (sink, _collector) = sample_channel(start);

        let worker = TransferWorker::new(3, transport, endpoints(), config(), sink, start + Duration::from_secs(10));
        let report = worker.run_download().await;

        assert_eq!(report.attempts, MAX_WORKER_RETRIES + 1);
        assert_eq!(report.bytes, 0);
        assert!(matches!(report.error, Some(AppError::Network(_))));
        assert!(!report.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tls_failure_is_not_retried() {
        let transport = Arc::new(MockTransport::new().with_download(DownloadBehavior::TlsFailure));
        let start = Instant::now();
        let (sink, _collector) = sample_channel(start);

        let report = TransferWorker::new(0, transport, endpoints(), config(), sink, start + Duration::from_secs(10))
            .run_download()
            .await;

        assert_eq!(report.attempts, 1);
        assert!(report.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_worker_records_each_piece() {
        let transport = Arc::new(MockTransport::new().with_upload(UploadBehavior::Accept {
            per_piece: Duration::from_millis(50),
        }));
        let start = Instant::now();
        let (sink, collector) = sample_channel(start);

        // 256 KiB per request in 64 KiB pieces, 200 ms per request
        let report = TransferWorker::new(1, transport, endpoints(), config(), sink, start + Duration::from_secs(1))
            .run_upload()
            .await;

        let samples = collector.drain();
        assert!(report.error.is_none());
        assert!(report.attempts >= 5);
        assert_eq!(report.bytes, samples.iter().map(|s| s.bytes()).sum::<u64>());
        assert!(samples.iter().all(|s| s.bytes() == UPLOAD_PIECE_SIZE as u64));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_piece_cut_by_deadline_is_not_counted() {
        let transport = Arc::new(MockTransport::new().with_upload(UploadBehavior::Accept {
            per_piece: Duration::from_millis(100),
        }));
        let start = Instant::now();
        let (sink, collector) = sample_channel(start);

        // Third piece is pulled at 200 ms and still being sent at the 250 ms deadline
        let report = TransferWorker::new(0, transport, endpoints(), config(), sink, start + Duration::from_millis(250))
            .run_upload()
            .await;

        let samples = collector.drain();
        assert!(report.error.is_none());
        assert_eq!(report.attempts, 1);
        assert_eq!(samples.len(), 2);
        assert_eq!(report.bytes, 2 * UPLOAD_PIECE_SIZE as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_upload_counts_every_piece() {
        let transport = Arc::new(MockTransport::new().with_upload(UploadBehavior::Accept {
            per_piece: Duration::from_millis(100),
        }));
        let start = Instant::now();
        let (sink, collector) = sample_channel(start);

        // One 256 KiB request completes at 400 ms, the second is cut at 450 ms
        let report = TransferWorker::new(0, transport, endpoints(), config(), sink, start + Duration::from_millis(450))
            .run_upload()
            .await;

        assert_eq!(report.attempts, 2);
        assert_eq!(report.bytes, 256 * 1024);
        assert_eq!(collector.drain().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_worker_with_shared_payload() {
        let transport = Arc::new(MockTransport::new().with_upload(UploadBehavior::Accept {
            per_piece: Duration::from_millis(100),
        }));
        let start = Instant::now();
        let (sink, collector) = sample_channel(start);
        let payload = generate_piece(UPLOAD_PIECE_SIZE, 1);

        let report = TransferWorker::new(0, transport.clone(), endpoints(), config(), sink, start + Duration::from_millis(450))
            .with_payload(payload)
            .run_upload()
            .await;

        assert!(report.error.is_none());
        assert!(!collector.drain().is_empty());
        assert!(transport.uploads_started() >= 1);
    }
}
