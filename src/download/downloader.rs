//! Concurrent range downloader

use crate::core::progress::ProgressSnapshot;
use crate::download::abort::AbortSignal;
use crate::download::fetcher::{HttpRangeFetcher, RangeFetcher, RangeMethod};
use crate::download::plan::{DownloadPlan, Packet};
use crate::error::SigfetchError;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Range downloader configuration
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Packet size in bytes
    pub packet_size: u64,
    /// Maximum number of packets in flight
    pub workers: usize,
    /// Interval between progress reports
    pub poll_interval: Duration,
    /// Wait before retrying a packet after a transient failure
    pub retry_delay: Duration,
    /// Per-request timeout of the HTTP client
    pub request_timeout: Duration,
    /// Request method for range requests
    pub method: RangeMethod,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            packet_size: 100 * 1024,
            workers: 40,
            poll_interval: Duration::from_secs(1),
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            method: RangeMethod::Get,
        }
    }
}

impl DownloaderConfig {
    pub fn with_packet_size(mut self, packet_size: u64) -> Self {
        self.packet_size = packet_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_method(mut self, method: RangeMethod) -> Self {
        self.method = method;
        self
    }
}

/// Downloads content of known length as concurrent byte ranges into one file
pub struct RangeDownloader {
    fetcher: Arc<dyn RangeFetcher>,
    config: DownloaderConfig,
}

/// State shared by every worker of one download
struct WorkerContext {
    fetcher: Arc<dyn RangeFetcher>,
    url: String,
    path: PathBuf,
    downloaded: AtomicU64,
    abort: AbortSignal,
    limiter: Semaphore,
    retry_delay: Duration,
}

/// Deletes the output file unless the download completed
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed partial file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial file {}: {}", self.path.display(), e),
        }
    }
}

impl RangeDownloader {
    /// Create a downloader over HTTP with default settings
    pub fn new() -> Result<Self, SigfetchError> {
        Self::with_config(DownloaderConfig::default())
    }

    /// Create a downloader over HTTP
    pub fn with_config(config: DownloaderConfig) -> Result<Self, SigfetchError> {
        let fetcher = HttpRangeFetcher::new(config.request_timeout, config.method)?;
        Ok(Self::with_fetcher(Arc::new(fetcher), config))
    }

    /// Create a downloader over any range source
    pub fn with_fetcher(fetcher: Arc<dyn RangeFetcher>, config: DownloaderConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Download `total_length` bytes of `url` into `output`.
    ///
    /// `on_progress` is called once per poll interval with non-decreasing
    /// snapshots and once more on completion. On failure the output file is
    /// removed.
    pub async fn download<P>(
        &self,
        url: &str,
        output: &Path,
        total_length: u64,
        on_progress: P,
    ) -> Result<PathBuf, SigfetchError>
    where
        P: FnMut(ProgressSnapshot) + Send,
    {
        self.download_with_abort(url, output, total_length, on_progress, AbortSignal::new())
            .await
    }

    /// Like [`download`](Self::download), stopping early once `abort` is triggered
    pub async fn download_with_abort<P>(
        &self,
        url: &str,
        output: &Path,
        total_length: u64,
        mut on_progress: P,
        abort: AbortSignal,
    ) -> Result<PathBuf, SigfetchError>
    where
        P: FnMut(ProgressSnapshot) + Send,
    {
        let plan = DownloadPlan::new(total_length, self.config.packet_size, self.config.workers)?;

        let file = File::create(output).await?;
        let partial = PartialFile::new(output);
        file.set_len(total_length).await?;
        drop(file);

        if plan.total_length() == 0 {
            info!("Empty content, created {}", output.display());
            return Ok(partial.keep());
        }

        info!(
            "Downloading {} bytes in {} packets with {} workers",
            total_length,
            plan.packet_count(),
            plan.workers()
        );

        let context = Arc::new(WorkerContext {
            fetcher: self.fetcher.clone(),
            url: url.to_string(),
            path: output.to_path_buf(),
            downloaded: AtomicU64::new(0),
            abort: abort.clone(),
            limiter: Semaphore::new(plan.workers()),
            retry_delay: self.config.retry_delay,
        });

        let mut workers = JoinSet::new();
        for packet in plan.packets() {
            workers.spawn(run_worker(context.clone(), packet));
        }

        // interval() panics on a zero period
        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failure: Option<SigfetchError> = None;

        loop {
            tokio::select! {
                _ = abort.triggered() => break,
                _ = ticker.tick() => {
                    if abort.is_set() {
                        break;
                    }
                    let downloaded = context.downloaded.load(Ordering::SeqCst);
                    on_progress(ProgressSnapshot::new(downloaded, total_length));
                }
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => {
                        record_failure(&mut failure, e);
                        abort.trigger();
                    }
                    Some(Err(e)) => {
                        record_failure(&mut failure, SigfetchError::Worker(e.to_string()));
                        abort.trigger();
                    }
                },
            }
        }

        if abort.is_set() {
            workers.abort_all();
            while let Some(joined) = workers.join_next().await {
                if let Ok(Err(e)) = joined {
                    record_failure(&mut failure, e);
                }
            }
            let err = failure.unwrap_or(SigfetchError::Aborted);
            warn!("Download of {} aborted: {}", url, err);
            drop(partial);
            return Err(err);
        }

        let downloaded = context.downloaded.load(Ordering::SeqCst);
        on_progress(ProgressSnapshot::new(downloaded, total_length));
        info!("Download completed: {}", output.display());
        Ok(partial.keep())
    }
}

/// Keep the first real cause; `Aborted` from workers stopping is only a fallback
fn record_failure(slot: &mut Option<SigfetchError>, err: SigfetchError) {
    if matches!(err, SigfetchError::Aborted) {
        return;
    }
    if slot.is_none() {
        *slot = Some(err);
    }
}

async fn run_worker(context: Arc<WorkerContext>, packet: Packet) -> Result<(), SigfetchError> {
    let _permit = tokio::select! {
        _ = context.abort.triggered() => return Err(SigfetchError::Aborted),
        permit = context.limiter.acquire() => {
            permit.map_err(|e| SigfetchError::Worker(e.to_string()))?
        }
    };

    loop {
        if context.abort.is_set() {
            return Err(SigfetchError::Aborted);
        }

        match write_packet(&context, packet).await {
            Ok(()) => {
                context.downloaded.fetch_add(packet.len, Ordering::SeqCst);
                return Ok(());
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "Packet {} failed, retrying in {:?}: {}",
                    packet.range_header(),
                    context.retry_delay,
                    e
                );
                tokio::select! {
                    _ = context.abort.triggered() => return Err(SigfetchError::Aborted),
                    _ = tokio::time::sleep(context.retry_delay) => {}
                }
            }
            Err(e) => {
                error!("Packet {} failed: {}", packet.range_header(), e);
                context.abort.trigger();
                return Err(e);
            }
        }
    }
}

async fn write_packet(context: &WorkerContext, packet: Packet) -> Result<(), SigfetchError> {
    let body = context.fetcher.fetch(&context.url, packet).await?;
    let mut file = OpenOptions::new().write(true).open(&context.path).await?;
    file.seek(SeekFrom::Start(packet.start)).await?;
    file.write_all(&body).await?;
    file.flush().await?;
    debug!("Wrote {} bytes at {}", body.len(), packet.start);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn test_config() -> DownloaderConfig {
        DownloaderConfig::default()
            .with_packet_size(100)
            .with_workers(4)
            .with_poll_interval(Duration::from_millis(5))
            .with_retry_delay(Duration::from_millis(5))
    }

    fn slice(data: &[u8], packet: Packet) -> Vec<u8> {
        data[packet.start as usize..(packet.start + packet.len) as usize].to_vec()
    }

    /// Serves ranges of an in-memory buffer, tracking concurrency
    struct MemoryFetcher {
        data: Vec<u8>,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MemoryFetcher {
        fn new(data: Vec<u8>, delay: Duration) -> Self {
            Self {
                data,
                delay,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RangeFetcher for MemoryFetcher {
        async fn fetch(&self, _url: &str, packet: Packet) -> Result<Vec<u8>, SigfetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(slice(&self.data, packet))
        }
    }

    /// Fails each packet's first attempt with a connection reset
    struct FlakyFetcher {
        data: Vec<u8>,
        seen: Mutex<Vec<u64>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RangeFetcher for FlakyFetcher {
        async fn fetch(&self, _url: &str, packet: Packet) -> Result<Vec<u8>, SigfetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let first_attempt = {
                let mut seen = self.seen.lock().unwrap();
                if seen.contains(&packet.start) {
                    false
                } else {
                    seen.push(packet.start);
                    true
                }
            };
            if first_attempt {
                return Err(SigfetchError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "reset",
                )));
            }
            Ok(slice(&self.data, packet))
        }
    }

    /// Rejects every packet with a fatal status
    struct RejectingFetcher;

    #[async_trait]
    impl RangeFetcher for RejectingFetcher {
        async fn fetch(&self, _url: &str, packet: Packet) -> Result<Vec<u8>, SigfetchError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(SigfetchError::HttpStatus {
                status: 403,
                range: packet.range_header(),
            })
        }
    }

    /// Serves every packet except the one starting at `rejected_start`
    struct PartiallyRejectingFetcher {
        data: Vec<u8>,
        rejected_start: u64,
    }

    #[async_trait]
    impl RangeFetcher for PartiallyRejectingFetcher {
        async fn fetch(&self, _url: &str, packet: Packet) -> Result<Vec<u8>, SigfetchError> {
            if packet.start != self.rejected_start {
                return Ok(slice(&self.data, packet));
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
            Err(SigfetchError::HttpStatus {
                status: 403,
                range: packet.range_header(),
            })
        }
    }

    /// Never answers
    struct StalledFetcher;

    #[async_trait]
    impl RangeFetcher for StalledFetcher {
        async fn fetch(&self, _url: &str, _packet: Packet) -> Result<Vec<u8>, SigfetchError> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_downloader_config_default() {
        let config = DownloaderConfig::default();
        assert_eq!(config.packet_size, 100 * 1024);
        assert_eq!(config.workers, 40);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.method, RangeMethod::Get);
    }

    #[tokio::test]
    async fn test_download_assembles_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("media.bin");
        let data = content(1050);
        let fetcher = Arc::new(MemoryFetcher::new(data.clone(), Duration::from_millis(2)));
        let downloader = RangeDownloader::with_fetcher(fetcher.clone(), test_config());

        let mut snapshots = Vec::new();
        let path = downloader
            .download("mem://media", &output, data.len() as u64, |s| snapshots.push(s))
            .await
            .unwrap();

        assert_eq!(path, output);
        assert_eq!(std::fs::read(&output).unwrap(), data);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 11);

        assert!(!snapshots.is_empty());
        for pair in snapshots.windows(2) {
            assert!(pair[0].downloaded <= pair[1].downloaded);
        }
        assert!(snapshots.iter().all(|s| s.downloaded <= s.total));
        let last = snapshots.last().unwrap();
        assert_eq!(last.downloaded, 1050);
        assert!(last.is_complete());
    }

    #[tokio::test]
    async fn test_worker_pool_is_bounded() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("media.bin");
        let data = content(2000);
        let fetcher = Arc::new(MemoryFetcher::new(data.clone(), Duration::from_millis(10)));
        let downloader =
            RangeDownloader::with_fetcher(fetcher.clone(), test_config().with_workers(3));

        downloader
            .download("mem://media", &output, data.len() as u64, |_| {})
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), data);
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_zero_length_creates_empty_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("empty.bin");
        let fetcher = Arc::new(MemoryFetcher::new(Vec::new(), Duration::ZERO));
        let downloader = RangeDownloader::with_fetcher(fetcher.clone(), test_config());

        let path = downloader
            .download("mem://empty", &output, 0, |_| {})
            .await
            .unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_plan_rejected_before_file_creation() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("never.bin");
        let fetcher = Arc::new(MemoryFetcher::new(content(10), Duration::ZERO));
        let downloader =
            RangeDownloader::with_fetcher(fetcher, test_config().with_packet_size(0));

        let err = downloader
            .download("mem://media", &output, 10, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, SigfetchError::InvalidPlan(_)));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("media.bin");
        let data = content(450);
        let fetcher = Arc::new(FlakyFetcher {
            data: data.clone(),
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        });
        let downloader = RangeDownloader::with_fetcher(fetcher.clone(), test_config());

        downloader
            .download("mem://media", &output, data.len() as u64, |_| {})
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), data);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_fatal_failure_aborts_and_removes_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("media.bin");
        let fetcher = Arc::new(RejectingFetcher);
        let downloader = RangeDownloader::with_fetcher(fetcher, test_config());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            downloader.download("mem://media", &output, 1000, |_| {}),
        )
        .await
        .unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, SigfetchError::HttpStatus { status: 403, .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_single_failed_packet_aborts_download() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("media.bin");
        let fetcher = Arc::new(PartiallyRejectingFetcher {
            data: content(1000),
            rejected_start: 500,
        });
        let downloader = RangeDownloader::with_fetcher(fetcher, test_config());
        let mut snapshots = Vec::new();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            downloader.download("mem://media", &output, 1000, |p| snapshots.push(p)),
        )
        .await
        .unwrap();

        match result {
            Err(SigfetchError::HttpStatus { status, range }) => {
                assert_eq!(status, 403);
                assert_eq!(range, "bytes=500-599");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!output.exists());
        assert!(snapshots
            .windows(2)
            .all(|pair| pair[0].downloaded <= pair[1].downloaded));
        assert!(snapshots.iter().all(|p| p.downloaded < 1000));
    }

    #[tokio::test]
    async fn test_external_abort_removes_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("media.bin");
        let downloader = RangeDownloader::with_fetcher(Arc::new(StalledFetcher), test_config());
        let abort = AbortSignal::new();

        let trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.trigger();
        });

        let err = downloader
            .download_with_abort("mem://media", &output, 1000, |_| {}, abort)
            .await
            .unwrap_err();

        assert!(matches!(err, SigfetchError::Aborted));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_dropped_download_removes_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("media.bin");
        let downloader = RangeDownloader::with_fetcher(Arc::new(StalledFetcher), test_config());

        let result = tokio::time::timeout(
            Duration::from_millis(30),
            downloader.download("mem://media", &output, 1000, |_| {}),
        )
        .await;

        assert!(result.is_err());
        assert!(!output.exists());
    }
}
