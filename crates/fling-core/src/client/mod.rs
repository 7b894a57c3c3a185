//! The transfer client (Device B role).
//!
//! Once a sender is known (via discovery or an explicit address), the
//! client polls its metadata endpoint, downloads every file it has not
//! seen before over the raw dialect, and keeps polling so files shared
//! later in the session arrive too. Files are deduplicated by name and
//! size across the whole run; a failed file is set aside rather than
//! retried every poll, until the caller clears it.
//!
//! Downloads append to disk as chunks arrive, so an interrupted file
//! keeps its partial bytes and a retry resumes over the HTTP dialect's
//! `Range` request instead of starting over.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::discovery::SenderDiscovery;
use crate::error::{Error, Result};
use crate::events::{Direction, EventBus, StatusEvent};
use crate::files::{sanitize_file_name, SharedFile};
use crate::history::{HistoryEntry, HistoryStore, Outcome, Role};
use crate::protocol::{self, http, ProgressThrottle};
use crate::session::{FileProgress, SessionTracker};

/// Tuning for a client run.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Sender's transfer port
    pub port: u16,
    /// Directory downloads land in
    pub save_dir: PathBuf,
    /// Delay between metadata polls
    pub poll_interval: Duration,
    /// Budget for one metadata fetch
    pub metadata_timeout: Duration,
    /// Progress event granularity in percent
    pub progress_step: u8,
}

impl ClientConfig {
    /// Defaults for the given download directory.
    #[must_use]
    pub fn new(save_dir: PathBuf) -> Self {
        Self {
            port: crate::DEFAULT_TRANSFER_PORT,
            save_dir,
            poll_interval: crate::POLL_INTERVAL,
            metadata_timeout: crate::METADATA_TIMEOUT,
            progress_step: 5,
        }
    }
}

/// Polling download client.
pub struct TransferClient {
    config: ClientConfig,
    events: EventBus,
    cancel: CancellationToken,
    processed: Mutex<HashSet<(String, u64)>>,
    tracker: Mutex<Option<SessionTracker>>,
    history: Mutex<Option<HistoryStore>>,
}

impl TransferClient {
    /// Create a client.
    #[must_use]
    pub fn new(config: ClientConfig, events: EventBus) -> Self {
        Self {
            config,
            events,
            cancel: CancellationToken::new(),
            processed: Mutex::new(HashSet::new()),
            tracker: Mutex::new(None),
            history: Mutex::new(None),
        }
    }

    /// Attach a history store; finished downloads are recorded into it.
    pub async fn set_history(&self, store: HistoryStore) {
        *self.history.lock().await = Some(store);
    }

    /// Request a cooperative stop. The file mid-download stops at the
    /// next chunk boundary; its partial bytes stay on disk.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled by [`stop`](Self::stop); callers can tie their
    /// own shutdown to it.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Forget a failed file so the next poll retries it.
    pub async fn clear_failed_file(&self, name: &str, size: u64) {
        self.processed
            .lock()
            .await
            .remove(&(name.to_string(), size));
        if let Some(tracker) = self.tracker.lock().await.as_mut() {
            tracker.remove_file(name);
        }
    }

    /// Snapshot of per-file progress for the current run.
    pub async fn progress(&self) -> Vec<FileProgress> {
        self.tracker
            .lock()
            .await
            .as_ref()
            .map(|t| t.files().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Find a sender with `discovery`, then poll it until stopped.
    ///
    /// Stopping during the discovery phase returns `Ok(())` like any
    /// other cooperative stop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiscoveryTimeout`] when discovery exhausts its
    /// attempts, or whatever [`run`](Self::run) returns afterwards.
    pub async fn discover_and_run(&self, discovery: &SenderDiscovery) -> Result<()> {
        let found = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            found = discovery.discover() => found,
        };
        let Some(host) = found else {
            return Err(Error::DiscoveryTimeout(discovery.config().max_attempts));
        };
        self.events.log(format!("sender found at {host}"));
        self.run(host).await
    }

    /// Poll `host` until stopped.
    ///
    /// Each poll fetches metadata, downloads every not-yet-seen file
    /// sequentially, and publishes a `BatchCompleted` event when the
    /// batch settles. Per-file failures do not abort the run, and
    /// metadata fetch failures are logged and swallowed - the sender
    /// may be mid-handover on a flaky radio, and the next poll finds it
    /// again. Only [`stop`](Self::stop) ends the loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the save directory cannot be created.
    pub async fn run(&self, host: Ipv4Addr) -> Result<()> {
        let addr = SocketAddr::from((host, self.config.port));
        tokio::fs::create_dir_all(&self.config.save_dir).await?;
        *self.tracker.lock().await = Some(SessionTracker::new(addr, Direction::Receive));
        self.events.log(format!("polling {addr} for shared files"));

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            match self.fetch_metadata(addr).await {
                Ok(files) => {
                    if self.process_batch(addr, files).await.is_err() {
                        // Cancelled mid-batch.
                        return Ok(());
                    }
                }
                Err(e) => {
                    warn!(addr = %addr, error = %e, "metadata fetch failed; will poll again");
                }
            }

            tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// One metadata round trip: connect, send the token, read until the
    /// sentinel.
    async fn fetch_metadata(&self, addr: SocketAddr) -> Result<Vec<SharedFile>> {
        let work = async {
            let mut stream = TcpStream::connect(addr).await?;
            stream
                .write_all(protocol::GET_METADATA.as_bytes())
                .await?;
            stream.flush().await?;

            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(Error::MetadataFetch(
                        "connection closed before sentinel".to_string(),
                    ));
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(files) = protocol::parse_metadata(&buf)? {
                    return Ok(files);
                }
            }
        };

        tokio::time::timeout(self.config.metadata_timeout, work)
            .await
            .map_err(|_| {
                Error::Timeout(u64::try_from(self.config.metadata_timeout.as_millis()).unwrap_or(u64::MAX))
            })?
    }

    /// Download every file the run has not processed yet.
    ///
    /// Returns `Err` only on cancellation; per-file failures are
    /// reported through events and recorded as processed.
    async fn process_batch(&self, addr: SocketAddr, files: Vec<SharedFile>) -> Result<()> {
        let mut downloaded_any = false;

        for file in files {
            let key = (file.name.clone(), file.size);
            if self.processed.lock().await.contains(&key) {
                continue;
            }
            if self.cancel.is_cancelled() {
                return Err(Error::TransferCancelled);
            }

            if let Some(tracker) = self.tracker.lock().await.as_mut() {
                tracker.add_file(&file.name, file.size);
            }
            downloaded_any = true;

            match self.download_file(addr, &file).await {
                Ok(()) => {
                    self.mark_done(&file, Outcome::Success).await;
                    self.processed.lock().await.insert(key);
                }
                Err(Error::TransferCancelled) => {
                    self.events.log(format!("cancelled during {}", file.name));
                    return Err(Error::TransferCancelled);
                }
                Err(e) => {
                    warn!(name = %file.name, error = %e, "download failed");
                    self.events.publish(StatusEvent::FileFailed {
                        name: file.name.clone(),
                        message: e.to_string(),
                    });
                    self.mark_done(&file, Outcome::Failed).await;
                    self.processed.lock().await.insert(key);
                }
            }
        }

        if downloaded_any {
            self.events.publish(StatusEvent::BatchCompleted);
        }
        Ok(())
    }

    async fn mark_done(&self, file: &SharedFile, outcome: Outcome) {
        if let Some(tracker) = self.tracker.lock().await.as_mut() {
            match outcome {
                Outcome::Success => tracker.mark_completed(&file.name),
                Outcome::Failed => tracker.mark_failed(&file.name),
            }
        }
        if outcome == Outcome::Success {
            self.events.publish(StatusEvent::FileCompleted {
                name: file.name.clone(),
                size: file.size,
                direction: Direction::Receive,
            });
        }
        if let Some(store) = self.history.lock().await.as_mut() {
            let entry = HistoryEntry::new(
                file.name.clone(),
                file.size,
                file.kind.clone(),
                Role::Received,
                outcome,
            );
            if let Err(e) = store.add(entry) {
                warn!(error = %e, "failed to record history entry");
            }
        }
    }

    /// Fetch one file: raw dialect first, resume over HTTP on a partial
    /// failure.
    async fn download_file(&self, addr: SocketAddr, file: &SharedFile) -> Result<()> {
        let dest = self.config.save_dir.join(sanitize_file_name(&file.name));

        match self.download_raw(addr, file, &dest).await {
            Ok(()) => Ok(()),
            Err(Error::TransferCancelled) => Err(Error::TransferCancelled),
            Err(e) => {
                let partial = tokio::fs::metadata(&dest).await.map_or(0, |m| m.len());
                if partial == 0 || partial >= file.size {
                    return Err(e);
                }
                self.events.log(format!(
                    "{}: retrying from byte {partial} after {e}",
                    file.name
                ));
                self.download_remainder(addr, file, &dest, partial).await
            }
        }
    }

    /// Stream `GET_FILE:<name>` into `dest`, appending chunk by chunk.
    async fn download_raw(
        &self,
        addr: SocketAddr,
        file: &SharedFile,
        dest: &std::path::Path,
    ) -> Result<()> {
        let mut stream = TcpStream::connect(addr).await?;
        stream
            .write_all(format!("{}{}", protocol::GET_FILE_PREFIX, file.name).as_bytes())
            .await?;
        stream.flush().await?;

        let mut out = File::create(dest).await?;
        let received = self
            .drain_stream(&mut stream, &mut out, file, 0, file.size)
            .await?;

        if received < file.size {
            return Err(Error::ConnectionLost(addr));
        }
        debug!(name = %file.name, bytes = received, "file received");
        Ok(())
    }

    /// Resume `dest` from `from` using the HTTP dialect's `Range`
    /// request.
    async fn download_remainder(
        &self,
        addr: SocketAddr,
        file: &SharedFile,
        dest: &std::path::Path,
        from: u64,
    ) -> Result<()> {
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!(
            "GET /api/download?name={} HTTP/1.1\r\nHost: {addr}\r\nRange: bytes={from}-\r\nConnection: close\r\n\r\n",
            http::percent_encode(&file.name)
        );
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;

        let (status, leftover) = read_response_head(&mut stream).await?;

        // 206 resumes in place; a server answering 200 restarts the body
        // from zero, so the partial file is discarded.
        let (mut out, start) = match status {
            206 => {
                let f = tokio::fs::OpenOptions::new().append(true).open(dest).await?;
                (f, from)
            }
            200 => (File::create(dest).await?, 0),
            404 => return Err(Error::FileNotFound(file.name.clone())),
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected download status {other}"
                )))
            }
        };

        if !leftover.is_empty() {
            out.write_all(&leftover).await?;
        }
        let received = self
            .drain_stream(
                &mut stream,
                &mut out,
                file,
                start + leftover.len() as u64,
                file.size,
            )
            .await?;

        if received < file.size {
            return Err(Error::ConnectionLost(addr));
        }
        debug!(name = %file.name, bytes = received - start, "resume completed");
        Ok(())
    }

    /// Copy socket bytes into the file until the peer closes, publishing
    /// throttled progress. Returns the absolute byte count including
    /// `start`.
    async fn drain_stream(
        &self,
        stream: &mut TcpStream,
        out: &mut File,
        file: &SharedFile,
        start: u64,
        total: u64,
    ) -> Result<u64> {
        let mut throttle = ProgressThrottle::new(self.config.progress_step);
        let mut buf = vec![0u8; protocol::chunk_size_for(total)];
        let mut received = start;

        loop {
            let n = tokio::select! {
                () = self.cancel.cancelled() => {
                    out.flush().await?;
                    return Err(Error::TransferCancelled);
                }
                n = stream.read(&mut buf) => n?,
            };
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await?;
            received += n as u64;

            if let Some(percent) = throttle.update(received, total) {
                self.events.publish(StatusEvent::Progress {
                    name: file.name.clone(),
                    percent,
                    direction: Direction::Receive,
                });
            }
            if let Some(tracker) = self.tracker.lock().await.as_mut() {
                tracker.record_bytes(&file.name, received);
            }

            if received >= total && total > 0 {
                break;
            }
        }

        out.flush().await?;
        Ok(received)
    }
}

/// Read an HTTP response's status code and swallow its headers.
///
/// Returns the status and any body bytes that shared a read with the
/// header block.
async fn read_response_head(stream: &mut TcpStream) -> Result<(u16, Vec<u8>)> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 2048];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::HttpParse("response closed mid-headers".to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = std::str::from_utf8(&buf[..pos])
                .map_err(|_| Error::HttpParse("non-UTF-8 response head".to_string()))?;
            let status = head
                .split_whitespace()
                .nth(1)
                .and_then(|s| s.parse::<u16>().ok())
                .ok_or_else(|| Error::HttpParse("malformed status line".to_string()))?;
            return Ok((status, buf[pos + 4..].to_vec()));
        }
        if buf.len() > 16 * 1024 {
            return Err(Error::HttpParse("response head too large".to_string()));
        }
    }
}
