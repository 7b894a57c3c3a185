//! The transfer server (Device A role).
//!
//! One TCP listener serves both wire dialects. Each accepted connection
//! is sniffed ([`request`]) and dispatched: device peers speak the
//! custom tokens, PC browsers speak the HTTP subset. The file list is
//! shared state behind a lock; handlers snapshot it per request, so a
//! list update mid-transfer never disturbs an in-flight stream.
//!
//! Streaming writes are awaited chunk by chunk, which ties the disk read
//! rate to the socket's send rate; a slow receiver slows the sender
//! instead of ballooning memory.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

#[cfg(feature = "mdns")]
use crate::discovery::mdns::MdnsPublisher;
use crate::error::{Error, Result};
use crate::events::{Direction, EventBus, StatusEvent};
use crate::files::{sanitize_file_name, FsResolver, SharedFile, SourceResolver};
use crate::history::{HistoryEntry, HistoryStore, Outcome, Role};
use crate::protocol::{self, http, ProgressThrottle};

mod request;
mod writer;

pub use request::Request;
pub use writer::WriteQueue;

use request::sniff;

/// The browser control page, served for any GET outside `/api/`.
const CONTROL_PAGE: &str = include_str!("page.html");

/// State shared between the accept loop and connection handlers.
struct Shared {
    files: RwLock<Vec<SharedFile>>,
    events: EventBus,
    seen_clients: Mutex<HashSet<IpAddr>>,
    history: Mutex<Option<HistoryStore>>,
    resolver: Box<dyn SourceResolver>,
    upload_dir: PathBuf,
    progress_step: u8,
    http_progress_step: u8,
    cancel: CancellationToken,
}

/// Dual-dialect transfer server.
///
/// Construct, optionally adjust with the builder methods, then
/// [`start`](Self::start). Dropping the server stops the listener.
pub struct TransferServer {
    shared: Arc<Shared>,
    device_name: String,
    port: Option<u16>,
    accept_task: Option<JoinHandle<()>>,
    #[cfg(feature = "mdns")]
    publisher: Option<MdnsPublisher>,
}

impl TransferServer {
    /// Create a server that stores uploads under `upload_dir`.
    #[must_use]
    pub fn new(upload_dir: PathBuf, events: EventBus) -> Self {
        Self {
            shared: Arc::new(Shared {
                files: RwLock::new(Vec::new()),
                events,
                seen_clients: Mutex::new(HashSet::new()),
                history: Mutex::new(None),
                resolver: Box::new(FsResolver),
                upload_dir,
                progress_step: 5,
                http_progress_step: 2,
                cancel: CancellationToken::new(),
            }),
            device_name: "fling".to_string(),
            port: None,
            accept_task: None,
            #[cfg(feature = "mdns")]
            publisher: None,
        }
    }

    /// Set the advertised device name.
    #[must_use]
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set progress reporting granularity for the two dialects.
    #[must_use]
    pub fn with_progress_steps(mut self, device_step: u8, http_step: u8) -> Self {
        let shared = Arc::get_mut(&mut self.shared);
        if let Some(shared) = shared {
            shared.progress_step = device_step;
            shared.http_progress_step = http_step;
        }
        self
    }

    /// Replace the source resolver (platform layers with content URIs).
    #[must_use]
    pub fn with_resolver(mut self, resolver: Box<dyn SourceResolver>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.resolver = resolver;
        }
        self
    }

    /// Attach a history store; completed and failed transfers are
    /// recorded into it.
    pub async fn set_history(&self, store: HistoryStore) {
        *self.shared.history.lock().await = Some(store);
    }

    /// Merge new entries into the offered file list.
    ///
    /// Entries already present (same name and locator) are skipped, so
    /// repeated shares of the same batch do not duplicate.
    pub async fn update_files(&self, incoming: Vec<SharedFile>) {
        let mut files = self.shared.files.write().await;
        for file in incoming {
            let exists = files
                .iter()
                .any(|f| f.name == file.name && f.uri == file.uri);
            if !exists {
                files.push(file);
            }
        }
    }

    /// Snapshot of the currently offered files.
    pub async fn files(&self) -> Vec<SharedFile> {
        self.shared.files.read().await.clone()
    }

    /// The bound port, once started.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Port `0` binds an ephemeral port; the bound port is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self, port: u16) -> Result<u16> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let bound = listener.local_addr()?.port();
        self.port = Some(bound);
        debug!(port = bound, "transfer server listening");

        let shared = Arc::clone(&self.shared);
        self.accept_task = Some(tokio::spawn(accept_loop(listener, shared)));
        Ok(bound)
    }

    /// Announce the service over mDNS so receivers can skip the subnet
    /// scan. Requires a started server.
    ///
    /// # Errors
    ///
    /// Returns an error if the mDNS daemon cannot be started or the
    /// service cannot be registered.
    #[cfg(feature = "mdns")]
    pub async fn announce(&mut self) -> Result<()> {
        let port = self
            .port
            .ok_or_else(|| Error::Internal("announce before start".to_string()))?;
        let file_count = self.shared.files.read().await.len();

        let mut publisher = match self.publisher.take() {
            Some(p) => p,
            None => MdnsPublisher::new()?,
        };
        let result = publisher.publish(&self.device_name, port, file_count);
        self.publisher = Some(publisher);
        result
    }

    /// Stop accepting connections and withdraw the mDNS announcement.
    ///
    /// Transfers already in flight run to completion.
    pub async fn stop(&mut self) {
        self.shared.cancel.cancel();

        #[cfg(feature = "mdns")]
        if let Some(mut publisher) = self.publisher.take() {
            publisher.unpublish();
        }

        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        self.port = None;
    }
}

impl Drop for TransferServer {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        tokio::select! {
            () = shared.cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        configure_keepalive(&stream);
                        let shared = Arc::clone(&shared);
                        tokio::spawn(async move {
                            note_client(&shared, peer.ip()).await;
                            if let Err(e) = handle_connection(&shared, stream, peer).await {
                                warn!(peer = %peer, error = %e, "connection handler failed");
                                shared.events.publish(StatusEvent::ServerError {
                                    message: e.to_string(),
                                });
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        shared.events.publish(StatusEvent::ServerError {
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
    }
    debug!("transfer server stopped accepting");
}

/// Enable TCP keepalive so dead peers are noticed during long pauses.
fn configure_keepalive(stream: &TcpStream) {
    let sock = socket2::SockRef::from(stream);
    let keepalive =
        socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(30));
    if let Err(e) = sock.set_tcp_keepalive(&keepalive) {
        debug!(error = %e, "failed to set TCP keepalive");
    }
}

/// Publish `ClientConnected` once per peer IP per server lifetime.
async fn note_client(shared: &Shared, ip: IpAddr) {
    let mut seen = shared.seen_clients.lock().await;
    if seen.insert(ip) {
        shared
            .events
            .publish(StatusEvent::ClientConnected { ip });
    }
}

async fn handle_connection(
    shared: &Arc<Shared>,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    match sniff(&mut stream).await? {
        // Discovery probe: connect and close, nothing to serve.
        None => Ok(()),
        Some(Request::Metadata) => serve_metadata(shared, stream, peer).await,
        Some(Request::File { name }) => serve_raw_file(shared, stream, peer, &name).await,
        Some(Request::Http { request, body }) => {
            serve_http(shared, stream, peer, request, body).await
        }
    }
}

/// Answer `GET_METADATA` and hold the socket open until the peer closes.
///
/// Receivers treat this connection as their liveness signal while they
/// download over separate connections, so closing early would make them
/// restart discovery.
async fn serve_metadata(shared: &Arc<Shared>, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
    let snapshot = shared.files.read().await.clone();
    let body = protocol::encode_metadata(&snapshot)?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    debug!(peer = %peer, files = snapshot.len(), "metadata served");

    let mut scratch = [0u8; 256];
    loop {
        tokio::select! {
            () = shared.cancel.cancelled() => break,
            n = stream.read(&mut scratch) => {
                match n {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        }
    }
    debug!(peer = %peer, "metadata connection closed");
    Ok(())
}

/// Answer `GET_FILE:<name>` with the raw byte stream.
async fn serve_raw_file(
    shared: &Arc<Shared>,
    mut stream: TcpStream,
    peer: SocketAddr,
    name: &str,
) -> Result<()> {
    let Some(file) = lookup(shared, name).await else {
        // The raw dialect has no error channel; closing is the signal.
        warn!(peer = %peer, name, "requested file not offered");
        return Ok(());
    };

    send_reported(shared, &mut stream, peer, &file, 0, shared.progress_step).await?;
    stream.flush().await?;
    Ok(())
}

async fn lookup(shared: &Shared, name: &str) -> Option<SharedFile> {
    shared
        .files
        .read()
        .await
        .iter()
        .find(|f| f.name == name)
        .cloned()
}

/// Stream a file and publish completion or failure, recording history.
async fn send_reported(
    shared: &Arc<Shared>,
    stream: &mut TcpStream,
    peer: SocketAddr,
    file: &SharedFile,
    start: u64,
    step: u8,
) -> Result<u64> {
    match stream_file(shared, stream, file, start, step).await {
        Ok(sent) => {
            shared.events.publish(StatusEvent::FileCompleted {
                name: file.name.clone(),
                size: file.size,
                direction: Direction::Send,
            });
            record_history(shared, file, Role::Sent, Outcome::Success).await;
            debug!(peer = %peer, name = %file.name, bytes = sent, "file sent");
            Ok(sent)
        }
        Err(e) => {
            shared.events.publish(StatusEvent::FileFailed {
                name: file.name.clone(),
                message: e.to_string(),
            });
            record_history(shared, file, Role::Sent, Outcome::Failed).await;
            Err(e)
        }
    }
}

/// A readable local path for a shared file's locator.
///
/// Non-path locators are materialized to a temporary file that is
/// deleted when the source is dropped, success or not.
struct LocalSource {
    path: PathBuf,
    temporary: bool,
}

impl Drop for LocalSource {
    fn drop(&mut self) {
        if self.temporary {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn resolve_source(shared: &Arc<Shared>, file: &SharedFile) -> Result<LocalSource> {
    if file.is_plain_path() {
        return Ok(LocalSource {
            path: PathBuf::from(&file.uri),
            temporary: false,
        });
    }

    let dest = std::env::temp_dir().join(format!("fling-{}.tmp", Uuid::new_v4()));
    let uri = file.uri.clone();
    let dest_clone = dest.clone();
    let shared = Arc::clone(shared);
    tokio::task::spawn_blocking(move || shared.resolver.materialize(&uri, &dest_clone))
        .await
        .map_err(|e| Error::Internal(format!("materialize task failed: {e}")))??;

    Ok(LocalSource {
        path: dest,
        temporary: true,
    })
}

/// Stream file bytes from `start` to the socket, chunked and throttled.
async fn stream_file(
    shared: &Arc<Shared>,
    stream: &mut TcpStream,
    file: &SharedFile,
    start: u64,
    step: u8,
) -> Result<u64> {
    let source = resolve_source(shared, file).await?;
    let mut reader = File::open(&source.path).await?;
    if start > 0 {
        reader.seek(std::io::SeekFrom::Start(start)).await?;
    }

    let chunk = protocol::chunk_size_for(file.size);
    let mut buf = vec![0u8; chunk];
    let mut throttle = ProgressThrottle::new(step);
    let mut sent: u64 = 0;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n]).await?;
        sent += n as u64;

        if let Some(percent) = throttle.update(start + sent, file.size) {
            shared.events.publish(StatusEvent::Progress {
                name: file.name.clone(),
                percent,
                direction: Direction::Send,
            });
        }
    }
    Ok(sent)
}

async fn record_history(shared: &Shared, file: &SharedFile, role: Role, status: Outcome) {
    let mut guard = shared.history.lock().await;
    if let Some(store) = guard.as_mut() {
        let entry = HistoryEntry::new(file.name.clone(), file.size, file.kind.clone(), role, status);
        if let Err(e) = store.add(entry) {
            warn!(error = %e, "failed to record history entry");
        }
    }
}

async fn serve_http(
    shared: &Arc<Shared>,
    mut stream: TcpStream,
    peer: SocketAddr,
    request: http::HttpRequest,
    body: Vec<u8>,
) -> Result<()> {
    debug!(peer = %peer, method = %request.method, path = %request.path, "http request");

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/api/files") => {
            let snapshot = shared.files.read().await.clone();
            let json =
                serde_json::to_vec(&snapshot).map_err(|e| Error::Serialization(e.to_string()))?;
            stream.write_all(&http::json_response(200, &json)).await?;
        }
        ("GET", "/api/download") => {
            serve_download(shared, &mut stream, peer, &request).await?;
        }
        ("GET", "/api/upload/check") => {
            serve_upload_check(shared, &mut stream, &request).await?;
        }
        ("POST", "/api/upload") => {
            serve_upload(shared, &mut stream, peer, &request, body).await?;
        }
        ("GET", _) => {
            stream.write_all(&http::html_response(CONTROL_PAGE)).await?;
        }
        _ => {
            stream.write_all(&http::empty_response(400)).await?;
        }
    }

    stream.flush().await?;
    Ok(())
}

async fn serve_download(
    shared: &Arc<Shared>,
    stream: &mut TcpStream,
    peer: SocketAddr,
    request: &http::HttpRequest,
) -> Result<()> {
    let Some(name) = request.query_param("name") else {
        stream.write_all(&http::empty_response(400)).await?;
        return Ok(());
    };
    let Some(file) = lookup(shared, name).await else {
        stream.write_all(&http::empty_response(404)).await?;
        return Ok(());
    };

    let range_start = request.range_start().filter(|s| *s < file.size || file.size == 0);
    let start = range_start.unwrap_or(0);

    let head = http::download_head(&file.name, file.size, range_start);
    stream.write_all(&head).await?;

    send_reported(shared, stream, peer, &file, start, shared.http_progress_step).await?;
    Ok(())
}

/// Answer the resume probe: how many bytes of this upload already
/// landed on disk.
async fn serve_upload_check(
    shared: &Arc<Shared>,
    stream: &mut TcpStream,
    request: &http::HttpRequest,
) -> Result<()> {
    let Some(name) = request.query_param("name") else {
        stream.write_all(&http::empty_response(400)).await?;
        return Ok(());
    };

    let path = shared.upload_dir.join(sanitize_file_name(name));
    let received = tokio::fs::metadata(&path).await.map_or(0, |m| m.len());

    let body = format!("{{\"received\":{received}}}");
    stream
        .write_all(&http::json_response(200, body.as_bytes()))
        .await?;
    Ok(())
}

async fn serve_upload(
    shared: &Arc<Shared>,
    stream: &mut TcpStream,
    peer: SocketAddr,
    request: &http::HttpRequest,
    initial_body: Vec<u8>,
) -> Result<()> {
    let Some(name) = request.query_param("name") else {
        stream.write_all(&http::empty_response(400)).await?;
        return Ok(());
    };
    let name = sanitize_file_name(name);
    let Some(size) = request.query_param("size").and_then(|s| s.parse::<u64>().ok()) else {
        stream.write_all(&http::empty_response(400)).await?;
        return Ok(());
    };

    let result = receive_upload(shared, stream, peer, &name, size, request, initial_body).await;
    match result {
        Ok(kind) => {
            shared.events.publish(StatusEvent::FileCompleted {
                name: name.clone(),
                size,
                direction: Direction::Receive,
            });
            let file = SharedFile {
                name: name.clone(),
                kind,
                size,
                uri: shared.upload_dir.join(&name).display().to_string(),
            };
            record_history(shared, &file, Role::Received, Outcome::Success).await;
            stream.write_all(&http::empty_response(200)).await?;
            Ok(())
        }
        Err(e) => {
            shared.events.publish(StatusEvent::FileFailed {
                name: name.clone(),
                message: e.to_string(),
            });
            let file = SharedFile {
                name: name.clone(),
                kind: "application/octet-stream".to_string(),
                size,
                uri: shared.upload_dir.join(&name).display().to_string(),
            };
            record_history(shared, &file, Role::Received, Outcome::Failed).await;
            // Best effort; the socket is likely already gone.
            let _ = stream.write_all(&http::empty_response(500)).await;
            Err(e)
        }
    }
}

/// Drain the upload body into the destination file via the write queue.
///
/// A `Content-Range` header resumes by appending to the partial file;
/// otherwise the destination is truncated. Returns the guessed MIME type.
async fn receive_upload(
    shared: &Arc<Shared>,
    stream: &mut TcpStream,
    peer: SocketAddr,
    name: &str,
    size: u64,
    request: &http::HttpRequest,
    initial_body: Vec<u8>,
) -> Result<String> {
    tokio::fs::create_dir_all(&shared.upload_dir).await?;
    let path = shared.upload_dir.join(name);

    let resuming = request.content_range_start().is_some_and(|s| s > 0);
    let (file, mut received) = if resuming {
        let existing = tokio::fs::metadata(&path).await.map_or(0, |m| m.len());
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        (file, existing)
    } else {
        (File::create(&path).await?, 0)
    };

    let queue = WriteQueue::spawn(file);
    let mut throttle = ProgressThrottle::new(shared.progress_step);

    if !initial_body.is_empty() {
        let mut chunk = initial_body;
        let remaining = size.saturating_sub(received);
        if chunk.len() as u64 > remaining {
            chunk.truncate(usize::try_from(remaining).unwrap_or(usize::MAX));
        }
        received += chunk.len() as u64;
        queue.push(chunk).await?;
        report_progress(shared, name, &mut throttle, received, size);
    }

    let mut buf = vec![0u8; protocol::chunk_size_for(size)];
    while received < size {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::ConnectionLost(peer));
        }
        // Bytes past the declared size are ignored, not written.
        let take = usize::try_from((n as u64).min(size - received)).unwrap_or(n);
        received += take as u64;
        queue.push(buf[..take].to_vec()).await?;
        report_progress(shared, name, &mut throttle, received, size);
    }

    queue.finish().await?;
    debug!(peer = %peer, name, bytes = size, "upload received");

    Ok(mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string())
}

fn report_progress(
    shared: &Shared,
    name: &str,
    throttle: &mut ProgressThrottle,
    transferred: u64,
    total: u64,
) {
    if let Some(percent) = throttle.update(transferred, total) {
        shared.events.publish(StatusEvent::Progress {
            name: name.to_string(),
            percent,
            direction: Direction::Receive,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn started_server(dir: &TempDir) -> (TransferServer, u16, EventBus) {
        let events = EventBus::new();
        let mut server = TransferServer::new(dir.path().join("uploads"), events.clone());
        let port = server.start(0).await.unwrap();
        (server, port, events)
    }

    fn shared_fixture(dir: &TempDir, name: &str, content: &[u8]) -> SharedFile {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        SharedFile::from_path(&path).unwrap()
    }

    async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
            }
        }
        out
    }

    fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
        let pos = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("no header terminator");
        (
            String::from_utf8_lossy(&raw[..pos]).to_string(),
            raw[pos + 4..].to_vec(),
        )
    }

    #[tokio::test]
    async fn test_metadata_request_lists_files() {
        let dir = TempDir::new().unwrap();
        let (server, port, _events) = started_server(&dir).await;
        server
            .update_files(vec![shared_fixture(&dir, "a.txt", b"hello")])
            .await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(protocol::GET_METADATA.as_bytes()).await.unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let files = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "server closed before sentinel");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(files) = protocol::parse_metadata(&buf).unwrap() {
                break files;
            }
        };

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.txt");
        assert_eq!(files[0].size, 5);
    }

    #[tokio::test]
    async fn test_raw_file_request_streams_bytes() {
        let dir = TempDir::new().unwrap();
        let (server, port, _events) = started_server(&dir).await;
        let content = vec![7u8; 10_000];
        server
            .update_files(vec![shared_fixture(&dir, "blob.bin", &content)])
            .await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"GET_FILE:blob.bin").await.unwrap();

        let received = read_to_close(&mut stream).await;
        assert_eq!(received, content);
    }

    #[tokio::test]
    async fn test_unknown_raw_file_closes_without_bytes() {
        let dir = TempDir::new().unwrap();
        let (_server, port, _events) = started_server(&dir).await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"GET_FILE:missing.bin").await.unwrap();

        assert!(read_to_close(&mut stream).await.is_empty());
    }

    #[tokio::test]
    async fn test_http_files_endpoint() {
        let dir = TempDir::new().unwrap();
        let (server, port, _events) = started_server(&dir).await;
        server
            .update_files(vec![shared_fixture(&dir, "doc.pdf", b"%PDF")])
            .await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(b"GET /api/files HTTP/1.1\r\nHost: t\r\n\r\n")
            .await
            .unwrap();

        let raw = read_to_close(&mut stream).await;
        let (head, body) = split_response(&raw);
        assert!(head.starts_with("HTTP/1.1 200"));
        assert!(head.contains("Access-Control-Allow-Origin: *"));
        assert!(head.contains("Connection: close"));

        let files: Vec<SharedFile> = serde_json::from_slice(&body).unwrap();
        assert_eq!(files[0].name, "doc.pdf");
    }

    #[tokio::test]
    async fn test_http_download_with_range() {
        let dir = TempDir::new().unwrap();
        let (server, port, _events) = started_server(&dir).await;
        server
            .update_files(vec![shared_fixture(&dir, "song.mp3", b"0123456789")])
            .await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(
                b"GET /api/download?name=song.mp3 HTTP/1.1\r\nRange: bytes=4-\r\n\r\n",
            )
            .await
            .unwrap();

        let raw = read_to_close(&mut stream).await;
        let (head, body) = split_response(&raw);
        assert!(head.starts_with("HTTP/1.1 206"));
        assert!(head.contains("Content-Range: bytes 4-9/10"));
        assert!(head.contains("Content-Length: 6"));
        assert_eq!(body, b"456789");
    }

    #[tokio::test]
    async fn test_http_download_missing_file_is_404() {
        let dir = TempDir::new().unwrap();
        let (_server, port, _events) = started_server(&dir).await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(b"GET /api/download?name=nope HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let raw = read_to_close(&mut stream).await;
        let (head, _) = split_response(&raw);
        assert!(head.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn test_http_upload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let (_server, port, _events) = started_server(&dir).await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(b"POST /api/upload?name=note.txt&size=4 HTTP/1.1\r\nContent-Length: 4\r\n\r\nDATA")
            .await
            .unwrap();

        let raw = read_to_close(&mut stream).await;
        let (head, _) = split_response(&raw);
        assert!(head.starts_with("HTTP/1.1 200"));

        let stored = std::fs::read(dir.path().join("uploads").join("note.txt")).unwrap();
        assert_eq!(stored, b"DATA");
    }

    #[tokio::test]
    async fn test_http_upload_resume_appends() {
        let dir = TempDir::new().unwrap();
        let (_server, port, _events) = started_server(&dir).await;

        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::write(uploads.join("big.bin"), b"ABCD").unwrap();

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(
                b"POST /api/upload?name=big.bin&size=8 HTTP/1.1\r\nContent-Range: bytes 4-7/8\r\n\r\nEFGH",
            )
            .await
            .unwrap();

        let raw = read_to_close(&mut stream).await;
        let (head, _) = split_response(&raw);
        assert!(head.starts_with("HTTP/1.1 200"));
        assert_eq!(std::fs::read(uploads.join("big.bin")).unwrap(), b"ABCDEFGH");
    }

    #[tokio::test]
    async fn test_upload_check_reports_partial_size() {
        let dir = TempDir::new().unwrap();
        let (_server, port, _events) = started_server(&dir).await;

        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::write(uploads.join("half.bin"), b"12345").unwrap();

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(b"GET /api/upload/check?name=half.bin HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let raw = read_to_close(&mut stream).await;
        let (_, body) = split_response(&raw);
        assert_eq!(body, b"{\"received\":5}");
    }

    #[tokio::test]
    async fn test_fallback_get_serves_control_page() {
        let dir = TempDir::new().unwrap();
        let (_server, port, _events) = started_server(&dir).await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let raw = read_to_close(&mut stream).await;
        let (head, body) = split_response(&raw);
        assert!(head.contains("text/html"));
        assert!(String::from_utf8_lossy(&body).contains("<title>Fling</title>"));
    }

    #[tokio::test]
    async fn test_client_connected_deduplicated_by_ip() {
        let dir = TempDir::new().unwrap();
        let (_server, port, events) = started_server(&dir).await;
        let mut rx = events.subscribe();

        for _ in 0..2 {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            stream.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
            let _ = read_to_close(&mut stream).await;
        }

        let mut connected = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, StatusEvent::ClientConnected { .. }) {
                connected += 1;
            }
        }
        assert_eq!(connected, 1);
    }

    #[tokio::test]
    async fn test_update_files_deduplicates() {
        let dir = TempDir::new().unwrap();
        let events = EventBus::new();
        let server = TransferServer::new(dir.path().to_path_buf(), events);

        let file = shared_fixture(&dir, "same.txt", b"x");
        server.update_files(vec![file.clone()]).await;
        server.update_files(vec![file]).await;

        assert_eq!(server.files().await.len(), 1);
    }
}
