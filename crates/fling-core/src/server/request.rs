//! Per-connection protocol sniffing.
//!
//! Every inbound connection speaks exactly one request, and its first
//! bytes say which dialect: the custom device tokens, or the HTTP subset
//! for browsers. The sniffer reads just enough to classify and hands the
//! dispatcher a typed request, so dialect checks live in one place
//! instead of being scattered through the connection handler.

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::protocol::{self, http};

/// Upper bound on bytes buffered while waiting for a complete header
/// block. Anything bigger is not a request this listener serves.
const MAX_SNIFF_BYTES: usize = 32 * 1024;

/// A classified inbound request.
#[derive(Debug)]
pub enum Request {
    /// `GET_METADATA` - the device dialect's file list request
    Metadata,
    /// `GET_FILE:<name>` - the device dialect's raw stream request
    File {
        /// Requested file name
        name: String,
    },
    /// An HTTP-subset request; `body` holds any bytes that arrived after
    /// the header block in the same reads
    Http {
        /// The parsed request
        request: http::HttpRequest,
        /// Raw body bytes already received
        body: Vec<u8>,
    },
}

/// Read the connection's opening bytes and classify them.
///
/// The device tokens are written in a single send by their clients, so
/// the first read decides those. HTTP requests keep reading until the
/// blank line ends the header block.
///
/// Returns `Ok(None)` when the peer closes without sending a byte;
/// discovery probes do exactly that and are not an error.
///
/// # Errors
///
/// Returns an error if the peer closes mid-request or the bytes match
/// no dialect.
pub async fn sniff(stream: &mut TcpStream) -> Result<Option<Request>> {
    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(Error::Protocol("connection closed mid-request".to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);

        if buf.starts_with(protocol::GET_METADATA.as_bytes()) {
            return Ok(Some(Request::Metadata));
        }

        if buf.starts_with(protocol::GET_FILE_PREFIX.as_bytes()) {
            let raw = &buf[protocol::GET_FILE_PREFIX.len()..];
            let name = String::from_utf8_lossy(raw).trim().to_string();
            if name.is_empty() {
                // Prefix arrived alone; wait for the name bytes.
                continue;
            }
            return Ok(Some(Request::File { name }));
        }

        // Neither token prefix: if it could still become one, keep
        // reading; otherwise try HTTP.
        let could_be_token = protocol::GET_METADATA.as_bytes().starts_with(&buf[..])
            || protocol::GET_FILE_PREFIX.as_bytes().starts_with(&buf[..]);
        if could_be_token {
            continue;
        }

        if let Some((request, body_start)) = http::parse_request(&buf)? {
            let body = buf[body_start..].to_vec();
            return Ok(Some(Request::Http { request, body }));
        }

        if buf.len() > MAX_SNIFF_BYTES {
            return Err(Error::Protocol("request exceeds sniff limit".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn sniff_bytes(payload: &[u8]) -> Result<Option<Request>> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let payload = payload.to_vec();
        let writer = tokio::spawn(async move {
            let mut client = TcpStream::connect(addr).await.unwrap();
            client.write_all(&payload).await.unwrap();
            client
        });

        let (mut stream, _) = listener.accept().await.unwrap();
        let result = sniff(&mut stream).await;
        let _client = writer.await.unwrap();
        result
    }

    #[tokio::test]
    async fn test_sniff_metadata_token() {
        assert!(matches!(
            sniff_bytes(b"GET_METADATA").await.unwrap(),
            Some(Request::Metadata)
        ));
    }

    #[tokio::test]
    async fn test_sniff_file_token() {
        match sniff_bytes(b"GET_FILE:holiday.jpg").await.unwrap() {
            Some(Request::File { name }) => assert_eq!(name, "holiday.jpg"),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sniff_http_with_body() {
        let raw = b"POST /api/upload?name=a.bin&size=4 HTTP/1.1\r\nHost: x\r\n\r\nDATA";
        match sniff_bytes(raw).await.unwrap() {
            Some(Request::Http { request, body }) => {
                assert_eq!(request.method, "POST");
                assert_eq!(body, b"DATA");
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sniff_treats_silent_close_as_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let client = TcpStream::connect(addr).await.unwrap();
            drop(client);
        });

        let (mut stream, _) = listener.accept().await.unwrap();
        assert!(sniff(&mut stream).await.unwrap().is_none());
    }
}
