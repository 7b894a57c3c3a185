//! Minimal HTTP/1.1 subset for browser peers.
//!
//! The transfer listener is not an HTTP server; it hand-frames just enough
//! of HTTP/1.1 for a PC browser to list, download, and upload files. Every
//! response carries `Connection: close` - one request per connection, like
//! the custom dialect.
//!
//! The parser assumes the request line and headers arrive within the
//! initial reads of the connection (the body may be split); this mirrors
//! how small LAN requests behave in practice. Bytes following the header
//! block in the same read are handed back to the caller untouched, because
//! an upload's first body bytes routinely share a packet with its headers.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// A parsed request from the HTTP dialect.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method (`GET`, `POST`, ...)
    pub method: String,
    /// Path component of the request target
    pub path: String,
    /// Decoded query parameters
    pub query: HashMap<String, String>,
    /// Header map, names lowercased
    pub headers: HashMap<String, String>,
}

impl HttpRequest {
    /// Look up a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Look up a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Resume offset from a `Range: bytes=N-` header, if present.
    #[must_use]
    pub fn range_start(&self) -> Option<u64> {
        parse_range_start(self.header("range")?)
    }

    /// Resume offset from a `Content-Range: bytes N-E/T` header (uploads).
    #[must_use]
    pub fn content_range_start(&self) -> Option<u64> {
        parse_content_range_start(self.header("content-range")?)
    }
}

/// Parse a request whose header block is fully present in `buf`.
///
/// Returns `Ok(None)` while the terminating blank line has not arrived.
/// On success the second element is the offset of the first body byte.
///
/// # Errors
///
/// Returns an error if the header block is present but malformed.
pub fn parse_request(buf: &[u8]) -> Result<Option<(HttpRequest, usize)>> {
    let Some(header_end) = find_header_end(buf) else {
        return Ok(None);
    };

    let header_text = std::str::from_utf8(&buf[..header_end])
        .map_err(|_| Error::HttpParse("non-UTF-8 header block".to_string()))?;

    let mut lines = header_text.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| Error::HttpParse("empty request".to_string()))?;

    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| Error::HttpParse("missing method".to_string()))?
        .to_string();
    let target = parts
        .next()
        .ok_or_else(|| Error::HttpParse("missing request target".to_string()))?;

    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), parse_query(q)),
        None => (target.to_string(), HashMap::new()),
    };

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::HttpParse(format!("malformed header line: {line}")))?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    Ok(Some((
        HttpRequest {
            method,
            path,
            query,
            headers,
        },
        header_end + 4,
    )))
}

/// Offset of the `\r\n\r\n` terminator, if present.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Decode a query string into a parameter map.
fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

/// Decode percent-escapes and `+` in a URL component.
#[must_use]
pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                if let (Some(hi), Some(lo)) = (
                    bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                    bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
                ) {
                    #[allow(clippy::cast_possible_truncation)]
                    out.push((hi * 16 + lo) as u8);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).to_string()
}

/// Percent-encode a URL query component.
///
/// Unreserved characters pass through; everything else becomes `%XX`.
#[must_use]
pub fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Parse `bytes=N-` (open-ended ranges only; that is all resume needs).
#[must_use]
pub fn parse_range_start(value: &str) -> Option<u64> {
    let spec = value.trim().strip_prefix("bytes=")?;
    let (start, _) = spec.split_once('-')?;
    start.trim().parse().ok()
}

/// Parse the start offset out of `bytes N-E/T`.
#[must_use]
pub fn parse_content_range_start(value: &str) -> Option<u64> {
    let spec = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = spec.split_once('-')?;
    start.trim().parse().ok()
}

/// A response ready to be written to the socket.
///
/// Streaming bodies write these headers first and then the raw bytes.
#[derive(Debug)]
pub struct ResponseHead {
    status: u16,
    reason: &'static str,
    headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Start a response with the given status.
    #[must_use]
    pub fn new(status: u16) -> Self {
        let reason = match status {
            200 => "OK",
            206 => "Partial Content",
            400 => "Bad Request",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "Unknown",
        };
        Self {
            status,
            reason,
            headers: Vec::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Allow any origin; applied to JSON and empty responses so the
    /// control page's fetches work from file:// and foreign hosts.
    #[must_use]
    pub fn cors(self) -> Self {
        self.header("Access-Control-Allow-Origin", "*")
    }

    /// Serialize the status line and headers. `Connection: close` is
    /// always appended.
    #[must_use]
    pub fn into_bytes(self, content_length: u64) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str(&format!("Content-Length: {content_length}\r\n"));
        out.push_str("Connection: close\r\n\r\n");
        out.into_bytes()
    }
}

/// Build a complete JSON response.
#[must_use]
pub fn json_response(status: u16, body: &[u8]) -> Vec<u8> {
    let mut out = ResponseHead::new(status)
        .header("Content-Type", "application/json")
        .cors()
        .into_bytes(body.len() as u64);
    out.extend_from_slice(body);
    out
}

/// Build a complete empty response.
#[must_use]
pub fn empty_response(status: u16) -> Vec<u8> {
    ResponseHead::new(status).cors().into_bytes(0)
}

/// Build a complete HTML response.
#[must_use]
pub fn html_response(body: &str) -> Vec<u8> {
    let mut out = ResponseHead::new(200)
        .header("Content-Type", "text/html; charset=utf-8")
        .into_bytes(body.len() as u64);
    out.extend_from_slice(body.as_bytes());
    out
}

/// Headers for a (possibly ranged) file download.
///
/// A present `range_start` yields 206 with `Content-Range`; otherwise 200.
/// `Content-Length` always covers the bytes actually sent.
#[must_use]
pub fn download_head(name: &str, total: u64, range_start: Option<u64>) -> Vec<u8> {
    let start = range_start.unwrap_or(0);
    let remaining = total.saturating_sub(start);

    let mut head = ResponseHead::new(if range_start.is_some() { 206 } else { 200 })
        .header("Content-Type", "application/octet-stream")
        .header(
            "Content-Disposition",
            format!("attachment; filename=\"{name}\""),
        )
        .header("Accept-Ranges", "bytes");

    if range_start.is_some() {
        head = head.header(
            "Content-Range",
            format!("bytes {}-{}/{}", start, total.saturating_sub(1), total),
        );
    }

    head.into_bytes(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_get() {
        let raw = b"GET /api/files HTTP/1.1\r\nHost: 192.168.49.1\r\n\r\n";
        let (req, body_start) = parse_request(raw).unwrap().unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/api/files");
        assert_eq!(req.header("host"), Some("192.168.49.1"));
        assert_eq!(body_start, raw.len());
    }

    #[test]
    fn test_parse_incomplete_headers() {
        let raw = b"GET /api/files HTTP/1.1\r\nHost: 192.168";
        assert!(parse_request(raw).unwrap().is_none());
    }

    #[test]
    fn test_percent_encode_round_trip() {
        let name = "my holiday pic (1).jpg";
        assert_eq!(percent_decode(&percent_encode(name)), name);
        assert_eq!(percent_encode("a b"), "a%20b");
    }

    #[test]
    fn test_parse_query_decoding() {
        let raw = b"GET /api/download?name=my%20holiday+pic.jpg HTTP/1.1\r\n\r\n";
        let (req, _) = parse_request(raw).unwrap().unwrap();
        assert_eq!(req.query_param("name"), Some("my holiday pic.jpg"));
    }

    #[test]
    fn test_parse_body_in_same_read() {
        let raw = b"POST /api/upload?name=a.bin&size=4 HTTP/1.1\r\nContent-Length: 4\r\n\r\nDATA";
        let (req, body_start) = parse_request(raw).unwrap().unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.query_param("size"), Some("4"));
        assert_eq!(&raw[body_start..], b"DATA");
    }

    #[test]
    fn test_range_start() {
        assert_eq!(parse_range_start("bytes=100-"), Some(100));
        assert_eq!(parse_range_start("bytes=0-499"), Some(0));
        assert_eq!(parse_range_start("items=3-"), None);
        assert_eq!(parse_range_start("bytes=x-"), None);
    }

    #[test]
    fn test_content_range_start() {
        assert_eq!(parse_content_range_start("bytes 500-999/2000"), Some(500));
        assert_eq!(parse_content_range_start("bytes 0-"), Some(0));
        assert_eq!(parse_content_range_start("chunks 1-2/3"), None);
    }

    #[test]
    fn test_response_has_close_and_length() {
        let bytes = json_response(200, b"[]");
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.ends_with("\r\n\r\n[]"));
    }

    #[test]
    fn test_download_head_full() {
        let text = String::from_utf8(download_head("a.bin", 1000, None)).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK"));
        assert!(text.contains("Content-Length: 1000"));
        assert!(text.contains("Accept-Ranges: bytes"));
        assert!(text.contains("Content-Disposition: attachment; filename=\"a.bin\""));
        assert!(!text.contains("Content-Range"));
    }

    #[test]
    fn test_download_head_ranged() {
        let text = String::from_utf8(download_head("a.bin", 1000, Some(400))).unwrap();
        assert!(text.starts_with("HTTP/1.1 206 Partial Content"));
        assert!(text.contains("Content-Length: 600"));
        assert!(text.contains("Content-Range: bytes 400-999/1000"));
    }

    #[test]
    fn test_percent_decode_edge_cases() {
        assert_eq!(percent_decode("a%2Fb"), "a/b");
        assert_eq!(percent_decode("trailing%2"), "trailing%2");
        assert_eq!(percent_decode("%zz"), "%zz");
    }
}
