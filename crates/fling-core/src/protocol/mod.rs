//! Wire protocol for Fling transfers.
//!
//! Two dialects share one TCP listener, distinguished by the first bytes
//! of each connection:
//!
//! - A lightweight custom protocol for device peers: a single token per
//!   connection (`GET_METADATA` or `GET_FILE:<name>`), answered with JSON
//!   plus a sentinel or a raw byte stream. One logical request per
//!   connection; there is no connection reuse.
//! - A minimal HTTP/1.1 subset for PC browsers (see [`http`]).
//!
//! ## Custom dialect
//!
//! ```text
//! client -> GET_METADATA
//! server -> <json-array>\n<EOF>\n         (socket stays open, client closes)
//!
//! client -> GET_FILE:<name>
//! server -> <raw file bytes until done>   (client counts bytes against the
//!                                          size learned from metadata)
//! ```

pub mod http;

use crate::error::{Error, Result};
use crate::files::SharedFile;

/// Token requesting the file list.
pub const GET_METADATA: &str = "GET_METADATA";

/// Prefix requesting a raw file stream.
pub const GET_FILE_PREFIX: &str = "GET_FILE:";

/// Sentinel terminating a metadata response.
pub const EOF_SENTINEL: &str = "\n<EOF>\n";

/// Encode the file list as a metadata response body (JSON + sentinel).
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_metadata(files: &[SharedFile]) -> Result<Vec<u8>> {
    let json = serde_json::to_string(files).map_err(|e| Error::Serialization(e.to_string()))?;
    let mut out = json.into_bytes();
    out.extend_from_slice(EOF_SENTINEL.as_bytes());
    Ok(out)
}

/// Parse an accumulated metadata response, if the sentinel has arrived.
///
/// Returns `Ok(None)` while the response is still incomplete.
///
/// # Errors
///
/// Returns an error if the JSON before the sentinel is malformed.
pub fn parse_metadata(buf: &[u8]) -> Result<Option<Vec<SharedFile>>> {
    let Some(end) = find_subslice(buf, EOF_SENTINEL.as_bytes()) else {
        return Ok(None);
    };
    let json = &buf[..end];
    let files = serde_json::from_slice(json).map_err(|e| Error::MetadataFetch(e.to_string()))?;
    Ok(Some(files))
}

/// Locate `needle` in `haystack`.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Pick a read-chunk size for a file of the given length.
///
/// Larger files use larger chunks to cut syscall overhead; small files use
/// small chunks so progress stays responsive on slow radios.
#[must_use]
pub fn chunk_size_for(file_size: u64) -> usize {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if file_size < MB {
        16 * 1024
    } else if file_size < 64 * MB {
        128 * 1024
    } else {
        512 * 1024
    }
}

/// Throttles progress reports to fixed percent increments.
///
/// Guarantees the reported sequence is monotonically non-decreasing and
/// that a completed transfer reports exactly 100.
#[derive(Debug)]
pub struct ProgressThrottle {
    step: u8,
    last: Option<u8>,
}

impl ProgressThrottle {
    /// Create a throttle reporting at `step` percent increments.
    #[must_use]
    pub fn new(step: u8) -> Self {
        Self {
            step: step.max(1),
            last: None,
        }
    }

    /// Feed the current byte counts; returns a percent to report, or
    /// `None` if the change is below the configured step.
    pub fn update(&mut self, transferred: u64, total: u64) -> Option<u8> {
        let percent = if total == 0 {
            100
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let p = (transferred.min(total) * 100 / total) as u8;
            p
        };

        match self.last {
            Some(last) if percent < last => None,
            Some(last) if percent == 100 && last < 100 => {
                self.last = Some(100);
                Some(100)
            }
            Some(last) if percent < last.saturating_add(self.step) => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_files() -> Vec<SharedFile> {
        vec![
            SharedFile {
                name: "a.txt".to_string(),
                kind: "text/plain".to_string(),
                size: 10,
                uri: "/tmp/a.txt".to_string(),
            },
            SharedFile {
                name: "b.jpg".to_string(),
                kind: "image/jpeg".to_string(),
                size: 2048,
                uri: "content://media/7".to_string(),
            },
        ]
    }

    #[test]
    fn test_metadata_round_trip() {
        let files = sample_files();
        let encoded = encode_metadata(&files).unwrap();
        assert!(encoded.ends_with(EOF_SENTINEL.as_bytes()));

        let parsed = parse_metadata(&encoded).unwrap().unwrap();
        assert_eq!(parsed, files);
    }

    #[test]
    fn test_metadata_wire_field_name() {
        let encoded = encode_metadata(&sample_files()).unwrap();
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(text.contains("\"type\":\"text/plain\""));
    }

    #[test]
    fn test_parse_metadata_incomplete() {
        let files = sample_files();
        let encoded = encode_metadata(&files).unwrap();
        // Missing half the sentinel: not parseable yet.
        let partial = &encoded[..encoded.len() - 3];
        assert!(parse_metadata(partial).unwrap().is_none());
    }

    #[test]
    fn test_parse_metadata_malformed_json() {
        let mut buf = b"not json".to_vec();
        buf.extend_from_slice(EOF_SENTINEL.as_bytes());
        assert!(parse_metadata(&buf).is_err());
    }

    #[test]
    fn test_chunk_size_scales_with_file() {
        assert_eq!(chunk_size_for(1000), 16 * 1024);
        assert_eq!(chunk_size_for(10 * 1024 * 1024), 128 * 1024);
        assert_eq!(chunk_size_for(1024 * 1024 * 1024), 512 * 1024);
    }

    #[test]
    fn test_progress_throttle_steps() {
        let mut throttle = ProgressThrottle::new(5);
        assert_eq!(throttle.update(0, 100), Some(0));
        assert_eq!(throttle.update(3, 100), None);
        assert_eq!(throttle.update(5, 100), Some(5));
        assert_eq!(throttle.update(7, 100), None);
        assert_eq!(throttle.update(50, 100), Some(50));
        assert_eq!(throttle.update(100, 100), Some(100));
    }

    #[test]
    fn test_progress_throttle_monotone() {
        let mut throttle = ProgressThrottle::new(5);
        let mut reported = Vec::new();
        for transferred in [0u64, 10, 7, 20, 20, 99, 100] {
            if let Some(p) = throttle.update(transferred, 100) {
                reported.push(p);
            }
        }
        let mut sorted = reported.clone();
        sorted.sort_unstable();
        assert_eq!(reported, sorted, "progress must never decrease");
        assert_eq!(*reported.last().unwrap(), 100);
    }

    #[test]
    fn test_progress_throttle_zero_total() {
        let mut throttle = ProgressThrottle::new(5);
        assert_eq!(throttle.update(0, 0), Some(100));
    }

    #[test]
    fn test_progress_final_always_reported() {
        // 99 -> 100 is below the step but completion must still fire.
        let mut throttle = ProgressThrottle::new(5);
        assert_eq!(throttle.update(98, 100), Some(98));
        assert_eq!(throttle.update(100, 100), Some(100));
    }
}
