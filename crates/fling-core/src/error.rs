//! Error types for Fling.
//!
//! This module provides a unified error type for all Fling operations.
//!
//! Propagation policy: low-level probe and connect failures are never
//! surfaced as errors - they resolve to `false`/`None` and drive retry
//! logic. Errors here are reserved for protocol violations, filesystem
//! failures, and setup-phase failures that a caller must handle.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// A specialized `Result` type for Fling operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Fling.
#[derive(Error, Debug)]
pub enum Error {
    /// No peer was found within the bounded discovery attempts
    #[error("no sender found on the network after {0} attempts")]
    DiscoveryTimeout(u32),

    /// Metadata poll failed (timeout or malformed JSON)
    #[error("metadata fetch failed: {0}")]
    MetadataFetch(String),

    /// Connection lost during transfer
    #[error("connection lost during transfer to {0}")]
    ConnectionLost(SocketAddr),

    /// Invalid protocol message
    #[error("invalid protocol message: {0}")]
    Protocol(String),

    /// Malformed HTTP request on the transfer listener
    #[error("malformed HTTP request: {0}")]
    HttpParse(String),

    /// Transfer was cancelled
    #[error("transfer cancelled")]
    TransferCancelled,

    /// File not found
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Invalid path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Platform capability refused (group creation, permission prompts)
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A source locator that no registered resolver can materialize
    #[error("unresolvable source locator: {0}")]
    UnresolvableSource(String),

    /// Operation timeout (milliseconds)
    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    /// Configuration file error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns whether this error is recoverable by a user retry.
    ///
    /// Discovery timeouts and mid-transfer connection losses are retried
    /// from the UI; protocol violations and permission refusals are not.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryTimeout(_)
                | Self::MetadataFetch(_)
                | Self::ConnectionLost(_)
                | Self::Timeout(_)
                | Self::TransferCancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::DiscoveryTimeout(30).is_recoverable());
        assert!(Error::MetadataFetch("timeout".to_string()).is_recoverable());
        assert!(!Error::Protocol("bad token".to_string()).is_recoverable());
        assert!(!Error::PermissionDenied("group creation".to_string()).is_recoverable());
    }

    #[test]
    fn test_timeout_message_reports_milliseconds() {
        assert_eq!(
            Error::Timeout(5000).to_string(),
            "operation timed out after 5000 ms"
        );
    }
}
