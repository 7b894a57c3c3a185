//! Status event bus for Fling.
//!
//! Both transfer roles report progress through an [`EventBus`] rather than
//! a single reassignable callback, so several interested listeners (a
//! progress screen, a history recorder, a log pane) can observe the same
//! session without clobbering each other.
//!
//! Events are broadcast; a slow subscriber that falls behind loses the
//! oldest events, never blocks the transfer.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the broadcast channel backing an [`EventBus`].
const EVENT_CAPACITY: usize = 256;

/// Which way bytes are moving for a given file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// This device is sending the file
    Send,
    /// This device is receiving the file
    Receive,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::Receive => write!(f, "receive"),
        }
    }
}

/// A status event emitted by the transfer engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// A peer connected for the first time (deduplicated by IP per
    /// server lifetime)
    ClientConnected {
        /// Address of the peer
        ip: IpAddr,
    },
    /// Throttled per-file progress. Percent values for a given file are
    /// monotonically non-decreasing.
    Progress {
        /// File name
        name: String,
        /// Completed percent (0-100)
        percent: u8,
        /// Transfer direction
        direction: Direction,
    },
    /// A file finished transferring
    FileCompleted {
        /// File name
        name: String,
        /// Total bytes moved
        size: u64,
        /// Transfer direction
        direction: Direction,
    },
    /// A file failed mid-transfer; the batch continues without it
    FileFailed {
        /// File name
        name: String,
        /// Human-readable reason
        message: String,
    },
    /// All files offered in the current batch have been processed
    BatchCompleted,
    /// The listener hit a socket error but keeps accepting
    ServerError {
        /// Human-readable reason
        message: String,
    },
    /// Human-readable progress line (discovery phases, retries)
    Log {
        /// The message
        message: String,
    },
}

/// Broadcast hub for [`StatusEvent`]s.
///
/// Cloning the bus is cheap; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl EventBus {
    /// Create a new event bus.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Subscribe to events. Each subscriber sees every event published
    /// after the call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Silently dropped when nobody is listening.
    pub fn publish(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }

    /// Publish a human-readable log line.
    pub fn log(&self, message: impl Into<String>) {
        self.publish(StatusEvent::Log {
            message: message.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
