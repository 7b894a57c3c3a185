//! Per-session transfer bookkeeping.
//!
//! A [`SessionTracker`] follows one connected peer: which files the
//! session covers, how many bytes of each have moved, and each file's
//! current state. Byte counts only ever grow; a stale progress report
//! arriving out of order can never walk a counter backwards.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::events::Direction;

/// State of one file within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Not started yet
    Pending,
    /// Bytes are moving
    Active,
    /// All bytes arrived
    Completed,
    /// Errored partway; the session continues without it
    Failed,
}

/// Progress record for one file.
#[derive(Debug, Clone)]
pub struct FileProgress {
    /// File name
    pub name: String,
    /// Total size in bytes
    pub size: u64,
    /// Bytes moved so far (monotonically non-decreasing)
    pub transferred: u64,
    /// Current state
    pub state: FileState,
}

impl FileProgress {
    /// Completed percent, 0-100.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.size == 0 {
            return if self.state == FileState::Completed { 100 } else { 0 };
        }
        let pct = self.transferred.saturating_mul(100) / self.size;
        u8::try_from(pct.min(100)).unwrap_or(100)
    }
}

/// Tracks one peer session's files and byte counts.
#[derive(Debug)]
pub struct SessionTracker {
    peer: SocketAddr,
    direction: Direction,
    files: HashMap<String, FileProgress>,
    order: Vec<String>,
}

impl SessionTracker {
    /// Start tracking a session with the given peer.
    #[must_use]
    pub fn new(peer: SocketAddr, direction: Direction) -> Self {
        Self {
            peer,
            direction,
            files: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// The peer this session talks to.
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Which way the session's bytes move.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Register a file. Re-registering an existing name keeps its
    /// progress (the offered list is merged, not replaced).
    pub fn add_file(&mut self, name: &str, size: u64) {
        if self.files.contains_key(name) {
            return;
        }
        self.order.push(name.to_string());
        self.files.insert(
            name.to_string(),
            FileProgress {
                name: name.to_string(),
                size,
                transferred: 0,
                state: FileState::Pending,
            },
        );
    }

    /// Record bytes moved for a file. Counts never decrease; a report
    /// below the current count is ignored.
    pub fn record_bytes(&mut self, name: &str, transferred: u64) {
        if let Some(file) = self.files.get_mut(name) {
            if transferred > file.transferred {
                file.transferred = transferred;
            }
            if file.state == FileState::Pending {
                file.state = FileState::Active;
            }
        }
    }

    /// Mark a file completed, pinning its count to the full size.
    pub fn mark_completed(&mut self, name: &str) {
        if let Some(file) = self.files.get_mut(name) {
            file.transferred = file.size;
            file.state = FileState::Completed;
        }
    }

    /// Mark a file failed. Transferred bytes are kept; a retry resumes
    /// from them.
    pub fn mark_failed(&mut self, name: &str) {
        if let Some(file) = self.files.get_mut(name) {
            file.state = FileState::Failed;
        }
    }

    /// Drop a file from the session entirely (a failed entry the user
    /// dismissed).
    pub fn remove_file(&mut self, name: &str) {
        self.files.remove(name);
        self.order.retain(|n| n != name);
    }

    /// Look up one file's progress.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&FileProgress> {
        self.files.get(name)
    }

    /// All files in registration order.
    #[must_use]
    pub fn files(&self) -> Vec<&FileProgress> {
        self.order
            .iter()
            .filter_map(|name| self.files.get(name))
            .collect()
    }

    /// Whether every registered file is completed or failed.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.files.is_empty()
            && self
                .files
                .values()
                .all(|f| matches!(f.state, FileState::Completed | FileState::Failed))
    }

    /// Total bytes moved across all files.
    #[must_use]
    pub fn total_transferred(&self) -> u64 {
        self.files.values().map(|f| f.transferred).sum()
    }
}
