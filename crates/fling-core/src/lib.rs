//! # Fling Core Library
//!
//! `fling-core` is the transfer engine behind Fling, a peer-to-peer local
//! file transfer tool for devices on the same Wi-Fi Direct group, hotspot,
//! or LAN - no internet access required.
//!
//! ## How a transfer works
//!
//! 1. The sending device starts a [`server::TransferServer`] on a known
//!    port and advertises it via mDNS.
//! 2. The receiving device runs [`discovery::SenderDiscovery`]: an mDNS
//!    lookup first, falling back to a prioritized subnet probe sweep
//!    (gateway heuristics, near neighbours, then the rest of the /24).
//! 3. Once an IP is known, [`client::TransferClient`] polls the sender for
//!    metadata and downloads offered files sequentially, with byte-range
//!    resume for interrupted files.
//!
//! The same TCP listener also speaks a minimal HTTP subset so a PC browser
//! on the network can list, download, and upload files without installing
//! anything.
//!
//! ## Modules
//!
//! - [`client`] - Receiver role: discovery-driven connect, metadata
//!   polling, resumable downloads
//! - [`config`] - Configuration management
//! - [`discovery`] - Peer discovery (mDNS plus subnet scan fallback)
//! - [`events`] - Status event bus consumed by UI layers
//! - [`files`] - Shared file descriptors and size formatting
//! - [`group`] - Platform capability interfaces (local group creation,
//!   gateway lookup)
//! - [`history`] - Transfer history tracking and persistence
//! - [`protocol`] - Wire tokens, metadata framing, HTTP subset
//! - [`server`] - Sender role: raw protocol plus browser endpoints
//! - [`session`] - Per-session progress aggregation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod files;
pub mod group;
pub mod history;
pub mod protocol;
pub mod server;
pub mod session;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default transfer port (TCP)
pub const DEFAULT_TRANSFER_PORT: u16 = 53320;

/// Timeout for a single reachability probe
pub const PROBE_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(1500);

/// Number of candidates probed concurrently during a subnet scan
pub const SCAN_BATCH_SIZE: usize = 5;

/// Maximum subnet scan attempts before discovery gives up
pub const MAX_SCAN_ATTEMPTS: u32 = 30;

/// Pause between subnet scan attempts
pub const SCAN_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

/// Default mDNS resolution timeout
pub const MDNS_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Interval between metadata polls on the receiver side
pub const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3);

/// Timeout for a single metadata fetch
pub const METADATA_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
