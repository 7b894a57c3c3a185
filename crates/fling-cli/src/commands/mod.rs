//! CLI command definitions and handlers.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Load configuration with graceful fallback to defaults.
///
/// All commands go through this; a missing or unparsable config file
/// falls back to defaults instead of aborting.
pub fn load_config() -> fling_core::config::Config {
    fling_core::config::Config::load().unwrap_or_default()
}

pub mod config;
pub mod history;
pub mod receive;
pub mod scan;
pub mod send;

/// Fling - peer-to-peer local network file transfer
#[derive(Parser)]
#[command(name = "fling")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Offer files to other devices on the network
    Send(SendArgs),

    /// Discover a sender and download everything it offers
    Receive(ReceiveArgs),

    /// Look for an active sender without downloading
    Scan(ScanArgs),

    /// Show past transfers
    History(HistoryArgs),

    /// Show or reset configuration
    Config(ConfigArgs),
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// Files or directories to offer (directories are walked)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Listen port (defaults to the configured transfer port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Skip the mDNS announcement
    #[arg(long)]
    pub no_mdns: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the receive command
#[derive(Parser)]
pub struct ReceiveArgs {
    /// Directory downloads land in (defaults to the configured output)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Connect to this address instead of discovering
    #[arg(long)]
    pub from: Option<Ipv4Addr>,

    /// Sender's port (defaults to the configured transfer port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the scan command
#[derive(Parser)]
pub struct ScanArgs {
    /// Port to probe (defaults to the configured transfer port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the history command
#[derive(Parser)]
pub struct HistoryArgs {
    /// Show at most this many entries
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Delete all history entries
    #[arg(long)]
    pub clear: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Print the config file path and exit
    #[arg(long)]
    pub path: bool,

    /// Write default settings to the config file
    #[arg(long)]
    pub reset: bool,
}
