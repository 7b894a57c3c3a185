//! Fling CLI - peer-to-peer local network file transfer
//!
//! Fling moves files directly between devices on the same network (or a
//! shared hotspot / Wi-Fi Direct group) with no server in between.
//!
//! ## Quick Start
//!
//! ```bash
//! # Offer files
//! fling send ./photos ./notes.pdf
//!
//! # Receive them (on another device)
//! fling receive
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Send(args) => commands::send::run(args).await,
        Command::Receive(args) => commands::receive::run(args).await,
        Command::Scan(args) => commands::scan::run(args).await,
        Command::History(args) => commands::history::run(args),
        Command::Config(args) => commands::config::run(args),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,fling=info,fling_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
