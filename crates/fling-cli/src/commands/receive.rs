//! Receive command implementation.
//!
//! Finds the sender (mDNS first, subnet scan as fallback, or an
//! explicit `--from` address), then polls it and downloads everything
//! it offers until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};

use fling_core::client::{ClientConfig, TransferClient};
use fling_core::discovery::SenderDiscovery;
use fling_core::events::EventBus;
use fling_core::files::format_size;
use fling_core::history::HistoryStore;
use fling_core::session::FileState;

use super::ReceiveArgs;
use crate::ui;

/// Run the receive command.
pub async fn run(args: ReceiveArgs) -> Result<()> {
    let config = super::load_config();
    let port = args.port.unwrap_or(config.network.transfer_port);

    let events = EventBus::new();
    let _printer = ui::spawn_printer(&events, args.quiet);

    if !args.quiet {
        ui::banner();
    }

    let save_dir = args
        .output
        .or_else(|| config.general.default_output.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    println!("  Saving to {}", save_dir.display());
    println!();

    let mut client_config = ClientConfig::new(save_dir);
    client_config.port = port;
    client_config.poll_interval =
        std::time::Duration::from_millis(config.transfer.poll_interval_ms);
    client_config.metadata_timeout =
        std::time::Duration::from_millis(config.transfer.metadata_timeout_ms);
    client_config.progress_step = config.transfer.progress_step;

    let client = std::sync::Arc::new(TransferClient::new(client_config, events.clone()));

    if config.history.enabled {
        if let Some(path) = HistoryStore::default_path() {
            if let Ok(store) = HistoryStore::load_from(path, config.history.clone()) {
                client.set_history(store).await;
            }
        }
    }

    {
        let client = std::sync::Arc::clone(&client);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                client.stop();
            }
        });
    }

    let run_result = match args.from {
        Some(ip) => {
            println!("  Sender: {ip}:{port}");
            client.run(ip).await
        }
        None => {
            println!("  Looking for a sender...");
            let discovery =
                SenderDiscovery::new(port, config.discovery.to_discovery_config(), events);
            client.discover_and_run(&discovery).await
        }
    };

    println!();
    let progress = client.progress().await;
    let completed = progress
        .iter()
        .filter(|f| f.state == FileState::Completed)
        .count();
    let failed = progress
        .iter()
        .filter(|f| f.state == FileState::Failed)
        .count();
    let bytes: u64 = progress.iter().map(|f| f.transferred).sum();
    println!(
        "  {completed} file(s) received ({}), {failed} failed",
        format_size(bytes)
    );

    run_result.context("transfer session ended abnormally")?;
    Ok(())
}
