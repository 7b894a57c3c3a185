//! Send command implementation.
//!
//! Offers the given files on the transfer port and keeps serving until
//! interrupted. Receivers find the host over mDNS or the subnet scan; a
//! browser on the same network can use the control page instead.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use fling_core::discovery::local_ipv4;
use fling_core::events::EventBus;
use fling_core::files::{format_size, SharedFile};
use fling_core::history::HistoryStore;
use fling_core::server::TransferServer;

use super::SendArgs;
use crate::ui;

/// Run the send command.
pub async fn run(args: SendArgs) -> Result<()> {
    let config = super::load_config();

    let files = collect_files(&args.paths)?;
    anyhow::ensure!(!files.is_empty(), "nothing to send: no regular files found");

    let events = EventBus::new();
    let _printer = ui::spawn_printer(&events, args.quiet);

    let upload_dir = config
        .general
        .default_output
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let mut server = TransferServer::new(upload_dir, events)
        .with_device_name(config.general.device_name.clone())
        .with_progress_steps(
            config.transfer.progress_step,
            config.transfer.http_progress_step,
        );

    if config.history.enabled {
        if let Some(path) = HistoryStore::default_path() {
            if let Ok(store) = HistoryStore::load_from(path, config.history.clone()) {
                server.set_history(store).await;
            }
        }
    }

    let total: u64 = files.iter().map(|f| f.size).sum();
    let count = files.len();
    server.update_files(files).await;

    let port = args.port.unwrap_or(config.network.transfer_port);
    let bound = server
        .start(port)
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    if config.network.mdns && !args.no_mdns {
        if let Err(e) = server.announce().await {
            tracing::warn!(error = %e, "mDNS announcement failed; receivers will scan");
        }
    }

    if !args.quiet {
        ui::banner();
    }
    println!("  Offering {count} file(s), {}", format_size(total));
    match local_ipv4() {
        Some(ip) => {
            println!("  Receivers: fling receive (or fling receive --from {ip})");
            println!("  Browser:   http://{ip}:{bound}");
        }
        None => println!("  Listening on port {bound}"),
    }
    println!();
    println!("  Press Ctrl+C to stop sharing.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    println!();
    println!("  Stopping...");
    server.stop().await;
    Ok(())
}

/// Expand the given paths into shared file descriptors, walking
/// directories recursively.
fn collect_files(paths: &[PathBuf]) -> Result<Vec<SharedFile>> {
    let mut files = Vec::new();
    for path in paths {
        anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(false) {
                let entry = entry?;
                if entry.file_type().is_file() {
                    push_file(&mut files, entry.path())?;
                }
            }
        } else {
            push_file(&mut files, path)?;
        }
    }
    Ok(files)
}

fn push_file(files: &mut Vec<SharedFile>, path: &Path) -> Result<()> {
    let file = SharedFile::from_path(path)
        .with_context(|| format!("cannot share {}", path.display()))?;
    files.push(file);
    Ok(())
}
