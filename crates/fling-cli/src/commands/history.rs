//! History command implementation.

use anyhow::{Context, Result};

use fling_core::files::format_size;
use fling_core::history::HistoryStore;

use super::HistoryArgs;

/// Run the history command.
pub fn run(args: HistoryArgs) -> Result<()> {
    let mut store = HistoryStore::load().context("failed to load history")?;

    if args.clear {
        store.clear().context("failed to clear history")?;
        println!("History cleared.");
        return Ok(());
    }

    let entries = store.list(args.limit);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(entries).context("failed to serialize history")?
        );
        return Ok(());
    }

    if entries.is_empty() {
        println!("No transfers recorded.");
        return Ok(());
    }

    println!();
    println!(
        "  {:<17}  {:<9}  {:<8}  {:>9}  NAME",
        "WHEN", "ROLE", "STATUS", "SIZE"
    );
    for entry in entries {
        println!(
            "  {:<17}  {:<9}  {:<8}  {:>9}  {}",
            entry.formatted_timestamp(),
            entry.role.to_string(),
            entry.status.to_string(),
            format_size(entry.file_size),
            entry.file_name,
        );
    }
    println!();
    println!("  {} entr(ies) total", store.len());
    Ok(())
}
