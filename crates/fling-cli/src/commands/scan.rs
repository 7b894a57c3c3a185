//! Scan command implementation.
//!
//! One discovery pass (mDNS plus a single subnet sweep) to report
//! whether a sender is reachable, without downloading anything.

use anyhow::Result;

use fling_core::discovery::{local_ipv4, SenderDiscovery};
use fling_core::events::EventBus;

use super::ScanArgs;

/// Run the scan command.
pub async fn run(args: ScanArgs) -> Result<()> {
    let config = super::load_config();
    let port = args.port.unwrap_or(config.network.transfer_port);

    let mut discovery_config = config.discovery.to_discovery_config();
    discovery_config.max_attempts = 1;

    let events = EventBus::new();
    if !args.json {
        println!("Scanning for a sender on port {port}...");
        if let Some(ip) = local_ipv4() {
            println!("Local address: {ip}");
        }
    }

    let discovery = SenderDiscovery::new(port, discovery_config, events);
    let found = discovery.discover().await;

    if args.json {
        let value = match found {
            Some(ip) => serde_json::json!({ "found": true, "host": ip.to_string(), "port": port }),
            None => serde_json::json!({ "found": false }),
        };
        println!("{value}");
    } else {
        match found {
            Some(ip) => println!("Sender found at {ip}:{port}"),
            None => println!("No sender found."),
        }
    }

    Ok(())
}
