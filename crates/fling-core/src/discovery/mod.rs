//! Peer discovery for Fling.
//!
//! Finding the sender is a two-phase state machine:
//!
//! ```text
//! Idle -> MdnsAttempt -> resolved        -> Done
//!                     \-> timeout        -> SubnetScan -> found     -> Done
//!                                                      \-> exhausted -> Failed
//! ```
//!
//! The mDNS phase browses `_fling._tcp.local.` for a few seconds. The
//! fallback builds a prioritized candidate list ([`candidates`]) and
//! probes it in small concurrent batches ([`probe`]), retrying with a
//! pause between passes; every few passes the list is rebuilt against the
//! current own IP, because the device's address can change mid-scan while
//! it joins the peer's group.
//!
//! Discovery never fails with an error - it resolves to an address or
//! `None`, and narrates its phases on the event bus.

pub mod candidates;
#[cfg(feature = "mdns")]
pub mod mdns;
pub mod probe;

pub use candidates::{Candidate, CandidateSource};

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::events::EventBus;
use crate::group::GatewayLookup;

/// Tuning knobs for a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// mDNS resolution timeout
    pub mdns_timeout: Duration,
    /// Per-probe connect timeout
    pub probe_timeout: Duration,
    /// Candidates probed concurrently
    pub batch_size: usize,
    /// Maximum full passes over the candidate list
    pub max_attempts: u32,
    /// Pause between passes
    pub retry_delay: Duration,
    /// Rebuild the candidate list every this many passes
    pub rebuild_every: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mdns_timeout: crate::MDNS_TIMEOUT,
            probe_timeout: crate::PROBE_TIMEOUT,
            batch_size: crate::SCAN_BATCH_SIZE,
            max_attempts: crate::MAX_SCAN_ATTEMPTS,
            retry_delay: crate::SCAN_RETRY_DELAY,
            rebuild_every: 5,
        }
    }
}

/// Orchestrates finding a sender on the local network.
pub struct SenderDiscovery {
    port: u16,
    config: DiscoveryConfig,
    events: EventBus,
    gateway: Option<Box<dyn GatewayLookup>>,
}

impl SenderDiscovery {
    /// Create a discovery session for the given transfer port.
    #[must_use]
    pub fn new(port: u16, config: DiscoveryConfig, events: EventBus) -> Self {
        Self {
            port,
            config,
            events,
            gateway: None,
        }
    }

    /// Attach a platform DHCP-gateway lookup. Optional; lookup failures
    /// are ignored.
    #[must_use]
    pub fn with_gateway_lookup(mut self, gateway: Box<dyn GatewayLookup>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// The tuning this session runs with.
    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Run discovery: mDNS first, subnet scan as fallback.
    ///
    /// Resolves to the sender's address, or `None` once every attempt is
    /// exhausted.
    pub async fn discover(&self) -> Option<Ipv4Addr> {
        if let Some(ip) = self.try_mdns().await {
            return Some(ip);
        }
        self.subnet_scan().await
    }

    #[cfg(feature = "mdns")]
    async fn try_mdns(&self) -> Option<Ipv4Addr> {
        self.events.log("looking for sender via mDNS...");
        match mdns::MdnsResolver::new() {
            Ok(resolver) => {
                let found = resolver.resolve(self.config.mdns_timeout).await;
                if found.is_none() {
                    self.events.log("mDNS lookup timed out, falling back to subnet scan");
                }
                found
            }
            Err(e) => {
                tracing::debug!("mDNS unavailable: {e}");
                self.events.log("mDNS unavailable, using subnet scan");
                None
            }
        }
    }

    #[cfg(not(feature = "mdns"))]
    async fn try_mdns(&self) -> Option<Ipv4Addr> {
        None
    }

    async fn subnet_scan(&self) -> Option<Ipv4Addr> {
        let Some(mut self_ip) = local_ipv4() else {
            self.events.log("no local IPv4 address; cannot scan");
            return None;
        };

        let gateway = self.gateway.as_ref().and_then(|g| g.dhcp_gateway());
        let mut list = candidates::build(self_ip, gateway);
        self.events.log(format!(
            "scanning subnet of {self_ip} ({} candidates)",
            list.len()
        ));

        for attempt in 1..=self.config.max_attempts {
            // The own IP can change mid-scan while the platform joins the
            // peer's group; refresh the list periodically and put any new
            // candidates first.
            if attempt > 1 && attempt % self.config.rebuild_every == 0 {
                if let Some(current) = local_ipv4() {
                    if current != self_ip {
                        self.events
                            .log(format!("own address changed to {current}, rebuilding candidates"));
                        self_ip = current;
                    }
                    let fresh = candidates::build(self_ip, gateway);
                    let new_ones: Vec<Candidate> = fresh
                        .iter()
                        .filter(|c| !list.iter().any(|old| old.ip == c.ip))
                        .copied()
                        .collect();
                    if !new_ones.is_empty() {
                        let mut merged = new_ones;
                        merged.extend(list.iter().copied());
                        list = merged;
                    }
                }
            }

            if let Some(found) = probe::probe_batches(
                &list,
                self.port,
                self.config.probe_timeout,
                self.config.batch_size,
            )
            .await
            {
                self.events.log(format!("found sender at {found}"));
                return Some(found);
            }

            tracing::debug!(attempt, "scan pass found nothing");
            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        self.events
            .log("discovery failed - check that both devices are on the same Wi-Fi");
        None
    }
}

/// Best-effort own-IPv4 lookup via a connected UDP socket.
///
/// No packets are sent; connecting just asks the OS which source address
/// it would route from.
#[must_use]
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:53").ok()?;
    match socket.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(v4) if !v4.is_unspecified() => Some(v4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_scan_finds_loopback_listener() {
        // A listener on loopback plus a candidate list containing it:
        // discovery's scan path must return the address.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let found = probe::probe_batches(
            &[Candidate {
                ip: Ipv4Addr::LOCALHOST,
                source: CandidateSource::GatewayHeuristic,
            }],
            port,
            Duration::from_millis(500),
            5,
        )
        .await;

        assert_eq!(found, Some(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_default_config_matches_constants() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.batch_size, crate::SCAN_BATCH_SIZE);
        assert_eq!(config.max_attempts, crate::MAX_SCAN_ATTEMPTS);
        assert_eq!(config.probe_timeout, crate::PROBE_TIMEOUT);
    }
}
