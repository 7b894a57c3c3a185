//! Platform capability interfaces.
//!
//! Group creation (Wi-Fi Direct, hotspot) and DHCP gateway lookup live in
//! platform code outside this crate. The engine consumes them only through
//! these narrow traits, so the library stays testable on any desktop.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A created local network group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalGroup {
    /// Network name to join
    pub ssid: String,
    /// Passphrase for the network
    pub passphrase: String,
    /// Address of the group owner (the device that created the group)
    pub owner_ip: Ipv4Addr,
    /// MAC address of the peer, when the platform reports it
    pub peer_mac: Option<String>,
}

/// Creates a local network group (Wi-Fi Direct group or hotspot).
///
/// This is the only setup-phase capability allowed to fail loudly: a
/// refused platform permission surfaces as
/// [`Error::PermissionDenied`](crate::Error::PermissionDenied) and is
/// shown to the user with a retry affordance, never retried silently.
pub trait GroupProvider: Send + Sync {
    /// Create a group and return its join parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses (permissions, radio off).
    fn create_group(&self) -> Result<LocalGroup>;

    /// Tear the group down. Best effort.
    fn remove_group(&self);
}

/// Reports the DHCP gateway, when the platform exposes one.
///
/// Purely advisory: a `None` simply leaves the gateway out of the
/// candidate list.
pub trait GatewayLookup: Send + Sync {
    /// The current DHCP gateway address, if known.
    fn dhcp_gateway(&self) -> Option<Ipv4Addr>;
}

/// A fixed gateway, useful for tests and manual configuration.
#[derive(Debug, Clone, Copy)]
pub struct StaticGateway(pub Ipv4Addr);

impl GatewayLookup for StaticGateway {
    fn dhcp_gateway(&self) -> Option<Ipv4Addr> {
        Some(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_gateway() {
        let gw = StaticGateway(Ipv4Addr::new(192, 168, 43, 1));
        assert_eq!(gw.dhcp_gateway(), Some(Ipv4Addr::new(192, 168, 43, 1)));
    }

    #[test]
    fn test_local_group_serializes() {
        let group = LocalGroup {
            ssid: "DIRECT-ab-Fling".to_string(),
            passphrase: "s3cret".to_string(),
            owner_ip: Ipv4Addr::new(192, 168, 49, 1),
            peer_mac: None,
        };
        let json = serde_json::to_string(&group).unwrap();
        assert!(json.contains("DIRECT-ab-Fling"));
    }
}
