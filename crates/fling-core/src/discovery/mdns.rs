//! mDNS/DNS-SD advertisement and lookup.
//!
//! The sender registers `_fling._tcp.local.` with TXT records describing
//! the share; the receiver browses for the same type and takes the first
//! usable IPv4 address. mDNS is the fast path - when it is unavailable or
//! blocked, discovery silently degrades to the subnet scan.

use std::net::Ipv4Addr;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};

use crate::error::{Error, Result};

/// mDNS service type for Fling.
pub const SERVICE_TYPE: &str = "_fling._tcp.local.";

/// TXT record keys for service properties.
pub mod txt_keys {
    /// Device name key
    pub const DEVICE_NAME: &str = "device_name";
    /// Protocol version key
    pub const VERSION: &str = "version";
    /// Number of files offered
    pub const FILE_COUNT: &str = "file_count";
}

/// Pick the first address usable for a direct connection.
///
/// Loopback, link-local, and `INADDR_ANY` entries are artifacts of the
/// responder's interface enumeration, not reachable peer addresses.
fn usable_ipv4(info: &ServiceInfo) -> Option<Ipv4Addr> {
    info.get_addresses().iter().find_map(|addr| match addr {
        std::net::IpAddr::V4(v4)
            if !v4.is_loopback() && !v4.is_link_local() && !v4.is_unspecified() =>
        {
            Some(*v4)
        }
        _ => None,
    })
}

/// Advertises the local sender via mDNS.
pub struct MdnsPublisher {
    daemon: Option<ServiceDaemon>,
    instance_name: Option<String>,
}

impl MdnsPublisher {
    /// Create a new publisher.
    ///
    /// # Errors
    ///
    /// Returns an error if the mDNS daemon cannot be created; callers
    /// treat that as "no mDNS on this platform" and continue.
    pub fn new() -> Result<Self> {
        let daemon =
            ServiceDaemon::new().map_err(|e| Error::Internal(format!("mDNS daemon error: {e}")))?;
        Ok(Self {
            daemon: Some(daemon),
            instance_name: None,
        })
    }

    /// Register the sender on the local network.
    ///
    /// Idempotent: a second publish first unregisters the previous
    /// instance.
    ///
    /// # Errors
    ///
    /// Returns an error if registration fails.
    pub fn publish(&mut self, device_name: &str, port: u16, file_count: usize) -> Result<()> {
        if self.instance_name.is_some() {
            self.unpublish();
        }

        let instance_name = format!("Fling-{device_name}");

        let raw_hostname = hostname::get().map_or_else(
            |_| "localhost".to_string(),
            |h| h.to_string_lossy().to_string(),
        );
        let host = if raw_hostname.to_lowercase().ends_with(".local.") {
            raw_hostname
        } else {
            format!("{raw_hostname}.local.")
        };

        let txt = [
            (txt_keys::DEVICE_NAME, device_name.to_string()),
            (txt_keys::VERSION, crate::VERSION.to_string()),
            (txt_keys::FILE_COUNT, file_count.to_string()),
        ];

        let service_info = ServiceInfo::new(SERVICE_TYPE, &instance_name, &host, (), port, &txt[..])
            .map_err(|e| Error::Internal(format!("failed to create mDNS service info: {e}")))?;

        self.daemon
            .as_ref()
            .ok_or_else(|| Error::Internal("mDNS daemon already shut down".to_string()))?
            .register(service_info)
            .map_err(|e| Error::Internal(format!("failed to register mDNS service: {e}")))?;

        tracing::info!(instance = %instance_name, port, "registered mDNS service");
        self.instance_name = Some(instance_name);

        Ok(())
    }

    /// Unregister the current instance, if any. Failures are logged and
    /// swallowed: an unreachable daemon means nothing is advertised
    /// anyway.
    pub fn unpublish(&mut self) {
        let Some(instance_name) = self.instance_name.take() else {
            return;
        };
        let Some(daemon) = self.daemon.as_ref() else {
            return;
        };

        let full_name = format!("{instance_name}.{SERVICE_TYPE}");
        match daemon.unregister(&full_name) {
            Ok(receiver) => {
                match receiver.recv_timeout(Duration::from_millis(500)) {
                    Ok(status) => {
                        tracing::debug!(instance = %instance_name, ?status, "mDNS unregister completed");
                    }
                    Err(_) => {
                        tracing::debug!(instance = %instance_name, "mDNS unregister timed out");
                    }
                }
            }
            Err(e) => {
                tracing::debug!(instance = %instance_name, "mDNS unregister failed: {e}");
            }
        }
    }

    /// Shut down the publisher's daemon.
    pub fn shutdown(mut self) {
        self.unpublish();
        if let Some(daemon) = self.daemon.take() {
            if let Ok(receiver) = daemon.shutdown() {
                let _ = receiver.recv_timeout(Duration::from_millis(500));
            }
        }
    }
}

impl Drop for MdnsPublisher {
    fn drop(&mut self) {
        self.unpublish();
        if let Some(daemon) = self.daemon.take() {
            match daemon.shutdown() {
                Ok(receiver) => {
                    let _ = receiver.recv_timeout(Duration::from_millis(500));
                }
                Err(e) => {
                    tracing::debug!("mDNS publisher shutdown during drop: {e}");
                }
            }
        }
    }
}

/// Browses for an advertised sender.
pub struct MdnsResolver {
    daemon: Option<ServiceDaemon>,
    receiver: flume::Receiver<ServiceEvent>,
}

impl MdnsResolver {
    /// Create a resolver and start browsing.
    ///
    /// # Errors
    ///
    /// Returns an error if the mDNS daemon cannot be created.
    pub fn new() -> Result<Self> {
        let daemon =
            ServiceDaemon::new().map_err(|e| Error::Internal(format!("mDNS daemon error: {e}")))?;
        let receiver = daemon
            .browse(SERVICE_TYPE)
            .map_err(|e| Error::Internal(format!("failed to browse mDNS services: {e}")))?;
        Ok(Self {
            daemon: Some(daemon),
            receiver,
        })
    }

    /// Wait for the first resolved sender address.
    ///
    /// Resolves to `None` on timeout. The browse session is torn down on
    /// both paths; no listeners survive this call.
    pub async fn resolve(mut self, timeout: Duration) -> Option<Ipv4Addr> {
        let deadline = tokio::time::Instant::now() + timeout;

        let found = loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break None;
            }

            match tokio::time::timeout(remaining, self.receiver.recv_async()).await {
                Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                    if let Some(ip) = usable_ipv4(&info) {
                        tracing::info!(%ip, "found sender via mDNS");
                        break Some(ip);
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(_)) | Err(_) => break None,
            }
        };

        self.teardown();
        found
    }

    fn teardown(&mut self) {
        if let Some(daemon) = self.daemon.take() {
            if let Err(e) = daemon.stop_browse(SERVICE_TYPE) {
                tracing::debug!("failed to stop mDNS browse: {e}");
            }
            match daemon.shutdown() {
                Ok(receiver) => {
                    let _ = receiver.recv_timeout(Duration::from_millis(500));
                }
                Err(e) => {
                    tracing::debug!("mDNS resolver shutdown: {e}");
                }
            }
        }
    }
}

impl Drop for MdnsResolver {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_format() {
        assert!(SERVICE_TYPE.starts_with("_fling._tcp"));
        assert!(SERVICE_TYPE.ends_with(".local."));
    }
}
