//! Best-effort TCP reachability probes.
//!
//! A probe opens a connection to one `(ip, port)` and immediately drops
//! it. Probes never error: refusal, timeout, and unreachable hosts all
//! resolve to `false`, which simply means "try the next candidate".

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;

use super::candidates::Candidate;

/// Probe a single address.
///
/// Settles exactly once: the connect attempt and the deadline race inside
/// one `select!`, so a connection completing after the timeout fired is
/// dropped, never double-reported.
pub async fn probe(addr: SocketAddr, timeout: Duration) -> bool {
    tokio::select! {
        result = TcpStream::connect(addr) => result.is_ok(),
        () = tokio::time::sleep(timeout) => false,
    }
}

/// Probe candidates in priority order, `batch_size` at a time.
///
/// Within a batch the probes run concurrently, so a pass over C
/// candidates costs about `ceil(C / batch_size)` probe timeouts rather
/// than C of them. Returns the first candidate (in priority order) whose
/// probe succeeded.
pub async fn probe_batches(
    candidates: &[Candidate],
    port: u16,
    timeout: Duration,
    batch_size: usize,
) -> Option<Ipv4Addr> {
    let batch_size = batch_size.max(1);

    for batch in candidates.chunks(batch_size) {
        let probes = batch
            .iter()
            .map(|c| probe(SocketAddr::new(c.ip.into(), port), timeout));
        let results = futures::future::join_all(probes).await;

        if let Some(index) = results.iter().position(|ok| *ok) {
            return Some(batch[index].ip);
        }
    }

    None
}
