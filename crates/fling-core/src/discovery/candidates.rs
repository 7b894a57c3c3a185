//! Prioritized peer address candidates for the subnet scan.
//!
//! Mobile hotspot and Wi-Fi Direct stacks hand out predictable addresses,
//! so the scan probes likely gateways and near neighbours before sweeping
//! the rest of the /24. The ordering here is a deliberate
//! probability-ordered heuristic, not a guess.

use std::net::Ipv4Addr;

/// Where a candidate address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    /// Resolved via mDNS
    Mdns,
    /// A well-known mobile-stack gateway or the subnet's `.1`
    GatewayHeuristic,
    /// A host near (or elsewhere in) our own /24
    SubnetNeighbour,
}

/// One address worth probing, tagged with its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// The address to probe
    pub ip: Ipv4Addr,
    /// How it was derived
    pub source: CandidateSource,
}

/// Gateways conventionally used by mobile group-owner stacks: Wi-Fi
/// Direct group owners, Android hotspots, iOS personal hotspots.
pub const FIXED_GATEWAYS: [Ipv4Addr; 3] = [
    Ipv4Addr::new(192, 168, 49, 1),
    Ipv4Addr::new(192, 168, 43, 1),
    Ipv4Addr::new(172, 20, 10, 1),
];

/// How far either side of our own last octet counts as a "near neighbour".
const NEIGHBOUR_SPAN: u8 = 10;

/// Build the prioritized, deduplicated candidate list.
///
/// Order: fixed mobile-stack gateways, the subnet's `.1`, the DHCP
/// gateway when the platform reports one, neighbours within ±10 of our
/// own last octet (ascending delta), then the remaining `.2`-`.254` of
/// the /24 in ascending order. Our own address is never included.
#[must_use]
pub fn build(self_ip: Ipv4Addr, dhcp_gateway: Option<Ipv4Addr>) -> Vec<Candidate> {
    let octets = self_ip.octets();
    let subnet = [octets[0], octets[1], octets[2]];
    let self_last = octets[3];
    let in_subnet = |last: u8| Ipv4Addr::new(subnet[0], subnet[1], subnet[2], last);

    let mut out: Vec<Candidate> = Vec::with_capacity(270);
    let mut push = |ip: Ipv4Addr, source: CandidateSource| {
        if ip != self_ip && !out.iter().any(|c| c.ip == ip) {
            out.push(Candidate { ip, source });
        }
    };

    for gw in FIXED_GATEWAYS {
        push(gw, CandidateSource::GatewayHeuristic);
    }

    push(in_subnet(1), CandidateSource::GatewayHeuristic);

    if let Some(gw) = dhcp_gateway {
        push(gw, CandidateSource::GatewayHeuristic);
    }

    for delta in 1..=NEIGHBOUR_SPAN {
        if let Some(above) = self_last.checked_add(delta) {
            if above <= 254 {
                push(in_subnet(above), CandidateSource::SubnetNeighbour);
            }
        }
        if let Some(below) = self_last.checked_sub(delta) {
            if below >= 1 {
                push(in_subnet(below), CandidateSource::SubnetNeighbour);
            }
        }
    }

    for last in 2..=254 {
        push(in_subnet(last), CandidateSource::SubnetNeighbour);
    }

    out
}
