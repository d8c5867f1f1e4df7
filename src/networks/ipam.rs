//! Subnet and IP allocation (spec §4.4)

use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnetwork::Ipv4Network;
use thiserror::Error;

use crate::state::{IpAllocationRow, StateStore};

#[derive(Debug, Error)]
pub enum IpamError {
    #[error("subnet pool exhausted")]
    SubnetExhausted,

    #[error("ip pool exhausted")]
    IpExhausted,

    #[error("ip {0} is reserved")]
    IpReserved(String),

    #[error("ip {0} is outside subnet {1}")]
    IpOutsideSubnet(String, String),

    #[error("ip {0} already allocated")]
    IpAllocated(String),

    #[error("invalid cidr: {0}")]
    InvalidCidr(String),

    #[error(transparent)]
    State(#[from] crate::state::StateError),
}

pub type IpamResult<T> = Result<T, IpamError>;

const ALLOCATOR_BASE: &str = "172.16.0.0/12";
const DEFAULT_BRIDGE_SUBNET: &str = "172.17.0.0/16";

/// Sequential /16 scanner over the allocator base range, skipping the
/// default bridge subnet, informed by the persisted "last assigned" marker
/// so no subnet is reused across restarts.
pub fn allocate_subnet(store: &StateStore) -> IpamResult<Ipv4Network> {
    let base: Ipv4Network = ALLOCATOR_BASE.parse().map_err(|_| IpamError::InvalidCidr(ALLOCATOR_BASE.into()))?;
    let bridge: Ipv4Network = DEFAULT_BRIDGE_SUBNET.parse().unwrap();

    let existing: std::collections::HashSet<String> = store
        .list_networks()?
        .into_iter()
        .map(|n| n.subnet)
        .collect();

    let last_assigned = store.next_subnet_candidate()?;
    let start_octet = last_assigned
        .as_ref()
        .and_then(|s| Ipv4Network::from_str(s).ok())
        .map(|n| third_octet(n) + 1)
        .unwrap_or(18); // first candidate after bridge's .17

    let base_octets = base.ip().octets();

    for third in start_octet..=255u16 {
        let candidate_ip = Ipv4Addr::new(base_octets[0], base_octets[1], third as u8, 0);
        let candidate = Ipv4Network::new(candidate_ip, 16).map_err(|_| IpamError::InvalidCidr(candidate_ip.to_string()))?;

        if !base.contains(candidate.ip()) {
            break;
        }
        if candidate == bridge {
            continue;
        }
        if existing.contains(&candidate.to_string()) {
            continue;
        }

        store.record_subnet_assigned(&candidate.to_string())?;
        return Ok(candidate);
    }

    Err(IpamError::SubnetExhausted)
}

fn third_octet(network: Ipv4Network) -> u16 {
    network.ip().octets()[2] as u16
}

/// Reserved addresses within a subnet: network address, gateway, broadcast.
pub fn reserved_addresses(subnet: Ipv4Network, gateway: Ipv4Addr) -> Vec<Ipv4Addr> {
    vec![subnet.network(), gateway, subnet.broadcast()]
}

/// Allocate the lowest free address in `subnet`, honoring an optional
/// sub-CIDR range restriction, skipping reserved addresses and anything
/// already recorded in `ip_allocations`.
pub fn allocate_ip(
    store: &StateStore,
    network_id: &str,
    subnet: Ipv4Network,
    gateway: Ipv4Addr,
    range: Option<Ipv4Network>,
    requested_ip: Option<Ipv4Addr>,
    owner_container_id: &str,
) -> IpamResult<Ipv4Addr> {
    let reserved = reserved_addresses(subnet, gateway);
    let allocated: std::collections::HashSet<Ipv4Addr> = store
        .list_ip_allocations(network_id)?
        .into_iter()
        .filter_map(|r| r.ip.parse().ok())
        .collect();

    if let Some(ip) = requested_ip {
        if reserved.contains(&ip) {
            return Err(IpamError::IpReserved(ip.to_string()));
        }
        if !subnet.contains(ip) {
            return Err(IpamError::IpOutsideSubnet(ip.to_string(), subnet.to_string()));
        }
        if allocated.contains(&ip) {
            return Err(IpamError::IpAllocated(ip.to_string()));
        }
        store.insert_ip_allocation(&IpAllocationRow {
            network_id: network_id.to_string(),
            ip: ip.to_string(),
            owner_container_id: owner_container_id.to_string(),
        })?;
        return Ok(ip);
    }

    let scan_range = range.unwrap_or(subnet);
    for ip in scan_range.iter() {
        if reserved.contains(&ip) || allocated.contains(&ip) {
            continue;
        }
        if !subnet.contains(ip) {
            continue;
        }
        store.insert_ip_allocation(&IpAllocationRow {
            network_id: network_id.to_string(),
            ip: ip.to_string(),
            owner_container_id: owner_container_id.to_string(),
        })?;
        return Ok(ip);
    }

    Err(IpamError::IpExhausted)
}

pub fn release_ip(store: &StateStore, network_id: &str, ip: Ipv4Addr) -> IpamResult<()> {
    store.release_ip_allocation(network_id, &ip.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_subnet_skips_default_bridge() {
        let store = StateStore::open_in_memory().unwrap();
        let subnet = allocate_subnet(&store).unwrap();
        assert_eq!(subnet.to_string(), "172.18.0.0/16");
    }

    #[test]
    fn sequential_allocation_avoids_reuse() {
        let store = StateStore::open_in_memory().unwrap();
        let first = allocate_subnet(&store).unwrap();
        let second = allocate_subnet(&store).unwrap();
        assert_ne!(first, second);
        assert_eq!(second.to_string(), "172.19.0.0/16");
    }

    #[test]
    fn allocate_ip_skips_network_gateway_broadcast() {
        let store = StateStore::open_in_memory().unwrap();
        let subnet: Ipv4Network = "172.18.0.0/16".parse().unwrap();
        let gateway: Ipv4Addr = "172.18.0.1".parse().unwrap();
        let ip = allocate_ip(&store, "net1", subnet, gateway, None, None, "c1").unwrap();
        assert_eq!(ip, Ipv4Addr::new(172, 18, 0, 2));
    }

    #[test]
    fn released_ip_is_reclaimed_next() {
        let store = StateStore::open_in_memory().unwrap();
        let subnet: Ipv4Network = "172.18.0.0/16".parse().unwrap();
        let gateway: Ipv4Addr = "172.18.0.1".parse().unwrap();
        let ip1 = allocate_ip(&store, "net1", subnet, gateway, None, None, "c1").unwrap();
        let _ip2 = allocate_ip(&store, "net1", subnet, gateway, None, None, "c2").unwrap();
        release_ip(&store, "net1", ip1).unwrap();
        let ip3 = allocate_ip(&store, "net1", subnet, gateway, None, None, "c3").unwrap();
        assert_eq!(ip3, ip1);
    }
}
