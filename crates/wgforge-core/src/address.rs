//! Address Planning
//!
//! Partitions an address block into a hub network plus per-spoke host
//! addresses, and places mesh sites on a shared transfer network.
//!
//! All arithmetic is done on the 32-bit integer form of the address, so
//! an offset past `.255` carries into the next octet to the left.

use crate::error::{Error, Result};
use ipnet::{IpNet, Ipv4Net};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::debug;

/// IPv4 address with prefix length, host bits preserved
///
/// `10.0.0.1/24` keeps `10.0.0.1` as its address; use [`AddressBlock::network`]
/// for the masked base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressBlock {
    net: Ipv4Net,
}

impl AddressBlock {
    /// Create from address and prefix length (0..=32)
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        Ipv4Net::new(addr, prefix_len)
            .map(|net| Self { net })
            .map_err(|_| Error::InvalidAddressBlock(format!("{}/{}", addr, prefix_len)))
    }

    /// A single host (`/32`)
    pub fn host(addr: Ipv4Addr) -> Self {
        Self { net: Ipv4Net::from(addr) }
    }

    /// The address as supplied
    pub fn addr(&self) -> Ipv4Addr {
        self.net.addr()
    }

    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    /// Masked base address
    pub fn network(&self) -> Ipv4Addr {
        self.net.network()
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.net.broadcast()
    }

    /// The same block with host bits cleared
    pub fn masked(&self) -> Self {
        Self { net: self.net.trunc() }
    }

    /// Whether `addr` lies inside the masked block
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.net.contains(&addr)
    }

    /// As a generic network for allowed-IP lists
    pub fn to_ip_net(&self) -> IpNet {
        IpNet::V4(self.net)
    }
}

impl fmt::Display for AddressBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.net)
    }
}

impl FromStr for AddressBlock {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        trimmed
            .parse::<Ipv4Net>()
            .map(|net| Self { net })
            .map_err(|_| Error::InvalidAddressBlock(format!("'{}' is not an IPv4 CIDR", trimmed)))
    }
}

/// Add `offset` to `base` with carry across octets
///
/// Returns `None` past `255.255.255.255`.
pub fn offset_address(base: Ipv4Addr, offset: u32) -> Option<Ipv4Addr> {
    u32::from(base).checked_add(offset).map(Ipv4Addr::from)
}

/// Number of bits needed to count `n` values
fn ceil_log2(n: u64) -> u32 {
    if n <= 1 { 0 } else { 64 - (n - 1).leading_zeros() }
}

/// Result of hub-and-spoke planning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubPlan {
    /// Hub host address as supplied by the operator
    pub hub_address: Ipv4Addr,
    /// Masked hub network with the planned prefix
    pub hub_network: AddressBlock,
    /// One address per spoke, in spoke order
    pub spoke_addresses: Vec<Ipv4Addr>,
}

impl HubPlan {
    pub fn prefix_len(&self) -> u8 {
        self.hub_network.prefix_len()
    }

    /// Hub interface address with the planned prefix
    pub fn hub_interface(&self) -> AddressBlock {
        AddressBlock { net: Ipv4Net::new(self.hub_address, self.prefix_len()).unwrap_or(self.hub_network.net) }
    }

    /// Interface address of spoke `index` with the planned prefix
    pub fn spoke_interface(&self, index: usize) -> Option<AddressBlock> {
        let addr = *self.spoke_addresses.get(index)?;
        Ipv4Net::new(addr, self.prefix_len()).ok().map(|net| AddressBlock { net })
    }
}

/// Plan the hub network and spoke addresses
///
/// The host range is sized with `ceil(log2(spoke_count + 2))` bits but never
/// below the declared prefix. Spokes sit at hub + 2, hub + 3, ... and the
/// prefix keeps widening until the last spoke is inside the network and
/// below its broadcast address. `max_growth` caps how many bits the prefix
/// may widen past the declared one.
pub fn plan_hub_and_spoke(
    hub: AddressBlock,
    spoke_count: usize,
    max_growth: Option<u8>,
) -> Result<HubPlan> {
    if spoke_count == 0 {
        return Err(Error::TopologyPrecondition(
            "at least one client is required".to_string(),
        ));
    }

    let declared_host_bits = 32 - u32::from(hub.prefix_len());
    let required_bits = ceil_log2(spoke_count as u64 + 2);
    let mut host_bits = required_bits.max(declared_host_bits);

    let spoke_addresses = (0..spoke_count)
        .map(|i| {
            u32::try_from(i + 2)
                .ok()
                .and_then(|offset| offset_address(hub.addr(), offset))
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| {
            Error::InsufficientAddressSpace(format!(
                "{} clients after {} overflow the IPv4 range",
                spoke_count,
                hub.addr()
            ))
        })?;

    // spoke_count >= 1, so there is a last address
    let last = spoke_addresses[spoke_addresses.len() - 1];

    let network = loop {
        if host_bits > 32 {
            return Err(Error::InsufficientAddressSpace(format!(
                "no prefix around {} fits {} clients",
                hub.addr(),
                spoke_count
            )));
        }

        let candidate = AddressBlock::new(hub.addr(), (32 - host_bits) as u8)?.masked();
        let below_broadcast = host_bits <= 1 || last < candidate.broadcast();
        if candidate.contains(last) && below_broadcast {
            break candidate;
        }
        host_bits += 1;
    };

    let growth = host_bits.saturating_sub(declared_host_bits);
    if let Some(max) = max_growth {
        if growth > u32::from(max) {
            return Err(Error::InsufficientAddressSpace(format!(
                "{} clients need /{}, policy allows at most /{}",
                spoke_count,
                network.prefix_len(),
                hub.prefix_len().saturating_sub(max)
            )));
        }
    }

    debug!(
        "Planned hub network {} for {} clients (declared /{})",
        network,
        spoke_count,
        hub.prefix_len()
    );

    Ok(HubPlan {
        hub_address: hub.addr(),
        hub_network: network,
        spoke_addresses,
    })
}

/// Address of site `site_index` (1-based) on the transfer network
///
/// The site sits at the supplied base address + `site_index`, keeping the
/// transfer block's prefix.
pub fn plan_transfer_address(transfer: AddressBlock, site_index: usize) -> Result<AddressBlock> {
    if site_index == 0 {
        return Err(Error::InvalidParameter(
            "site indices on the transfer network start at 1".to_string(),
        ));
    }

    let exhausted = || {
        Error::InsufficientAddressSpace(format!(
            "transfer network {} has no room for site {}",
            transfer, site_index
        ))
    };

    let offset = u32::try_from(site_index).map_err(|_| exhausted())?;
    let addr = offset_address(transfer.addr(), offset).ok_or_else(exhausted)?;

    let usable = if transfer.prefix_len() >= 31 {
        transfer.contains(addr)
    } else {
        transfer.contains(addr) && addr < transfer.broadcast()
    };
    if !usable {
        return Err(exhausted());
    }

    AddressBlock::new(addr, transfer.prefix_len())
}
