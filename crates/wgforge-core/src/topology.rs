//! Peer Topology
//!
//! Builds the peer graph of one generation: hub-and-spoke (the hub sees
//! every client, each client sees the hub) or full mesh (every site sees
//! every other site). Key pairs are resolved before building; pre-shared
//! keys are assigned once per relationship and handed to both sides.
//!
//! Construction is all-or-nothing: any planning or key error aborts the
//! build and no partial [`Topology`] is returned.

use crate::address::{self, AddressBlock};
use crate::config::{Endpoint, GenerateRequest, TopologyMode};
use crate::error::{Error, Result};
use crate::keyring::{KeyRing, PskPolicy, PskTable};
use crate::keys::{KeyPair, PresharedKey, PublicKey};
use ipnet::IpNet;
use std::net::IpAddr;
use tracing::debug;

/// Central participant of a client-server topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hub {
    pub name: String,
    pub keys: KeyPair,
    /// Hub host address with the planned prefix
    pub address: AddressBlock,
    /// Masked hub network
    pub network: AddressBlock,
    pub listen_port: u16,
    /// Public endpoint clients dial
    pub endpoint: Endpoint,
}

/// Leaf participant of a client-server topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spoke {
    pub name: String,
    pub keys: KeyPair,
    pub address: AddressBlock,
    pub dns: Vec<String>,
    /// Prefixes routed through the tunnel to the hub
    pub allowed_ips: Vec<IpNet>,
    pub hub_endpoint: Endpoint,
    pub keepalive: Option<u16>,
}

/// Gateway of one site in a full mesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshSite {
    pub name: String,
    pub keys: KeyPair,
    /// 1-based position in the site list
    pub index: usize,
    /// Point address on the transfer network
    pub address: AddressBlock,
    pub listen_port: u16,
    /// The site's LAN, masked
    pub local_network: AddressBlock,
    pub public_endpoint: Endpoint,
}

/// A participant of a topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Participant {
    Hub(Hub),
    Spoke(Spoke),
    MeshSite(MeshSite),
}

impl Participant {
    pub fn name(&self) -> &str {
        match self {
            Participant::Hub(h) => &h.name,
            Participant::Spoke(s) => &s.name,
            Participant::MeshSite(m) => &m.name,
        }
    }

    pub fn keys(&self) -> &KeyPair {
        match self {
            Participant::Hub(h) => &h.keys,
            Participant::Spoke(s) => &s.keys,
            Participant::MeshSite(m) => &m.keys,
        }
    }

    /// Interface address with prefix
    pub fn address(&self) -> AddressBlock {
        match self {
            Participant::Hub(h) => h.address,
            Participant::Spoke(s) => s.address,
            Participant::MeshSite(m) => m.address,
        }
    }

    /// Listen port (hub and mesh sites only)
    pub fn listen_port(&self) -> Option<u16> {
        match self {
            Participant::Hub(h) => Some(h.listen_port),
            Participant::Spoke(_) => None,
            Participant::MeshSite(m) => Some(m.listen_port),
        }
    }

    /// DNS servers (spokes only)
    pub fn dns(&self) -> &[String] {
        match self {
            Participant::Spoke(s) => &s.dns,
            _ => &[],
        }
    }
}

/// One side's record of a relationship with a remote participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peering {
    pub remote_name: String,
    pub remote_public_key: PublicKey,
    pub allowed_ips: Vec<IpNet>,
    pub preshared_key: Option<PresharedKey>,
    pub endpoint: Option<Endpoint>,
    pub keepalive: Option<u16>,
}

/// A participant together with its peerings, in build order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub participant: Participant,
    pub peerings: Vec<Peering>,
}

impl Member {
    fn new(participant: Participant) -> Self {
        Self {
            participant,
            peerings: Vec::new(),
        }
    }
}

/// A complete peer graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    ClientServer {
        hub: Member,
        spokes: Vec<Member>,
    },
    SiteToSite {
        transfer_network: AddressBlock,
        sites: Vec<Member>,
    },
}

impl Topology {
    pub fn mode(&self) -> TopologyMode {
        match self {
            Topology::ClientServer { .. } => TopologyMode::ClientServer,
            Topology::SiteToSite { .. } => TopologyMode::SiteToSite,
        }
    }

    /// All members, hub first
    pub fn members(&self) -> Vec<&Member> {
        match self {
            Topology::ClientServer { hub, spokes } => {
                std::iter::once(hub).chain(spokes.iter()).collect()
            }
            Topology::SiteToSite { sites, .. } => sites.iter().collect(),
        }
    }

    /// Total number of directed peerings
    pub fn peering_count(&self) -> usize {
        self.members().iter().map(|m| m.peerings.len()).sum()
    }
}

/// Parse a comma separated prefix list; bare addresses become host routes
pub fn parse_allowed_ips(text: &str) -> Result<Vec<IpNet>> {
    let nets = text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpNet>()
                .or_else(|_| s.parse::<IpAddr>().map(IpNet::from))
                .map_err(|_| Error::InvalidAddressBlock(format!("'{}' is not a CIDR", s)))
        })
        .collect::<Result<Vec<_>>>()?;

    if nets.is_empty() {
        return Err(Error::InvalidAddressBlock("allowed IPs list is empty".to_string()));
    }
    Ok(nets)
}

fn keepalive(seconds: u16) -> Option<u16> {
    (seconds > 0).then_some(seconds)
}

/// Build the hub-and-spoke peer graph
///
/// `spoke_keys` holds one resolved key pair per client, in client order.
pub fn build_client_server(
    request: &GenerateRequest,
    hub_keys: KeyPair,
    spoke_keys: Vec<KeyPair>,
    ring: &KeyRing,
) -> Result<Topology> {
    let options = &request.options;
    let clients = &request.clients;
    let policy = PskPolicy {
        enabled: options.enable_psk,
        individual: options.individual_psk,
    };

    if spoke_keys.len() != clients.spoke_count() {
        return Err(Error::TopologyPrecondition(format!(
            "{} client key pairs for {} clients",
            spoke_keys.len(),
            clients.spoke_count()
        )));
    }

    let declared: AddressBlock = request.server.address.parse()?;
    let plan = address::plan_hub_and_spoke(declared, spoke_keys.len(), options.max_prefix_growth)?;

    let hub_endpoint = Endpoint::new(request.server.endpoint.trim(), request.server.listen_port);
    let hub = Hub {
        name: request.server.name.trim().to_string(),
        keys: hub_keys,
        address: plan.hub_interface(),
        network: plan.hub_network,
        listen_port: request.server.listen_port,
        endpoint: hub_endpoint.clone(),
    };

    let default_allowed = parse_allowed_ips(&clients.allowed_ips)?;
    let split_tunnel = vec![AddressBlock::host(plan.hub_address).to_ip_net()];

    let mut hub_member = Member::new(Participant::Hub(hub.clone()));
    let mut spokes = Vec::with_capacity(spoke_keys.len());

    for (i, keys) in spoke_keys.into_iter().enumerate() {
        let entry = clients.entry(i);
        let name = clients.name_of(i);
        let address = plan.spoke_interface(i).ok_or_else(|| {
            Error::InsufficientAddressSpace(format!("no address planned for {}", name))
        })?;

        let allowed_ips = if options.no_routing_table {
            split_tunnel.clone()
        } else {
            match entry.and_then(|e| e.allowed_ips.as_deref()) {
                Some(text) if !text.trim().is_empty() => parse_allowed_ips(text)?,
                _ => default_allowed.clone(),
            }
        };
        let dns = entry
            .and_then(|e| e.dns.clone())
            .unwrap_or_else(|| clients.dns.clone());

        let psk = policy.assign(ring, entry.and_then(|e| e.preshared_key.as_deref()))?;

        hub_member.peerings.push(Peering {
            remote_name: name.clone(),
            remote_public_key: keys.public.clone(),
            allowed_ips: vec![AddressBlock::host(address.addr()).to_ip_net()],
            preshared_key: psk.clone(),
            endpoint: None,
            keepalive: None,
        });

        let spoke = Spoke {
            name,
            keys,
            address,
            dns,
            allowed_ips: allowed_ips.clone(),
            hub_endpoint: hub_endpoint.clone(),
            keepalive: keepalive(options.keepalive),
        };
        let mut member = Member::new(Participant::Spoke(spoke));
        member.peerings.push(Peering {
            remote_name: hub.name.clone(),
            remote_public_key: hub.keys.public.clone(),
            allowed_ips,
            preshared_key: psk,
            endpoint: Some(hub_endpoint.clone()),
            keepalive: keepalive(options.keepalive),
        });
        spokes.push(member);
    }

    debug!("Built client-server topology with {} clients", spokes.len());

    Ok(Topology::ClientServer {
        hub: hub_member,
        spokes,
    })
}

/// Build the full-mesh peer graph
///
/// `site_keys` holds one resolved key pair per site, in site order.
pub fn build_site_to_site(
    request: &GenerateRequest,
    site_keys: Vec<KeyPair>,
    ring: &KeyRing,
) -> Result<Topology> {
    let options = &request.options;
    let params = &request.sites;
    let policy = PskPolicy {
        enabled: options.enable_psk,
        individual: false,
    };

    if site_keys.len() < 2 {
        return Err(Error::TopologyPrecondition(format!(
            "a mesh needs at least two sites, got {}",
            site_keys.len()
        )));
    }
    if site_keys.len() != params.list.len() {
        return Err(Error::TopologyPrecondition(format!(
            "{} site key pairs for {} sites",
            site_keys.len(),
            params.list.len()
        )));
    }

    let transfer_network: AddressBlock = params.transfer_network.parse()?;

    let sites = site_keys
        .into_iter()
        .enumerate()
        .map(|(i, keys)| {
            let entry = &params.list[i];
            let listen_port = params.listen_port_of(i).ok_or_else(|| {
                Error::InvalidParameter(format!("{} has no usable listen port", params.name_of(i)))
            })?;
            let local_network: AddressBlock = params.local_network_of(i).parse()?;
            Ok(MeshSite {
                name: params.name_of(i),
                keys,
                index: i + 1,
                address: address::plan_transfer_address(transfer_network, i + 1)?,
                listen_port,
                local_network: local_network.masked(),
                public_endpoint: Endpoint::new(entry.dial_host(), listen_port),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut psks = PskTable::default();
    for a in 0..sites.len() {
        for b in (a + 1)..sites.len() {
            if let Some(psk) = policy.assign(ring, None)? {
                psks.insert(a, b, psk);
            }
        }
    }

    let members = sites
        .iter()
        .enumerate()
        .map(|(a, site)| {
            let peerings = sites
                .iter()
                .enumerate()
                .filter(|(b, _)| *b != a)
                .map(|(b, remote)| Peering {
                    remote_name: remote.name.clone(),
                    remote_public_key: remote.keys.public.clone(),
                    allowed_ips: vec![
                        remote.local_network.to_ip_net(),
                        AddressBlock::host(remote.address.addr()).to_ip_net(),
                    ],
                    preshared_key: psks.get(a, b).cloned(),
                    endpoint: Some(remote.public_endpoint.clone()),
                    keepalive: keepalive(options.keepalive),
                })
                .collect();
            Member {
                participant: Participant::MeshSite(site.clone()),
                peerings,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        "Built site-to-site topology with {} sites, {} shared keys",
        members.len(),
        psks.len()
    );

    Ok(Topology::SiteToSite {
        transfer_network,
        sites: members,
    })
}
