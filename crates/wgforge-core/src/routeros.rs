//! RouterOS Script Rendering
//!
//! Renders members as RouterOS command scripts: interface, address, one
//! peer line per peering, then optional firewall, NAT and mesh routes.
//! Scripts start by removing an interface of the same name so they can be
//! re-imported.

use crate::render::{RenderOptions, single_line};
use crate::topology::{Member, Participant, Topology};
use std::fmt::{self, Display};

/// Quote a RouterOS string value
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' | '$' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Interface name a member uses on its router
///
/// Mesh sites get `<name>-<index>` so several site scripts never collide.
pub fn interface_name(participant: &Participant, options: &RenderOptions) -> String {
    match participant {
        Participant::MeshSite(site) => format!("{}-{}", options.interface_name, site.index),
        _ => options.interface_name.clone(),
    }
}

/// RouterOS script of one member, rendered through [`Display`]
pub struct VendorScript<'a> {
    member: &'a Member,
    /// Remote sites for mesh routes; empty outside a mesh
    mesh: &'a [Member],
    options: &'a RenderOptions,
}

impl<'a> VendorScript<'a> {
    pub fn new(member: &'a Member, mesh: &'a [Member], options: &'a RenderOptions) -> Self {
        Self { member, mesh, options }
    }

    fn write_interface(&self, f: &mut fmt::Formatter<'_>, iface: &str) -> fmt::Result {
        let participant = &self.member.participant;

        writeln!(f, "# {}", single_line(participant.name()))?;
        writeln!(f, "/interface wireguard remove [find name={}]", quote(iface))?;
        write!(f, "/interface wireguard add name={}", iface)?;
        if let Some(port) = participant.listen_port() {
            write!(f, " listen-port={}", port)?;
        }
        if let Some(mtu) = self.options.custom_mtu() {
            write!(f, " mtu={}", mtu)?;
        }
        writeln!(f, " private-key={}", quote(&participant.keys().private.to_base64()))?;
        writeln!(f, "/ip address add address={} interface={}", participant.address(), iface)?;
        Ok(())
    }

    fn write_peers(&self, f: &mut fmt::Formatter<'_>, iface: &str) -> fmt::Result {
        for peer in &self.member.peerings {
            write!(
                f,
                "/interface wireguard peers add interface={} public-key={}",
                iface,
                quote(&peer.remote_public_key.to_base64())
            )?;
            if let Some(psk) = &peer.preshared_key {
                write!(f, " preshared-key={}", quote(&psk.to_base64()))?;
            }
            let allowed = peer
                .allowed_ips
                .iter()
                .map(|net| net.to_string())
                .collect::<Vec<_>>()
                .join(",");
            write!(f, " allowed-address={}", allowed)?;
            if let Some(endpoint) = &peer.endpoint {
                write!(
                    f,
                    " endpoint-address={} endpoint-port={}",
                    endpoint.host, endpoint.port
                )?;
            }
            if let Some(keepalive) = peer.keepalive.filter(|k| *k > 0) {
                write!(f, " persistent-keepalive={}s", keepalive)?;
            }
            writeln!(f, " comment={}", quote(&peer.remote_name))?;
        }
        Ok(())
    }

    fn write_firewall(&self, f: &mut fmt::Formatter<'_>, iface: &str) -> fmt::Result {
        let (port, trusted) = match &self.member.participant {
            Participant::Hub(hub) => (hub.listen_port, hub.network),
            Participant::MeshSite(site) => (site.listen_port, site.address.masked()),
            Participant::Spoke(_) => return Ok(()),
        };
        let label = quote(&format!("WireGuard {}", self.member.participant.name()));

        writeln!(
            f,
            "/ip firewall filter add chain=input action=accept protocol=udp dst-port={} comment={}",
            port, label
        )?;
        writeln!(f, "/interface list member add list=LAN interface={}", iface)?;
        writeln!(
            f,
            "/ip firewall filter add chain=input action=accept src-address={} comment={}",
            trusted, label
        )?;

        if let Participant::MeshSite(site) = &self.member.participant {
            writeln!(
                f,
                "/ip firewall filter add chain=forward action=accept in-interface={} dst-address={} comment={}",
                iface, site.local_network, label
            )?;
            writeln!(
                f,
                "/ip firewall filter add chain=forward action=accept out-interface={} src-address={} comment={}",
                iface, site.local_network, label
            )?;
        }
        Ok(())
    }

    fn write_nat(&self, f: &mut fmt::Formatter<'_>, iface: &str) -> fmt::Result {
        let label = quote(&format!("WireGuard NAT {}", self.member.participant.name()));
        match &self.member.participant {
            Participant::Hub(hub) => writeln!(
                f,
                "/ip firewall nat add chain=srcnat action=masquerade src-address={} comment={}",
                hub.network, label
            ),
            Participant::MeshSite(_) => writeln!(
                f,
                "/ip firewall nat add chain=srcnat action=masquerade out-interface={} comment={}",
                iface, label
            ),
            Participant::Spoke(_) => Ok(()),
        }
    }

    fn write_routes(&self, f: &mut fmt::Formatter<'_>, iface: &str) -> fmt::Result {
        let Participant::MeshSite(own) = &self.member.participant else {
            return Ok(());
        };
        for remote in self.mesh {
            if let Participant::MeshSite(site) = &remote.participant {
                if site.index == own.index {
                    continue;
                }
                writeln!(
                    f,
                    "/ip route add dst-address={} gateway={} comment={}",
                    site.local_network,
                    iface,
                    quote(&site.name)
                )?;
            }
        }
        Ok(())
    }
}

impl Display for VendorScript<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let iface = interface_name(&self.member.participant, self.options);

        self.write_interface(f, &iface)?;
        self.write_peers(f, &iface)?;
        if self.options.generate_firewall {
            self.write_firewall(f, &iface)?;
        }
        if self.options.enable_nat {
            self.write_nat(f, &iface)?;
        }
        self.write_routes(f, &iface)
    }
}

/// Render the script of one member of `topology`
pub fn render_participant_script(
    topology: &Topology,
    member: &Member,
    options: &RenderOptions,
) -> String {
    let mesh: &[Member] = match topology {
        Topology::SiteToSite { sites, .. } => sites,
        Topology::ClientServer { .. } => &[],
    };
    VendorScript::new(member, mesh, options).to_string()
}

/// Render the scripts of every member, hub first, separated by blank lines
pub fn render_vendor_script(topology: &Topology, options: &RenderOptions) -> String {
    topology
        .members()
        .into_iter()
        .map(|member| render_participant_script(topology, member, options))
        .collect::<Vec<_>>()
        .join("\n")
}
