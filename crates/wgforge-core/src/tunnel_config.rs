//! Tunnel Config Rendering
//!
//! Renders one participant as a wg-quick style INI file: an `[Interface]`
//! section followed by one `[Peer]` section per peering, in build order.

use crate::render::{RenderOptions, single_line};
use crate::topology::{Member, Participant, Peering};
use std::fmt::{self, Display};

/// Tunnel config of one member, rendered through [`Display`]
pub struct TunnelConfig<'a> {
    member: &'a Member,
    options: &'a RenderOptions,
}

impl<'a> TunnelConfig<'a> {
    pub fn new(member: &'a Member, options: &'a RenderOptions) -> Self {
        Self { member, options }
    }

    fn write_interface(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let participant = &self.member.participant;

        writeln!(f, "# {}", single_line(participant.name()))?;
        writeln!(f, "[Interface]")?;
        writeln!(f, "PrivateKey = {}", participant.keys().private.to_base64())?;
        writeln!(f, "Address = {}", participant.address())?;
        if let Some(port) = participant.listen_port() {
            writeln!(f, "ListenPort = {}", port)?;
        }
        if !participant.dns().is_empty() {
            writeln!(f, "DNS = {}", participant.dns().join(", "))?;
        }
        if let Some(mtu) = self.options.custom_mtu() {
            writeln!(f, "MTU = {}", mtu)?;
        }

        if let Participant::Hub(_) = participant {
            if self.options.enable_nat {
                let out = &self.options.nat_out_interface;
                writeln!(
                    f,
                    "PostUp = iptables -A FORWARD -i %i -j ACCEPT; iptables -A FORWARD -o %i -j ACCEPT; iptables -t nat -A POSTROUTING -o {} -j MASQUERADE",
                    out
                )?;
                writeln!(
                    f,
                    "PostDown = iptables -D FORWARD -i %i -j ACCEPT; iptables -D FORWARD -o %i -j ACCEPT; iptables -t nat -D POSTROUTING -o {} -j MASQUERADE",
                    out
                )?;
            }
        }
        Ok(())
    }
}

fn write_peer(f: &mut fmt::Formatter<'_>, peer: &Peering) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "[Peer]")?;
    writeln!(f, "# {}", single_line(&peer.remote_name))?;
    writeln!(f, "PublicKey = {}", peer.remote_public_key)?;
    if let Some(endpoint) = &peer.endpoint {
        writeln!(f, "Endpoint = {}", endpoint)?;
    }
    writeln!(f, "AllowedIPs = {}", join_nets(&peer.allowed_ips))?;
    if let Some(psk) = &peer.preshared_key {
        writeln!(f, "PresharedKey = {}", psk.to_base64())?;
    }
    if let Some(keepalive) = peer.keepalive.filter(|k| *k > 0) {
        writeln!(f, "PersistentKeepalive = {}", keepalive)?;
    }
    Ok(())
}

/// Comma separated prefix list
fn join_nets(nets: &[ipnet::IpNet]) -> String {
    nets.iter()
        .map(|net| net.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Display for TunnelConfig<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_interface(f)?;
        for peer in &self.member.peerings {
            write_peer(f, peer)?;
        }
        Ok(())
    }
}

/// Render the tunnel config of one member
pub fn render_tunnel_config(member: &Member, options: &RenderOptions) -> String {
    TunnelConfig::new(member, options).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerateRequest, TopologyMode};
    use crate::keyring::KeyRing;
    use crate::topology::{self, Topology};

    fn client_server(count: usize) -> (GenerateRequest, Topology) {
        let ring = KeyRing::x25519();
        let mut request = GenerateRequest::example(TopologyMode::ClientServer);
        request.clients.count = count;
        request.clients.peers.clear();
        let hub = ring.generate().unwrap();
        let spokes = (0..count).map(|_| ring.generate().unwrap()).collect();
        let topology = topology::build_client_server(&request, hub, spokes, &ring).unwrap();
        (request, topology)
    }

    fn field<'a>(text: &'a str, key: &str) -> Vec<&'a str> {
        let prefix = format!("{} = ", key);
        text.lines().filter_map(|l| l.strip_prefix(prefix.as_str())).collect()
    }

    #[test]
    fn test_hub_config() {
        let (request, topology) = client_server(2);
        let Topology::ClientServer { hub, spokes } = &topology else {
            panic!("expected client-server topology");
        };
        let mut options = RenderOptions::from(&request);
        options.enable_nat = false;
        let text = render_tunnel_config(hub, &options);

        assert!(text.starts_with("# WireGuard Server\n[Interface]\n"));
        assert_eq!(field(&text, "Address"), vec!["10.0.0.1/24"]);
        assert_eq!(field(&text, "ListenPort"), vec!["51820"]);
        assert!(field(&text, "DNS").is_empty());
        assert!(field(&text, "MTU").is_empty());
        assert!(field(&text, "Endpoint").is_empty());
        assert!(field(&text, "PersistentKeepalive").is_empty());
        assert!(field(&text, "PostUp").is_empty());
        assert_eq!(field(&text, "AllowedIPs"), vec!["10.0.0.3/32", "10.0.0.4/32"]);
        assert_eq!(text.matches("[Peer]").count(), 2);
        assert_eq!(
            field(&text, "PublicKey")[1],
            spokes[1].participant.keys().public.to_base64()
        );
    }

    #[test]
    fn test_spoke_config() {
        let (request, topology) = client_server(1);
        let Topology::ClientServer { spokes, .. } = &topology else {
            panic!("expected client-server topology");
        };
        let mut options = RenderOptions::from(&request);
        options.mtu = 1380;
        let text = render_tunnel_config(&spokes[0], &options);

        assert_eq!(field(&text, "Address"), vec!["10.0.0.3/24"]);
        assert!(field(&text, "ListenPort").is_empty());
        assert_eq!(field(&text, "DNS"), vec!["1.1.1.1, 8.8.8.8"]);
        assert_eq!(field(&text, "MTU"), vec!["1380"]);
        assert_eq!(field(&text, "Endpoint"), vec!["vpn.example.com:51820"]);
        assert_eq!(field(&text, "AllowedIPs"), vec!["0.0.0.0/0"]);
        assert_eq!(field(&text, "PersistentKeepalive"), vec!["25"]);
        assert_eq!(field(&text, "PresharedKey").len(), 1);
    }

    #[test]
    fn test_section_order() {
        let (request, topology) = client_server(1);
        let Topology::ClientServer { spokes, .. } = &topology else {
            panic!("expected client-server topology");
        };
        let text = render_tunnel_config(&spokes[0], &RenderOptions::from(&request));

        let position = |needle: &str| text.find(needle).unwrap();
        assert!(position("[Interface]") < position("[Peer]"));
        assert!(position("PublicKey") < position("Endpoint"));
        assert!(position("Endpoint") < position("AllowedIPs"));
        assert!(position("AllowedIPs") < position("PresharedKey"));
        assert!(position("PresharedKey") < position("PersistentKeepalive"));
    }

    #[test]
    fn test_hub_nat_rules() {
        let (request, topology) = client_server(1);
        let Topology::ClientServer { hub, spokes } = &topology else {
            panic!("expected client-server topology");
        };
        let mut options = RenderOptions::from(&request);
        options.enable_nat = true;
        options.nat_out_interface = "ens3".into();

        let text = render_tunnel_config(hub, &options);
        assert_eq!(field(&text, "PostUp").len(), 1);
        assert!(field(&text, "PostDown")[0].ends_with("-o ens3 -j MASQUERADE"));

        let spoke_text = render_tunnel_config(&spokes[0], &options);
        assert!(field(&spoke_text, "PostUp").is_empty());
    }

    #[test]
    fn test_names_cannot_inject_directives() {
        let (request, mut topology) = client_server(1);
        let Topology::ClientServer { hub, .. } = &mut topology else {
            panic!("expected client-server topology");
        };
        hub.peerings[0].remote_name = "Laptop\nPostUp = touch /tmp/x".into();

        let text = render_tunnel_config(hub, &RenderOptions::from(&request));
        assert!(!text.lines().any(|l| l.starts_with("PostUp = touch")));
        assert!(text.contains("# Laptop PostUp = touch /tmp/x\n"));
    }

    #[test]
    fn test_render_is_idempotent() {
        let (request, topology) = client_server(3);
        let options = RenderOptions::from(&request);
        for member in topology.members() {
            assert_eq!(
                render_tunnel_config(member, &options),
                render_tunnel_config(member, &options)
            );
        }
    }
}
