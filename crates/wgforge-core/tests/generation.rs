//! End-to-end generation tests over rendered text

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use wgforge_core::{
    GenerateRequest, Generator, KeyDerivation, KeyError, KeyRing, PrivateKey, PublicKey,
    RenderOptions, SiteEntry, TopologyMode, render_tunnel_config, render_vendor_script,
};

/// Deterministic stand-in for X25519: public = private bytes reversed
struct ReversedDerivation;

impl KeyDerivation for ReversedDerivation {
    fn derive_public(&self, private: &PrivateKey) -> Result<PublicKey, KeyError> {
        let mut bytes = private.to_bytes();
        bytes.reverse();
        Ok(PublicKey::from_bytes(bytes))
    }
}

fn generator() -> Generator {
    Generator::new(KeyRing::new(Arc::new(ReversedDerivation)))
}

/// Parse a tunnel config into (interface fields, peer sections)
fn parse_config(text: &str) -> (HashMap<String, String>, Vec<HashMap<String, String>>) {
    let mut interface = HashMap::new();
    let mut peers: Vec<HashMap<String, String>> = Vec::new();
    let mut in_peer = false;

    for line in text.lines() {
        match line.trim() {
            "[Interface]" => in_peer = false,
            "[Peer]" => {
                in_peer = true;
                peers.push(HashMap::new());
            }
            l if l.starts_with('#') || l.is_empty() => {}
            l => {
                let (key, value) = l.split_once(" = ").unwrap();
                let section = if in_peer { peers.last_mut().unwrap() } else { &mut interface };
                section.insert(key.to_string(), value.to_string());
            }
        }
    }
    (interface, peers)
}

fn client_server_request(count: usize) -> GenerateRequest {
    let mut request = GenerateRequest::example(TopologyMode::ClientServer);
    request.clients.count = count;
    request.clients.peers.clear();
    request
}

fn mesh_request(count: usize) -> GenerateRequest {
    let mut request = GenerateRequest::example(TopologyMode::SiteToSite);
    request.sites.list = (0..count)
        .map(|i| SiteEntry {
            endpoint: format!("192.0.2.{}", i + 10),
            ..SiteEntry::default()
        })
        .collect();
    request
}

#[tokio::test]
async fn test_hub_and_spoke_psk_matches_in_rendered_text() {
    let generated = generator().generate(&client_server_request(5)).await.unwrap();

    let (hub_iface, hub_peers) = parse_config(&generated.tunnel_configs[0].content);
    assert_eq!(hub_peers.len(), 5);

    for (i, artifact) in generated.tunnel_configs[1..].iter().enumerate() {
        let (spoke_iface, spoke_peers) = parse_config(&artifact.content);
        assert_eq!(spoke_peers.len(), 1);

        let to_hub = &spoke_peers[0];
        let hub_record = &hub_peers[i];

        assert_eq!(to_hub["PresharedKey"], hub_record["PresharedKey"]);
        assert_eq!(
            hub_record["AllowedIPs"],
            format!("{}/32", spoke_iface["Address"].split('/').next().unwrap())
        );

        // Each side names the other's public key
        let hub_private = PrivateKey::from_base64(&hub_iface["PrivateKey"]).unwrap();
        let spoke_private = PrivateKey::from_base64(&spoke_iface["PrivateKey"]).unwrap();
        assert_eq!(
            to_hub["PublicKey"],
            ReversedDerivation.derive_public(&hub_private).unwrap().to_base64()
        );
        assert_eq!(
            hub_record["PublicKey"],
            ReversedDerivation.derive_public(&spoke_private).unwrap().to_base64()
        );
    }
}

#[tokio::test]
async fn test_vendor_script_carries_same_psk_as_tunnel_config() {
    let generated = generator().generate(&client_server_request(2)).await.unwrap();

    let (_, spoke_peers) = parse_config(&generated.tunnel_configs[1].content);
    let psk = &spoke_peers[0]["PresharedKey"];

    let hub_script = &generated.vendor_scripts[0].content;
    let spoke_script = &generated.vendor_scripts[1].content;
    let needle = format!("preshared-key=\"{}\"", psk);
    assert!(hub_script.contains(&needle));
    assert!(spoke_script.contains(&needle));
}

#[tokio::test]
async fn test_spoke_addresses_distinct_and_inside_hub_network() {
    let mut request = client_server_request(20);
    request.server.address = "10.9.0.1/28".to_string();
    let generated = generator().generate(&request).await.unwrap();

    let (hub_iface, _) = parse_config(&generated.tunnel_configs[0].content);
    assert_eq!(hub_iface["Address"], "10.9.0.1/27");

    let mut seen = HashSet::new();
    seen.insert(hub_iface["Address"].clone());
    for artifact in &generated.tunnel_configs[1..] {
        let (iface, _) = parse_config(&artifact.content);
        assert!(iface["Address"].ends_with("/27"));
        assert!(seen.insert(iface["Address"].clone()));
    }
    assert_eq!(seen.len(), 21);
}

#[tokio::test]
async fn test_split_tunnel_routes_only_hub() {
    let mut request = client_server_request(3);
    request.options.no_routing_table = true;
    request.clients.allowed_ips = "0.0.0.0/0".to_string();
    let generated = generator().generate(&request).await.unwrap();

    for artifact in &generated.tunnel_configs[1..] {
        let (_, peers) = parse_config(&artifact.content);
        assert_eq!(peers[0]["AllowedIPs"], "10.0.0.1/32");
    }
}

#[tokio::test]
async fn test_mesh_of_four_sites() {
    let generated = generator().generate(&mesh_request(4)).await.unwrap();
    assert_eq!(generated.topology.peering_count(), 12);

    let mut pair_psks: HashMap<(String, String), String> = HashMap::new();
    for artifact in &generated.tunnel_configs {
        let (_, peers) = parse_config(&artifact.content);
        assert_eq!(peers.len(), 3);

        let content = &artifact.content;
        for (peer, remote) in peers.iter().zip(remote_names(content)) {
            let mut pair = [artifact.participant.clone(), remote];
            pair.sort();
            let [a, b] = pair;
            let psk = peer["PresharedKey"].clone();
            if let Some(existing) = pair_psks.insert((a, b), psk.clone()) {
                assert_eq!(existing, psk);
            }
        }
    }

    assert_eq!(pair_psks.len(), 6);
    let distinct: HashSet<_> = pair_psks.values().collect();
    assert_eq!(distinct.len(), 6);
}

/// Names from the `# <name>` comments following each `[Peer]` header
fn remote_names(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    lines
        .windows(2)
        .filter(|w| w[0] == "[Peer]")
        .filter_map(|w| w[1].strip_prefix("# "))
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_mesh_routes_and_interfaces() {
    let generated = generator().generate(&mesh_request(3)).await.unwrap();
    let site_c = &generated.vendor_scripts[2].content;

    assert!(site_c.contains("/interface wireguard add name=wireguard1-3 listen-port=51822"));
    assert!(site_c.contains("/ip route add dst-address=192.168.1.0/24 gateway=wireguard1-3"));
    assert!(site_c.contains("/ip route add dst-address=192.168.2.0/24 gateway=wireguard1-3"));
    assert!(!site_c.contains("dst-address=192.168.3.0/24 gateway"));
}

#[tokio::test]
async fn test_rendering_is_idempotent() {
    let request = client_server_request(4);
    let generated = generator().generate(&request).await.unwrap();
    let options = RenderOptions::from(&request);

    assert_eq!(
        render_vendor_script(&generated.topology, &options),
        render_vendor_script(&generated.topology, &options)
    );
    for (member, artifact) in generated.topology.members().into_iter().zip(&generated.tunnel_configs) {
        assert_eq!(render_tunnel_config(member, &options), artifact.content);
    }
}

#[tokio::test]
async fn test_parameter_file_roundtrip_generates() {
    let toml = r#"
        mode = "site-to-site"

        [options]
        enable_psk = true
        keepalive = 0

        [sites]
        transfer_network = "172.31.0.0/29"

        [[sites.list]]
        name = "HQ"
        endpoint = "hq.example.net"
        local_network = "10.10.0.0/16"

        [[sites.list]]
        name = "Branch"
        endpoint = "203.0.113.9"
        ddns = "branch.dyn.example"
        listen_port = 13231
    "#;

    let request = GenerateRequest::from_toml(toml).unwrap();
    let generated = generator().generate(&request).await.unwrap();

    let (hq_iface, hq_peers) = parse_config(&generated.tunnel_configs[0].content);
    assert_eq!(hq_iface["Address"], "172.31.0.1/29");
    assert_eq!(hq_peers[0]["Endpoint"], "branch.dyn.example:13231");
    assert_eq!(hq_peers[0]["AllowedIPs"], "192.168.2.0/24, 172.31.0.2/32");
    assert!(!hq_peers[0].contains_key("PersistentKeepalive"));

    let (_, branch_peers) = parse_config(&generated.tunnel_configs[1].content);
    assert_eq!(branch_peers[0]["AllowedIPs"], "10.10.0.0/16, 172.31.0.1/32");
    assert_eq!(branch_peers[0]["Endpoint"], "hq.example.net:51820");
}

#[tokio::test]
async fn test_line_breaks_in_names_are_rejected() {
    let mut request = client_server_request(1);
    request.clients.peers = vec![wgforge_core::ClientEntry {
        name: Some("Laptop\nPostUp = touch /tmp/x".to_string()),
        ..Default::default()
    }];

    let result = generator().generate(&request).await;
    assert!(matches!(result, Err(wgforge_core::Error::InvalidParameter(_))));
}

#[tokio::test]
async fn test_interface_name_with_space_is_rejected() {
    let mut request = client_server_request(1);
    request.interface.name = "wg home".to_string();

    let result = generator().generate(&request).await;
    assert!(matches!(result, Err(wgforge_core::Error::InvalidParameter(_))));
}
