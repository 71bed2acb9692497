//! Generation Parameters
//!
//! Immutable input of one generation: topology mode, hub or site
//! parameters, and the security/NAT/firewall toggles. Loaded from TOML or
//! JSON parameter files.

use crate::error::{Error, Result};
use crate::render::DEFAULT_MTU;
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::path::Path;

/// Network endpoint (host name or IP + UDP port)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// DNS name or IP literal
    pub host: String,
    /// UDP port
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Topology mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyMode {
    /// One hub, N spokes
    ClientServer,
    /// Full mesh between sites
    SiteToSite,
}

impl std::fmt::Display for TopologyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyMode::ClientServer => write!(f, "client-server"),
            TopologyMode::SiteToSite => write!(f, "site-to-site"),
        }
    }
}

/// Tunnel interface settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSettings {
    /// Router interface name
    #[serde(default = "default_interface_name")]
    pub name: String,
    /// Interface MTU; only rendered when it differs from 1420
    #[serde(default = "default_mtu")]
    pub mtu: u16,
}

fn default_interface_name() -> String {
    "wireguard1".to_string()
}

fn default_mtu() -> u16 {
    DEFAULT_MTU
}

impl Default for InterfaceSettings {
    fn default() -> Self {
        Self {
            name: default_interface_name(),
            mtu: default_mtu(),
        }
    }
}

/// Security and routing toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Generate a PSK for every peering relationship
    #[serde(default)]
    pub enable_psk: bool,
    /// Use per-client PSKs from the parameter file where supplied
    #[serde(default)]
    pub individual_psk: bool,
    /// Route only the hub address through the tunnel (split tunnel)
    #[serde(default)]
    pub no_routing_table: bool,
    /// Emit masquerade rules
    #[serde(default)]
    pub enable_nat: bool,
    /// Emit firewall accept rules
    #[serde(default)]
    pub generate_firewall: bool,
    /// Persistent keepalive in seconds, 0 disables
    #[serde(default = "default_keepalive")]
    pub keepalive: u16,
    /// Uplink used by the hub's PostUp masquerade rule
    #[serde(default = "default_nat_out_interface")]
    pub nat_out_interface: String,
    /// Maximum number of bits the hub prefix may widen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_prefix_growth: Option<u8>,
}

fn default_keepalive() -> u16 {
    25
}

fn default_nat_out_interface() -> String {
    "eth0".to_string()
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enable_psk: false,
            individual_psk: false,
            no_routing_table: false,
            enable_nat: false,
            generate_firewall: false,
            keepalive: default_keepalive(),
            nat_out_interface: default_nat_out_interface(),
            max_prefix_growth: None,
        }
    }
}

/// Hub parameters (client-server mode)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerParams {
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Hub host address with declared prefix, e.g. `10.0.0.1/24`
    #[serde(default = "default_server_address")]
    pub address: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Public host name or IP clients connect to
    #[serde(default)]
    pub endpoint: String,
    /// Manual private key (base64); generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

fn default_server_name() -> String {
    "WireGuard Server".to_string()
}

fn default_server_address() -> String {
    "10.0.0.1/24".to_string()
}

fn default_listen_port() -> u16 {
    51820
}

impl Default for ServerParams {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            address: default_server_address(),
            listen_port: default_listen_port(),
            endpoint: String::new(),
            private_key: None,
        }
    }
}

/// Per-client overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Only used when `options.individual_psk` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preshared_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_ips: Option<String>,
}

/// Client parameters (client-server mode)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientParams {
    /// Number of clients; raised to `peers.len()` if smaller
    #[serde(default)]
    pub count: usize,
    /// DNS servers pushed to every client
    #[serde(default = "default_dns")]
    pub dns: Vec<String>,
    /// Routed prefixes for full-tunnel clients, comma separated
    #[serde(default = "default_allowed_ips")]
    pub allowed_ips: String,
    #[serde(default)]
    pub peers: Vec<ClientEntry>,
}

fn default_dns() -> Vec<String> {
    vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()]
}

fn default_allowed_ips() -> String {
    "0.0.0.0/0".to_string()
}

impl Default for ClientParams {
    fn default() -> Self {
        Self {
            count: 0,
            dns: default_dns(),
            allowed_ips: default_allowed_ips(),
            peers: Vec::new(),
        }
    }
}

impl ClientParams {
    /// Effective number of clients
    pub fn spoke_count(&self) -> usize {
        self.count.max(self.peers.len())
    }

    /// Overrides of client `index`, if any
    pub fn entry(&self, index: usize) -> Option<&ClientEntry> {
        self.peers.get(index)
    }

    /// Display name of client `index` (0-based)
    pub fn name_of(&self, index: usize) -> String {
        self.entry(index)
            .and_then(|e| e.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Client {}", index + 1))
    }
}

/// One mesh site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Public host name or IP
    #[serde(default)]
    pub endpoint: String,
    /// LAN behind the site gateway, e.g. `192.168.1.0/24`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    /// Dynamic DNS name; preferred over `endpoint` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

impl SiteEntry {
    /// Host other sites dial: the DDNS name if set, else the endpoint
    pub fn dial_host(&self) -> &str {
        self.ddns
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(self.endpoint.trim())
    }
}

/// Site parameters (site-to-site mode)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteParams {
    /// Dedicated inter-site network
    #[serde(default = "default_transfer_network")]
    pub transfer_network: String,
    #[serde(default)]
    pub list: Vec<SiteEntry>,
}

fn default_transfer_network() -> String {
    "10.2.2.0/24".to_string()
}

impl Default for SiteParams {
    fn default() -> Self {
        Self {
            transfer_network: default_transfer_network(),
            list: Vec::new(),
        }
    }
}

impl SiteParams {
    /// Display name of site `index` (0-based): Site A, Site B, ...
    pub fn name_of(&self, index: usize) -> String {
        self.list
            .get(index)
            .and_then(|s| s.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match u8::try_from(index).ok().filter(|i| *i < 26) {
                Some(i) => format!("Site {}", char::from(b'A' + i)),
                None => format!("Site {}", index + 1),
            })
    }

    /// LAN of site `index`; defaults to `192.168.<index+1>.0/24`
    pub fn local_network_of(&self, index: usize) -> String {
        self.list
            .get(index)
            .and_then(|s| s.local_network.clone())
            .unwrap_or_else(|| format!("192.168.{}.0/24", index + 1))
    }

    /// Listen port of site `index`; defaults to `51820 + index`
    ///
    /// `None` when the default would run past port 65535.
    pub fn listen_port_of(&self, index: usize) -> Option<u16> {
        match self.list.get(index).and_then(|s| s.listen_port) {
            Some(port) => Some(port),
            None => u16::try_from(index)
                .ok()
                .and_then(|i| default_listen_port().checked_add(i)),
        }
    }
}

/// Reject control characters; they would split rendered lines
fn check_text(field: &str, value: &str) -> Result<()> {
    if value.chars().any(char::is_control) {
        return Err(Error::InvalidParameter(format!(
            "{} contains control characters",
            field
        )));
    }
    Ok(())
}

/// Reject host names, addresses and interface names containing whitespace
fn check_token(field: &str, value: &str) -> Result<()> {
    check_text(field, value)?;
    if value.trim().chars().any(char::is_whitespace) {
        return Err(Error::InvalidParameter(format!(
            "{} '{}' contains whitespace",
            field,
            value.trim()
        )));
    }
    Ok(())
}

/// RouterOS interface names are limited to `[A-Za-z0-9._-]`
fn check_interface_name(field: &str, value: &str) -> Result<()> {
    let name = value.trim();
    if name.is_empty() {
        return Err(Error::InvalidParameter(format!("{} is empty", field)));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(Error::InvalidParameter(format!(
            "{} '{}' may only contain letters, digits, '.', '_' and '-'",
            field,
            name.escape_debug()
        )));
    }
    Ok(())
}

/// Complete input of one generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub mode: TopologyMode,
    #[serde(default)]
    pub interface: InterfaceSettings,
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub server: ServerParams,
    #[serde(default)]
    pub clients: ClientParams,
    #[serde(default)]
    pub sites: SiteParams,
}

impl GenerateRequest {
    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Parse(e.to_string()))
    }

    /// Load from JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::Parse(e.to_string()))
    }

    /// Load from a `.toml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            "toml" => Self::from_toml(&content),
            "json" => Self::from_json(&content),
            other => Err(Error::Parse(format!("unsupported parameter file extension '{}'", other))),
        }
    }

    /// Export as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Parse(e.to_string()))
    }

    /// Export as JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Parse(e.to_string()))
    }

    /// Example parameters with placeholder endpoints
    pub fn example(mode: TopologyMode) -> Self {
        let mut request = Self {
            mode,
            interface: InterfaceSettings::default(),
            options: Options {
                enable_psk: true,
                generate_firewall: true,
                enable_nat: mode == TopologyMode::ClientServer,
                ..Options::default()
            },
            server: ServerParams::default(),
            clients: ClientParams::default(),
            sites: SiteParams::default(),
        };

        match mode {
            TopologyMode::ClientServer => {
                request.server.endpoint = "vpn.example.com".to_string();
                request.clients.count = 3;
                request.clients.peers = vec![ClientEntry {
                    name: Some("Laptop".to_string()),
                    ..ClientEntry::default()
                }];
            }
            TopologyMode::SiteToSite => {
                request.sites.list = (0..3)
                    .map(|i| SiteEntry {
                        endpoint: format!("site-{}.example.com", char::from(b'a' + i)),
                        ..SiteEntry::default()
                    })
                    .collect();
            }
        }

        request
    }

    /// Reject parameter combinations no topology can be built from
    pub fn validate(&self) -> Result<()> {
        if !(576..=9000).contains(&self.interface.mtu) {
            return Err(Error::InvalidParameter(format!(
                "MTU {} outside 576..=9000",
                self.interface.mtu
            )));
        }
        check_interface_name("interface name", &self.interface.name)?;
        check_interface_name("NAT out interface", &self.options.nat_out_interface)?;

        match self.mode {
            TopologyMode::ClientServer => {
                if self.clients.spoke_count() == 0 {
                    return Err(Error::TopologyPrecondition(
                        "client-server mode needs at least one client".to_string(),
                    ));
                }
                if self.server.listen_port == 0 {
                    return Err(Error::InvalidParameter("server listen port is 0".to_string()));
                }
                if self.server.endpoint.trim().is_empty() {
                    return Err(Error::InvalidParameter(
                        "server endpoint is required for client configs".to_string(),
                    ));
                }
                check_text("server name", &self.server.name)?;
                check_token("server endpoint", &self.server.endpoint)?;
                for dns in &self.clients.dns {
                    check_token("client DNS server", dns)?;
                }
                for entry in &self.clients.peers {
                    if let Some(name) = &entry.name {
                        check_text("client name", name)?;
                    }
                    for dns in entry.dns.iter().flatten() {
                        check_token("client DNS server", dns)?;
                    }
                }
            }
            TopologyMode::SiteToSite => {
                if self.sites.list.len() < 2 {
                    return Err(Error::TopologyPrecondition(format!(
                        "site-to-site mode needs at least two sites, got {}",
                        self.sites.list.len()
                    )));
                }
                for (i, site) in self.sites.list.iter().enumerate() {
                    if let Some(name) = &site.name {
                        check_text("site name", name)?;
                    }
                    check_token("site endpoint", &site.endpoint)?;
                    if let Some(ddns) = &site.ddns {
                        check_token("site ddns", ddns)?;
                    }
                    if site.dial_host().is_empty() {
                        return Err(Error::InvalidParameter(format!(
                            "{} has neither endpoint nor ddns",
                            self.sites.name_of(i)
                        )));
                    }
                    if matches!(self.sites.listen_port_of(i), None | Some(0)) {
                        return Err(Error::InvalidParameter(format!(
                            "{} has no usable listen port",
                            self.sites.name_of(i)
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_display() {
        let ep = Endpoint::new("vpn.example.com", 51820);
        assert_eq!(ep.to_string(), "vpn.example.com:51820");
    }

    #[test]
    fn test_endpoint_display_ipv6() {
        assert_eq!(Endpoint::new("2001:db8::1", 51820).to_string(), "[2001:db8::1]:51820");
        assert_eq!(Endpoint::new("203.0.113.1", 51820).to_string(), "203.0.113.1:51820");
    }

    #[test]
    fn test_validate_rejects_line_breaks() {
        let mut request = GenerateRequest::example(TopologyMode::ClientServer);
        request.clients.peers[0].name = Some("Laptop\nPostUp = touch /tmp/x".into());
        assert!(matches!(request.validate(), Err(Error::InvalidParameter(_))));

        let mut request = GenerateRequest::example(TopologyMode::ClientServer);
        request.server.name = "Hub\r".into();
        assert!(matches!(request.validate(), Err(Error::InvalidParameter(_))));

        let mut request = GenerateRequest::example(TopologyMode::ClientServer);
        request.clients.dns = vec!["1.1.1.1\nPostUp = id".into()];
        assert!(matches!(request.validate(), Err(Error::InvalidParameter(_))));

        let mut mesh = GenerateRequest::example(TopologyMode::SiteToSite);
        mesh.sites.list[1].ddns = Some("b.example\n".into());
        assert!(matches!(mesh.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_validate_interface_names() {
        let mut request = GenerateRequest::example(TopologyMode::ClientServer);
        request.interface.name = "wg home".into();
        assert!(matches!(request.validate(), Err(Error::InvalidParameter(_))));

        request.interface.name = "wg-home_1.0".into();
        assert!(request.validate().is_ok());

        request.options.nat_out_interface = "eth0; reboot".into();
        assert!(matches!(request.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_validate_endpoint_whitespace() {
        let mut request = GenerateRequest::example(TopologyMode::ClientServer);
        request.server.endpoint = "vpn example.com".into();
        assert!(matches!(request.validate(), Err(Error::InvalidParameter(_))));

        request.server.endpoint = "  vpn.example.com ".into();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_minimal_toml_defaults() {
        let request = GenerateRequest::from_toml(
            r#"
            mode = "client-server"

            [server]
            endpoint = "vpn.example.com"

            [clients]
            count = 2
            "#,
        )
        .unwrap();

        assert_eq!(request.mode, TopologyMode::ClientServer);
        assert_eq!(request.server.address, "10.0.0.1/24");
        assert_eq!(request.server.listen_port, 51820);
        assert_eq!(request.interface.name, "wireguard1");
        assert_eq!(request.interface.mtu, 1420);
        assert_eq!(request.options.keepalive, 25);
        assert_eq!(request.clients.allowed_ips, "0.0.0.0/0");
        assert_eq!(request.clients.dns, vec!["1.1.1.1", "8.8.8.8"]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_spoke_count_and_names() {
        let clients = ClientParams {
            count: 1,
            peers: vec![
                ClientEntry { name: Some("Phone".into()), ..ClientEntry::default() },
                ClientEntry { name: Some("  ".into()), ..ClientEntry::default() },
            ],
            ..ClientParams::default()
        };
        assert_eq!(clients.spoke_count(), 2);
        assert_eq!(clients.name_of(0), "Phone");
        assert_eq!(clients.name_of(1), "Client 2");
        assert_eq!(clients.name_of(5), "Client 6");
    }

    #[test]
    fn test_site_defaults() {
        let sites = SiteParams {
            list: vec![SiteEntry::default(), SiteEntry::default()],
            ..SiteParams::default()
        };
        assert_eq!(sites.name_of(1), "Site B");
        assert_eq!(sites.local_network_of(1), "192.168.2.0/24");
        assert_eq!(sites.listen_port_of(1), Some(51821));
    }

    #[test]
    fn test_default_listen_port_overflow() {
        let sites = SiteParams::default();
        assert_eq!(sites.listen_port_of(13715), Some(65535));
        assert_eq!(sites.listen_port_of(13716), None);
        assert_eq!(sites.listen_port_of(65536), None);
    }

    #[test]
    fn test_validate_rejects_exhausted_site_port() {
        let mut request = GenerateRequest::example(TopologyMode::SiteToSite);
        request.sites.list = (0..13717)
            .map(|i| SiteEntry {
                endpoint: format!("site-{}.example.com", i),
                listen_port: (i < 13716).then_some(40000),
                ..SiteEntry::default()
            })
            .collect();
        assert!(matches!(request.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_ddns_preferred() {
        let site = SiteEntry {
            endpoint: "203.0.113.7".into(),
            ddns: Some("site.dyn.example".into()),
            ..SiteEntry::default()
        };
        assert_eq!(site.dial_host(), "site.dyn.example");

        let plain = SiteEntry { endpoint: "203.0.113.7".into(), ..SiteEntry::default() };
        assert_eq!(plain.dial_host(), "203.0.113.7");
    }

    #[test]
    fn test_validate_preconditions() {
        let mut request = GenerateRequest::example(TopologyMode::ClientServer);
        assert!(request.validate().is_ok());

        request.clients.count = 0;
        request.clients.peers.clear();
        assert!(matches!(request.validate(), Err(Error::TopologyPrecondition(_))));

        let mut mesh = GenerateRequest::example(TopologyMode::SiteToSite);
        assert!(mesh.validate().is_ok());
        mesh.sites.list.truncate(1);
        assert!(matches!(mesh.validate(), Err(Error::TopologyPrecondition(_))));
    }

    #[test]
    fn test_validate_parameters() {
        let mut request = GenerateRequest::example(TopologyMode::ClientServer);
        request.server.endpoint = " ".into();
        assert!(matches!(request.validate(), Err(Error::InvalidParameter(_))));

        let mut request = GenerateRequest::example(TopologyMode::ClientServer);
        request.interface.mtu = 100;
        assert!(matches!(request.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_toml_json_roundtrip() {
        let request = GenerateRequest::example(TopologyMode::SiteToSite);

        let parsed = GenerateRequest::from_toml(&request.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, request);

        let parsed = GenerateRequest::from_json(&request.to_json().unwrap()).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            GenerateRequest::from_toml("mode = \"ring\""),
            Err(Error::Parse(_))
        ));
    }
}
