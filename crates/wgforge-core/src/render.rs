//! Rendering options and output artifacts shared by both formats

use crate::config::GenerateRequest;

/// MTU WireGuard picks when none is configured
pub const DEFAULT_MTU: u16 = 1420;

/// Formatting toggles; rendering is a pure function of topology + these
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Router interface name
    pub interface_name: String,
    pub mtu: u16,
    /// Emit NAT / masquerade rules
    pub enable_nat: bool,
    /// Emit firewall accept rules
    pub generate_firewall: bool,
    /// Uplink used by iptables PostUp/PostDown rules
    pub nat_out_interface: String,
}

impl RenderOptions {
    /// MTU to render, `None` when it is the default
    pub fn custom_mtu(&self) -> Option<u16> {
        (self.mtu != DEFAULT_MTU).then_some(self.mtu)
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            interface_name: "wireguard1".to_string(),
            mtu: DEFAULT_MTU,
            enable_nat: false,
            generate_firewall: false,
            nat_out_interface: "eth0".to_string(),
        }
    }
}

impl From<&GenerateRequest> for RenderOptions {
    fn from(request: &GenerateRequest) -> Self {
        Self {
            interface_name: request.interface.name.trim().to_string(),
            mtu: request.interface.mtu,
            enable_nat: request.options.enable_nat,
            generate_firewall: request.options.generate_firewall,
            nat_out_interface: request.options.nat_out_interface.trim().to_string(),
        }
    }
}

/// One rendered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Participant the file belongs to
    pub participant: String,
    /// Suggested file name, e.g. `Client_1.conf`
    pub file_name: String,
    pub content: String,
}

impl Artifact {
    pub fn new(participant: &str, extension: &str, content: String) -> Self {
        Self {
            participant: participant.to_string(),
            file_name: format!("{}.{}", sanitize_file_name(participant), extension),
            content,
        }
    }
}

/// Flatten a free-text value onto one line
///
/// Control characters (line breaks included) become spaces, so a name
/// can never start a new directive in a rendered file.
pub fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Reduce a participant name to `[A-Za-z0-9._-]`
///
/// Other characters become `_`, runs of `_` collapse and leading or
/// trailing `_` are dropped. An empty result becomes `peer`.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "peer".to_string()
    } else {
        trimmed.to_string()
    }
}
