//! wgforge - WireGuard Configuration Generator
//!
//! Turns a set of form parameters into mutually consistent WireGuard
//! configurations for every participant of a hub-and-spoke or full-mesh
//! network, in two formats: wg-quick tunnel configs and RouterOS scripts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ GenerateRequest │  (TOML / JSON parameter file)
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐    ┌──────────────┐
//! │    Generator    │───▶│   KeyRing    │  key pairs + PSKs
//! └────────┬────────┘    └──────────────┘
//!          ▼
//! ┌─────────────────┐    ┌──────────────┐
//! │ TopologyBuilder │───▶│AddressPlanner│  hub network, spoke / transfer IPs
//! └────────┬────────┘    └──────────────┘
//!          ▼
//! ┌─────────────────┐
//! │ ConfigRenderer  │──▶ <name>.conf  +  <name>.rsc  per participant
//! └─────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - Every PSK is generated once per relationship and rendered identically
//!   on both sides
//! - Spoke addresses never collide with the hub or each other
//! - Public keys come from a real X25519 backend or the generation fails
//! - Rendering is a pure function of the topology and render options

pub mod address;
pub mod config;
pub mod error;
pub mod generator;
pub mod keyring;
pub mod keys;
pub mod render;
pub mod routeros;
pub mod topology;
pub mod tunnel_config;

pub use address::{AddressBlock, HubPlan, plan_hub_and_spoke, plan_transfer_address};
pub use config::{
    ClientEntry, ClientParams, Endpoint, GenerateRequest, InterfaceSettings, Options,
    ServerParams, SiteEntry, SiteParams, TopologyMode,
};
pub use error::{Error, Result};
pub use generator::{Generated, Generator};
pub use keyring::{KeyDerivation, KeyRing, PskPolicy, UnavailableDerivation, X25519Derivation};
pub use keys::{KeyError, KeyPair, PresharedKey, PrivateKey, PublicKey, validate_key};
pub use render::{Artifact, RenderOptions};
pub use routeros::{render_participant_script, render_vendor_script};
pub use topology::{Member, Participant, Peering, Topology, build_client_server, build_site_to_site};
pub use tunnel_config::render_tunnel_config;
