//! Generator
//!
//! Runs one generation end to end: validate parameters, resolve every key
//! pair, plan addresses, build the peer graph and render both formats.
//!
//! # Usage
//!
//! ```rust,ignore
//! let request = GenerateRequest::from_file(Path::new("office.toml"))?;
//! let generated = Generator::x25519().generate(&request).await?;
//!
//! for artifact in generated.artifacts() {
//!     std::fs::write(&artifact.file_name, &artifact.content)?;
//! }
//! ```
//!
//! Each call builds a fresh topology from scratch. Key pairs are resolved
//! concurrently, but peerings are only assembled after every key pair of
//! the generation is available.

use crate::config::{GenerateRequest, TopologyMode};
use crate::error::{Error, Result};
use crate::keyring::KeyRing;
use crate::keys::KeyPair;
use crate::render::{Artifact, RenderOptions};
use crate::routeros;
use crate::topology::{self, Topology};
use crate::tunnel_config;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Output of one generation
#[derive(Debug, Clone)]
pub struct Generated {
    pub topology: Topology,
    /// One `.conf` per participant, hub first
    pub tunnel_configs: Vec<Artifact>,
    /// One `.rsc` per participant, hub first
    pub vendor_scripts: Vec<Artifact>,
}

impl Generated {
    /// Render a topology into both formats
    pub fn render(topology: Topology, options: &RenderOptions) -> Self {
        let members = topology.members();

        let tunnel_configs = members
            .iter()
            .map(|m| {
                Artifact::new(
                    m.participant.name(),
                    "conf",
                    tunnel_config::render_tunnel_config(m, options),
                )
            })
            .collect();

        let vendor_scripts = members
            .iter()
            .map(|m| {
                Artifact::new(
                    m.participant.name(),
                    "rsc",
                    routeros::render_participant_script(&topology, m, options),
                )
            })
            .collect();

        Self {
            topology,
            tunnel_configs,
            vendor_scripts,
        }
    }

    /// Every artifact, tunnel configs first
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.tunnel_configs.iter().chain(self.vendor_scripts.iter())
    }
}

/// Generation entry point
///
/// Holds no per-generation state; concurrent calls never share keys.
#[derive(Debug, Clone, Default)]
pub struct Generator {
    ring: KeyRing,
}

impl Generator {
    /// Create a generator over the given key ring
    pub fn new(ring: KeyRing) -> Self {
        Self { ring }
    }

    /// Generator backed by x25519-dalek
    pub fn x25519() -> Self {
        Self::new(KeyRing::x25519())
    }

    pub fn key_ring(&self) -> &KeyRing {
        &self.ring
    }

    /// Run one generation
    pub async fn generate(&self, request: &GenerateRequest) -> Result<Generated> {
        let started = Instant::now();
        request.validate()?;

        let topology = match request.mode {
            TopologyMode::ClientServer => {
                let clients = &request.clients;
                let mut manual = vec![request.server.private_key.clone()];
                manual.extend(
                    (0..clients.spoke_count())
                        .map(|i| clients.entry(i).and_then(|e| e.private_key.clone())),
                );

                let mut keys = self.resolve_keys(manual).await?;
                let spoke_keys = keys.split_off(1);
                let hub_keys = keys.pop().ok_or_else(|| {
                    Error::Task("hub key pair missing".to_string())
                })?;

                topology::build_client_server(request, hub_keys, spoke_keys, &self.ring)?
            }
            TopologyMode::SiteToSite => {
                let manual = request
                    .sites
                    .list
                    .iter()
                    .map(|s| s.private_key.clone())
                    .collect();

                let keys = self.resolve_keys(manual).await?;
                topology::build_site_to_site(request, keys, &self.ring)?
            }
        };

        let generated = Generated::render(topology, &RenderOptions::from(request));

        info!(
            "Generated {} topology: {} participants, {} peerings in {:?}",
            request.mode,
            generated.tunnel_configs.len(),
            generated.topology.peering_count(),
            started.elapsed()
        );

        Ok(generated)
    }

    /// Resolve one key pair per slot, in slot order
    ///
    /// Blank or missing manual keys are generated. The first failing slot
    /// (by position) decides the error.
    async fn resolve_keys(&self, manual: Vec<Option<String>>) -> Result<Vec<KeyPair>> {
        let mut tasks = JoinSet::new();
        let slots = manual.len();

        for (index, key) in manual.into_iter().enumerate() {
            let ring = self.ring.clone();
            tasks.spawn_blocking(move || (index, ring.resolve(key.as_deref())));
        }

        let mut results: Vec<Option<Result<KeyPair>>> = vec![None; slots];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| Error::Task(e.to_string()))?;
            results[index] = Some(result);
        }

        debug!("Resolved {} key pairs", slots);

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(Error::Task("key slot never completed".to_string()))))
            .collect()
    }
}
