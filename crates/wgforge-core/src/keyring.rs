//! Key Ring
//!
//! Generates and resolves key pairs for every participant of one
//! generation, and assigns pre-shared keys per peering relationship.
//!
//! Public key derivation is delegated to a [`KeyDerivation`] backend.
//! A backend that cannot derive must fail; there is no fallback math.

use crate::error::Result;
use crate::keys::{KeyError, KeyPair, PresharedKey, PrivateKey, PublicKey};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

/// Derives a public key from a private key
pub trait KeyDerivation: Send + Sync {
    /// Derive the public key; must be deterministic for a given input
    fn derive_public(&self, private: &PrivateKey) -> std::result::Result<PublicKey, KeyError>;
}

/// Curve25519 scalar base multiplication via x25519-dalek
#[derive(Debug, Clone, Copy, Default)]
pub struct X25519Derivation;

impl KeyDerivation for X25519Derivation {
    fn derive_public(&self, private: &PrivateKey) -> std::result::Result<PublicKey, KeyError> {
        let secret = StaticSecret::from(private.to_bytes());
        Ok(PublicKey::from_bytes(X25519Public::from(&secret).to_bytes()))
    }
}

/// Backend used when no elliptic-curve primitive is available
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableDerivation;

impl KeyDerivation for UnavailableDerivation {
    fn derive_public(&self, _private: &PrivateKey) -> std::result::Result<PublicKey, KeyError> {
        Err(KeyError::DerivationUnavailable(
            "no elliptic-curve backend configured".to_string(),
        ))
    }
}

/// Key generation entry point shared by one or more generations
///
/// Holds no per-generation state, so concurrent generations can share
/// a clone without observing each other's keys.
#[derive(Clone)]
pub struct KeyRing {
    derivation: Arc<dyn KeyDerivation>,
}

impl KeyRing {
    /// Create a key ring over the given derivation backend
    pub fn new(derivation: Arc<dyn KeyDerivation>) -> Self {
        Self { derivation }
    }

    /// Key ring backed by x25519-dalek
    pub fn x25519() -> Self {
        Self::new(Arc::new(X25519Derivation))
    }

    /// Generate a fresh clamped private key and derive its public key
    pub fn generate(&self) -> Result<KeyPair> {
        let private = PrivateKey::generate();
        let public = self.derivation.derive_public(&private)?;
        debug!("Generated key pair {:?}", public);
        Ok(KeyPair::new(private, public))
    }

    /// Accept an operator-supplied private key and derive its public key
    pub fn from_manual_private_key(&self, text: &str) -> Result<KeyPair> {
        let private = PrivateKey::from_base64(text).inspect_err(|e| {
            warn!("Rejected manual private key: {}", e);
        })?;
        let public = self.derivation.derive_public(&private)?;
        Ok(KeyPair::new(private, public))
    }

    /// Use the manual private key when one is given, otherwise generate
    pub fn resolve(&self, manual: Option<&str>) -> Result<KeyPair> {
        match manual.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => self.from_manual_private_key(text),
            None => self.generate(),
        }
    }

    /// Generate an independent pre-shared key
    pub fn generate_preshared_key(&self) -> PresharedKey {
        PresharedKey::generate()
    }
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::x25519()
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing").finish_non_exhaustive()
    }
}

/// Pre-shared key policy for one generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PskPolicy {
    /// Generate a PSK for every relationship
    pub enabled: bool,
    /// Prefer operator-supplied PSKs where present
    pub individual: bool,
}

impl PskPolicy {
    /// Resolve the PSK of one relationship
    ///
    /// Call exactly once per relationship and hand the result to both
    /// sides; calling it per side yields two different keys.
    pub fn assign(&self, ring: &KeyRing, manual: Option<&str>) -> Result<Option<PresharedKey>> {
        if self.individual {
            if let Some(text) = manual.map(str::trim).filter(|s| !s.is_empty()) {
                let psk = PresharedKey::from_base64(text).inspect_err(|e| {
                    warn!("Rejected manual pre-shared key: {}", e);
                })?;
                return Ok(Some(psk));
            }
        }

        if self.enabled {
            Ok(Some(ring.generate_preshared_key()))
        } else {
            Ok(None)
        }
    }
}

/// Pre-shared keys indexed by unordered participant pair
#[derive(Debug, Clone, Default)]
pub struct PskTable {
    entries: HashMap<(usize, usize), PresharedKey>,
}

impl PskTable {
    fn pair(a: usize, b: usize) -> (usize, usize) {
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Store the PSK of the relationship between `a` and `b`
    pub fn insert(&mut self, a: usize, b: usize, psk: PresharedKey) {
        self.entries.insert(Self::pair(a, b), psk);
    }

    /// PSK of the relationship between `a` and `b`, in either direction
    pub fn get(&self, a: usize, b: usize) -> Option<&PresharedKey> {
        self.entries.get(&Self::pair(a, b))
    }

    /// Number of relationships carrying a PSK
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
