//! WireGuard Key Material
//!
//! Private/public key and pre-shared key types. Keys are opaque 32-byte
//! values exchanged as padded base64 (44 characters). Public key derivation
//! is not done here; see [`crate::keyring::KeyDerivation`].

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;

/// Raw key length in bytes
pub const KEY_LENGTH: usize = 32;

/// Length of a padded base64 key
pub const ENCODED_KEY_LENGTH: usize = 44;

/// Apply Curve25519 clamping to freshly generated private key bytes
pub fn clamp(bytes: &mut [u8; KEY_LENGTH]) {
    bytes[0] &= 0xF8;
    bytes[31] &= 0x7F;
    bytes[31] |= 0x40;
}

/// Check that `key` looks like a WireGuard key: 44 base64 characters
/// decoding to exactly 32 bytes
pub fn validate_key(key: &str) -> bool {
    let key = key.trim();
    if key.len() != ENCODED_KEY_LENGTH {
        return false;
    }
    decode_key(key).is_ok()
}

fn decode_key(s: &str) -> Result<[u8; KEY_LENGTH], KeyError> {
    let bytes = BASE64.decode(s.trim())
        .map_err(|_| KeyError::InvalidBase64)?;

    if bytes.len() != KEY_LENGTH {
        return Err(KeyError::InvalidLength);
    }

    let mut arr = [0u8; KEY_LENGTH];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

fn random_bytes() -> [u8; KEY_LENGTH] {
    let mut bytes = [0u8; KEY_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// WireGuard private key (Curve25519 scalar)
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    bytes: [u8; KEY_LENGTH],
}

impl PrivateKey {
    /// Generate a new random, clamped private key
    pub fn generate() -> Self {
        let mut bytes = random_bytes();
        clamp(&mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes (not clamped)
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Create from base64 string
    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        decode_key(s).map(Self::from_bytes)
    }

    /// Get raw bytes
    pub fn to_bytes(&self) -> [u8; KEY_LENGTH] {
        self.bytes
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([redacted])")
    }
}

/// WireGuard public key (Curve25519 point)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    bytes: [u8; KEY_LENGTH],
}

impl PublicKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Create from base64 string
    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        decode_key(s).map(Self::from_bytes)
    }

    /// Get raw bytes
    pub fn to_bytes(&self) -> [u8; KEY_LENGTH] {
        self.bytes
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_base64()[..8])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

/// A key pair (private + public)
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private: PrivateKey,
    pub public: PublicKey,
}

impl KeyPair {
    /// Pair a private key with its already-derived public key
    pub fn new(private: PrivateKey, public: PublicKey) -> Self {
        Self { private, public }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish()
    }
}

/// Symmetric pre-shared key for exactly one peering relationship
#[derive(Clone, PartialEq, Eq)]
pub struct PresharedKey {
    bytes: [u8; KEY_LENGTH],
}

impl PresharedKey {
    /// Generate 32 random bytes; every call is independent
    pub fn generate() -> Self {
        Self { bytes: random_bytes() }
    }

    /// Create from base64 string
    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        decode_key(s).map(|bytes| Self { bytes })
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes)
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PresharedKey([redacted])")
    }
}

/// Key parsing and derivation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid base64 encoding")]
    InvalidBase64,

    #[error("Invalid key length (expected 32 bytes)")]
    InvalidLength,

    #[error("Public key derivation unavailable: {0}")]
    DerivationUnavailable(String),
}
