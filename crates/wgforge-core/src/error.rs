//! Error types for configuration generation

use crate::keys::KeyError;

/// Result type for planning, key and topology operations
pub type Result<T> = std::result::Result<T, Error>;

/// Generation errors
///
/// Planner and key ring raise these immediately; the topology builder
/// and generator propagate them untouched to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Invalid address block: {0}")]
    InvalidAddressBlock(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Insufficient address space: {0}")]
    InsufficientAddressSpace(String),

    #[error("Key derivation unavailable: {0}")]
    KeyDerivationUnavailable(String),

    #[error("Topology precondition failed: {0}")]
    TopologyPrecondition(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Key generation task failed: {0}")]
    Task(String),
}

impl From<KeyError> for Error {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::DerivationUnavailable(reason) => Error::KeyDerivationUnavailable(reason),
            other => Error::InvalidKeyFormat(other.to_string()),
        }
    }
}
