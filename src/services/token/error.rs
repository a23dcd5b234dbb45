use thiserror::Error;

use crate::services::crypto::CryptoError;
use crate::services::keys::KeyError;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("unsupported alg: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unsecured tokens are not accepted")]
    Unsecured,

    #[error("missing kid")]
    MissingKid,

    #[error("unknown kid: {0}")]
    UnknownKey(String),

    #[error("alg does not match key")]
    AlgorithmMismatch,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("invalid claim: {0}")]
    InvalidClaim(&'static str),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("claims serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
