use thiserror::Error;

use crate::services::crypto::algorithm::SignatureAlgorithm;

/// Errors raised on the signing side.
///
/// Validation never surfaces these: a failed validation is just `false`.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("missing signing input")]
    MissingSigningInput,

    #[error("missing key material for {0}")]
    MissingKey(SignatureAlgorithm),

    #[error("key material does not fit {0}")]
    KeyMismatch(SignatureAlgorithm),

    #[error("malformed signature encoding")]
    MalformedSignature,

    #[error("jose error: {0}")]
    Jose(#[from] josekit::JoseError),

    #[error("random source unavailable: {0}")]
    Random(String),
}
