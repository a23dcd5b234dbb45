use thiserror::Error;

use crate::services::crypto::{CryptoError, SignatureAlgorithm};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("no active key for {0}")]
    NoActiveKey(SignatureAlgorithm),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
