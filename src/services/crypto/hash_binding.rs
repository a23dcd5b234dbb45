//! Left-half digest bindings carried in ID tokens (`c_hash`, `at_hash`, `s_hash`).

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};
use tracing::debug;

use crate::services::crypto::algorithm::{DigestAlgorithm, SignatureAlgorithm};

/// Authorization code binding.
pub const CODE_HASH: &str = "c_hash";
/// Access token binding.
pub const ACCESS_TOKEN_HASH: &str = "at_hash";
/// State binding.
pub const STATE_HASH: &str = "s_hash";

/// Computes and checks hash bindings for one JOSE `alg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashBinder {
    algorithm: Option<SignatureAlgorithm>,
}

impl HashBinder {
    pub fn new(algorithm: Option<SignatureAlgorithm>) -> Self {
        Self { algorithm }
    }

    /// Binder for the `alg` header of a token. Unknown names leave it unset.
    pub fn for_header_alg(alg: &str) -> Self {
        Self::new(alg.parse().ok())
    }

    pub fn algorithm(&self) -> Option<SignatureAlgorithm> {
        self.algorithm
    }

    /// base64url(left half of digest(value)), or `None` without a usable digest.
    pub fn compute(&self, value: &str) -> Option<String> {
        let digest = self.algorithm?.hash_digest()?;
        Some(left_half_hash(digest, value))
    }

    pub fn validate_authorization_code(&self, code: Option<&str>, claims: &Map<String, Value>) -> bool {
        self.validate(code, claims, CODE_HASH)
    }

    pub fn validate_access_token(
        &self,
        access_token: Option<&str>,
        claims: &Map<String, Value>,
    ) -> bool {
        self.validate(access_token, claims, ACCESS_TOKEN_HASH)
    }

    pub fn validate_state(&self, state: Option<&str>, claims: &Map<String, Value>) -> bool {
        self.validate(state, claims, STATE_HASH)
    }

    fn validate(&self, value: Option<&str>, claims: &Map<String, Value>, claim: &str) -> bool {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            return false;
        };
        let Some(expected) = claims.get(claim).and_then(Value::as_str) else {
            debug!(claim, "hash binding claim missing");
            return false;
        };
        match self.compute(value) {
            Some(actual) => actual == expected,
            None => {
                debug!(claim, alg = ?self.algorithm, "no digest for hash binding");
                false
            }
        }
    }
}

pub fn left_half_hash(digest: DigestAlgorithm, value: &str) -> String {
    let bytes = digest.digest(value.as_bytes());
    URL_SAFE_NO_PAD.encode(&bytes[..bytes.len() / 2])
}
