use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::services::crypto::error::CryptoError;

/// JWS `alg` values this server can produce and check.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "none")]
    None,
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
    ES256,
    ES384,
    ES512,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmFamily {
    /// Unsecured JWS: empty signature.
    None,
    Hmac,
    Rsa,
    Ec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn digest(&self, input: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(input).to_vec(),
            Self::Sha384 => Sha384::digest(input).to_vec(),
            Self::Sha512 => Sha512::digest(input).to_vec(),
        }
    }
}

impl SignatureAlgorithm {
    pub const ALL: [SignatureAlgorithm; 10] = [
        Self::None,
        Self::HS256,
        Self::HS384,
        Self::HS512,
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::ES256,
        Self::ES384,
        Self::ES512,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
        }
    }

    pub fn family(&self) -> AlgorithmFamily {
        match self {
            Self::None => AlgorithmFamily::None,
            Self::HS256 | Self::HS384 | Self::HS512 => AlgorithmFamily::Hmac,
            Self::RS256 | Self::RS384 | Self::RS512 => AlgorithmFamily::Rsa,
            Self::ES256 | Self::ES384 | Self::ES512 => AlgorithmFamily::Ec,
        }
    }

    /// Digest used for `at_hash` / `c_hash` / `s_hash`: the hash half of the
    /// JOSE algorithm (OpenID Connect Core, section 3.1.3.6).
    ///
    /// `none` has no hash and therefore no binding.
    pub fn hash_digest(&self) -> Option<DigestAlgorithm> {
        match self {
            Self::None => None,
            Self::HS256 | Self::RS256 | Self::ES256 => Some(DigestAlgorithm::Sha256),
            Self::HS384 | Self::RS384 | Self::ES384 => Some(DigestAlgorithm::Sha384),
            Self::HS512 | Self::RS512 | Self::ES512 => Some(DigestAlgorithm::Sha512),
        }
    }

    /// Keys of this algorithm may be published in the JWKS.
    pub fn is_asymmetric(&self) -> bool {
        matches!(self.family(), AlgorithmFamily::Rsa | AlgorithmFamily::Ec)
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|alg| alg.as_str() == s.trim())
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm(s.to_string()))
    }
}
