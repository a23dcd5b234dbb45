use std::{fmt, sync::Arc};

use josekit::jwk::Jwk;

/// Raw key material behind a signing key.
///
/// Cheap to clone; the bytes are shared and never mutated after creation.
#[derive(Clone)]
pub enum KeyMaterial {
    /// No key (unsecured tokens only).
    Empty,
    /// HMAC shared secret.
    Secret(Arc<[u8]>),
    /// Asymmetric pair: PKCS#8 PEM private key plus its public JWK.
    KeyPair {
        private_pem: Arc<[u8]>,
        public_jwk: Arc<Jwk>,
    },
    /// Verification-only public key.
    PublicOnly(Arc<Jwk>),
}

impl KeyMaterial {
    pub fn secret(bytes: Vec<u8>) -> Self {
        Self::Secret(Arc::from(bytes))
    }

    pub fn key_pair(private_pem: Vec<u8>, public_jwk: Jwk) -> Self {
        Self::KeyPair {
            private_pem: Arc::from(private_pem),
            public_jwk: Arc::new(public_jwk),
        }
    }

    pub fn public_jwk(&self) -> Option<&Jwk> {
        match self {
            Self::KeyPair { public_jwk, .. } => Some(public_jwk),
            Self::PublicOnly(jwk) => Some(jwk),
            Self::Empty | Self::Secret(_) => None,
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secrets or private keys.
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Secret(_) => f.write_str("Secret(..)"),
            Self::KeyPair { .. } => f.write_str("KeyPair(..)"),
            Self::PublicOnly(_) => f.write_str("PublicOnly(..)"),
        }
    }
}
