//! Per-algorithm sign/validate over an opaque JWS signing input.
//!
//! `sign` may fail (configuration problems are fatal to that one operation).
//! `validate` is fail-closed: every internal error ends up as `false`.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use josekit::jws::{self, JwsSigner, JwsVerifier};
use tracing::debug;

use crate::services::crypto::{
    algorithm::{AlgorithmFamily, SignatureAlgorithm},
    error::CryptoError,
    key_material::KeyMaterial,
};

pub trait SignatureEngine: Send + Sync {
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Returns the base64url (unpadded) signature of `signing_input`.
    fn sign(&self, signing_input: &str) -> Result<String, CryptoError>;

    /// `true` only when `signature` is a valid signature of `signing_input`.
    fn validate(&self, signing_input: &str, signature: &str) -> bool;
}

/// Build the engine for `algorithm` backed by `material`.
///
/// Mismatched or missing material is not rejected here; it shows up as a
/// `sign` error or a `false` validation.
pub fn engine_for(algorithm: SignatureAlgorithm, material: KeyMaterial) -> Box<dyn SignatureEngine> {
    match algorithm.family() {
        AlgorithmFamily::None => Box::new(UnsecuredEngine),
        _ => Box::new(JoseEngine {
            algorithm,
            material,
        }),
    }
}

/// `alg=none`: empty signature, validates only against an empty signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsecuredEngine;

impl SignatureEngine for UnsecuredEngine {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::None
    }

    fn sign(&self, signing_input: &str) -> Result<String, CryptoError> {
        if signing_input.is_empty() {
            return Err(CryptoError::MissingSigningInput);
        }
        Ok(String::new())
    }

    fn validate(&self, signing_input: &str, signature: &str) -> bool {
        !signing_input.is_empty() && signature.is_empty()
    }
}

/// HMAC, RSA and EC families through josekit.
#[derive(Debug, Clone)]
pub struct JoseEngine {
    algorithm: SignatureAlgorithm,
    material: KeyMaterial,
}

impl JoseEngine {
    fn signer(&self) -> Result<Box<dyn JwsSigner>, CryptoError> {
        let alg = self.algorithm;
        match (alg.family(), &self.material) {
            (AlgorithmFamily::Hmac, KeyMaterial::Secret(secret)) => hmac_signer(alg, secret),
            (AlgorithmFamily::Rsa | AlgorithmFamily::Ec, KeyMaterial::KeyPair { private_pem, .. }) => {
                pem_signer(alg, private_pem)
            }
            (_, KeyMaterial::Empty | KeyMaterial::PublicOnly(_)) => Err(CryptoError::MissingKey(alg)),
            _ => Err(CryptoError::KeyMismatch(alg)),
        }
    }

    fn verifier(&self) -> Result<Box<dyn JwsVerifier>, CryptoError> {
        let alg = self.algorithm;
        match (alg.family(), &self.material) {
            (AlgorithmFamily::Hmac, KeyMaterial::Secret(secret)) => hmac_verifier(alg, secret),
            (AlgorithmFamily::Rsa | AlgorithmFamily::Ec, material) => match material.public_jwk() {
                Some(jwk) => jwk_verifier(alg, jwk),
                None => Err(CryptoError::MissingKey(alg)),
            },
            (_, KeyMaterial::Empty) => Err(CryptoError::MissingKey(alg)),
            _ => Err(CryptoError::KeyMismatch(alg)),
        }
    }

    fn try_validate(&self, signing_input: &str, signature: &str) -> Result<bool, CryptoError> {
        if signing_input.is_empty() || signature.is_empty() {
            return Ok(false);
        }
        let raw = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CryptoError::MalformedSignature)?;
        let verifier = self.verifier()?;
        Ok(verifier.verify(signing_input.as_bytes(), &raw).is_ok())
    }
}

impl SignatureEngine for JoseEngine {
    fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn sign(&self, signing_input: &str) -> Result<String, CryptoError> {
        if signing_input.is_empty() {
            return Err(CryptoError::MissingSigningInput);
        }
        let signer = self.signer()?;
        let raw = signer.sign(signing_input.as_bytes())?;
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    fn validate(&self, signing_input: &str, signature: &str) -> bool {
        match self.try_validate(signing_input, signature) {
            Ok(valid) => valid,
            Err(e) => {
                debug!(alg = %self.algorithm, error = %e, "signature validation error treated as invalid");
                false
            }
        }
    }
}

fn hmac_signer(alg: SignatureAlgorithm, secret: &[u8]) -> Result<Box<dyn JwsSigner>, CryptoError> {
    let signer: Box<dyn JwsSigner> = match alg {
        SignatureAlgorithm::HS256 => Box::new(jws::HS256.signer_from_bytes(secret)?),
        SignatureAlgorithm::HS384 => Box::new(jws::HS384.signer_from_bytes(secret)?),
        SignatureAlgorithm::HS512 => Box::new(jws::HS512.signer_from_bytes(secret)?),
        other => return Err(CryptoError::KeyMismatch(other)),
    };
    Ok(signer)
}

fn hmac_verifier(
    alg: SignatureAlgorithm,
    secret: &[u8],
) -> Result<Box<dyn JwsVerifier>, CryptoError> {
    let verifier: Box<dyn JwsVerifier> = match alg {
        SignatureAlgorithm::HS256 => Box::new(jws::HS256.verifier_from_bytes(secret)?),
        SignatureAlgorithm::HS384 => Box::new(jws::HS384.verifier_from_bytes(secret)?),
        SignatureAlgorithm::HS512 => Box::new(jws::HS512.verifier_from_bytes(secret)?),
        other => return Err(CryptoError::KeyMismatch(other)),
    };
    Ok(verifier)
}

fn pem_signer(alg: SignatureAlgorithm, pem: &[u8]) -> Result<Box<dyn JwsSigner>, CryptoError> {
    let signer: Box<dyn JwsSigner> = match alg {
        SignatureAlgorithm::RS256 => Box::new(jws::RS256.signer_from_pem(pem)?),
        SignatureAlgorithm::RS384 => Box::new(jws::RS384.signer_from_pem(pem)?),
        SignatureAlgorithm::RS512 => Box::new(jws::RS512.signer_from_pem(pem)?),
        SignatureAlgorithm::ES256 => Box::new(jws::ES256.signer_from_pem(pem)?),
        SignatureAlgorithm::ES384 => Box::new(jws::ES384.signer_from_pem(pem)?),
        SignatureAlgorithm::ES512 => Box::new(jws::ES512.signer_from_pem(pem)?),
        other => return Err(CryptoError::KeyMismatch(other)),
    };
    Ok(signer)
}

fn jwk_verifier(
    alg: SignatureAlgorithm,
    jwk: &josekit::jwk::Jwk,
) -> Result<Box<dyn JwsVerifier>, CryptoError> {
    let verifier: Box<dyn JwsVerifier> = match alg {
        SignatureAlgorithm::RS256 => Box::new(jws::RS256.verifier_from_jwk(jwk)?),
        SignatureAlgorithm::RS384 => Box::new(jws::RS384.verifier_from_jwk(jwk)?),
        SignatureAlgorithm::RS512 => Box::new(jws::RS512.verifier_from_jwk(jwk)?),
        SignatureAlgorithm::ES256 => Box::new(jws::ES256.verifier_from_jwk(jwk)?),
        SignatureAlgorithm::ES384 => Box::new(jws::ES384.verifier_from_jwk(jwk)?),
        SignatureAlgorithm::ES512 => Box::new(jws::ES512.verifier_from_jwk(jwk)?),
        other => return Err(CryptoError::KeyMismatch(other)),
    };
    Ok(verifier)
}
