use chrono::{DateTime, Duration, Utc};
use josekit::jwk::KeyPair as _;
use josekit::jws;
use uuid::Uuid;

use crate::services::crypto::{
    AlgorithmFamily, CryptoError, KeyMaterial, SignatureAlgorithm, random::random_bytes,
};
use crate::services::keys::signing_key::SigningKey;

const RSA_BITS: u32 = 2048;
const HMAC_SECRET_LEN: usize = 64;

/// Generate a fresh active key for `algorithm`, valid for `lifetime`.
pub fn generate(
    algorithm: SignatureAlgorithm,
    now: DateTime<Utc>,
    lifetime: Duration,
) -> Result<SigningKey, CryptoError> {
    let kid = new_kid(algorithm);

    let material = match algorithm.family() {
        AlgorithmFamily::None => return Err(CryptoError::UnsupportedAlgorithm("none".into())),
        AlgorithmFamily::Hmac => KeyMaterial::secret(random_bytes(HMAC_SECRET_LEN)?),
        AlgorithmFamily::Rsa => {
            let pair = jws::RS256.generate_key_pair(RSA_BITS)?;
            let mut jwk = pair.to_jwk_public_key();
            tag_jwk(&mut jwk, &kid, algorithm);
            KeyMaterial::key_pair(pair.to_pem_private_key(), jwk)
        }
        AlgorithmFamily::Ec => {
            let pair = match algorithm {
                SignatureAlgorithm::ES384 => jws::ES384.generate_key_pair()?,
                SignatureAlgorithm::ES512 => jws::ES512.generate_key_pair()?,
                _ => jws::ES256.generate_key_pair()?,
            };
            let mut jwk = pair.to_jwk_public_key();
            tag_jwk(&mut jwk, &kid, algorithm);
            KeyMaterial::key_pair(pair.to_pem_private_key(), jwk)
        }
    };

    Ok(SigningKey::new(kid, algorithm, material, now, now + lifetime))
}

fn tag_jwk(jwk: &mut josekit::jwk::Jwk, kid: &str, algorithm: SignatureAlgorithm) {
    jwk.set_key_id(kid);
    jwk.set_algorithm(algorithm.as_str());
    jwk.set_key_use("sig");
}

// `<uuid>_sig_<alg>` keeps kids unique and readable in logs.
fn new_kid(algorithm: SignatureAlgorithm) -> String {
    format!(
        "{}_sig_{}",
        Uuid::new_v4(),
        algorithm.as_str().to_ascii_lowercase()
    )
}
