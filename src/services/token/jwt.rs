//! JWS compact serialization on top of `SignatureEngine` and `KeyRegistry`.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::services::crypto::{SignatureAlgorithm, SignatureEngine, signature::UnsecuredEngine};
use crate::services::keys::KeyRegistry;
use crate::services::token::error::TokenError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// A parsed token together with the exact bytes its signature covers.
#[derive(Debug, Clone)]
pub struct SignedToken {
    header: JwtHeader,
    claims: Map<String, Value>,
    signature: String,
    signing_input: String,
}

impl SignedToken {
    pub fn parse(compact: &str) -> Result<Self, TokenError> {
        let mut parts = compact.trim().split('.');
        let (Some(h), Some(c), Some(s), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header: JwtHeader = decode_segment(h)?;
        let claims: Map<String, Value> = decode_segment(c)?;

        Ok(Self {
            header,
            claims,
            signature: s.to_string(),
            signing_input: format!("{h}.{c}"),
        })
    }

    /// `base64url(header) "." base64url(claims)`.
    pub fn signing_input_for(
        header: &JwtHeader,
        claims: &Map<String, Value>,
    ) -> Result<String, TokenError> {
        let h = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header)?);
        let c = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        Ok(format!("{h}.{c}"))
    }

    pub fn header(&self) -> &JwtHeader {
        &self.header
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn into_claims(self) -> Map<String, Value> {
        self.claims
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn signing_input(&self) -> &str {
        &self.signing_input
    }

    pub fn compact(&self) -> String {
        format!("{}.{}", self.signing_input, self.signature)
    }

    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    pub fn claim_i64(&self, name: &str) -> Option<i64> {
        self.claims.get(name).and_then(Value::as_i64)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

/// Signs claims with the current active key of the requested algorithm.
#[derive(Debug, Clone)]
pub struct JwtSigner {
    keys: Arc<KeyRegistry>,
}

impl JwtSigner {
    pub fn new(keys: Arc<KeyRegistry>) -> Self {
        Self { keys }
    }

    pub fn sign(
        &self,
        algorithm: SignatureAlgorithm,
        claims: &Map<String, Value>,
    ) -> Result<String, TokenError> {
        self.sign_typed(algorithm, "JWT", claims)
    }

    /// Same as `sign` with an explicit `typ` header (e.g. `at+jwt`).
    pub fn sign_typed(
        &self,
        algorithm: SignatureAlgorithm,
        typ: &str,
        claims: &Map<String, Value>,
    ) -> Result<String, TokenError> {
        let (engine, kid): (Box<dyn SignatureEngine>, Option<String>) =
            if algorithm == SignatureAlgorithm::None {
                (Box::new(UnsecuredEngine), None)
            } else {
                let key = self.keys.active_key(algorithm)?;
                (key.engine(), Some(key.kid().to_string()))
            };

        let header = JwtHeader {
            alg: algorithm.to_string(),
            typ: Some(typ.to_string()),
            kid,
        };
        let signing_input = SignedToken::signing_input_for(&header, claims)?;
        let signature = engine.sign(&signing_input)?;
        Ok(format!("{signing_input}.{signature}"))
    }
}

/// Verifies tokens issued by this server, including ones signed with keys
/// that have since been rotated out of the published set.
#[derive(Debug, Clone)]
pub struct JwtVerifier {
    keys: Arc<KeyRegistry>,
    leeway_seconds: i64,
    allow_unsecured: bool,
}

impl JwtVerifier {
    pub fn new(keys: Arc<KeyRegistry>, leeway_seconds: i64) -> Self {
        Self {
            keys,
            leeway_seconds,
            allow_unsecured: false,
        }
    }

    pub fn allow_unsecured(mut self, allow: bool) -> Self {
        self.allow_unsecured = allow;
        self
    }

    /// Signature check, then `exp`/`nbf` against `now`.
    pub fn verify(&self, compact: &str, now: DateTime<Utc>) -> Result<SignedToken, TokenError> {
        let token = SignedToken::parse(compact)?;
        let alg: SignatureAlgorithm = token
            .header
            .alg
            .parse()
            .map_err(|_| TokenError::UnsupportedAlgorithm(token.header.alg.clone()))?;

        let valid = if alg == SignatureAlgorithm::None {
            if !self.allow_unsecured {
                return Err(TokenError::Unsecured);
            }
            UnsecuredEngine.validate(token.signing_input(), token.signature())
        } else {
            let kid = token.header.kid.as_deref().ok_or(TokenError::MissingKid)?;
            let key = self
                .keys
                .verification_key(kid)
                .ok_or_else(|| TokenError::UnknownKey(kid.to_string()))?;
            if key.algorithm() != alg {
                return Err(TokenError::AlgorithmMismatch);
            }
            key.engine()
                .validate(token.signing_input(), token.signature())
        };

        if !valid {
            warn!(alg = %alg, kid = ?token.header.kid, "token signature rejected");
            return Err(TokenError::InvalidSignature);
        }

        let now = now.timestamp();
        if let Some(exp) = token.claim_i64("exp")
            && now > exp + self.leeway_seconds
        {
            return Err(TokenError::Expired);
        }
        if let Some(nbf) = token.claim_i64("nbf")
            && now + self.leeway_seconds < nbf
        {
            return Err(TokenError::NotYetValid);
        }

        Ok(token)
    }
}
