//! ID token minting. Codes, access tokens and state issued alongside the ID
//! token are bound to it through their hash claims.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::services::crypto::{
    HashBinder, SignatureAlgorithm,
    hash_binding::{ACCESS_TOKEN_HASH, CODE_HASH, STATE_HASH},
};
use crate::services::token::{error::TokenError, jwt::JwtSigner};

/// Inputs for one ID token. Artifacts left as `None` get no hash claim.
#[derive(Debug, Clone, Default)]
pub struct IdTokenRequest<'a> {
    pub subject: &'a str,
    pub audience: &'a str,
    pub nonce: Option<&'a str>,
    pub auth_time: Option<DateTime<Utc>>,
    pub code: Option<&'a str>,
    pub access_token: Option<&'a str>,
    pub state: Option<&'a str>,
    /// Extra claims (e.g. `email`). Registered claims above take precedence.
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct IdTokenFactory {
    signer: JwtSigner,
    issuer: String,
    algorithm: SignatureAlgorithm,
    ttl_seconds: u64,
}

impl IdTokenFactory {
    pub fn new(
        signer: JwtSigner,
        issuer: impl Into<String>,
        algorithm: SignatureAlgorithm,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            signer,
            issuer: issuer.into(),
            algorithm,
            ttl_seconds,
        }
    }

    pub fn create(&self, req: IdTokenRequest<'_>, now: DateTime<Utc>) -> Result<String, TokenError> {
        if req.subject.trim().is_empty() {
            return Err(TokenError::InvalidClaim("sub"));
        }
        if req.audience.trim().is_empty() {
            return Err(TokenError::InvalidClaim("aud"));
        }

        let mut claims = req.extra;
        let iat = now.timestamp();
        claims.insert("iss".into(), self.issuer.clone().into());
        claims.insert("sub".into(), req.subject.into());
        claims.insert("aud".into(), req.audience.into());
        claims.insert("iat".into(), iat.into());
        claims.insert("exp".into(), (iat + self.ttl_seconds as i64).into());
        if let Some(nonce) = req.nonce {
            claims.insert("nonce".into(), nonce.into());
        }
        if let Some(auth_time) = req.auth_time {
            claims.insert("auth_time".into(), auth_time.timestamp().into());
        }

        let binder = HashBinder::new(Some(self.algorithm));
        for (claim, value) in [
            (CODE_HASH, req.code),
            (ACCESS_TOKEN_HASH, req.access_token),
            (STATE_HASH, req.state),
        ] {
            if let Some(hash) = value.and_then(|v| binder.compute(v)) {
                claims.insert(claim.into(), hash.into());
            }
        }

        self.signer.sign(self.algorithm, &claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::keys::{KeyRegistry, KeySettings};
    use crate::services::token::jwt::JwtVerifier;
    use std::sync::Arc;

    fn keys() -> Arc<KeyRegistry> {
        let settings = KeySettings {
            algorithms: vec![SignatureAlgorithm::ES256],
            ..KeySettings::default()
        };
        Arc::new(KeyRegistry::bootstrap(settings, Utc::now()).unwrap())
    }

    #[test]
    fn id_token_binds_code_token_and_state() {
        let keys = keys();
        let now = Utc::now();
        let factory = IdTokenFactory::new(
            JwtSigner::new(keys.clone()),
            "https://as.example",
            SignatureAlgorithm::ES256,
            300,
        );

        let jwt = factory
            .create(
                IdTokenRequest {
                    subject: "alice",
                    audience: "client-1",
                    nonce: Some("n-0S6_WzA2Mj"),
                    code: Some("the-code"),
                    access_token: Some("the-access-token"),
                    state: Some("xyz"),
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        let token = JwtVerifier::new(keys, 0).verify(&jwt, now).unwrap();
        let binder = HashBinder::for_header_alg(&token.header().alg);
        assert!(binder.validate_authorization_code(Some("the-code"), token.claims()));
        assert!(binder.validate_access_token(Some("the-access-token"), token.claims()));
        assert!(binder.validate_state(Some("xyz"), token.claims()));
        assert!(!binder.validate_access_token(Some("another-token"), token.claims()));
        assert_eq!(token.claim_str("nonce"), Some("n-0S6_WzA2Mj"));
    }

    #[test]
    fn missing_artifacts_get_no_hash_claim() {
        let keys = keys();
        let now = Utc::now();
        let factory =
            IdTokenFactory::new(JwtSigner::new(keys.clone()), "iss", SignatureAlgorithm::ES256, 300);
        let jwt = factory
            .create(
                IdTokenRequest {
                    subject: "alice",
                    audience: "client-1",
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        let token = JwtVerifier::new(keys, 0).verify(&jwt, now).unwrap();
        assert!(token.claims().get(CODE_HASH).is_none());
        assert!(token.claims().get(ACCESS_TOKEN_HASH).is_none());
        assert!(token.claims().get(STATE_HASH).is_none());
    }

    #[test]
    fn blank_subject_is_rejected() {
        let factory =
            IdTokenFactory::new(JwtSigner::new(keys()), "iss", SignatureAlgorithm::ES256, 300);
        let req = IdTokenRequest {
            subject: " ",
            audience: "client-1",
            ..Default::default()
        };
        assert!(factory.create(req, Utc::now()).is_err());
    }
}
