use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::crypto::SignatureAlgorithm;
use crate::services::token::{
    error::TokenError,
    jwt::{JwtSigner, JwtVerifier},
};

pub const ACCESS_TOKEN_TYPE: &str = "at+jwt";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub client_id: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Verified access token, reduced to what request handling needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAccessToken {
    pub client_id: String,
    pub subject: String,
    pub scopes: Vec<String>,
    pub jti: String,
}

impl VerifiedAccessToken {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub access_token: String,
    pub expires_in: u64,
    pub scope: Option<String>,
}

/// Issues and verifies the server's own access tokens (PATs included).
#[derive(Debug, Clone)]
pub struct AccessTokenService {
    signer: JwtSigner,
    verifier: JwtVerifier,
    issuer: String,
    algorithm: SignatureAlgorithm,
    ttl_seconds: u64,
}

impl AccessTokenService {
    pub fn new(
        signer: JwtSigner,
        verifier: JwtVerifier,
        issuer: impl Into<String>,
        algorithm: SignatureAlgorithm,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            signer,
            verifier,
            issuer: issuer.into(),
            algorithm,
            ttl_seconds,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Issue a client-credentials access token. The client is its own subject.
    pub fn issue(
        &self,
        client_id: &str,
        scopes: &[String],
        now: DateTime<Utc>,
    ) -> Result<IssuedAccessToken, TokenError> {
        let iat = now.timestamp();
        let scope = (!scopes.is_empty()).then(|| scopes.join(" "));

        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            aud: self.issuer.clone(),
            sub: client_id.to_string(),
            client_id: client_id.to_string(),
            iat,
            exp: iat + self.ttl_seconds as i64,
            jti: Uuid::new_v4().to_string(),
            scope: scope.clone(),
        };

        let serde_json::Value::Object(map) = serde_json::to_value(&claims)? else {
            return Err(TokenError::InvalidClaim("claims"));
        };
        let access_token = self
            .signer
            .sign_typed(self.algorithm, ACCESS_TOKEN_TYPE, &map)?;

        Ok(IssuedAccessToken {
            access_token,
            expires_in: self.ttl_seconds,
            scope,
        })
    }

    /// Signature and expiry via `JwtVerifier`, then strict claim checks.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedAccessToken, TokenError> {
        let signed = self.verifier.verify(token, now)?;
        if signed.header().typ.as_deref() != Some(ACCESS_TOKEN_TYPE) {
            return Err(TokenError::InvalidClaim("typ"));
        }

        let claims: AccessTokenClaims =
            serde_json::from_value(serde_json::Value::Object(signed.into_claims()))
                .map_err(|_| TokenError::Malformed)?;

        if claims.iss != self.issuer {
            return Err(TokenError::InvalidClaim("iss"));
        }
        if claims.aud != self.issuer {
            return Err(TokenError::InvalidClaim("aud"));
        }
        if claims.client_id.trim().is_empty() {
            return Err(TokenError::InvalidClaim("client_id"));
        }
        if claims.sub.trim().is_empty() {
            return Err(TokenError::InvalidClaim("sub"));
        }

        Ok(VerifiedAccessToken {
            client_id: claims.client_id,
            subject: claims.sub,
            scopes: claims
                .scope
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            jti: claims.jti,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::keys::{KeyRegistry, KeySettings};
    use chrono::Duration;
    use std::sync::Arc;

    fn service(issuer: &str, keys: Arc<KeyRegistry>) -> AccessTokenService {
        AccessTokenService::new(
            JwtSigner::new(keys.clone()),
            JwtVerifier::new(keys, 0),
            issuer,
            SignatureAlgorithm::ES256,
            60,
        )
    }

    fn keys() -> Arc<KeyRegistry> {
        let settings = KeySettings {
            algorithms: vec![SignatureAlgorithm::ES256, SignatureAlgorithm::HS256],
            ..KeySettings::default()
        };
        Arc::new(KeyRegistry::bootstrap(settings, Utc::now()).unwrap())
    }

    #[test]
    fn issued_token_verifies_with_scopes() {
        let svc = service("https://as.example", keys());
        let now = Utc::now();
        let issued = svc
            .issue("rs-1", &["uma_protection".into(), "openid".into()], now)
            .unwrap();
        assert_eq!(issued.scope.as_deref(), Some("uma_protection openid"));

        let verified = svc.verify(&issued.access_token, now).unwrap();
        assert_eq!(verified.client_id, "rs-1");
        assert!(verified.has_scope("uma_protection"));
        assert!(!verified.has_scope("uma_authorization"));
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let keys = keys();
        let now = Utc::now();
        let other = service("https://other.example", keys.clone());
        let token = other.issue("rs-1", &[], now).unwrap().access_token;

        let err = service("https://as.example", keys).verify(&token, now).unwrap_err();
        assert!(matches!(err, TokenError::InvalidClaim("iss")));
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = service("https://as.example", keys());
        let issued_at = Utc::now() - Duration::minutes(5);
        let token = svc.issue("rs-1", &[], issued_at).unwrap().access_token;
        assert!(matches!(svc.verify(&token, Utc::now()), Err(TokenError::Expired)));
    }

    #[test]
    fn plain_jwt_is_not_an_access_token() {
        let keys = keys();
        let now = Utc::now();
        let claims = serde_json::json!({
            "iss": "https://as.example", "aud": "https://as.example", "sub": "x",
            "client_id": "x", "iat": now.timestamp(), "exp": now.timestamp() + 60, "jti": "j"
        });
        let token = JwtSigner::new(keys.clone())
            .sign(SignatureAlgorithm::ES256, claims.as_object().unwrap())
            .unwrap();
        let err = service("https://as.example", keys).verify(&token, now).unwrap_err();
        assert!(matches!(err, TokenError::InvalidClaim("typ")));
    }
}
