use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::services::crypto::{SignatureAlgorithm, random::random_token};
use crate::services::token::JwtSigner;
use crate::services::uma::error::UmaError;

/// Produces the bearer codes of RPTs and PCTs: opaque random strings, or
/// signed JWTs when configured. The store stays authoritative either way.
#[derive(Debug, Clone)]
pub struct CodeFactory {
    signer: JwtSigner,
    algorithm: SignatureAlgorithm,
}

impl CodeFactory {
    pub fn new(signer: JwtSigner, algorithm: SignatureAlgorithm) -> Self {
        Self { signer, algorithm }
    }

    pub fn opaque(&self) -> Result<String, UmaError> {
        Ok(random_token()?)
    }

    pub fn jwt(
        &self,
        client_id: &str,
        subject: Option<&str>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, UmaError> {
        let mut claims = Map::new();
        claims.insert("jti".into(), Value::String(Uuid::new_v4().to_string()));
        claims.insert("client_id".into(), Value::String(client_id.to_string()));
        if let Some(sub) = subject {
            claims.insert("sub".into(), Value::String(sub.to_string()));
        }
        claims.insert("iat".into(), issued_at.timestamp().into());
        claims.insert("exp".into(), expires_at.timestamp().into());
        Ok(self.signer.sign(self.algorithm, &claims)?)
    }

    pub fn code(
        &self,
        as_jwt: bool,
        client_id: &str,
        subject: Option<&str>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, UmaError> {
        if as_jwt {
            self.jwt(client_id, subject, issued_at, expires_at)
        } else {
            self.opaque()
        }
    }
}
