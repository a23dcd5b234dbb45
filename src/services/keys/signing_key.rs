use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::services::crypto::{KeyMaterial, SignatureAlgorithm, SignatureEngine, engine_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Archived,
}

/// A signing key. Material is fixed at construction; rotation produces new
/// values instead of mutating existing ones.
#[derive(Debug, Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: SignatureAlgorithm,
    material: KeyMaterial,
    status: KeyStatus,
    created_at: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl SigningKey {
    pub fn new(
        kid: impl Into<String>,
        algorithm: SignatureAlgorithm,
        material: KeyMaterial,
        created_at: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Self {
        Self {
            kid: kid.into(),
            algorithm,
            material,
            status: KeyStatus::Active,
            created_at,
            not_after,
        }
    }

    /// The archived copy of this key, retained until `retain_until`.
    pub fn archived(&self, retain_until: DateTime<Utc>) -> Self {
        Self {
            status: KeyStatus::Archived,
            not_after: retain_until.max(self.not_after),
            ..self.clone()
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    pub fn status(&self) -> KeyStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn engine(&self) -> Box<dyn SignatureEngine> {
        engine_for(self.algorithm, self.material.clone())
    }

    /// Public JWK as published in the JWKS. HMAC secrets have none.
    pub fn public_jwk(&self) -> Option<Map<String, Value>> {
        let jwk = self.material.public_jwk()?;
        let mut map = AsRef::<Map<String, Value>>::as_ref(jwk).clone();
        map.insert("kid".into(), Value::String(self.kid.clone()));
        map.insert("alg".into(), Value::String(self.algorithm.to_string()));
        map.insert("use".into(), Value::String("sig".into()));
        Some(map)
    }
}
