/*
 * Responsibility
 * - PCT (persisted claims token) の発行と claims の merge
 * - claims は増える一方 (同名 claim は後勝ち)
 * - 壊れた claims blob は空 map + error log で扱う (呼び出し側には返さない)
 */
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::repos::{EntityStore, merge};
use crate::services::uma::{
    code::CodeFactory,
    error::UmaError,
    settings::{UmaSettings, store_ttl},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pct {
    pub code: String,
    pub client_id: String,
    /// JSON object, kept serialized the way it is persisted.
    pub claims: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Pct {
    /// Parsed claims. A corrupt blob reads as no claims.
    pub fn claims(&self) -> Map<String, Value> {
        match serde_json::from_str::<Map<String, Value>>(&self.claims) {
            Ok(map) => map,
            Err(err) => {
                error!(client_id = %self.client_id, error = %err, "unreadable pct claims, treating as empty");
                Map::new()
            }
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Clone)]
pub struct ClaimsCollector {
    store: Arc<dyn EntityStore<Pct>>,
    codes: CodeFactory,
    settings: UmaSettings,
}

impl std::fmt::Debug for ClaimsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimsCollector")
            .field("pct_lifetime", &self.settings.pct_lifetime)
            .field("pct_as_jwt", &self.settings.pct_as_jwt)
            .finish()
    }
}

impl ClaimsCollector {
    pub fn new(store: Arc<dyn EntityStore<Pct>>, codes: CodeFactory, settings: UmaSettings) -> Self {
        Self {
            store,
            codes,
            settings,
        }
    }

    pub fn get_valid(&self, code: &str, now: DateTime<Utc>) -> Result<Pct, UmaError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(UmaError::InvalidPct);
        }
        match self.store.find(code)? {
            Some(stored) if stored.value.is_valid(now) => Ok(stored.value),
            Some(_) => {
                debug!("pct expired");
                Err(UmaError::InvalidPct)
            }
            None => {
                debug!("unknown pct");
                Err(UmaError::InvalidPct)
            }
        }
    }

    /// Create a PCT carrying `claims`, or merge them into `existing`.
    pub fn merge_claims_into_pct(
        &self,
        existing: Option<&Pct>,
        client_id: &str,
        claims: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Pct, UmaError> {
        let Some(existing) = existing else {
            return self.create(client_id, claims, now);
        };
        if claims.is_empty() {
            return Ok(existing.clone());
        }

        let merged = merge(self.store.as_ref(), &existing.code, |current: &Pct| {
            let mut map = current.claims();
            map.extend(claims.clone());
            Ok::<_, UmaError>(Pct {
                claims: Value::Object(map).to_string(),
                ..current.clone()
            })
        })?
        .ok_or(UmaError::InvalidPct)?;

        debug!(claims = claims.len(), "claims merged into pct");
        Ok(merged.value)
    }

    fn create(
        &self,
        client_id: &str,
        claims: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Pct, UmaError> {
        let expires_at = now + self.settings.pct_lifetime;
        let pct = Pct {
            code: self
                .codes
                .code(self.settings.pct_as_jwt, client_id, None, now, expires_at)?,
            client_id: client_id.to_string(),
            claims: Value::Object(claims.clone()).to_string(),
            created_at: now,
            expires_at,
        };
        self.store.persist(
            &pct.code,
            pct.clone(),
            Some(store_ttl(self.settings.pct_lifetime)),
        )?;
        info!(client_id, "pct created");
        Ok(pct)
    }
}
