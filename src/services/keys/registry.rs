//! Active/archived signing keys.
//!
//! Both sets live in one immutable snapshot behind a lock. Rotation builds the
//! next snapshot (new key active, old key archived) and swaps it in with a
//! single write, so a reader sees a kid either in the old snapshot or the new
//! one, never in both sets or in neither.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::services::crypto::SignatureAlgorithm;
use crate::services::keys::{
    error::KeyError,
    generator,
    signing_key::{KeyStatus, SigningKey},
};

/// Knobs for key publication and rotation.
#[derive(Debug, Clone)]
pub struct KeySettings {
    /// Algorithms that get an active key.
    pub algorithms: Vec<SignatureAlgorithm>,
    /// JWKS `alg` allow-list. Empty disables filtering.
    pub jwks_allowed_algs: Vec<String>,
    pub key_lifetime: Duration,
    /// How long a demoted key stays verifiable. Must cover the longest
    /// lifetime of anything it signed.
    pub archive_retention: Duration,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            algorithms: vec![SignatureAlgorithm::RS256, SignatureAlgorithm::HS256],
            jwks_allowed_algs: Vec::new(),
            key_lifetime: Duration::days(2),
            archive_retention: Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JwkSet {
    pub keys: Vec<Map<String, Value>>,
}

#[derive(Debug, Default)]
struct KeySnapshot {
    active: BTreeMap<String, Arc<SigningKey>>,
    archived: BTreeMap<String, Arc<SigningKey>>,
}

pub struct KeyRegistry {
    settings: KeySettings,
    snapshot: RwLock<Arc<KeySnapshot>>,
}

impl std::fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.current();
        f.debug_struct("KeyRegistry")
            .field("active", &snapshot.active.keys().collect::<Vec<_>>())
            .field("archived", &snapshot.archived.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KeyRegistry {
    /// Generate one active key per configured algorithm.
    pub fn bootstrap(settings: KeySettings, now: DateTime<Utc>) -> Result<Self, KeyError> {
        let mut keys = Vec::with_capacity(settings.algorithms.len());
        for alg in &settings.algorithms {
            keys.push(generator::generate(*alg, now, settings.key_lifetime)?);
        }
        info!(count = keys.len(), "generated signing keys");
        Ok(Self::from_keys(settings, keys))
    }

    /// Registry over existing keys; each goes to the set its status says.
    pub fn from_keys(settings: KeySettings, keys: Vec<SigningKey>) -> Self {
        let mut snapshot = KeySnapshot::default();
        for key in keys {
            let kid = key.kid().to_string();
            match key.status() {
                KeyStatus::Active => snapshot.active.insert(kid, Arc::new(key)),
                KeyStatus::Archived => snapshot.archived.insert(kid, Arc::new(key)),
            };
        }
        Self {
            settings,
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn settings(&self) -> &KeySettings {
        &self.settings
    }

    fn current(&self) -> Arc<KeySnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Published key set, filtered by the configured `alg` allow-list.
    ///
    /// Keys without an `alg` tag are always published.
    pub fn jwks(&self) -> JwkSet {
        let allowed = &self.settings.jwks_allowed_algs;
        let keys = self
            .current()
            .active
            .values()
            .filter_map(|key| key.public_jwk())
            .filter(|jwk| match jwk.get("alg").and_then(Value::as_str) {
                None => true,
                Some(_) if allowed.is_empty() => true,
                Some(alg) => allowed.iter().any(|a| a == alg),
            })
            .collect();
        JwkSet { keys }
    }

    pub fn archived_key(&self, kid: &str) -> Result<Arc<SigningKey>, KeyError> {
        let kid = kid.trim();
        if kid.is_empty() {
            return Err(KeyError::NotFound(String::new()));
        }
        self.current()
            .archived
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyError::NotFound(kid.to_string()))
    }

    /// Newest active key for `algorithm`.
    pub fn active_key(&self, algorithm: SignatureAlgorithm) -> Result<Arc<SigningKey>, KeyError> {
        self.current()
            .active
            .values()
            .filter(|k| k.algorithm() == algorithm)
            .max_by_key(|k| k.created_at())
            .cloned()
            .ok_or(KeyError::NoActiveKey(algorithm))
    }

    /// Key for verifying a token signed under `kid`: published set first,
    /// then the archive.
    pub fn verification_key(&self, kid: &str) -> Option<Arc<SigningKey>> {
        let snapshot = self.current();
        if let Some(key) = snapshot.active.get(kid) {
            return Some(key.clone());
        }
        let archived = snapshot.archived.get(kid).cloned();
        if archived.is_some() {
            debug!(kid, "verifying with archived key");
        }
        archived
    }

    /// Replace the active key for `algorithm` with a freshly generated one.
    pub fn rotate(
        &self,
        algorithm: SignatureAlgorithm,
        now: DateTime<Utc>,
    ) -> Result<Arc<SigningKey>, KeyError> {
        // Generate outside the lock; RSA generation is slow.
        let fresh = Arc::new(generator::generate(
            algorithm,
            now,
            self.settings.key_lifetime,
        )?);
        self.install(fresh.clone(), now);
        Ok(fresh)
    }

    pub fn rotate_all(&self, now: DateTime<Utc>) -> Result<Vec<String>, KeyError> {
        let algorithms: Vec<_> = {
            let snapshot = self.current();
            let mut algs: Vec<_> = snapshot.active.values().map(|k| k.algorithm()).collect();
            algs.sort();
            algs.dedup();
            algs
        };
        let mut kids = Vec::with_capacity(algorithms.len());
        for alg in algorithms {
            kids.push(self.rotate(alg, now)?.kid().to_string());
        }
        Ok(kids)
    }

    /// Publish `key` as active, archiving every active key of the same algorithm.
    pub fn install(&self, key: Arc<SigningKey>, now: DateTime<Utc>) {
        let retain_until = now + self.settings.archive_retention;
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);

        let mut next = KeySnapshot {
            active: BTreeMap::new(),
            archived: guard.archived.clone(),
        };
        for (kid, current) in &guard.active {
            if current.algorithm() == key.algorithm() {
                next.archived
                    .insert(kid.clone(), Arc::new(current.archived(retain_until)));
            } else {
                next.active.insert(kid.clone(), current.clone());
            }
        }
        next.active.insert(key.kid().to_string(), key.clone());

        *guard = Arc::new(next);
        info!(kid = key.kid(), alg = %key.algorithm(), "rotated signing key");
    }

    /// Drop archived keys whose retention window has passed.
    pub fn prune_archived(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.archived.len();
        let archived: BTreeMap<_, _> = guard
            .archived
            .iter()
            .filter(|(_, k)| k.not_after() > now)
            .map(|(kid, k)| (kid.clone(), k.clone()))
            .collect();
        let pruned = before - archived.len();
        if pruned > 0 {
            *guard = Arc::new(KeySnapshot {
                active: guard.active.clone(),
                archived,
            });
            info!(pruned, "pruned archived signing keys");
        }
        pruned
    }
}
