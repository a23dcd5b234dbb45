//! In-process `EntityStore` on a moka cache.
//!
//! Expiry is per entry: `persist` sets it, conditional replaces keep whatever
//! is left of it. Expired entries are invisible to reads and are reported to
//! the eviction hook when moka reclaims them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::notification::RemovalCause;
use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache;
use tracing::debug;

use crate::repos::error::{RepoError, RepoResult};
use crate::repos::store::{EntityStore, Versioned};

pub type EvictionHook<T> = Arc<dyn Fn(&str, &T, RemovalCause) + Send + Sync>;

#[derive(Debug, Clone)]
struct Slot<T> {
    version: u64,
    value: T,
    ttl: Option<Duration>,
    reset_ttl: bool,
}

impl<T: Clone> Slot<T> {
    fn versioned(&self) -> Versioned<T> {
        Versioned {
            version: self.version,
            value: self.value.clone(),
        }
    }
}

struct PerEntryTtl;

impl<T> moka::Expiry<String, Slot<T>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        slot: &Slot<T>,
        _created_at: Instant,
    ) -> Option<Duration> {
        slot.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        slot: &Slot<T>,
        _updated_at: Instant,
        remaining: Option<Duration>,
    ) -> Option<Duration> {
        if slot.reset_ttl { slot.ttl } else { remaining }
    }
}

pub struct MemoryStore<T> {
    name: &'static str,
    cache: Cache<String, Slot<T>>,
}

impl<T> std::fmt::Debug for MemoryStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.name)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl<T> MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self::with_eviction_hook(name, None)
    }

    /// `hook` sees entries that expired or were removed, not ones that were
    /// overwritten.
    pub fn with_eviction_hook(name: &'static str, hook: Option<EvictionHook<T>>) -> Self {
        let cache = Cache::builder()
            .name(name)
            .expire_after(PerEntryTtl)
            .eviction_listener(move |key: Arc<String>, slot: Slot<T>, cause: RemovalCause| {
                if cause == RemovalCause::Replaced {
                    return;
                }
                debug!(store = name, key = %key, ?cause, "entry evicted");
                if let Some(hook) = &hook {
                    hook(&key, &slot.value, cause);
                }
            })
            .build();
        Self { name, cache }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> EntityStore<T> for MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn find(&self, key: &str) -> RepoResult<Option<Versioned<T>>> {
        Ok(self.cache.get(key).map(|slot| slot.versioned()))
    }

    fn persist(&self, key: &str, value: T, ttl: Option<Duration>) -> RepoResult<Versioned<T>> {
        let outcome = self.cache.entry_by_ref(key).and_compute_with(|current| {
            let version = current.map_or(0, |e| e.value().version) + 1;
            Op::Put(Slot {
                version,
                value,
                ttl,
                reset_ttl: true,
            })
        });

        match outcome {
            CompResult::Inserted(entry) | CompResult::ReplacedWith(entry) => {
                Ok(entry.into_value().versioned())
            }
            _ => Err(RepoError::Unavailable(format!(
                "{}: write to {key} not applied",
                self.name
            ))),
        }
    }

    fn replace_if_version(
        &self,
        key: &str,
        expected: u64,
        value: T,
    ) -> RepoResult<Option<Versioned<T>>> {
        let outcome = self.cache.entry_by_ref(key).and_compute_with(|current| match current {
            Some(entry) if entry.value().version == expected => {
                let slot = entry.value();
                Op::Put(Slot {
                    version: expected + 1,
                    value,
                    ttl: slot.ttl,
                    reset_ttl: false,
                })
            }
            _ => Op::Nop,
        });

        Ok(match outcome {
            CompResult::ReplacedWith(entry) | CompResult::Inserted(entry) => {
                Some(entry.into_value().versioned())
            }
            _ => None,
        })
    }

    fn remove(&self, key: &str) -> RepoResult<Option<T>> {
        Ok(self.cache.remove(key).map(|slot| slot.value))
    }

    fn values(&self) -> RepoResult<Vec<Versioned<T>>> {
        Ok(self.cache.iter().map(|(_, slot)| slot.versioned()).collect())
    }
}
