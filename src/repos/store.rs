/*
 * Responsibility
 * - key -> entity の保存契約 (find / persist / conditional replace / remove)
 * - version 付きの楽観的更新 (merge)
 * - backend (in-memory, 外部 DB など) はこの trait の実装として差し替える
 */
use std::time::Duration;

use tracing::debug;

use crate::repos::error::{RepoError, RepoResult};

const MAX_MERGE_ATTEMPTS: usize = 8;

/// A stored value with its per-key version. Versions start at 1 and grow by
/// one on every successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

pub trait EntityStore<T>: Send + Sync {
    fn find(&self, key: &str) -> RepoResult<Option<Versioned<T>>>;

    /// Unconditional write. `ttl` replaces any previous expiry; `None` keeps
    /// the entry until it is removed.
    fn persist(&self, key: &str, value: T, ttl: Option<Duration>) -> RepoResult<Versioned<T>>;

    /// Write `value` only if the stored version is still `expected`.
    ///
    /// Returns `None` when the key is gone or the version moved on. The
    /// remaining expiry of the entry is kept.
    fn replace_if_version(
        &self,
        key: &str,
        expected: u64,
        value: T,
    ) -> RepoResult<Option<Versioned<T>>>;

    fn remove(&self, key: &str) -> RepoResult<Option<T>>;

    /// Snapshot of every live entry, in no particular order.
    fn values(&self) -> RepoResult<Vec<Versioned<T>>>;
}

/// Read-modify-write `key` with `f` until the conditional write lands.
///
/// `Ok(None)` when the key does not exist. `f` may run more than once and
/// must not have side effects.
pub fn merge<T, E, F>(
    store: &dyn EntityStore<T>,
    key: &str,
    mut f: F,
) -> Result<Option<Versioned<T>>, E>
where
    F: FnMut(&T) -> Result<T, E>,
    E: From<RepoError>,
{
    for attempt in 1..=MAX_MERGE_ATTEMPTS {
        let Some(current) = store.find(key)? else {
            return Ok(None);
        };
        let next = f(&current.value)?;
        if let Some(written) = store.replace_if_version(key, current.version, next)? {
            return Ok(Some(written));
        }
        debug!(key, attempt, "merge lost a race, retrying");
    }
    Err(RepoError::Conflict(key.to_string()).into())
}
