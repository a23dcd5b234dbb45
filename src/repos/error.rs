use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    /// Optimistic write lost the race too many times.
    #[error("concurrent modification of {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type RepoResult<T> = Result<T, RepoError>;
