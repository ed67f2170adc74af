use hostreg_core::HostError;
use thiserror::Error;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such host: {0}")]
    NotFound(String),
    #[error("no such tag {key:?} on host {host}")]
    NoSuchTag { host: String, key: String },
    #[error("no such var {key:?} on host {host}")]
    NoSuchVar { host: String, key: String },
    #[error("host already exists: {0}")]
    Conflict(String),
    #[error(transparent)]
    Invalid(#[from] HostError),
    #[error("migration {label} failed: {source}")]
    Migration {
        label: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("backing store failure: {0}")]
    Backend(#[from] rusqlite::Error),
    #[error("malformed key-value column: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Coarse classification of a [`StoreError`], for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    NoSuchTag,
    NoSuchVar,
    Conflict,
    Invalid,
    Migration,
    Backend,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::NoSuchTag { .. } => ErrorKind::NoSuchTag,
            StoreError::NoSuchVar { .. } => ErrorKind::NoSuchVar,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Invalid(_) => ErrorKind::Invalid,
            StoreError::Migration { .. } => ErrorKind::Migration,
            StoreError::Backend(_) | StoreError::Codec(_) => ErrorKind::Backend,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// True when `err` is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Audit event for a store operation on one host.
pub(crate) fn audit<T>(op: &'static str, host: &str, res: &Result<T>) {
    match res {
        Ok(_) => tracing::info!(host, op, outcome = "ok", "host operation"),
        Err(e) if e.kind() == ErrorKind::Backend || e.kind() == ErrorKind::Migration => {
            tracing::error!(host, op, outcome = "failed", error = %e, "host operation")
        }
        Err(e) => tracing::warn!(host, op, outcome = ?e.kind(), error = %e, "host operation"),
    }
}
