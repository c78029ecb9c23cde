//! Error taxonomy for the sync engine.
//!
//! The orchestrator treats [`SyncError::MalformedRecord`] and
//! [`SyncError::Persistence`] as per-record failures (counted, logged, loop
//! continues). [`SyncError::Upstream`] escapes a fetch after retries are
//! exhausted; anything outside the record loop marks the run `failed`.

use thiserror::Error;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure, timeout, or non-success status after all retries.
    #[error("upstream request to {endpoint} failed after {attempts} attempt(s): {message}")]
    Upstream {
        endpoint: String,
        attempts: u32,
        message: String,
    },

    /// Upstream returned a body that is not valid JSON.
    #[error("invalid JSON from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// A record lacks required fields or has an unexpected shape.
    #[error("malformed record {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Fatal(String),
}

impl SyncError {
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// True for errors the record loop absorbs instead of aborting the run.
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            Self::MalformedRecord { .. } | Self::Persistence(_) | Self::Serialize(_)
        )
    }
}
