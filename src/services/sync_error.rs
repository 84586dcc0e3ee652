//! Error taxonomy of the sync pipeline.
//!
//! Every failure the fetcher, normalizer or upserter can produce is
//! classified here, and the classification alone decides what the
//! orchestrator does with it: retry the page, skip the record, or stop the
//! run.

use crate::domain::{ExternalId, SourceKind};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP failure, timeout or malformed payload from an external catalog.
    #[error("{service} transport error: {message}")]
    Transport { service: String, message: String },

    /// A record that cannot be stored, e.g. one without any title.
    #[error("invalid record {external_id}: {message}")]
    Validation {
        external_id: ExternalId,
        message: String,
    },

    /// A uniqueness violation the upsert logic did not absorb.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A single storage statement failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Authentication failure, missing configuration or unreachable storage.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl SyncError {
    pub fn transport(source: SourceKind, message: impl Into<String>) -> Self {
        Self::Transport {
            service: source.service_name().to_string(),
            message: message.into(),
        }
    }

    pub fn validation(external_id: ExternalId, message: impl Into<String>) -> Self {
        Self::Validation {
            external_id,
            message: message.into(),
        }
    }

    /// Only transport errors are worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Short label used for metrics and structured logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Validation { .. } => "validation",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage",
            Self::Fatal(_) => "fatal",
        }
    }
}

impl From<DbErr> for SyncError {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(msg)) = err.sql_err() {
            return Self::Conflict(msg);
        }

        match err {
            DbErr::ConnectionAcquire(e) => Self::Fatal(format!("storage unreachable: {e}")),
            DbErr::Conn(e) => Self::Fatal(format!("storage unreachable: {e}")),
            other => Self::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_is_retryable() {
        assert!(SyncError::transport(SourceKind::Anilist, "timeout").is_retryable());
        assert!(!SyncError::validation(ExternalId::new(1), "no title").is_retryable());
        assert!(!SyncError::Conflict("dup".into()).is_retryable());
        assert!(!SyncError::Fatal("auth".into()).is_retryable());
    }

    #[test]
    fn db_errors_map_to_storage() {
        let err: SyncError = DbErr::Custom("boom".to_string()).into();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(err.kind(), "storage");
    }

    #[test]
    fn transport_message_names_service() {
        let err = SyncError::transport(SourceKind::Jikan, "HTTP 500");
        assert_eq!(err.to_string(), "Jikan transport error: HTTP 500");
    }
}
