//! Storage seam of the sync pipeline.
//!
//! The orchestrator only knows this trait; the `SeaORM` implementation lives
//! in [`crate::services::upsert_service_impl`].

use crate::domain::TitleId;
use crate::models::NormalizedRecord;
use crate::services::SyncError;
use serde::Serialize;

/// What an upsert did to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub title_id: TitleId,
    /// No title existed for the record's key before this call.
    pub created: bool,
    /// An existing title had its content, detail or links changed.
    pub changed: bool,
}

impl UpsertOutcome {
    /// Counted as "updated" in run reports.
    #[must_use]
    pub const fn is_update(&self) -> bool {
        !self.created && self.changed
    }
}

#[async_trait::async_trait]
pub trait UpsertService: Send + Sync {
    /// Writes one normalized record: title, detail row, then reference links.
    ///
    /// Applying the same record twice leaves storage exactly as applying it
    /// once.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Storage`] or [`SyncError::Conflict`] when a statement
    ///   fails. The title may already be written at that point; such titles
    ///   are found later by the repair pass.
    /// - [`SyncError::Fatal`] when storage is unreachable.
    async fn upsert(&self, record: &NormalizedRecord) -> Result<UpsertOutcome, SyncError>;

    /// Cheap liveness probe of the underlying storage.
    async fn ping(&self) -> Result<(), SyncError>;
}
