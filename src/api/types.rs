use serde::{Deserialize, Serialize};

use crate::db::SyncRun;
use crate::domain::SourceKind;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunDto {
    pub id: String,
    pub source: String,
    pub content_type: String,
    pub start_page: i32,
    pub max_pages: i32,
    pub status: String,
    pub processed: i32,
    pub created: i32,
    pub updated: i32,
    pub error_count: i32,
    pub pages_fetched: i32,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: i64,
    pub errors: Vec<String>,
}

impl From<SyncRun> for SyncRunDto {
    fn from(run: SyncRun) -> Self {
        let errors = serde_json::from_str(&run.errors_json).unwrap_or_default();
        Self {
            id: run.id,
            source: run.source,
            content_type: run.content_type,
            start_page: run.start_page,
            max_pages: run.max_pages,
            status: run.status,
            processed: run.processed,
            created: run.created,
            updated: run.updated,
            error_count: run.error_count,
            pages_fetched: run.pages_fetched,
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_ms: run.duration_ms,
            errors,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TitleCounts {
    pub anime: u64,
    pub manga: u64,
    pub total: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRequest {
    #[serde(default)]
    pub source: Option<SourceKind>,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTypeQuery {
    pub content_type: Option<String>,
}
