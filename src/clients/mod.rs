//! External catalog adapters.
//!
//! Each adapter turns one page of a third-party catalog into
//! [`ExternalMedia`] records. Adapters never touch storage; pacing between
//! calls belongs to the orchestrator.

pub mod anilist;
pub mod jikan;

use crate::domain::{ContentType, ExternalId, SourceKind};
use crate::models::ExternalMedia;
use crate::services::SyncError;
use reqwest::{Response, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;

pub use anilist::AnilistClient;
pub use jikan::JikanClient;

/// A paginated external catalog.
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Largest page size the catalog accepts.
    fn max_page_size(&self) -> u32;

    /// Fetches one page (1-based). An empty page means the catalog is
    /// exhausted; errors are reserved for transport and auth failures.
    async fn fetch_page(
        &self,
        content_type: ContentType,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ExternalMedia>, SyncError>;

    /// Fetches a single record; `None` if the catalog does not know the id.
    async fn fetch_one(
        &self,
        content_type: ContentType,
        id: ExternalId,
    ) -> Result<Option<ExternalMedia>, SyncError>;
}

/// The catalogs a process is configured to talk to, one adapter per kind.
#[derive(Clone, Default)]
pub struct CatalogSources {
    sources: HashMap<SourceKind, Arc<dyn CatalogSource>>,
}

impl CatalogSources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter, replacing any previous one of the same kind.
    #[must_use]
    pub fn with(mut self, source: Arc<dyn CatalogSource>) -> Self {
        self.sources.insert(source.kind(), source);
        self
    }

    #[must_use]
    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn CatalogSource>> {
        self.sources.get(&kind).cloned()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<SourceKind> {
        let mut kinds: Vec<SourceKind> = self.sources.keys().copied().collect();
        kinds.sort_by_key(SourceKind::as_str);
        kinds
    }
}

/// Builds the HTTP client shared by all catalog adapters.
///
/// The timeout bounds every single request, independent of the run deadline.
pub fn build_http_client(timeout_seconds: u64, user_agent: &str) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_seconds))
        .user_agent(user_agent)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

pub(crate) fn request_error(source: SourceKind, err: &reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::transport(source, format!("request timed out: {err}"))
    } else if err.is_decode() {
        SyncError::transport(source, format!("malformed payload: {err}"))
    } else {
        SyncError::transport(source, err.to_string())
    }
}

/// Classifies a non-2xx response. Credentials problems stop the run, every
/// other status is worth retrying.
pub(crate) async fn check_status(source: SourceKind, response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SyncError::Fatal(format!(
            "{} rejected credentials: {} - {}",
            source.service_name(),
            status,
            snippet
        )));
    }

    Err(SyncError::transport(
        source,
        format!("HTTP {status} - {snippet}"),
    ))
}

/// Trims a string and drops it when nothing is left.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
