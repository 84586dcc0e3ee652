//! The page loop: fetch a page, normalize each record, upsert it, pause,
//! repeat.
//!
//! A run never returns a bare error once it has started. Per-record failures
//! are counted and the loop moves on; a page that keeps failing after retries
//! ends the run early; a fatal error or the run deadline ends it immediately.
//! In every case the caller gets a [`SyncReport`] with the counts accumulated
//! so far, and the run is recorded in `sync_runs`.

use crate::clients::{CatalogSource, CatalogSources};
use crate::config::Config;
use crate::db::Store;
use crate::domain::{ContentType, SourceKind};
use crate::entities::sync_runs;
use crate::models::ExternalMedia;
use crate::services::SyncError;
use crate::services::normalizer;
use crate::services::upsert_service::{UpsertOutcome, UpsertService};
use chrono::Utc;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Body of a sync trigger.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub content_type: ContentType,
    pub max_pages: u32,
    #[serde(default)]
    pub start_page: Option<u32>,
    #[serde(default)]
    pub source: Option<SourceKind>,
}

/// Rejections that happen before a run starts.
#[derive(Debug, Error)]
pub enum SyncRequestError {
    #[error("maxPages must be at least 1")]
    InvalidMaxPages,

    #[error("startPage must be at least 1")]
    InvalidStartPage,

    #[error("catalog source '{0}' is not configured")]
    SourceUnavailable(SourceKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Page limit reached or the catalog ran out of pages.
    Completed,
    /// A page failed after every retry.
    Aborted,
    /// The run deadline was reached.
    Deadline,
    /// Authentication failure or unreachable storage.
    Failed,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Deadline => "deadline",
            Self::Failed => "failed",
        }
    }

    /// Whether callers should treat the run as a success. A run cut short by
    /// its deadline did everything it had time for.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Deadline)
    }
}

/// What a run did, returned to the caller verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub success: bool,
    pub run_id: String,
    pub status: RunStatus,
    /// Records successfully upserted.
    pub processed: u32,
    pub created: u32,
    /// Existing titles whose content changed.
    pub updated: u32,
    pub errors: Vec<String>,
    pub pages_fetched: u32,
    pub duration_ms: u64,
}

/// Exponential backoff for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based): `base * 2^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub default_source: SourceKind,
    pub page_delay: Duration,
    pub run_timeout: Duration,
    pub max_pages_limit: u32,
    pub per_page: u32,
    pub max_reported_errors: usize,
    pub retry: RetryPolicy,
}

impl SyncSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_source: config.sync.default_source,
            page_delay: Duration::from_millis(config.sync.page_delay_ms),
            run_timeout: Duration::from_secs(config.sync.run_timeout_seconds),
            max_pages_limit: config.sync.max_pages_limit,
            per_page: config.sync.per_page,
            max_reported_errors: config.sync.max_reported_errors,
            retry: RetryPolicy {
                max_attempts: config.retry.max_attempts.max(1),
                base_delay: Duration::from_millis(config.retry.base_delay_ms),
                max_delay: Duration::from_millis(config.retry.max_delay_ms),
            },
        }
    }
}

/// Error messages of a run, truncated to a fixed number of entries.
#[derive(Debug)]
struct ErrorLog {
    entries: Vec<String>,
    total: usize,
    cap: usize,
}

impl ErrorLog {
    const fn new(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            total: 0,
            cap,
        }
    }

    fn push(&mut self, message: String) {
        self.total += 1;
        if self.entries.len() < self.cap {
            self.entries.push(message);
        }
    }

    fn into_messages(mut self) -> Vec<String> {
        let hidden = self.total - self.entries.len();
        if hidden > 0 {
            self.entries.push(format!("... and {hidden} more"));
        }
        self.entries
    }
}

/// A validated request.
struct RunPlan {
    source: Arc<dyn CatalogSource>,
    content_type: ContentType,
    start_page: u32,
    max_pages: u32,
    per_page: u32,
}

struct RunTally {
    status: RunStatus,
    processed: u32,
    created: u32,
    updated: u32,
    pages_fetched: u32,
    errors: ErrorLog,
}

enum PageFetch {
    Fetched(Vec<ExternalMedia>),
    /// Carries the last transport error when retries were still pending.
    Deadline(Option<SyncError>),
    Failed(SyncError),
}

pub struct SyncService {
    sources: CatalogSources,
    upserter: Arc<dyn UpsertService>,
    store: Store,
    settings: SyncSettings,
}

impl SyncService {
    #[must_use]
    pub const fn new(
        sources: CatalogSources,
        upserter: Arc<dyn UpsertService>,
        store: Store,
        settings: SyncSettings,
    ) -> Self {
        Self {
            sources,
            upserter,
            store,
            settings,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Sources this service can sync from.
    #[must_use]
    pub fn source_kinds(&self) -> Vec<SourceKind> {
        self.sources.kinds()
    }

    fn plan(&self, request: &SyncRequest) -> Result<RunPlan, SyncRequestError> {
        if request.max_pages == 0 {
            return Err(SyncRequestError::InvalidMaxPages);
        }
        let start_page = request.start_page.unwrap_or(1);
        if start_page == 0 {
            return Err(SyncRequestError::InvalidStartPage);
        }

        let kind = request.source.unwrap_or(self.settings.default_source);
        let source = self
            .sources
            .get(kind)
            .ok_or(SyncRequestError::SourceUnavailable(kind))?;

        let max_pages = if request.max_pages > self.settings.max_pages_limit {
            warn!(
                requested = request.max_pages,
                limit = self.settings.max_pages_limit,
                "maxPages above configured limit, capping"
            );
            self.settings.max_pages_limit
        } else {
            request.max_pages
        };

        let per_page = self.settings.per_page.min(source.max_page_size()).max(1);

        Ok(RunPlan {
            source,
            content_type: request.content_type,
            start_page,
            max_pages,
            per_page,
        })
    }

    /// Runs one sync to completion and reports what it did.
    ///
    /// # Errors
    ///
    /// Only invalid requests fail; everything after validation ends up in the
    /// report.
    pub async fn run(&self, request: SyncRequest) -> Result<SyncReport, SyncRequestError> {
        let plan = self.plan(&request)?;
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let clock = std::time::Instant::now();

        let span = info_span!(
            "sync_run",
            run_id = %run_id,
            source = %plan.source.kind(),
            content_type = %plan.content_type,
        );

        info!(
            parent: &span,
            event = "sync_started",
            start_page = plan.start_page,
            max_pages = plan.max_pages,
            per_page = plan.per_page,
            "Starting catalog sync"
        );

        let tally = self.execute(&plan).instrument(span.clone()).await;

        let duration = clock.elapsed();
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let report = SyncReport {
            success: tally.status.is_success(),
            run_id,
            status: tally.status,
            processed: tally.processed,
            created: tally.created,
            updated: tally.updated,
            errors: tally.errors.into_messages(),
            pages_fetched: tally.pages_fetched,
            duration_ms,
        };

        metrics::counter!("sync_runs_total", "status" => report.status.as_str()).increment(1);
        metrics::histogram!("sync_run_duration_seconds").record(duration.as_secs_f64());

        info!(
            parent: &span,
            event = "sync_finished",
            status = report.status.as_str(),
            processed = report.processed,
            created = report.created,
            updated = report.updated,
            errors = report.errors.len(),
            pages = report.pages_fetched,
            duration_ms,
            "Catalog sync finished"
        );

        self.record_run(&plan, &report, started_at)
            .instrument(span)
            .await;

        Ok(report)
    }

    async fn execute(&self, plan: &RunPlan) -> RunTally {
        let deadline = Instant::now() + self.settings.run_timeout;
        let mut last_fetch: Option<Instant> = None;
        let mut tally = RunTally {
            status: RunStatus::Completed,
            processed: 0,
            created: 0,
            updated: 0,
            pages_fetched: 0,
            errors: ErrorLog::new(self.settings.max_reported_errors),
        };

        'pages: for offset in 0..plan.max_pages {
            let page = plan.start_page.saturating_add(offset);

            let media = match self.fetch_page(plan, page, deadline, &mut last_fetch).await {
                PageFetch::Fetched(media) => media,
                PageFetch::Deadline(last_error) => {
                    warn!(event = "sync_deadline", page, "Run deadline reached before fetch");
                    if let Some(err) = last_error {
                        tally.errors.push(format!("page {page}: {err}"));
                    }
                    tally.status = RunStatus::Deadline;
                    break;
                }
                PageFetch::Failed(err) => {
                    error!(
                        event = "page_failed",
                        page,
                        kind = err.kind(),
                        error = %err,
                        "Page fetch failed, stopping run"
                    );
                    tally.errors.push(format!("page {page}: {err}"));
                    tally.status = if err.is_fatal() {
                        RunStatus::Failed
                    } else {
                        RunStatus::Aborted
                    };
                    break;
                }
            };

            tally.pages_fetched += 1;
            metrics::counter!("sync_pages_total", "source" => plan.source.kind().as_str())
                .increment(1);

            if media.is_empty() {
                info!(event = "source_exhausted", page, "Catalog returned an empty page");
                break;
            }

            debug!(page, records = media.len(), "Fetched page");

            for item in &media {
                if Instant::now() >= deadline {
                    warn!(event = "sync_deadline", page, "Run deadline reached mid-page");
                    tally.status = RunStatus::Deadline;
                    break 'pages;
                }

                match self.process_record(plan, item).await {
                    Ok(outcome) => {
                        tally.processed += 1;
                        let label = if outcome.created {
                            tally.created += 1;
                            "created"
                        } else if outcome.is_update() {
                            tally.updated += 1;
                            "updated"
                        } else {
                            "unchanged"
                        };
                        metrics::counter!("sync_records_total", "outcome" => label).increment(1);
                    }
                    Err(err) => {
                        metrics::counter!("sync_records_total", "outcome" => "error").increment(1);
                        warn!(
                            event = "record_failed",
                            page,
                            external_id = item.id.value(),
                            kind = err.kind(),
                            error = %err,
                            "Record skipped"
                        );
                        tally
                            .errors
                            .push(format!("page {page}, id {}: {err}", item.id));

                        if err.is_fatal() {
                            tally.status = RunStatus::Failed;
                            break 'pages;
                        }

                        // A failed statement may mean the database is gone.
                        if matches!(err, SyncError::Storage(_))
                            && let Err(fatal) = self.upserter.ping().await
                        {
                            error!(event = "storage_unreachable", error = %fatal, "Stopping run");
                            tally.errors.push(fatal.to_string());
                            tally.status = RunStatus::Failed;
                            break 'pages;
                        }
                    }
                }
            }
        }

        tally
    }

    /// Fetches one page, retrying transport errors with backoff. Successive
    /// calls are spaced by at least the configured page delay.
    async fn fetch_page(
        &self,
        plan: &RunPlan,
        page: u32,
        deadline: Instant,
        last_fetch: &mut Option<Instant>,
    ) -> PageFetch {
        let retry = self.settings.retry;
        let mut not_before = last_fetch.map(|t| t + self.settings.page_delay);
        let mut attempt = 0;
        let mut last_error: Option<SyncError> = None;

        loop {
            attempt += 1;

            if let Some(at) = not_before {
                if at >= deadline {
                    return PageFetch::Deadline(last_error);
                }
                sleep_until(at).await;
            }
            if Instant::now() >= deadline {
                return PageFetch::Deadline(last_error);
            }

            *last_fetch = Some(Instant::now());
            let fetch = plan
                .source
                .fetch_page(plan.content_type, page, plan.per_page);

            match timeout_at(deadline, fetch).await {
                Err(_) => return PageFetch::Deadline(last_error),
                Ok(Ok(media)) => return PageFetch::Fetched(media),
                Ok(Err(err)) if err.is_retryable() && attempt < retry.max_attempts => {
                    let backoff = retry.delay_for(attempt);
                    warn!(
                        event = "page_retry",
                        page,
                        attempt,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Page fetch failed, retrying"
                    );
                    not_before = Some(Instant::now() + backoff);
                    last_error = Some(err);
                }
                Ok(Err(err)) => return PageFetch::Failed(err),
            }
        }
    }

    async fn process_record(
        &self,
        plan: &RunPlan,
        item: &ExternalMedia,
    ) -> Result<UpsertOutcome, SyncError> {
        let record = normalizer::normalize(item, plan.content_type, plan.source.kind())?;
        let outcome = self.upserter.upsert(&record).await?;
        debug!(
            external_id = item.id.value(),
            title_id = %outcome.title_id,
            created = outcome.created,
            changed = outcome.changed,
            "Upserted record"
        );
        Ok(outcome)
    }

    /// Best effort: a run that cannot be recorded still reports normally.
    async fn record_run(
        &self,
        plan: &RunPlan,
        report: &SyncReport,
        started_at: chrono::DateTime<Utc>,
    ) {
        let errors_json = serde_json::to_string(&report.errors).unwrap_or_else(|_| "[]".to_string());
        let to_i32 = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);

        let run = sync_runs::ActiveModel {
            id: Set(report.run_id.clone()),
            source: Set(plan.source.kind().as_str().to_string()),
            content_type: Set(plan.content_type.as_str().to_string()),
            start_page: Set(to_i32(plan.start_page)),
            max_pages: Set(to_i32(plan.max_pages)),
            status: Set(report.status.as_str().to_string()),
            processed: Set(to_i32(report.processed)),
            created: Set(to_i32(report.created)),
            updated: Set(to_i32(report.updated)),
            error_count: Set(i32::try_from(report.errors.len()).unwrap_or(i32::MAX)),
            pages_fetched: Set(to_i32(report.pages_fetched)),
            started_at: Set(started_at.to_rfc3339()),
            finished_at: Set(Utc::now().to_rfc3339()),
            duration_ms: Set(i64::try_from(report.duration_ms).unwrap_or(i64::MAX)),
            errors_json: Set(errors_json),
        };

        if let Err(e) = self.store.record_sync_run(run).await {
            error!(event = "run_not_recorded", error = %e, "Failed to record sync run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
    }

    #[test]
    fn error_log_summarizes_overflow() {
        let mut log = ErrorLog::new(2);
        for i in 0..5 {
            log.push(format!("error {i}"));
        }
        assert_eq!(
            log.into_messages(),
            vec![
                "error 0".to_string(),
                "error 1".to_string(),
                "... and 3 more".to_string()
            ]
        );
    }

    #[test]
    fn error_log_within_cap_is_verbatim() {
        let mut log = ErrorLog::new(3);
        log.push("only".to_string());
        assert_eq!(log.into_messages(), vec!["only".to_string()]);
    }

    #[test]
    fn status_success_flags() {
        assert!(RunStatus::Completed.is_success());
        assert!(RunStatus::Deadline.is_success());
        assert!(!RunStatus::Aborted.is_success());
        assert!(!RunStatus::Failed.is_success());
    }

    #[test]
    fn request_uses_camel_case() {
        let request: SyncRequest =
            serde_json::from_str(r#"{"contentType":"manga","maxPages":2,"startPage":3}"#).unwrap();
        assert_eq!(request.content_type, ContentType::Manga);
        assert_eq!(request.max_pages, 2);
        assert_eq!(request.start_page, Some(3));
        assert!(request.source.is_none());
    }
}
