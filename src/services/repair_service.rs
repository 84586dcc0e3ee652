//! Finishes titles left without a detail row by an interrupted upsert.

use crate::clients::CatalogSources;
use crate::db::{IncompleteTitle, Store};
use crate::domain::{ContentType, ExternalId, SourceKind};
use crate::services::SyncError;
use crate::services::normalizer;
use crate::services::upsert_service::UpsertService;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub examined: u32,
    pub repaired: u32,
    /// The catalog no longer knows the id.
    pub missing_upstream: u32,
    pub failed: u32,
    pub errors: Vec<String>,
    /// The pass stopped at the run deadline before every title was examined.
    pub timed_out: bool,
}

pub struct RepairService {
    sources: CatalogSources,
    upserter: Arc<dyn UpsertService>,
    store: Store,
    call_delay: Duration,
    run_timeout: Duration,
}

impl RepairService {
    #[must_use]
    pub const fn new(
        sources: CatalogSources,
        upserter: Arc<dyn UpsertService>,
        store: Store,
        call_delay: Duration,
        run_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            upserter,
            store,
            call_delay,
            run_timeout,
        }
    }

    pub async fn find_incomplete(
        &self,
        content_type: Option<ContentType>,
    ) -> Result<Vec<IncompleteTitle>, SyncError> {
        Ok(self.store.find_incomplete_titles(content_type, None).await?)
    }

    /// Re-fetches up to `limit` incomplete titles of `source` one by one and
    /// upserts them again, spacing calls like the page loop does. The pass
    /// shares the sync run deadline and returns what it finished by then.
    ///
    /// # Errors
    ///
    /// Fails only when the source is not configured, the incomplete titles
    /// cannot be listed, or a fatal error stops the pass.
    pub async fn repair(&self, source: SourceKind, limit: u64) -> Result<RepairReport, SyncError> {
        let client = self
            .sources
            .get(source)
            .ok_or_else(|| SyncError::Fatal(format!("catalog source '{source}' is not configured")))?;

        let incomplete = self.store.find_incomplete_titles(None, Some(source)).await?;
        let mut report = RepairReport::default();
        let mut last_call: Option<Instant> = None;
        let deadline = Instant::now() + self.run_timeout;

        for title in incomplete
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
        {
            let not_before = last_call.map(|t| t + self.call_delay);
            if Instant::now() >= deadline || not_before.is_some_and(|at| at >= deadline) {
                report.timed_out = true;
                break;
            }

            report.examined += 1;

            let Ok(content_type) = title.content_type.parse::<ContentType>() else {
                report.failed += 1;
                report.errors.push(format!(
                    "title {}: unknown content type '{}'",
                    title.title_id, title.content_type
                ));
                continue;
            };
            let external_id = ExternalId::new(title.external_id);

            if let Some(at) = not_before {
                sleep_until(at).await;
            }
            last_call = Some(Instant::now());

            let lookup = client.fetch_one(content_type, external_id);
            let fetched = match timeout_at(deadline, lookup).await {
                Err(_) => {
                    warn!(external_id = %external_id, "Repair deadline reached mid-lookup");
                    report.timed_out = true;
                    break;
                }
                Ok(result) => result,
            };
            let fetched = match fetched {
                Ok(fetched) => fetched,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!("id {external_id}: {e}"));
                    continue;
                }
            };

            let Some(media) = fetched else {
                warn!(external_id = %external_id, "Incomplete title no longer exists upstream");
                report.missing_upstream += 1;
                continue;
            };

            let outcome = match normalizer::normalize(&media, content_type, source) {
                Ok(record) => self.upserter.upsert(&record).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(_) => report.repaired += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!("id {external_id}: {e}"));
                }
            }
        }

        info!(
            event = "repair_finished",
            source = %source,
            examined = report.examined,
            repaired = report.repaired,
            missing_upstream = report.missing_upstream,
            failed = report.failed,
            timed_out = report.timed_out,
            "Repair pass finished"
        );

        Ok(report)
    }
}
