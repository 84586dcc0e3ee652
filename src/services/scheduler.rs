use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::{ScheduledSync, SchedulerConfig};
use crate::services::{RepairService, SyncRequest, SyncService};

/// Cron-driven sync and repair runs while the server is up.
pub struct Scheduler {
    sync_service: Arc<SyncService>,
    repair_service: Arc<RepairService>,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    pub fn new(
        sync_service: Arc<SyncService>,
        repair_service: Arc<RepairService>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            sync_service,
            repair_service,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Builds the jobs and blocks until [`Scheduler::stop`] is called.
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background scheduler");

        let mut sched = JobScheduler::new().await?;
        for job in self.build_jobs()? {
            sched.add(job).await?;
        }
        sched.start().await?;

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    fn build_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::with_capacity(self.config.jobs.len() + 1);

        for spec in &self.config.jobs {
            jobs.push(self.sync_job(spec)?);
            info!(job_name = %spec.name, cron = %spec.cron, "Sync job scheduled");
        }

        if let Some(cron) = &self.config.repair_cron {
            jobs.push(self.repair_job(cron)?);
            info!(job_name = "repair", cron = %cron, "Repair job scheduled");
        }

        Ok(jobs)
    }

    fn sync_job(&self, spec: &ScheduledSync) -> Result<Job> {
        let service = Arc::clone(&self.sync_service);
        let running = Arc::clone(&self.running);
        let name = spec.name.clone();
        let cron = spec.cron.clone();
        let spec = spec.clone();

        Job::new_async(cron.as_str(), move |_uuid, _lock| {
            let service = Arc::clone(&service);
            let running = Arc::clone(&running);
            let spec = spec.clone();
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                let start = std::time::Instant::now();
                info!(event = "job_started", job_name = %spec.name, "Starting scheduled sync");

                let request = SyncRequest {
                    content_type: spec.content_type,
                    max_pages: spec.max_pages,
                    start_page: spec.start_page,
                    source: spec.source,
                };

                match service.run(request).await {
                    Ok(report) => info!(
                        event = "job_finished",
                        job_name = %spec.name,
                        status = report.status.as_str(),
                        processed = report.processed,
                        duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "Scheduled sync finished"
                    ),
                    Err(e) => error!(
                        event = "job_failed",
                        job_name = %spec.name,
                        error = %e,
                        "Scheduled sync rejected"
                    ),
                }
            })
        })
        .with_context(|| format!("Invalid cron expression for job '{name}': {cron}"))
    }

    fn repair_job(&self, cron: &str) -> Result<Job> {
        let service = Arc::clone(&self.repair_service);
        let sources = self.sync_service.source_kinds();
        let running = Arc::clone(&self.running);
        let limit = self.config.repair_limit;

        Job::new_async(cron, move |_uuid, _lock| {
            let service = Arc::clone(&service);
            let running = Arc::clone(&running);
            let sources = sources.clone();
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                for source in sources.iter().copied() {
                    if let Err(e) = service.repair(source, limit).await {
                        error!(event = "job_failed", job_name = "repair", source = %source, error = %e, "Scheduled repair failed");
                    }
                }
            })
        })
        .with_context(|| format!("Invalid repair cron expression: {cron}"))
    }

    pub async fn stop(&self) {
        info!("Stopping scheduler...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::CatalogSources;
    use crate::config::Config;
    use crate::db::Store;
    use crate::domain::ContentType;
    use crate::services::{SeaOrmUpsertService, SyncSettings, UpsertService};

    async fn scheduler(config: SchedulerConfig) -> Scheduler {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let upserter = Arc::new(SeaOrmUpsertService::new(store.clone())) as Arc<dyn UpsertService>;
        let sync = Arc::new(SyncService::new(
            CatalogSources::new(),
            upserter.clone(),
            store.clone(),
            SyncSettings::from_config(&Config::default()),
        ));
        let repair = Arc::new(RepairService::new(
            CatalogSources::new(),
            upserter,
            store,
            Duration::from_millis(0),
            Duration::from_secs(60),
        ));
        Scheduler::new(sync, repair, config)
    }

    #[tokio::test]
    async fn default_jobs_parse() {
        let config = SchedulerConfig {
            repair_cron: Some("0 0 4 * * *".to_string()),
            ..SchedulerConfig::default()
        };
        let jobs = scheduler(config).await.build_jobs().unwrap();
        assert_eq!(jobs.len(), 3);
    }

    #[tokio::test]
    async fn invalid_cron_is_reported() {
        let config = SchedulerConfig {
            enabled: true,
            jobs: vec![ScheduledSync {
                name: "broken".to_string(),
                cron: "every tuesday".to_string(),
                content_type: ContentType::Anime,
                source: None,
                max_pages: 1,
                start_page: None,
            }],
            repair_cron: None,
            repair_limit: 10,
        };
        let err = scheduler(config).await.build_jobs().err().expect("expected build_jobs to fail");
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn disabled_scheduler_returns_immediately() {
        let scheduler = scheduler(SchedulerConfig::default()).await;
        scheduler.start().await.unwrap();
        assert!(!scheduler.is_running().await);
    }
}
