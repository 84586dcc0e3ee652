use crate::domain::{ContentType, ExternalId, SourceKind, TitleId};
use crate::entities::{anime_details, manga_details, sync_runs, titles};
use crate::models::{AnimeDetailRow, MangaDetailRow, TitleRow};
use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::reference::{LinkChanges, ReferenceKind};
pub use repositories::title::IncompleteTitle;

pub type SyncRun = sync_runs::Model;
pub type Title = titles::Model;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");
        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        // Every pooled connection to an in-memory database would otherwise
        // see its own empty database.
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        if !in_memory {
            opt.idle_timeout(Duration::from_secs(300))
                .max_lifetime(Duration::from_secs(600));
        }

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<(), DbErr> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn title_repo(&self) -> repositories::title::TitleRepository {
        repositories::title::TitleRepository::new(self.conn.clone())
    }

    fn reference_repo(&self) -> repositories::reference::ReferenceRepository {
        repositories::reference::ReferenceRepository::new(self.conn.clone())
    }

    fn sync_run_repo(&self) -> repositories::sync_run::SyncRunRepository {
        repositories::sync_run::SyncRunRepository::new(self.conn.clone())
    }

    pub async fn find_title(
        &self,
        source: SourceKind,
        content_type: ContentType,
        external_id: ExternalId,
    ) -> Result<Option<Title>, DbErr> {
        self.title_repo()
            .find_by_key(source, content_type, external_id)
            .await
    }

    pub async fn get_title(&self, id: TitleId) -> Result<Option<Title>, DbErr> {
        self.title_repo().get(id).await
    }

    pub async fn upsert_title(&self, row: &TitleRow, now: &str) -> Result<(), DbErr> {
        self.title_repo().upsert(row, now).await
    }

    pub async fn get_anime_detail(&self, id: TitleId) -> Result<Option<anime_details::Model>, DbErr> {
        self.title_repo().get_anime_detail(id).await
    }

    pub async fn get_manga_detail(&self, id: TitleId) -> Result<Option<manga_details::Model>, DbErr> {
        self.title_repo().get_manga_detail(id).await
    }

    pub async fn upsert_anime_detail(&self, id: TitleId, row: &AnimeDetailRow) -> Result<(), DbErr> {
        self.title_repo().upsert_anime_detail(id, row).await
    }

    pub async fn upsert_manga_detail(&self, id: TitleId, row: &MangaDetailRow) -> Result<(), DbErr> {
        self.title_repo().upsert_manga_detail(id, row).await
    }

    pub async fn delete_title_detail(&self, id: TitleId) -> Result<(), DbErr> {
        self.title_repo().delete_detail(id).await
    }

    pub async fn count_titles(&self, content_type: Option<ContentType>) -> Result<u64, DbErr> {
        self.title_repo().count(content_type).await
    }

    pub async fn list_titles(
        &self,
        content_type: Option<ContentType>,
        limit: u64,
    ) -> Result<Vec<Title>, DbErr> {
        self.title_repo().list(content_type, limit).await
    }

    pub async fn find_incomplete_titles(
        &self,
        content_type: Option<ContentType>,
        source: Option<SourceKind>,
    ) -> Result<Vec<IncompleteTitle>, DbErr> {
        self.title_repo().find_incomplete(content_type, source).await
    }

    pub async fn ensure_reference(&self, kind: ReferenceKind, name: &str) -> Result<i32, DbErr> {
        self.reference_repo().ensure(kind, name).await
    }

    pub async fn linked_reference_ids(
        &self,
        kind: ReferenceKind,
        title: TitleId,
    ) -> Result<BTreeSet<i32>, DbErr> {
        self.reference_repo().linked_ids(kind, title).await
    }

    pub async fn link_reference(
        &self,
        kind: ReferenceKind,
        title: TitleId,
        reference_id: i32,
    ) -> Result<(), DbErr> {
        self.reference_repo().link(kind, title, reference_id).await
    }

    pub async fn unlink_references(
        &self,
        kind: ReferenceKind,
        title: TitleId,
        stale: &[i32],
    ) -> Result<u64, DbErr> {
        self.reference_repo().unlink(kind, title, stale).await
    }

    pub async fn linked_reference_names(
        &self,
        kind: ReferenceKind,
        title: TitleId,
    ) -> Result<Vec<String>, DbErr> {
        self.reference_repo().linked_names(kind, title).await
    }

    pub async fn record_sync_run(&self, run: sync_runs::ActiveModel) -> Result<(), DbErr> {
        self.sync_run_repo().insert(run).await
    }

    pub async fn recent_sync_runs(&self, limit: u64) -> Result<Vec<SyncRun>, DbErr> {
        self.sync_run_repo().recent(limit).await
    }
}
