use crate::entities::{prelude::*, sync_runs};
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, QueryOrder, QuerySelect};

pub struct SyncRunRepository {
    conn: DatabaseConnection,
}

impl SyncRunRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, run: sync_runs::ActiveModel) -> Result<(), DbErr> {
        SyncRuns::insert(run).exec_without_returning(&self.conn).await?;
        Ok(())
    }

    pub async fn recent(&self, limit: u64) -> Result<Vec<sync_runs::Model>, DbErr> {
        SyncRuns::find()
            .order_by_desc(sync_runs::Column::StartedAt)
            .limit(limit)
            .all(&self.conn)
            .await
    }
}
