use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
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
    /// JSON array of the (bounded) error messages reported to the caller.
    #[sea_orm(column_type = "Text")]
    pub errors_json: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
