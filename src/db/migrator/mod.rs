use sea_orm_migration::prelude::*;

mod m20261001_initial;
mod m20261002_unique_keys;
mod m20261003_add_sync_runs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_initial::Migration),
            Box::new(m20261002_unique_keys::Migration),
            Box::new(m20261003_add_sync_runs::Migration),
        ]
    }
}
