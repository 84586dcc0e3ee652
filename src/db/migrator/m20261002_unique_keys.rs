use sea_orm_migration::prelude::*;

/// Uniqueness constraints the upserts resolve their conflicts against.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("idx_titles_source_type_external_id")
                    .table(Titles::Table)
                    .col(Titles::Source)
                    .col(Titles::ContentType)
                    .col(Titles::ExternalId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_titles_content_type")
                    .table(Titles::Table)
                    .col(Titles::ContentType)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_genres_name_type")
                    .table(Genres::Table)
                    .col(Genres::Name)
                    .col(Genres::ContentType)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_genres_name_type").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_titles_content_type").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_titles_source_type_external_id")
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Titles {
    Table,
    Source,
    ContentType,
    ExternalId,
}

#[derive(DeriveIden)]
enum Genres {
    Table,
    Name,
    ContentType,
}
