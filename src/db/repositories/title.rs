use crate::domain::{ContentType, ExternalId, SourceKind, TitleId};
use crate::entities::{anime_details, manga_details, prelude::*, titles};
use crate::models::{AnimeDetailRow, MangaDetailRow, TitleRow};
use sea_orm::sea_query::{OnConflict, Query};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::Serialize;

/// Content columns of a title: everything a resync may overwrite.
const TITLE_CONTENT_COLUMNS: [titles::Column; 11] = [
    titles::Column::Title,
    titles::Column::TitleEnglish,
    titles::Column::TitleNative,
    titles::Column::Synopsis,
    titles::Column::CoverImage,
    titles::Column::Score,
    titles::Column::Popularity,
    titles::Column::Favourites,
    titles::Column::ReleaseYear,
    titles::Column::StartDate,
    titles::Column::UpdatedAt,
];

/// A title whose declared content type has no detail row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncompleteTitle {
    pub title_id: i32,
    pub source: String,
    pub content_type: String,
    pub external_id: i32,
    pub title: String,
}

pub struct TitleRepository {
    conn: DatabaseConnection,
}

impl TitleRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn find_by_key(
        &self,
        source: SourceKind,
        content_type: ContentType,
        external_id: ExternalId,
    ) -> Result<Option<titles::Model>, DbErr> {
        Titles::find()
            .filter(titles::Column::Source.eq(source.as_str()))
            .filter(titles::Column::ContentType.eq(content_type.as_str()))
            .filter(titles::Column::ExternalId.eq(external_id.value()))
            .one(&self.conn)
            .await
    }

    pub async fn get(&self, id: TitleId) -> Result<Option<titles::Model>, DbErr> {
        Titles::find_by_id(id.value()).one(&self.conn).await
    }

    /// Inserts the title, or overwrites its content columns if a row with the
    /// same (source, content type, external id) already exists. The conflict
    /// target makes concurrent runs on the same id converge on one row.
    pub async fn upsert(&self, row: &TitleRow, now: &str) -> Result<(), DbErr> {
        let active_model = titles::ActiveModel {
            source: Set(row.source.as_str().to_string()),
            content_type: Set(row.content_type.as_str().to_string()),
            external_id: Set(row.external_id.value()),
            title: Set(row.title.clone()),
            title_english: Set(row.title_english.clone()),
            title_native: Set(row.title_native.clone()),
            synopsis: Set(row.synopsis.clone()),
            cover_image: Set(row.cover_image.clone()),
            score: Set(row.score),
            popularity: Set(row.popularity),
            favourites: Set(row.favourites),
            release_year: Set(row.release_year),
            start_date: Set(row.start_date.clone()),
            created_at: Set(now.to_string()),
            updated_at: Set(now.to_string()),
            ..Default::default()
        };

        Titles::insert(active_model)
            .on_conflict(
                OnConflict::columns([
                    titles::Column::Source,
                    titles::Column::ContentType,
                    titles::Column::ExternalId,
                ])
                .update_columns(TITLE_CONTENT_COLUMNS)
                .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;

        Ok(())
    }

    pub async fn get_anime_detail(&self, id: TitleId) -> Result<Option<anime_details::Model>, DbErr> {
        AnimeDetails::find_by_id(id.value()).one(&self.conn).await
    }

    pub async fn get_manga_detail(&self, id: TitleId) -> Result<Option<manga_details::Model>, DbErr> {
        MangaDetails::find_by_id(id.value()).one(&self.conn).await
    }

    pub async fn upsert_anime_detail(&self, id: TitleId, row: &AnimeDetailRow) -> Result<(), DbErr> {
        let active_model = anime_details::ActiveModel {
            title_id: Set(id.value()),
            episodes: Set(row.episodes),
            status: Set(row.status.clone()),
            format: Set(row.format.clone()),
            season: Set(row.season.clone()),
        };

        AnimeDetails::insert(active_model)
            .on_conflict(
                OnConflict::column(anime_details::Column::TitleId)
                    .update_columns([
                        anime_details::Column::Episodes,
                        anime_details::Column::Status,
                        anime_details::Column::Format,
                        anime_details::Column::Season,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;
        Ok(())
    }

    pub async fn upsert_manga_detail(&self, id: TitleId, row: &MangaDetailRow) -> Result<(), DbErr> {
        let active_model = manga_details::ActiveModel {
            title_id: Set(id.value()),
            chapters: Set(row.chapters),
            volumes: Set(row.volumes),
            status: Set(row.status.clone()),
            format: Set(row.format.clone()),
        };

        MangaDetails::insert(active_model)
            .on_conflict(
                OnConflict::column(manga_details::Column::TitleId)
                    .update_columns([
                        manga_details::Column::Chapters,
                        manga_details::Column::Volumes,
                        manga_details::Column::Status,
                        manga_details::Column::Format,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;
        Ok(())
    }

    pub async fn count(&self, content_type: Option<ContentType>) -> Result<u64, DbErr> {
        let mut query = Titles::find();
        if let Some(ct) = content_type {
            query = query.filter(titles::Column::ContentType.eq(ct.as_str()));
        }
        query.count(&self.conn).await
    }

    pub async fn list(
        &self,
        content_type: Option<ContentType>,
        limit: u64,
    ) -> Result<Vec<titles::Model>, DbErr> {
        let mut query = Titles::find();
        if let Some(ct) = content_type {
            query = query.filter(titles::Column::ContentType.eq(ct.as_str()));
        }
        query
            .order_by_asc(titles::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await
    }

    /// Titles whose declared content type has no matching detail row, i.e.
    /// records left half-written by an interrupted upsert.
    pub async fn find_incomplete(
        &self,
        content_type: Option<ContentType>,
        source: Option<SourceKind>,
    ) -> Result<Vec<IncompleteTitle>, DbErr> {
        let missing_anime = titles::Column::ContentType
            .eq(ContentType::Anime.as_str())
            .and(
                titles::Column::Id.not_in_subquery(
                    Query::select()
                        .column(anime_details::Column::TitleId)
                        .from(AnimeDetails)
                        .to_owned(),
                ),
            );

        let missing_manga = titles::Column::ContentType
            .eq(ContentType::Manga.as_str())
            .and(
                titles::Column::Id.not_in_subquery(
                    Query::select()
                        .column(manga_details::Column::TitleId)
                        .from(MangaDetails)
                        .to_owned(),
                ),
            );

        let mut query = Titles::find().filter(missing_anime.or(missing_manga));
        if let Some(ct) = content_type {
            query = query.filter(titles::Column::ContentType.eq(ct.as_str()));
        }
        if let Some(source) = source {
            query = query.filter(titles::Column::Source.eq(source.as_str()));
        }

        let rows = query
            .order_by_asc(titles::Column::Id)
            .all(&self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|m| IncompleteTitle {
                title_id: m.id,
                source: m.source,
                content_type: m.content_type,
                external_id: m.external_id,
                title: m.title,
            })
            .collect())
    }

    /// Drops the detail rows of a title, leaving it incomplete.
    pub async fn delete_detail(&self, id: TitleId) -> Result<(), DbErr> {
        AnimeDetails::delete_by_id(id.value()).exec(&self.conn).await?;
        MangaDetails::delete_by_id(id.value()).exec(&self.conn).await?;
        Ok(())
    }
}
