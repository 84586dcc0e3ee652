use crate::domain::{ContentType, TitleId};
use crate::entities::{authors, genres, prelude::*, studios, title_authors, title_genres, title_studios};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use std::collections::BTreeSet;

/// Which many-to-many link a reference name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Genre(ContentType),
    Studio,
    Author,
}

impl ReferenceKind {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Genre(_) => "genre",
            Self::Studio => "studio",
            Self::Author => "author",
        }
    }
}

/// How a title's link set changed during a sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkChanges {
    pub added: usize,
    pub removed: usize,
}

impl LinkChanges {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Get-or-create for genres, studios and authors plus their join rows.
///
/// Reference rows are created with insert-or-ignore against their unique key
/// and then read back, so two runs racing on the same name end up sharing
/// one row instead of failing or duplicating it.
pub struct ReferenceRepository {
    conn: DatabaseConnection,
}

impl ReferenceRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn ensure(&self, kind: ReferenceKind, name: &str) -> Result<i32, DbErr> {
        match kind {
            ReferenceKind::Genre(content_type) => self.ensure_genre(name, content_type).await,
            ReferenceKind::Studio => self.ensure_studio(name).await,
            ReferenceKind::Author => self.ensure_author(name).await,
        }
    }

    async fn ensure_genre(&self, name: &str, content_type: ContentType) -> Result<i32, DbErr> {
        Genres::insert(genres::ActiveModel {
            name: Set(name.to_string()),
            content_type: Set(content_type.as_str().to_string()),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([genres::Column::Name, genres::Column::ContentType])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await?;

        Genres::find()
            .filter(genres::Column::Name.eq(name))
            .filter(genres::Column::ContentType.eq(content_type.as_str()))
            .one(&self.conn)
            .await?
            .map(|g| g.id)
            .ok_or_else(|| DbErr::RecordNotFound(format!("genre '{name}' vanished after insert")))
    }

    async fn ensure_studio(&self, name: &str) -> Result<i32, DbErr> {
        Studios::insert(studios::ActiveModel {
            name: Set(name.to_string()),
            ..Default::default()
        })
        .on_conflict(OnConflict::column(studios::Column::Name).do_nothing().to_owned())
        .exec_without_returning(&self.conn)
        .await?;

        Studios::find()
            .filter(studios::Column::Name.eq(name))
            .one(&self.conn)
            .await?
            .map(|s| s.id)
            .ok_or_else(|| DbErr::RecordNotFound(format!("studio '{name}' vanished after insert")))
    }

    async fn ensure_author(&self, name: &str) -> Result<i32, DbErr> {
        Authors::insert(authors::ActiveModel {
            name: Set(name.to_string()),
            ..Default::default()
        })
        .on_conflict(OnConflict::column(authors::Column::Name).do_nothing().to_owned())
        .exec_without_returning(&self.conn)
        .await?;

        Authors::find()
            .filter(authors::Column::Name.eq(name))
            .one(&self.conn)
            .await?
            .map(|a| a.id)
            .ok_or_else(|| DbErr::RecordNotFound(format!("author '{name}' vanished after insert")))
    }

    /// Reference ids currently linked to a title.
    pub async fn linked_ids(&self, kind: ReferenceKind, title: TitleId) -> Result<BTreeSet<i32>, DbErr> {
        let id = title.value();
        let ids: BTreeSet<i32> = match kind {
            ReferenceKind::Genre(_) => TitleGenres::find()
                .filter(title_genres::Column::TitleId.eq(id))
                .all(&self.conn)
                .await?
                .into_iter()
                .map(|l| l.genre_id)
                .collect(),
            ReferenceKind::Studio => TitleStudios::find()
                .filter(title_studios::Column::TitleId.eq(id))
                .all(&self.conn)
                .await?
                .into_iter()
                .map(|l| l.studio_id)
                .collect(),
            ReferenceKind::Author => TitleAuthors::find()
                .filter(title_authors::Column::TitleId.eq(id))
                .all(&self.conn)
                .await?
                .into_iter()
                .map(|l| l.author_id)
                .collect(),
        };
        Ok(ids)
    }

    /// Idempotent insert of a join row.
    pub async fn link(&self, kind: ReferenceKind, title: TitleId, reference_id: i32) -> Result<(), DbErr> {
        let title_id = title.value();
        match kind {
            ReferenceKind::Genre(_) => {
                TitleGenres::insert(title_genres::ActiveModel {
                    title_id: Set(title_id),
                    genre_id: Set(reference_id),
                })
                .on_conflict(
                    OnConflict::columns([title_genres::Column::TitleId, title_genres::Column::GenreId])
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
            }
            ReferenceKind::Studio => {
                TitleStudios::insert(title_studios::ActiveModel {
                    title_id: Set(title_id),
                    studio_id: Set(reference_id),
                })
                .on_conflict(
                    OnConflict::columns([title_studios::Column::TitleId, title_studios::Column::StudioId])
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
            }
            ReferenceKind::Author => {
                TitleAuthors::insert(title_authors::ActiveModel {
                    title_id: Set(title_id),
                    author_id: Set(reference_id),
                })
                .on_conflict(
                    OnConflict::columns([title_authors::Column::TitleId, title_authors::Column::AuthorId])
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
            }
        }
        Ok(())
    }

    /// Removes join rows of one kind whose reference id is in `stale`.
    pub async fn unlink(&self, kind: ReferenceKind, title: TitleId, stale: &[i32]) -> Result<u64, DbErr> {
        if stale.is_empty() {
            return Ok(0);
        }

        let title_id = title.value();
        let stale = stale.to_vec();
        let result = match kind {
            ReferenceKind::Genre(_) => {
                TitleGenres::delete_many()
                    .filter(title_genres::Column::TitleId.eq(title_id))
                    .filter(title_genres::Column::GenreId.is_in(stale))
                    .exec(&self.conn)
                    .await?
            }
            ReferenceKind::Studio => {
                TitleStudios::delete_many()
                    .filter(title_studios::Column::TitleId.eq(title_id))
                    .filter(title_studios::Column::StudioId.is_in(stale))
                    .exec(&self.conn)
                    .await?
            }
            ReferenceKind::Author => {
                TitleAuthors::delete_many()
                    .filter(title_authors::Column::TitleId.eq(title_id))
                    .filter(title_authors::Column::AuthorId.is_in(stale))
                    .exec(&self.conn)
                    .await?
            }
        };
        Ok(result.rows_affected)
    }

    /// Names linked to a title, sorted, for reporting and verification.
    pub async fn linked_names(&self, kind: ReferenceKind, title: TitleId) -> Result<Vec<String>, DbErr> {
        let ids: Vec<i32> = self.linked_ids(kind, title).await?.into_iter().collect();
        let mut names: Vec<String> = match kind {
            ReferenceKind::Genre(_) => Genres::find()
                .filter(genres::Column::Id.is_in(ids))
                .all(&self.conn)
                .await?
                .into_iter()
                .map(|g| g.name)
                .collect(),
            ReferenceKind::Studio => Studios::find()
                .filter(studios::Column::Id.is_in(ids))
                .all(&self.conn)
                .await?
                .into_iter()
                .map(|s| s.name)
                .collect(),
            ReferenceKind::Author => Authors::find()
                .filter(authors::Column::Id.is_in(ids))
                .all(&self.conn)
                .await?
                .into_iter()
                .map(|a| a.name)
                .collect(),
        };
        names.sort();
        Ok(names)
    }
}
