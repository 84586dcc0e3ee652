use crate::domain::{ContentType, ExternalId, SourceKind};
use serde::Serialize;

/// Title columns derived from one external record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleRow {
    pub source: SourceKind,
    pub content_type: ContentType,
    pub external_id: ExternalId,
    pub title: String,
    pub title_english: Option<String>,
    pub title_native: Option<String>,
    pub synopsis: Option<String>,
    pub cover_image: Option<String>,
    pub score: Option<f32>,
    pub popularity: Option<i32>,
    pub favourites: Option<i32>,
    pub release_year: Option<i32>,
    /// ISO `YYYY-MM-DD`.
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnimeDetailRow {
    pub episodes: Option<i32>,
    pub status: Option<String>,
    pub format: Option<String>,
    pub season: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MangaDetailRow {
    pub chapters: Option<i32>,
    pub volumes: Option<i32>,
    pub status: Option<String>,
    pub format: Option<String>,
}

/// Type-specific extension of a title. Always matches the title's content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DetailRow {
    Anime(AnimeDetailRow),
    Manga(MangaDetailRow),
}

impl DetailRow {
    #[must_use]
    pub const fn content_type(&self) -> ContentType {
        match self {
            Self::Anime(_) => ContentType::Anime,
            Self::Manga(_) => ContentType::Manga,
        }
    }
}

/// Output of the normalizer: everything the upserter needs for one title.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub title: TitleRow,
    pub detail: DetailRow,
    pub genre_names: Option<Vec<String>>,
    /// Studios for anime, authors for manga.
    pub related_names: Option<Vec<String>>,
}

impl NormalizedRecord {
    #[must_use]
    pub const fn external_id(&self) -> ExternalId {
        self.title.external_id
    }
}
