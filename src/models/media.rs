use crate::domain::{ExternalId, PartialDate, ScoreScale};

/// A catalog record as reported by an external source, before normalization.
///
/// Both the GraphQL and REST adapters map their payloads into this shape so
/// the normalizer only has one input type. Fields keep the source's raw
/// conventions: the description may contain markup, the score is on the
/// source's own scale and dates may be partial.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalMedia {
    pub id: ExternalId,
    pub title_romaji: Option<String>,
    pub title_english: Option<String>,
    pub title_native: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub score: Option<f32>,
    pub score_scale: ScoreScale,
    pub popularity: Option<i32>,
    pub favourites: Option<i32>,
    pub season_year: Option<i32>,
    pub start_date: PartialDate,
    /// `None` when the source did not report the list at all.
    pub genres: Option<Vec<String>>,
    pub studios: Option<Vec<String>>,
    pub authors: Option<Vec<String>>,
    pub episodes: Option<i32>,
    pub chapters: Option<i32>,
    pub volumes: Option<i32>,
    pub status: Option<String>,
    pub format: Option<String>,
    pub season: Option<String>,
}

impl ExternalMedia {
    /// An otherwise empty record carrying only an id and score convention.
    #[must_use]
    pub fn bare(id: ExternalId, score_scale: ScoreScale) -> Self {
        Self {
            id,
            title_romaji: None,
            title_english: None,
            title_native: None,
            description: None,
            cover_image: None,
            score: None,
            score_scale,
            popularity: None,
            favourites: None,
            season_year: None,
            start_date: PartialDate::default(),
            genres: None,
            studios: None,
            authors: None,
            episodes: None,
            chapters: None,
            volumes: None,
            status: None,
            format: None,
            season: None,
        }
    }
}
