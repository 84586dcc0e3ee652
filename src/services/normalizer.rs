//! Maps external catalog records into the internal relational shape.
//!
//! Everything in here is a pure function of its inputs: no I/O, no clock,
//! no randomness. The same record always normalizes to the same rows, which
//! is what makes a resync converge.

use crate::domain::{ContentType, PartialDate, ScoreScale, SourceKind};
use crate::models::{AnimeDetailRow, DetailRow, ExternalMedia, MangaDetailRow, NormalizedRecord, TitleRow};
use crate::services::SyncError;
use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p>").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\u{a0}]+").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("valid regex"));

/// Normalizes one external record of the given content type.
///
/// # Errors
///
/// Returns [`SyncError::Validation`] when the record has no usable title.
pub fn normalize(
    media: &ExternalMedia,
    content_type: ContentType,
    source: SourceKind,
) -> Result<NormalizedRecord, SyncError> {
    let title = display_title(media)
        .ok_or_else(|| SyncError::validation(media.id, "record has no romaji, english or native title"))?;

    let start_date = normalize_date(media.start_date);
    let release_year = media.season_year.or(media.start_date.year);

    let title_row = TitleRow {
        source,
        content_type,
        external_id: media.id,
        title,
        title_english: clean_text(media.title_english.as_deref()),
        title_native: clean_text(media.title_native.as_deref()),
        synopsis: media.description.as_deref().and_then(strip_markup),
        cover_image: clean_text(media.cover_image.as_deref()),
        score: normalize_score(media.score, media.score_scale),
        popularity: media.popularity,
        favourites: media.favourites,
        release_year,
        start_date,
    };

    let (detail, related) = match content_type {
        ContentType::Anime => (
            DetailRow::Anime(AnimeDetailRow {
                episodes: media.episodes,
                status: clean_text(media.status.as_deref()),
                format: clean_text(media.format.as_deref()),
                season: clean_text(media.season.as_deref()),
            }),
            media.studios.as_deref().map(clean_names),
        ),
        ContentType::Manga => (
            DetailRow::Manga(MangaDetailRow {
                chapters: media.chapters,
                volumes: media.volumes,
                status: clean_text(media.status.as_deref()),
                format: clean_text(media.format.as_deref()),
            }),
            media.authors.as_deref().map(clean_names),
        ),
    };

    Ok(NormalizedRecord {
        title: title_row,
        detail,
        genre_names: media.genres.as_deref().map(clean_names),
        related_names: related,
    })
}

/// Romaji first, then English, then native.
fn display_title(media: &ExternalMedia) -> Option<String> {
    [&media.title_romaji, &media.title_english, &media.title_native]
        .into_iter()
        .find_map(|t| clean_text(t.as_deref()))
}

fn clean_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Removes HTML tags and entities from free text. Returns `None` when nothing
/// readable remains.
#[must_use]
pub fn strip_markup(raw: &str) -> Option<String> {
    let text = LINE_BREAK.replace_all(raw, "\n");
    let text = TAG.replace_all(&text, "");
    let text = html_escape::decode_html_entities(&text);
    let text = INLINE_SPACE.replace_all(&text, " ");

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    let collapsed = BLANK_LINES.replace_all(&joined, "\n\n");
    let result = collapsed.trim();

    if result.is_empty() {
        None
    } else {
        Some(result.to_string())
    }
}

/// Converts an external score to the internal 0-10 scale.
#[must_use]
pub fn normalize_score(score: Option<f32>, scale: ScoreScale) -> Option<f32> {
    let score = score.filter(|s| s.is_finite())?;
    let scaled = match scale {
        ScoreScale::Hundred => score / 10.0,
        ScoreScale::Ten => score,
    };
    Some(scaled.clamp(0.0, 10.0))
}

/// Turns a partial date into `YYYY-MM-DD`.
///
/// A year is required. Missing or out-of-range months and days default to 1,
/// and a day that does not exist in its month (Feb 30) falls back to the 1st.
#[must_use]
pub fn normalize_date(date: PartialDate) -> Option<String> {
    let year = date.year?;
    let month = date
        .month
        .and_then(|m| u32::try_from(m).ok())
        .filter(|m| (1..=12).contains(m))
        .unwrap_or(1);
    let day = date
        .day
        .and_then(|d| u32::try_from(d).ok())
        .filter(|d| (1..=31).contains(d))
        .unwrap_or(1);

    NaiveDate::from_ymd_opt(year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Trims names, drops empties and duplicates, keeps first-seen order.
fn clean_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(n.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExternalId;

    fn anime(id: i32) -> ExternalMedia {
        let mut media = ExternalMedia::bare(ExternalId::new(id), ScoreScale::Hundred);
        media.title_romaji = Some("Sousou no Frieren".to_string());
        media
    }

    #[test]
    fn rejects_record_without_any_title() {
        let media = ExternalMedia::bare(ExternalId::new(7), ScoreScale::Hundred);
        let err = normalize(&media, ContentType::Anime, SourceKind::Anilist).unwrap_err();
        assert!(matches!(err, SyncError::Validation { external_id, .. } if external_id.value() == 7));
    }

    #[test]
    fn title_falls_back_to_english_then_native() {
        let mut media = ExternalMedia::bare(ExternalId::new(1), ScoreScale::Hundred);
        media.title_romaji = Some("   ".to_string());
        media.title_native = Some("葬送のフリーレン".to_string());
        let record = normalize(&media, ContentType::Anime, SourceKind::Anilist).unwrap();
        assert_eq!(record.title.title, "葬送のフリーレン");

        media.title_english = Some("Frieren".to_string());
        let record = normalize(&media, ContentType::Anime, SourceKind::Anilist).unwrap();
        assert_eq!(record.title.title, "Frieren");
    }

    #[test]
    fn hundred_scale_divides_by_ten_across_range() {
        for raw in 0..=100 {
            let score = normalize_score(Some(raw as f32), ScoreScale::Hundred).unwrap();
            assert!((score - raw as f32 / 10.0).abs() < f32::EPSILON, "raw score {raw}");
        }
    }

    #[test]
    fn ten_scale_is_kept_and_clamped() {
        assert_eq!(normalize_score(Some(8.75), ScoreScale::Ten), Some(8.75));
        assert_eq!(normalize_score(Some(12.0), ScoreScale::Ten), Some(10.0));
        assert_eq!(normalize_score(Some(-1.0), ScoreScale::Hundred), Some(0.0));
        assert_eq!(normalize_score(None, ScoreScale::Ten), None);
        assert_eq!(normalize_score(Some(f32::NAN), ScoreScale::Ten), None);
    }

    #[test]
    fn partial_dates_get_defaults() {
        let full = PartialDate { year: Some(2023), month: Some(9), day: Some(29) };
        assert_eq!(normalize_date(full).as_deref(), Some("2023-09-29"));

        let no_day = PartialDate { year: Some(2023), month: Some(9), day: None };
        assert_eq!(normalize_date(no_day).as_deref(), Some("2023-09-01"));

        let year_only = PartialDate { year: Some(1989), month: None, day: None };
        assert_eq!(normalize_date(year_only).as_deref(), Some("1989-01-01"));

        let impossible = PartialDate { year: Some(2023), month: Some(2), day: Some(30) };
        assert_eq!(normalize_date(impossible).as_deref(), Some("2023-02-01"));

        let bad_month = PartialDate { year: Some(2023), month: Some(13), day: Some(5) };
        assert_eq!(normalize_date(bad_month).as_deref(), Some("2023-01-05"));

        assert_eq!(normalize_date(PartialDate::default()), None);
    }

    #[test]
    fn strips_markup_from_synopsis() {
        let raw = "During their decade-long quest<br><br>\n<i>Frieren</i> &amp; friends&#039; journey.  <br>\n(Source: Crunchyroll)";
        assert_eq!(
            strip_markup(raw).as_deref(),
            Some("During their decade-long quest\n\nFrieren & friends' journey.\n\n(Source: Crunchyroll)")
        );
        assert_eq!(strip_markup("<br><br>  "), None);
    }

    #[test]
    fn anime_record_uses_studios_and_anime_detail() {
        let mut media = anime(154_587);
        media.genres = Some(vec!["Adventure".into(), " Drama ".into(), "Adventure".into(), String::new()]);
        media.studios = Some(vec!["Madhouse".into()]);
        media.authors = Some(vec!["Kanehito Yamada".into()]);
        media.episodes = Some(28);
        media.score = Some(91.0);
        media.season_year = Some(2023);
        media.start_date = PartialDate { year: Some(2023), month: Some(9), day: Some(29) };

        let record = normalize(&media, ContentType::Anime, SourceKind::Anilist).unwrap();
        assert_eq!(record.title.score, Some(9.1));
        assert_eq!(record.title.release_year, Some(2023));
        assert_eq!(record.genre_names, Some(vec!["Adventure".to_string(), "Drama".to_string()]));
        assert_eq!(record.related_names, Some(vec!["Madhouse".to_string()]));
        assert!(matches!(record.detail, DetailRow::Anime(ref d) if d.episodes == Some(28)));
    }

    #[test]
    fn manga_record_uses_authors_and_manga_detail() {
        let mut media = ExternalMedia::bare(ExternalId::new(2), ScoreScale::Ten);
        media.title_romaji = Some("Berserk".into());
        media.authors = Some(vec!["Miura, Kentarou".into()]);
        media.studios = Some(vec!["Ignored".into()]);
        media.volumes = Some(42);
        media.start_date = PartialDate { year: Some(1989), month: Some(8), day: None };

        let record = normalize(&media, ContentType::Manga, SourceKind::Jikan).unwrap();
        assert_eq!(record.related_names, Some(vec!["Miura, Kentarou".to_string()]));
        assert_eq!(record.title.release_year, Some(1989));
        assert_eq!(record.title.start_date.as_deref(), Some("1989-08-01"));
        assert!(matches!(record.detail, DetailRow::Manga(ref d) if d.volumes == Some(42)));
        assert_eq!(record.genre_names, None);
    }

    #[test]
    fn normalization_is_deterministic() {
        let mut media = anime(5);
        media.description = Some("<b>Bold</b> text".into());
        let first = normalize(&media, ContentType::Anime, SourceKind::Anilist).unwrap();
        let second = normalize(&media, ContentType::Anime, SourceKind::Anilist).unwrap();
        assert_eq!(first, second);
    }
}
