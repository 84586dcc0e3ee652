use super::{CatalogSource, check_status, non_empty, request_error};
use crate::domain::{ContentType, ExternalId, PartialDate, ScoreScale, SourceKind};
use crate::models::ExternalMedia;
use crate::services::SyncError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

pub const JIKAN_API: &str = "https://api.jikan.moe/v4";

/// Jikan caps `limit` at 25 per page.
pub const MAX_LIMIT: u32 = 25;

#[derive(Debug, Deserialize)]
struct JikanResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
pub struct MalEntry {
    pub mal_id: i32,
    pub title: Option<String>,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    pub synopsis: Option<String>,
    pub images: Option<Images>,
    pub score: Option<f32>,
    /// MyAnimeList popularity rank (1 = most popular), not a member count.
    pub popularity: Option<i32>,
    pub favorites: Option<i32>,
    pub year: Option<i32>,
    pub season: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub episodes: Option<i32>,
    pub chapters: Option<i32>,
    pub volumes: Option<i32>,
    /// Anime airing window.
    pub aired: Option<DateRange>,
    /// Manga publication window.
    pub published: Option<DateRange>,
    pub genres: Option<Vec<MalGenericInfo>>,
    pub studios: Option<Vec<MalGenericInfo>>,
    pub authors: Option<Vec<MalGenericInfo>>,
}

#[derive(Debug, Deserialize)]
pub struct Images {
    pub jpg: Option<ImageSet>,
    pub webp: Option<ImageSet>,
}

#[derive(Debug, Deserialize)]
pub struct ImageSet {
    pub image_url: Option<String>,
    pub large_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DateRange {
    pub prop: Option<DateRangeProp>,
}

#[derive(Debug, Deserialize)]
pub struct DateRangeProp {
    pub from: Option<PartialDate>,
}

#[derive(Debug, Deserialize)]
pub struct MalGenericInfo {
    pub mal_id: i32,
    pub name: String,
}

impl MalEntry {
    fn start_date(&self) -> PartialDate {
        self.aired
            .as_ref()
            .or(self.published.as_ref())
            .and_then(|r| r.prop.as_ref())
            .and_then(|p| p.from)
            .unwrap_or_default()
    }

    fn cover_image(&self) -> Option<String> {
        let images = self.images.as_ref()?;
        let pick = |set: &Option<ImageSet>| {
            set.as_ref()
                .and_then(|s| s.large_image_url.clone().or_else(|| s.image_url.clone()))
        };
        pick(&images.jpg).or_else(|| pick(&images.webp))
    }

    fn into_media(self) -> ExternalMedia {
        let start_date = self.start_date();
        let cover_image = self.cover_image();
        let names = |list: Option<Vec<MalGenericInfo>>| {
            list.map(|items| items.into_iter().map(|i| i.name).collect::<Vec<_>>())
        };

        ExternalMedia {
            id: ExternalId::new(self.mal_id),
            title_romaji: non_empty(self.title),
            title_english: non_empty(self.title_english),
            title_native: non_empty(self.title_japanese),
            description: self.synopsis,
            cover_image,
            score: self.score,
            score_scale: ScoreScale::Ten,
            popularity: self.popularity,
            favourites: self.favorites,
            season_year: self.year,
            start_date,
            genres: names(self.genres),
            studios: names(self.studios),
            authors: names(self.authors),
            episodes: self.episodes,
            chapters: self.chapters,
            volumes: self.volumes,
            status: self.status,
            format: self.entry_type,
            season: self.season,
        }
    }
}

#[derive(Clone)]
pub struct JikanClient {
    client: Client,
    base_url: String,
}

impl JikanClient {
    #[must_use]
    pub fn with_shared_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn page_url(&self, content_type: ContentType, page: u32, limit: u32) -> Result<url::Url, SyncError> {
        let mut url = url::Url::parse(&format!("{}/{}", self.base_url, content_type.as_str()))
            .map_err(|e| SyncError::Fatal(format!("invalid Jikan base URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &limit.to_string())
            .append_pair("order_by", "popularity")
            .append_pair("sort", "asc");
        Ok(url)
    }
}

#[async_trait::async_trait]
impl CatalogSource for JikanClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Jikan
    }

    fn max_page_size(&self) -> u32 {
        MAX_LIMIT
    }

    async fn fetch_page(
        &self,
        content_type: ContentType,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ExternalMedia>, SyncError> {
        let source = SourceKind::Jikan;
        let url = self.page_url(content_type, page.max(1), per_page.clamp(1, MAX_LIMIT))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(source, &e))?;
        let response = check_status(source, response).await?;

        let body: JikanResponse<Vec<MalEntry>> = response
            .json()
            .await
            .map_err(|e| request_error(source, &e))?;

        debug!(
            source = "jikan",
            content_type = %content_type,
            page,
            count = body.data.len(),
            "Fetched catalog page"
        );

        Ok(body.data.into_iter().map(MalEntry::into_media).collect())
    }

    async fn fetch_one(
        &self,
        content_type: ContentType,
        id: ExternalId,
    ) -> Result<Option<ExternalMedia>, SyncError> {
        let source = SourceKind::Jikan;
        let url = format!("{}/{}/{}", self.base_url, content_type.as_str(), id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(source, &e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = check_status(source, response).await?;
        let body: JikanResponse<MalEntry> = response
            .json()
            .await
            .map_err(|e| request_error(source, &e))?;

        Ok(Some(body.data.into_media()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_manga_entry() {
        let entry: MalEntry = serde_json::from_str(
            r#"{
                "mal_id": 2,
                "title": "Berserk",
                "title_english": "Berserk",
                "title_japanese": "ベルセルク",
                "synopsis": "Guts, a former mercenary...",
                "images": { "jpg": { "image_url": "small.jpg", "large_image_url": "large.jpg" } },
                "score": 9.47,
                "popularity": 1,
                "favorites": 130000,
                "status": "Publishing",
                "type": "Manga",
                "chapters": null,
                "volumes": null,
                "published": { "prop": { "from": { "day": 25, "month": 8, "year": 1989 } } },
                "genres": [ { "mal_id": 1, "name": "Action" } ],
                "authors": [ { "mal_id": 1868, "name": "Miura, Kentarou" } ]
            }"#,
        )
        .unwrap();

        let media = entry.into_media();
        assert_eq!(media.id, ExternalId::new(2));
        assert_eq!(media.score_scale, ScoreScale::Ten);
        assert_eq!(media.cover_image.as_deref(), Some("large.jpg"));
        assert_eq!(media.start_date.year, Some(1989));
        assert_eq!(media.authors, Some(vec!["Miura, Kentarou".to_string()]));
        assert_eq!(media.studios, None);
        assert_eq!(media.format.as_deref(), Some("Manga"));
    }

    #[test]
    fn page_url_carries_pagination() {
        let client = JikanClient::with_shared_client(Client::new(), "http://localhost:9/v4/");
        let url = client.page_url(ContentType::Anime, 3, 25).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9/v4/anime?page=3&limit=25&order_by=popularity&sort=asc"
        );
    }
}
