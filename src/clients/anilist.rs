use super::{CatalogSource, check_status, non_empty, request_error};
use crate::domain::{ContentType, ExternalId, PartialDate, ScoreScale, SourceKind};
use crate::models::ExternalMedia;
use crate::services::SyncError;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ANILIST_API: &str = "https://graphql.anilist.co";

/// AniList refuses `perPage` above this.
pub const MAX_PER_PAGE: u32 = 50;

const MEDIA_FIELDS: &str = r"
    id
    title { romaji english native }
    description(asHtml: false)
    coverImage { extraLarge large }
    averageScore
    popularity
    favourites
    seasonYear
    season
    format
    status
    episodes
    chapters
    volumes
    startDate { year month day }
    genres
    studios(isMain: true) {
        nodes {
            name
            isAnimationStudio
        }
    }
    staff(sort: RELEVANCE, perPage: 10) {
        edges {
            role
            node { name { full } }
        }
    }
";

#[derive(Serialize)]
struct GraphQLRequest<V: Serialize> {
    query: String,
    variables: V,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageVariables {
    page: u32,
    per_page: u32,
    #[serde(rename = "type")]
    media_type: &'static str,
}

#[derive(Serialize)]
struct IdVariables {
    id: i32,
    #[serde(rename = "type")]
    media_type: &'static str,
}

#[derive(Deserialize)]
struct GraphQLResponse<D> {
    data: Option<D>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

enum GraphQLOutcome<D> {
    Data(D),
    NotFound,
}

#[derive(Deserialize)]
struct GraphQLError {
    message: String,
    status: Option<u16>,
}

#[derive(Deserialize)]
struct PageData {
    #[serde(rename = "Page")]
    page: Page,
}

#[derive(Deserialize)]
struct Page {
    media: Vec<Media>,
}

#[derive(Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: Option<Media>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Media {
    id: i32,
    title: Option<Title>,
    description: Option<String>,
    cover_image: Option<CoverImage>,
    average_score: Option<i32>,
    popularity: Option<i32>,
    favourites: Option<i32>,
    season_year: Option<i32>,
    season: Option<String>,
    format: Option<String>,
    status: Option<String>,
    episodes: Option<i32>,
    chapters: Option<i32>,
    volumes: Option<i32>,
    start_date: Option<PartialDate>,
    genres: Option<Vec<String>>,
    studios: Option<Studios>,
    staff: Option<Staff>,
}

#[derive(Deserialize)]
struct Title {
    romaji: Option<String>,
    english: Option<String>,
    native: Option<String>,
}

#[derive(Deserialize)]
struct CoverImage {
    #[serde(rename = "extraLarge")]
    extra_large: Option<String>,
    large: Option<String>,
}

#[derive(Deserialize)]
struct Studios {
    nodes: Vec<StudioNode>,
}

#[derive(Deserialize)]
struct StudioNode {
    name: String,
    #[serde(rename = "isAnimationStudio")]
    is_animation_studio: bool,
}

#[derive(Deserialize)]
struct Staff {
    edges: Vec<StaffEdge>,
}

#[derive(Deserialize)]
struct StaffEdge {
    role: Option<String>,
    node: Option<StaffNode>,
}

#[derive(Deserialize)]
struct StaffNode {
    name: Option<StaffName>,
}

#[derive(Deserialize)]
struct StaffName {
    full: Option<String>,
}

/// Staff roles that make someone an author of a manga.
fn is_author_role(role: &str) -> bool {
    let role = role.to_ascii_lowercase();
    role.starts_with("story") || role.starts_with("art") || role.contains("original creator")
}

#[derive(Clone)]
pub struct AnilistClient {
    client: Client,
    endpoint: String,
}

impl AnilistClient {
    #[must_use]
    pub fn with_shared_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Sends one GraphQL query. A 404 comes back as `NotFound` for the caller
    /// to judge; a response without data is a malformed payload.
    async fn post<V, D>(&self, query: String, variables: V) -> Result<GraphQLOutcome<D>, SyncError>
    where
        V: Serialize + Send,
        D: serde::de::DeserializeOwned,
    {
        let source = SourceKind::Anilist;
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GraphQLRequest { query, variables })
            .send()
            .await
            .map_err(|e| request_error(source, &e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(GraphQLOutcome::NotFound);
        }

        let response = check_status(source, response).await?;
        let body: GraphQLResponse<D> = response
            .json()
            .await
            .map_err(|e| request_error(source, &e))?;

        if let Some(data) = body.data {
            return Ok(GraphQLOutcome::Data(data));
        }
        if body.errors.iter().any(|e| e.status == Some(404)) {
            return Ok(GraphQLOutcome::NotFound);
        }
        if body.errors.is_empty() {
            return Err(SyncError::transport(
                source,
                "malformed payload: response carries no data",
            ));
        }

        let messages: Vec<String> = body.errors.iter().map(|e| e.message.clone()).collect();
        Err(SyncError::transport(source, messages.join("; ")))
    }

    fn map_media(m: Media) -> ExternalMedia {
        let (romaji, english, native) = m
            .title
            .map(|t| (t.romaji, t.english, t.native))
            .unwrap_or_default();

        let studios = m.studios.map(|s| {
            s.nodes
                .into_iter()
                .filter(|n| n.is_animation_studio)
                .map(|n| n.name)
                .collect::<Vec<String>>()
        });

        let authors = m.staff.map(|s| {
            s.edges
                .into_iter()
                .filter(|e| e.role.as_deref().is_some_and(is_author_role))
                .filter_map(|e| e.node.and_then(|n| n.name).and_then(|n| n.full))
                .collect::<Vec<String>>()
        });

        ExternalMedia {
            id: ExternalId::new(m.id),
            title_romaji: non_empty(romaji),
            title_english: non_empty(english),
            title_native: non_empty(native),
            description: m.description,
            cover_image: m.cover_image.and_then(|c| c.extra_large.or(c.large)),
            score: m.average_score.map(|s| s as f32),
            score_scale: ScoreScale::Hundred,
            popularity: m.popularity,
            favourites: m.favourites,
            season_year: m.season_year,
            start_date: m.start_date.unwrap_or_default(),
            genres: m.genres,
            studios,
            authors,
            episodes: m.episodes,
            chapters: m.chapters,
            volumes: m.volumes,
            status: m.status,
            format: m.format,
            season: m.season,
        }
    }
}

#[async_trait::async_trait]
impl CatalogSource for AnilistClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Anilist
    }

    fn max_page_size(&self) -> u32 {
        MAX_PER_PAGE
    }

    async fn fetch_page(
        &self,
        content_type: ContentType,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ExternalMedia>, SyncError> {
        let query = format!(
            r"
            query ($page: Int, $perPage: Int, $type: MediaType) {{
                Page(page: $page, perPage: $perPage) {{
                    media(type: $type, sort: [POPULARITY_DESC, ID]) {{
                        {MEDIA_FIELDS}
                    }}
                }}
            }}
            "
        );

        let variables = PageVariables {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
            media_type: content_type.anilist_type(),
        };

        // A page query never legitimately 404s, so an empty answer here must
        // not be mistaken for the end of the catalog.
        let media = match self.post::<_, PageData>(query, variables).await? {
            GraphQLOutcome::Data(data) => data.page.media,
            GraphQLOutcome::NotFound => {
                return Err(SyncError::transport(
                    SourceKind::Anilist,
                    format!("HTTP 404 for page {page}"),
                ));
            }
        };

        debug!(
            source = "anilist",
            content_type = %content_type,
            page,
            count = media.len(),
            "Fetched catalog page"
        );

        Ok(media.into_iter().map(Self::map_media).collect())
    }

    async fn fetch_one(
        &self,
        content_type: ContentType,
        id: ExternalId,
    ) -> Result<Option<ExternalMedia>, SyncError> {
        let query = format!(
            r"
            query ($id: Int, $type: MediaType) {{
                Media(id: $id, type: $type) {{
                    {MEDIA_FIELDS}
                }}
            }}
            "
        );

        let variables = IdVariables {
            id: id.value(),
            media_type: content_type.anilist_type(),
        };

        match self.post::<_, MediaData>(query, variables).await? {
            GraphQLOutcome::Data(data) => Ok(data.media.map(Self::map_media)),
            GraphQLOutcome::NotFound => Ok(None),
        }
    }
}
