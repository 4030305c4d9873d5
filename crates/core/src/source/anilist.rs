//! AniList GraphQL adapter.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{page_size, take_list, take_object, SourceAdapter, SourceError, SourceHttp, SourceQuery};
use crate::anime::{Provider, RawPayload};
use crate::config::ProviderConfig;

const DEFAULT_BASE_URL: &str = "https://graphql.anilist.co";
const MAX_PAGE_SIZE: u32 = 50;

const MEDIA_FIELDS: &str = r#"
    id
    idMal
    title { romaji english native userPreferred }
    description(asHtml: false)
    coverImage { extraLarge large medium }
    bannerImage
    seasonYear
    startDate { year month day }
    episodes
    status
    genres
    duration
    popularity
    favourites
    averageScore
    meanScore
"#;

/// AniList's fixed genre collection.
const GENRES: &[&str] = &[
    "Action",
    "Adventure",
    "Comedy",
    "Drama",
    "Ecchi",
    "Fantasy",
    "Horror",
    "Mahou Shoujo",
    "Mecha",
    "Music",
    "Mystery",
    "Psychological",
    "Romance",
    "Sci-Fi",
    "Slice of Life",
    "Sports",
    "Supernatural",
    "Thriller",
];

fn fold(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Canonical AniList spelling of a genre name.
pub(crate) fn canonical_genre(genre: &str) -> Option<&'static str> {
    let folded = fold(genre);
    GENRES.iter().copied().find(|g| fold(g) == folded)
}

fn page_query() -> String {
    format!(
        r#"query ($page: Int, $perPage: Int, $sort: [MediaSort], $genre: String, $search: String, $status: MediaStatus) {{
  Page(page: $page, perPage: $perPage) {{
    media(type: ANIME, isAdult: false, sort: $sort, genre: $genre, search: $search, status: $status) {{{}}}
  }}
}}"#,
        MEDIA_FIELDS
    )
}

fn media_query() -> String {
    format!(
        r#"query ($id: Int) {{
  Media(id: $id, type: ANIME) {{{}}}
}}"#,
        MEDIA_FIELDS
    )
}

/// GraphQL variables for a list query.
fn list_variables(query: &SourceQuery) -> Result<Value, SourceError> {
    let per_page = page_size(query.limit(), MAX_PAGE_SIZE);
    let variables = match query {
        SourceQuery::Trending { .. } => json!({ "page": 1, "perPage": per_page, "sort": ["TRENDING_DESC"] }),
        SourceQuery::TopRated { .. } => json!({ "page": 1, "perPage": per_page, "sort": ["SCORE_DESC"] }),
        SourceQuery::NewArrivals { .. } => json!({
            "page": 1,
            "perPage": per_page,
            "sort": ["START_DATE_DESC"],
            "status": "RELEASING"
        }),
        SourceQuery::Genre { genre, .. } => {
            let genre = canonical_genre(genre)
                .ok_or_else(|| SourceError::NotFound(format!("genre '{}'", genre)))?;
            json!({ "page": 1, "perPage": per_page, "sort": ["POPULARITY_DESC"], "genre": genre })
        }
        SourceQuery::Search { query, .. } => json!({
            "page": 1,
            "perPage": per_page,
            "sort": ["SEARCH_MATCH"],
            "search": query
        }),
    };
    Ok(variables)
}

/// Surface GraphQL-level errors that arrive with a 200 status.
fn check_graphql_errors(body: &Value) -> Result<(), SourceError> {
    let Some(first) = body
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
    else {
        return Ok(());
    };

    let message = first
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown GraphQL error")
        .to_string();
    match first.get("status").and_then(Value::as_u64) {
        Some(404) => Err(SourceError::NotFound(message)),
        Some(429) => Err(SourceError::RateLimited),
        status => Err(SourceError::Upstream {
            status: status.map(|s| s as u16),
            message,
        }),
    }
}

/// AniList source adapter.
pub struct AniListSource {
    http: SourceHttp,
    base_url: String,
}

impl AniListSource {
    pub fn new(config: &ProviderConfig) -> Result<Self, SourceError> {
        Ok(Self {
            http: SourceHttp::new(Provider::AniList, config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    async fn execute(&self, query: String, variables: Value) -> Result<Value, SourceError> {
        let request = json!({ "query": query, "variables": variables });
        let body = self.http.post_json(&self.base_url, &request).await?;
        check_graphql_errors(&body)?;
        Ok(body)
    }
}

#[async_trait]
impl SourceAdapter for AniListSource {
    fn provider(&self) -> Provider {
        Provider::AniList
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawPayload>, SourceError> {
        let variables = list_variables(query)?;
        debug!("AniList {}: variables={}", query.operation(), variables);

        let mut body = self.execute(page_query(), variables).await?;
        let items = take_list(&mut body, "/data/Page/media")?;
        Ok(items
            .into_iter()
            .map(|item| RawPayload::new(Provider::AniList, item))
            .collect())
    }

    async fn fetch_details(&self, native_id: &str) -> Result<RawPayload, SourceError> {
        let id: i64 = native_id
            .trim()
            .parse()
            .map_err(|_| SourceError::NotFound(format!("AniList id '{}'", native_id)))?;
        debug!("AniList details: id={}", id);

        let mut body = self.execute(media_query(), json!({ "id": id })).await?;
        match take_object(&mut body, "/data/Media") {
            Ok(media) => Ok(RawPayload::new(Provider::AniList, media)),
            Err(_) => Err(SourceError::NotFound(format!("AniList id {}", id))),
        }
    }
}
