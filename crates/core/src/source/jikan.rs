//! Jikan (unofficial MyAnimeList REST API) adapter.
//!
//! Jikan allows roughly 60 requests per minute and at most 25 items per page.

use async_trait::async_trait;
use tracing::debug;

use super::{page_size, take_list, take_object, SourceAdapter, SourceError, SourceHttp, SourceQuery};
use crate::anime::{Provider, RawPayload};
use crate::config::ProviderConfig;

const DEFAULT_BASE_URL: &str = "https://api.jikan.moe/v4";
const MAX_PAGE_SIZE: u32 = 25;

/// MyAnimeList genre ids keyed by a folded genre name.
const GENRES: &[(&str, u32)] = &[
    ("action", 1),
    ("adventure", 2),
    ("avantgarde", 5),
    ("awardwinning", 46),
    ("boyslove", 28),
    ("comedy", 4),
    ("drama", 8),
    ("ecchi", 9),
    ("fantasy", 10),
    ("girlslove", 26),
    ("gourmet", 47),
    ("historical", 13),
    ("horror", 14),
    ("isekai", 62),
    ("josei", 43),
    ("mahoushoujo", 66),
    ("mecha", 18),
    ("military", 38),
    ("music", 19),
    ("mystery", 7),
    ("psychological", 40),
    ("romance", 22),
    ("school", 23),
    ("scifi", 24),
    ("seinen", 42),
    ("shoujo", 25),
    ("shounen", 27),
    ("sliceoflife", 36),
    ("space", 29),
    ("sports", 30),
    ("supernatural", 37),
    ("suspense", 41),
];

/// Resolve a genre name (or a numeric id) to a MyAnimeList genre id.
pub(crate) fn genre_id(genre: &str) -> Option<u32> {
    let trimmed = genre.trim();
    if let Ok(id) = trimmed.parse::<u32>() {
        return Some(id);
    }
    let folded: String = trimmed
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    GENRES
        .iter()
        .find(|(name, _)| *name == folded)
        .map(|(_, id)| *id)
}

/// Path and query parameters for a list query.
fn list_request(query: &SourceQuery) -> Result<(&'static str, Vec<(&'static str, String)>), SourceError> {
    let limit = page_size(query.limit(), MAX_PAGE_SIZE).to_string();
    let request = match query {
        SourceQuery::Trending { .. } => (
            "/top/anime",
            vec![("filter", "airing".to_string()), ("limit", limit)],
        ),
        SourceQuery::TopRated { .. } => ("/top/anime", vec![("limit", limit)]),
        SourceQuery::NewArrivals { .. } => ("/seasons/now", vec![("limit", limit)]),
        SourceQuery::Genre { genre, .. } => {
            let id = genre_id(genre)
                .ok_or_else(|| SourceError::NotFound(format!("genre '{}'", genre)))?;
            (
                "/anime",
                vec![
                    ("genres", id.to_string()),
                    ("order_by", "popularity".to_string()),
                    ("sort", "asc".to_string()),
                    ("limit", limit),
                ],
            )
        }
        SourceQuery::Search { query, .. } => (
            "/anime",
            vec![("q", query.clone()), ("limit", limit)],
        ),
    };
    Ok(request)
}

/// Jikan source adapter.
pub struct JikanSource {
    http: SourceHttp,
    base_url: String,
}

impl JikanSource {
    pub fn new(config: &ProviderConfig) -> Result<Self, SourceError> {
        Ok(Self {
            http: SourceHttp::new(Provider::Jikan, config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[async_trait]
impl SourceAdapter for JikanSource {
    fn provider(&self) -> Provider {
        Provider::Jikan
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawPayload>, SourceError> {
        let (path, params) = list_request(query)?;
        let url = format!("{}{}", self.base_url, path);
        debug!("Jikan {}: {} {:?}", query.operation(), url, params);

        let mut body = self.http.get_json(&url, &params).await?;
        let items = take_list(&mut body, "/data")?;
        Ok(items
            .into_iter()
            .map(|item| RawPayload::new(Provider::Jikan, item))
            .collect())
    }

    async fn fetch_details(&self, native_id: &str) -> Result<RawPayload, SourceError> {
        let id: u64 = native_id
            .trim()
            .parse()
            .map_err(|_| SourceError::NotFound(format!("MAL id '{}'", native_id)))?;
        let url = format!("{}/anime/{}", self.base_url, id);
        debug!("Jikan details: {}", url);

        let mut body = self.http.get_json(&url, &[]).await?;
        let item = take_object(&mut body, "/data")?;
        Ok(RawPayload::new(Provider::Jikan, item))
    }
}
