//! Kitsu JSON:API adapter.
//!
//! Category names live in the `included` section of a JSON:API document.
//! They are folded into each resource as a top-level `genres` list so the
//! payload is self-contained.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{page_size, take_list, take_object, SourceAdapter, SourceError, SourceHttp, SourceQuery};
use crate::anime::{Provider, RawPayload};
use crate::config::ProviderConfig;

const DEFAULT_BASE_URL: &str = "https://kitsu.io/api/edge";
const MAX_PAGE_SIZE: u32 = 20;

/// Kitsu category slug for a genre name, e.g. `Slice of Life` -> `slice-of-life`.
fn category_slug(genre: &str) -> String {
    genre
        .trim()
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Path and query parameters for a list query.
fn list_request(query: &SourceQuery) -> (&'static str, Vec<(&'static str, String)>) {
    let limit = page_size(query.limit(), MAX_PAGE_SIZE).to_string();
    match query {
        SourceQuery::Trending { .. } => ("/trending/anime", vec![("limit", limit)]),
        SourceQuery::TopRated { .. } => (
            "/anime",
            vec![
                ("sort", "-averageRating".to_string()),
                ("page[limit]", limit),
                ("include", "categories".to_string()),
            ],
        ),
        SourceQuery::NewArrivals { .. } => (
            "/anime",
            vec![
                ("sort", "-startDate".to_string()),
                ("filter[status]", "current".to_string()),
                ("page[limit]", limit),
                ("include", "categories".to_string()),
            ],
        ),
        SourceQuery::Genre { genre, .. } => (
            "/anime",
            vec![
                ("filter[categories]", category_slug(genre)),
                ("sort", "-userCount".to_string()),
                ("page[limit]", limit),
                ("include", "categories".to_string()),
            ],
        ),
        SourceQuery::Search { query, .. } => (
            "/anime",
            vec![
                ("filter[text]", query.clone()),
                ("page[limit]", limit),
                ("include", "categories".to_string()),
            ],
        ),
    }
}

/// Category id to title, from a document's `included` section.
fn included_categories(document: &Value) -> HashMap<String, String> {
    document
        .get("included")
        .and_then(Value::as_array)
        .map(|included| {
            included
                .iter()
                .filter(|r| r.get("type").and_then(Value::as_str) == Some("categories"))
                .filter_map(|r| {
                    let id = r.get("id")?.as_str()?.to_string();
                    let title = r.pointer("/attributes/title")?.as_str()?.to_string();
                    Some((id, title))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Attach `genres` to a resource from its category relationships.
fn attach_genres(resource: &mut Value, categories: &HashMap<String, String>) {
    if categories.is_empty() {
        return;
    }
    let genres: Vec<Value> = resource
        .pointer("/relationships/categories/data")
        .and_then(Value::as_array)
        .map(|links| {
            links
                .iter()
                .filter_map(|link| link.get("id").and_then(Value::as_str))
                .filter_map(|id| categories.get(id))
                .map(|title| Value::String(title.clone()))
                .collect()
        })
        .unwrap_or_default();
    if let Some(obj) = resource.as_object_mut() {
        obj.insert("genres".to_string(), Value::Array(genres));
    }
}

/// Kitsu source adapter.
pub struct KitsuSource {
    http: SourceHttp,
    base_url: String,
}

impl KitsuSource {
    pub fn new(config: &ProviderConfig) -> Result<Self, SourceError> {
        Ok(Self {
            http: SourceHttp::new(Provider::Kitsu, config)?,
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
impl SourceAdapter for KitsuSource {
    fn provider(&self) -> Provider {
        Provider::Kitsu
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawPayload>, SourceError> {
        let (path, params) = list_request(query);
        let url = format!("{}{}", self.base_url, path);
        debug!("Kitsu {}: {} {:?}", query.operation(), url, params);

        let mut document = self.http.get_json(&url, &params).await?;
        let categories = included_categories(&document);
        let items = take_list(&mut document, "/data")?;
        Ok(items
            .into_iter()
            .map(|mut item| {
                attach_genres(&mut item, &categories);
                RawPayload::new(Provider::Kitsu, item)
            })
            .collect())
    }

    async fn fetch_details(&self, native_id: &str) -> Result<RawPayload, SourceError> {
        let id: u64 = native_id
            .trim()
            .parse()
            .map_err(|_| SourceError::NotFound(format!("Kitsu id '{}'", native_id)))?;
        let url = format!("{}/anime/{}", self.base_url, id);
        debug!("Kitsu details: {}", url);

        let mut document = self
            .http
            .get_json(&url, &[("include", "categories".to_string())])
            .await?;
        let categories = included_categories(&document);
        let mut item = take_object(&mut document, "/data")?;
        attach_genres(&mut item, &categories);
        Ok(RawPayload::new(Provider::Kitsu, item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::http::test_server::{serve, CannedResponse};
    use serde_json::json;

    #[test]
    fn test_category_slug() {
        assert_eq!(category_slug("Slice of Life"), "slice-of-life");
        assert_eq!(category_slug(" Sci-Fi "), "sci-fi");
        assert_eq!(category_slug("action"), "action");
    }

    #[test]
    fn test_list_request() {
        let (path, params) = list_request(&SourceQuery::Genre {
            genre: "Slice of Life".to_string(),
            limit: 50,
        });
        assert_eq!(path, "/anime");
        assert!(params.contains(&("filter[categories]", "slice-of-life".to_string())));
        assert!(params.contains(&("page[limit]", "20".to_string())));

        let (path, params) = list_request(&SourceQuery::Trending { limit: 12 });
        assert_eq!(path, "/trending/anime");
        assert_eq!(params, vec![("limit", "12".to_string())]);
    }

    #[test]
    fn test_attach_genres_from_included() {
        let document = json!({
            "data": [],
            "included": [
                { "id": "150", "type": "categories", "attributes": { "title": "Sci-Fi" } },
                { "id": "7", "type": "categories", "attributes": { "title": "Space" } },
                { "id": "1", "type": "genres", "attributes": { "name": "ignored" } }
            ]
        });
        let categories = included_categories(&document);
        assert_eq!(categories.len(), 2);

        let mut resource = json!({
            "id": "1",
            "relationships": { "categories": { "data": [
                { "type": "categories", "id": "7" },
                { "type": "categories", "id": "150" }
            ] } }
        });
        attach_genres(&mut resource, &categories);
        assert_eq!(resource["genres"], json!(["Space", "Sci-Fi"]));
    }

    #[tokio::test]
    async fn test_fetch_details() {
        let server = serve(vec![CannedResponse::ok(
            r#"{"data":{"id":"1","type":"anime","attributes":{"canonicalTitle":"Cowboy Bebop"},"relationships":{"categories":{"data":[{"type":"categories","id":"150"}]}}},"included":[{"id":"150","type":"categories","attributes":{"title":"Sci-Fi"}}]}"#,
        )])
        .await;
        let mut config = ProviderConfig::kitsu();
        config.base_url = Some(server.base_url.clone());
        let source = KitsuSource::new(&config).unwrap();

        let payload = source.fetch_details("1").await.unwrap();
        assert_eq!(payload.provider, Provider::Kitsu);
        assert_eq!(payload.body["attributes"]["canonicalTitle"], "Cowboy Bebop");
        assert_eq!(payload.body["genres"], json!(["Sci-Fi"]));
        assert!(server.requests()[0].starts_with("GET /anime/1?include=categories"));
    }
}
