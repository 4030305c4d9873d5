//! Test utilities and mock implementations.
//!
//! This module provides a mock source adapter and raw payload fixtures for
//! exercising the aggregator without reaching real provider APIs.
//!
//! # Example
//!
//! ```rust,ignore
//! use animedex_core::testing::{fixtures, MockSource};
//! use animedex_core::anime::Provider;
//!
//! let jikan = MockSource::new(Provider::Jikan);
//! jikan.set_payloads(fixtures::jikan_list(12)).await;
//! jikan.add_details("1", fixtures::jikan_anime(1, "Cowboy Bebop")).await;
//! ```

mod mock_source;

pub use mock_source::{MockSource, RecordedCall, SourceCall};

/// Raw provider payloads shaped like the real APIs return them.
pub mod fixtures {
    use serde_json::json;

    use crate::anime::{Provider, RawPayload};

    /// A Jikan `/anime/{id}` data object.
    pub fn jikan_anime(mal_id: i64, title: &str) -> RawPayload {
        RawPayload::new(
            Provider::Jikan,
            json!({
                "mal_id": mal_id,
                "title": title,
                "title_english": title,
                "synopsis": format!("Synopsis of {}.", title),
                "images": {
                    "jpg": {
                        "small_image_url": format!("https://cdn.myanimelist.net/images/anime/{}t.jpg", mal_id),
                        "image_url": format!("https://cdn.myanimelist.net/images/anime/{}.jpg", mal_id),
                        "large_image_url": format!("https://cdn.myanimelist.net/images/anime/{}l.jpg", mal_id)
                    }
                },
                "year": 2020,
                "episodes": 12,
                "status": "Finished Airing",
                "genres": [
                    { "mal_id": 1, "type": "anime", "name": "Action" },
                    { "mal_id": 24, "type": "anime", "name": "Sci-Fi" }
                ],
                "duration": "24 min per ep",
                "members": 100_000 + mal_id,
                "score": 8.5
            }),
        )
    }

    /// An AniList `Media` object.
    pub fn anilist_media(id: i64, id_mal: Option<i64>, title: &str) -> RawPayload {
        RawPayload::new(
            Provider::AniList,
            json!({
                "id": id,
                "idMal": id_mal,
                "title": { "romaji": title, "english": title, "native": null },
                "description": format!("<p>Synopsis of {}.</p>", title),
                "coverImage": {
                    "medium": format!("https://s4.anilist.co/file/anime/{}-m.jpg", id),
                    "large": format!("https://s4.anilist.co/file/anime/{}-l.jpg", id),
                    "extraLarge": null
                },
                "bannerImage": null,
                "seasonYear": 2021,
                "episodes": 24,
                "status": "RELEASING",
                "genres": ["Drama", "Fantasy"],
                "duration": 23,
                "popularity": 50_000 + id,
                "averageScore": 82,
                "meanScore": 81
            }),
        )
    }

    /// A Kitsu anime resource with genres already attached.
    pub fn kitsu_anime(id: i64, title: &str) -> RawPayload {
        RawPayload::new(
            Provider::Kitsu,
            json!({
                "id": id.to_string(),
                "type": "anime",
                "attributes": {
                    "canonicalTitle": title,
                    "titles": { "en": title },
                    "synopsis": format!("Synopsis of {}.", title),
                    "posterImage": {
                        "small": format!("https://media.kitsu.io/anime/{}/small.jpg", id),
                        "medium": format!("https://media.kitsu.io/anime/{}/medium.jpg", id),
                        "large": format!("https://media.kitsu.io/anime/{}/large.jpg", id)
                    },
                    "startDate": "2019-04-06",
                    "episodeCount": 26,
                    "status": "finished",
                    "episodeLength": 24,
                    "userCount": 20_000 + id,
                    "averageRating": "79.50"
                },
                "genres": ["Comedy"]
            }),
        )
    }

    /// A payload with no usable title, rejected by the normalizer.
    pub fn malformed(provider: Provider) -> RawPayload {
        RawPayload::new(provider, json!({ "unexpected": true }))
    }

    /// `count` Jikan payloads with MAL ids `1..=count`.
    pub fn jikan_list(count: i64) -> Vec<RawPayload> {
        (1..=count)
            .map(|i| jikan_anime(i, &format!("Jikan Anime {}", i)))
            .collect()
    }

    /// `count` AniList payloads with ids starting at 1001, MAL ids unset.
    pub fn anilist_list(count: i64) -> Vec<RawPayload> {
        (1..=count)
            .map(|i| anilist_media(1000 + i, None, &format!("AniList Anime {}", i)))
            .collect()
    }

    /// `count` Kitsu payloads with ids starting at 2001.
    pub fn kitsu_list(count: i64) -> Vec<RawPayload> {
        (1..=count)
            .map(|i| kitsu_anime(2000 + i, &format!("Kitsu Anime {}", i)))
            .collect()
    }
}
