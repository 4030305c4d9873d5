//! Types for the canonical anime record and upstream providers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upstream metadata providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Jikan, the unofficial MyAnimeList REST API.
    Jikan,
    /// AniList GraphQL API.
    #[serde(rename = "anilist")]
    AniList,
    /// Kitsu JSON:API.
    Kitsu,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Jikan, Provider::AniList, Provider::Kitsu];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Jikan => "jikan",
            Provider::AniList => "anilist",
            Provider::Kitsu => "kitsu",
        }
    }

    /// Name of the record column holding this provider's native id.
    pub fn id_column(&self) -> &'static str {
        match self {
            Provider::Jikan => "mal_id",
            Provider::AniList => "anilist_id",
            Provider::Kitsu => "kitsu_id",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jikan" | "mal" | "myanimelist" => Ok(Provider::Jikan),
            "anilist" => Ok(Provider::AniList),
            "kitsu" => Ok(Provider::Kitsu),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Airing status, collapsed across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnimeStatus {
    Ongoing,
    Finished,
    Upcoming,
    #[default]
    Unknown,
}

impl AnimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnimeStatus::Ongoing => "ongoing",
            AnimeStatus::Finished => "finished",
            AnimeStatus::Upcoming => "upcoming",
            AnimeStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ongoing" => AnimeStatus::Ongoing,
            "finished" => AnimeStatus::Finished,
            "upcoming" => AnimeStatus::Upcoming,
            _ => AnimeStatus::Unknown,
        }
    }
}

/// Cover and banner image URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ImageSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

impl ImageSet {
    pub fn is_empty(&self) -> bool {
        self.small.is_none() && self.medium.is_none() && self.large.is_none() && self.banner.is_none()
    }

    /// Fill missing sizes from `other`, keeping what is already set.
    pub fn merge_missing(&mut self, other: &ImageSet) {
        if self.small.is_none() {
            self.small = other.small.clone();
        }
        if self.medium.is_none() {
            self.medium = other.medium.clone();
        }
        if self.large.is_none() {
            self.large = other.large.clone();
        }
        if self.banner.is_none() {
            self.banner = other.banner.clone();
        }
    }
}

/// The canonical, provider-independent anime record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeRecord {
    /// Canonical id.
    pub id: Uuid,
    /// MyAnimeList id (also used by Jikan).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mal_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anilist_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kitsu_id: Option<i64>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub images: ImageSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_count: Option<u32>,
    #[serde(default)]
    pub status: AnimeStatus,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Minutes per episode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Upstream popularity (members / users who listed it).
    #[serde(default)]
    pub popularity: u64,
    /// Score on a 0-10 scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Provider the freshest data came from.
    pub source: Provider,
    #[serde(default)]
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AnimeRecord {
    /// Deterministic canonical id for a provider-native id.
    pub fn derive_id(provider: Provider, native_id: i64) -> Uuid {
        let name = format!("{}:{}", provider.as_str(), native_id);
        Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
    }

    /// Native id this record carries for `provider`.
    pub fn provider_id(&self, provider: Provider) -> Option<i64> {
        match provider {
            Provider::Jikan => self.mal_id,
            Provider::AniList => self.anilist_id,
            Provider::Kitsu => self.kitsu_id,
        }
    }

    /// All present provider-native ids.
    pub fn provider_ids(&self) -> Vec<(Provider, i64)> {
        Provider::ALL
            .iter()
            .filter_map(|p| self.provider_id(*p).map(|id| (*p, id)))
            .collect()
    }

    /// Merge fresher data from `incoming` into this record.
    ///
    /// Identity and popularity bookkeeping (`id`, `access_count`,
    /// `created_at`) are kept; provider ids and images are unioned; scalar
    /// attributes prefer the incoming value when present.
    pub fn merge_from(&mut self, incoming: &AnimeRecord) {
        self.mal_id = self.mal_id.or(incoming.mal_id);
        self.anilist_id = self.anilist_id.or(incoming.anilist_id);
        self.kitsu_id = self.kitsu_id.or(incoming.kitsu_id);
        self.title = incoming.title.clone();
        if incoming.synopsis.is_some() {
            self.synopsis = incoming.synopsis.clone();
        }
        let mut images = incoming.images.clone();
        images.merge_missing(&self.images);
        self.images = images;
        self.year = incoming.year.or(self.year);
        self.episode_count = incoming.episode_count.or(self.episode_count);
        if incoming.status != AnimeStatus::Unknown {
            self.status = incoming.status;
        }
        if !incoming.genres.is_empty() {
            self.genres = incoming.genres.clone();
        }
        self.duration = incoming.duration.or(self.duration);
        self.popularity = self.popularity.max(incoming.popularity);
        self.score = incoming.score.or(self.score);
        self.source = incoming.source;
    }
}

/// An unnormalized payload returned by one provider for one title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    pub provider: Provider,
    pub body: serde_json::Value,
}

impl RawPayload {
    pub fn new(provider: Provider, body: serde_json::Value) -> Self {
        Self { provider, body }
    }
}
