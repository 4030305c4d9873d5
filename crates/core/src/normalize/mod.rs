//! Provider payload normalization.
//!
//! Maps each provider's raw JSON into an [`AnimeRecord`]. Every attribute is
//! resolved from an ordered list of JSON pointers; the first non-empty value
//! wins. Only a missing title rejects a payload, everything else defaults.

mod fields;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::anime::{AnimeRecord, AnimeStatus, ImageSet, Provider, RawPayload};
use fields::{
    first_f64, first_i64, first_string, parse_duration_minutes, strip_html, string_list, year_from,
};

/// Errors produced while normalizing a payload.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NormalizeError {
    /// A required field was absent.
    #[error("Malformed {provider} payload: {reason}")]
    MalformedPayload { provider: Provider, reason: String },
}

/// Field lookup table for one provider.
struct FieldMap {
    native_id: &'static [&'static str],
    mal_id: &'static [&'static str],
    title: &'static [&'static str],
    synopsis: &'static [&'static str],
    image_small: &'static [&'static str],
    image_medium: &'static [&'static str],
    image_large: &'static [&'static str],
    banner: &'static [&'static str],
    year: &'static [&'static str],
    start_date: &'static [&'static str],
    episodes: &'static [&'static str],
    status: &'static [&'static str],
    genres: &'static [&'static str],
    duration: &'static [&'static str],
    popularity: &'static [&'static str],
    /// Score pointers paired with the divisor that brings them onto 0-10.
    score: &'static [(&'static str, f64)],
}

const JIKAN: FieldMap = FieldMap {
    native_id: &["/mal_id"],
    mal_id: &["/mal_id"],
    title: &["/title_english", "/title", "/titles/0/title", "/title_japanese"],
    synopsis: &["/synopsis", "/background"],
    image_small: &["/images/jpg/small_image_url", "/images/webp/small_image_url"],
    image_medium: &["/images/jpg/image_url", "/images/webp/image_url"],
    image_large: &["/images/jpg/large_image_url", "/images/webp/large_image_url"],
    banner: &["/trailer/images/maximum_image_url"],
    year: &["/year", "/aired/prop/from/year"],
    start_date: &["/aired/from"],
    episodes: &["/episodes"],
    status: &["/status"],
    genres: &["/genres", "/explicit_genres", "/themes"],
    duration: &["/duration"],
    popularity: &["/members", "/favorites"],
    score: &[("/score", 1.0)],
};

const ANILIST: FieldMap = FieldMap {
    native_id: &["/id"],
    mal_id: &["/idMal"],
    title: &[
        "/title/english",
        "/title/romaji",
        "/title/userPreferred",
        "/title/native",
    ],
    synopsis: &["/description"],
    image_small: &["/coverImage/medium"],
    image_medium: &["/coverImage/large", "/coverImage/medium"],
    image_large: &["/coverImage/extraLarge", "/coverImage/large"],
    banner: &["/bannerImage"],
    year: &["/seasonYear", "/startDate/year"],
    start_date: &[],
    episodes: &["/episodes"],
    status: &["/status"],
    genres: &["/genres"],
    duration: &["/duration"],
    popularity: &["/popularity", "/favourites"],
    score: &[("/averageScore", 10.0), ("/meanScore", 10.0)],
};

const KITSU: FieldMap = FieldMap {
    native_id: &["/id"],
    mal_id: &[],
    title: &[
        "/attributes/titles/en",
        "/attributes/canonicalTitle",
        "/attributes/titles/en_jp",
        "/attributes/titles/ja_jp",
    ],
    synopsis: &["/attributes/synopsis", "/attributes/description"],
    image_small: &["/attributes/posterImage/small", "/attributes/posterImage/tiny"],
    image_medium: &["/attributes/posterImage/medium"],
    image_large: &["/attributes/posterImage/large", "/attributes/posterImage/original"],
    banner: &["/attributes/coverImage/original", "/attributes/coverImage/large"],
    year: &[],
    start_date: &["/attributes/startDate"],
    episodes: &["/attributes/episodeCount"],
    status: &["/attributes/status"],
    genres: &["/genres"],
    duration: &["/attributes/episodeLength"],
    popularity: &["/attributes/userCount", "/attributes/favoritesCount"],
    score: &[("/attributes/averageRating", 10.0)],
};

fn field_map(provider: Provider) -> &'static FieldMap {
    match provider {
        Provider::Jikan => &JIKAN,
        Provider::AniList => &ANILIST,
        Provider::Kitsu => &KITSU,
    }
}

fn map_status(provider: Provider, raw: &str) -> AnimeStatus {
    let raw = raw.trim().to_lowercase();
    match provider {
        Provider::Jikan => match raw.as_str() {
            "currently airing" => AnimeStatus::Ongoing,
            "finished airing" => AnimeStatus::Finished,
            "not yet aired" => AnimeStatus::Upcoming,
            _ => AnimeStatus::Unknown,
        },
        Provider::AniList => match raw.as_str() {
            "releasing" | "hiatus" => AnimeStatus::Ongoing,
            "finished" | "cancelled" => AnimeStatus::Finished,
            "not_yet_released" => AnimeStatus::Upcoming,
            _ => AnimeStatus::Unknown,
        },
        Provider::Kitsu => match raw.as_str() {
            "current" => AnimeStatus::Ongoing,
            "finished" => AnimeStatus::Finished,
            "upcoming" | "unreleased" | "tba" => AnimeStatus::Upcoming,
            _ => AnimeStatus::Unknown,
        },
    }
}

/// Normalize one provider payload into a canonical record.
pub fn normalize(body: &Value, provider: Provider) -> Result<AnimeRecord, NormalizeError> {
    normalize_at(body, provider, Utc::now())
}

/// Normalize a [`RawPayload`].
pub fn normalize_payload(payload: &RawPayload) -> Result<AnimeRecord, NormalizeError> {
    normalize(&payload.body, payload.provider)
}

/// Normalize with an explicit timestamp for the bookkeeping fields.
pub fn normalize_at(
    body: &Value,
    provider: Provider,
    now: DateTime<Utc>,
) -> Result<AnimeRecord, NormalizeError> {
    let fields = field_map(provider);

    let title = first_string(body, fields.title).ok_or_else(|| {
        NormalizeError::MalformedPayload {
            provider,
            reason: "missing title".to_string(),
        }
    })?;

    let native_id = first_i64(body, fields.native_id);
    let id = match native_id {
        Some(native) => AnimeRecord::derive_id(provider, native),
        None => Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            format!("{}:title:{}", provider.as_str(), title.to_lowercase()).as_bytes(),
        ),
    };

    let mut mal_id = None;
    let mut anilist_id = None;
    let mut kitsu_id = None;
    match provider {
        Provider::Jikan => mal_id = native_id,
        Provider::AniList => {
            anilist_id = native_id;
            mal_id = first_i64(body, fields.mal_id);
        }
        Provider::Kitsu => kitsu_id = native_id,
    }

    let synopsis = first_string(body, fields.synopsis).map(|s| match provider {
        Provider::AniList => strip_html(&s),
        _ => s,
    });

    let images = ImageSet {
        small: first_string(body, fields.image_small),
        medium: first_string(body, fields.image_medium),
        large: first_string(body, fields.image_large),
        banner: first_string(body, fields.banner),
    };

    let year = first_i64(body, fields.year)
        .and_then(|y| i32::try_from(y).ok())
        .or_else(|| first_string(body, fields.start_date).and_then(|d| year_from(&d)));

    let status = first_string(body, fields.status)
        .map(|s| map_status(provider, &s))
        .unwrap_or_default();

    let duration = first_i64(body, fields.duration)
        .and_then(|d| u32::try_from(d).ok())
        .or_else(|| first_string(body, fields.duration).and_then(|d| parse_duration_minutes(&d)));

    let score = fields.score.iter().find_map(|(pointer, divisor)| {
        first_f64(body, &[*pointer])
            .filter(|s| *s > 0.0)
            .map(|s| ((s / divisor) * 100.0).round() / 100.0)
    });

    Ok(AnimeRecord {
        id,
        mal_id,
        anilist_id,
        kitsu_id,
        title,
        synopsis,
        images,
        year,
        episode_count: first_i64(body, fields.episodes)
            .and_then(|e| u32::try_from(e).ok()),
        status,
        genres: string_list(body, fields.genres),
        duration,
        popularity: first_i64(body, fields.popularity)
            .filter(|p| *p >= 0)
            .map(|p| p as u64)
            .unwrap_or(0),
        score,
        source: provider,
        access_count: 0,
        last_accessed: now,
        created_at: now,
    })
}
