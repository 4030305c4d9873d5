//! Query descriptors and their cache keys.

use std::fmt;
use std::time::Duration;

use crate::config::CacheConfig;
use crate::source::SourceQuery;

/// One aggregation query, identified by kind and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryDescriptor {
    Trending { limit: u32 },
    TopRated { limit: u32 },
    NewArrivals { limit: u32 },
    Genre { genre: String, limit: u32 },
    Search { query: String, limit: u32 },
    Details { id: String, source: String },
}

impl QueryDescriptor {
    /// Operation name, also the key prefix.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryDescriptor::Trending { .. } => "trending",
            QueryDescriptor::TopRated { .. } => "top_rated",
            QueryDescriptor::NewArrivals { .. } => "new_arrivals",
            QueryDescriptor::Genre { .. } => "genre",
            QueryDescriptor::Search { .. } => "search",
            QueryDescriptor::Details { .. } => "details",
        }
    }

    /// Deterministic cache key.
    pub fn key(&self) -> String {
        match self {
            QueryDescriptor::Trending { limit }
            | QueryDescriptor::TopRated { limit }
            | QueryDescriptor::NewArrivals { limit } => format!("{}:{}", self.kind(), limit),
            QueryDescriptor::Genre { genre, limit } => {
                format!("genre:{}:{}", genre.trim().to_lowercase(), limit)
            }
            QueryDescriptor::Search { query, limit } => {
                format!("search:{}:{}", query.trim().to_lowercase(), limit)
            }
            QueryDescriptor::Details { id, source } => {
                format!("details:{}:{}", id.trim(), source.trim().to_lowercase())
            }
        }
    }

    /// Time-to-live for entries of this kind.
    pub fn ttl(&self, config: &CacheConfig) -> Duration {
        let secs = match self {
            QueryDescriptor::Trending { .. } => config.trending_ttl_secs,
            QueryDescriptor::TopRated { .. } => config.top_rated_ttl_secs,
            QueryDescriptor::NewArrivals { .. } => config.new_arrivals_ttl_secs,
            QueryDescriptor::Genre { .. } => config.genre_ttl_secs,
            QueryDescriptor::Search { .. } => config.search_ttl_secs,
            QueryDescriptor::Details { .. } => config.details_ttl_secs,
        };
        Duration::from_secs(secs)
    }

    /// Upstream list query, `None` for details lookups.
    pub fn source_query(&self) -> Option<SourceQuery> {
        match self {
            QueryDescriptor::Trending { limit } => Some(SourceQuery::Trending { limit: *limit }),
            QueryDescriptor::TopRated { limit } => Some(SourceQuery::TopRated { limit: *limit }),
            QueryDescriptor::NewArrivals { limit } => {
                Some(SourceQuery::NewArrivals { limit: *limit })
            }
            QueryDescriptor::Genre { genre, limit } => Some(SourceQuery::Genre {
                genre: genre.trim().to_string(),
                limit: *limit,
            }),
            QueryDescriptor::Search { query, limit } => Some(SourceQuery::Search {
                query: query.trim().to_string(),
                limit: *limit,
            }),
            QueryDescriptor::Details { .. } => None,
        }
    }
}

impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(QueryDescriptor::Trending { limit: 12 }.key(), "trending:12");
        assert_eq!(QueryDescriptor::TopRated { limit: 5 }.key(), "top_rated:5");
        assert_eq!(
            QueryDescriptor::NewArrivals { limit: 12 }.key(),
            "new_arrivals:12"
        );
        assert_eq!(
            QueryDescriptor::Genre {
                genre: "Action".to_string(),
                limit: 12
            }
            .key(),
            "genre:action:12"
        );
        assert_eq!(
            QueryDescriptor::Search {
                query: "  Cowboy BEBOP ".to_string(),
                limit: 3
            }
            .key(),
            "search:cowboy bebop:3"
        );
        assert_eq!(
            QueryDescriptor::Details {
                id: "5114".to_string(),
                source: "auto".to_string()
            }
            .key(),
            "details:5114:auto"
        );
    }

    #[test]
    fn test_equivalent_queries_share_a_key() {
        let a = QueryDescriptor::Search {
            query: "Frieren".to_string(),
            limit: 12,
        };
        let b = QueryDescriptor::Search {
            query: " frieren".to_string(),
            limit: 12,
        };
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_ttl_per_kind() {
        let config = CacheConfig::default();
        assert_eq!(
            QueryDescriptor::Search {
                query: "x".to_string(),
                limit: 1
            }
            .ttl(&config),
            Duration::from_secs(config.search_ttl_secs)
        );
        assert_eq!(
            QueryDescriptor::TopRated { limit: 1 }.ttl(&config),
            Duration::from_secs(config.top_rated_ttl_secs)
        );
    }

    #[test]
    fn test_source_query() {
        assert_eq!(
            QueryDescriptor::Genre {
                genre: " Drama ".to_string(),
                limit: 4
            }
            .source_query(),
            Some(SourceQuery::Genre {
                genre: "Drama".to_string(),
                limit: 4
            })
        );
        assert_eq!(
            QueryDescriptor::Details {
                id: "1".to_string(),
                source: "auto".to_string()
            }
            .source_query(),
            None
        );
    }
}
