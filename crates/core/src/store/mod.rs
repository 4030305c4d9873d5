//! Persistent anime store.
//!
//! One row per canonical record, reconciled across providers through the
//! provider-native id columns.

mod sqlite;
mod types;

pub use sqlite::SqliteAnimeStore;
pub use types::*;

use uuid::Uuid;

use crate::anime::{AnimeRecord, Provider};

/// Trait for canonical record storage.
pub trait AnimeStore: Send + Sync {
    /// Insert or merge a freshly normalized record.
    ///
    /// An existing row matching the canonical id or any provider-native id is
    /// merged with the incoming data; otherwise a new row is created. Either
    /// way the access count is incremented and `last_accessed` refreshed.
    ///
    /// Returns the stored record, whose id may differ from the incoming one.
    fn upsert(&self, record: &AnimeRecord) -> Result<AnimeRecord, StoreError>;

    /// Get a record by canonical id.
    fn get(&self, id: Uuid) -> Result<AnimeRecord, StoreError>;

    /// Find a record by a provider-native id.
    fn find_by_provider_id(
        &self,
        provider: Provider,
        native_id: i64,
    ) -> Result<Option<AnimeRecord>, StoreError>;

    /// Record an access without changing metadata.
    fn touch(&self, id: Uuid) -> Result<AnimeRecord, StoreError>;

    /// Get store statistics.
    fn stats(&self) -> Result<StoreStats, StoreError>;
}
