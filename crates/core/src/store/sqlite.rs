//! SQLite-backed anime store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{AnimeStore, StoreError, StoreStats};
use crate::anime::{AnimeRecord, AnimeStatus, ImageSet, Provider};

const COLUMNS: &str = "id, mal_id, anilist_id, kitsu_id, title, synopsis, images, year, \
     episode_count, status, genres, duration, popularity, score, source, access_count, \
     last_accessed, created_at";

/// SQLite-backed anime store.
pub struct SqliteAnimeStore {
    conn: Mutex<Connection>,
}

impl SqliteAnimeStore {
    /// Create a new SQLite store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            -- Canonical anime records (one row per canonical id)
            CREATE TABLE IF NOT EXISTS anime (
                id TEXT PRIMARY KEY,
                mal_id INTEGER UNIQUE,
                anilist_id INTEGER UNIQUE,
                kitsu_id INTEGER UNIQUE,
                title TEXT NOT NULL,
                synopsis TEXT,
                images TEXT NOT NULL DEFAULT '{}',
                year INTEGER,
                episode_count INTEGER,
                status TEXT NOT NULL DEFAULT 'unknown',
                genres TEXT NOT NULL DEFAULT '[]',
                duration INTEGER,
                popularity INTEGER NOT NULL DEFAULT 0,
                score REAL,
                source TEXT NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 0,
                last_accessed TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Canonical ids of rows folded into another row
            CREATE TABLE IF NOT EXISTS anime_alias (
                alias_id TEXT PRIMARY KEY,
                id TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_anime_alias_id ON anime_alias(id);
            CREATE INDEX IF NOT EXISTS idx_anime_title ON anime(title);
            CREATE INDEX IF NOT EXISTS idx_anime_last_accessed ON anime(last_accessed);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<AnimeRecord> {
        let id: String = row.get(0)?;
        let id = Uuid::parse_str(&id)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

        let images: String = row.get(6)?;
        let status: String = row.get(9)?;
        let genres: String = row.get(10)?;
        let source: String = row.get(14)?;
        let source: Provider = source.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(14, Type::Text, e.into())
        })?;
        let popularity: i64 = row.get(12)?;
        let access_count: i64 = row.get(15)?;
        let last_accessed: String = row.get(16)?;
        let created_at: String = row.get(17)?;

        Ok(AnimeRecord {
            id,
            mal_id: row.get(1)?,
            anilist_id: row.get(2)?,
            kitsu_id: row.get(3)?,
            title: row.get(4)?,
            synopsis: row.get(5)?,
            images: serde_json::from_str::<ImageSet>(&images)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
            year: row.get(7)?,
            episode_count: row.get(8)?,
            status: AnimeStatus::parse(&status),
            genres: serde_json::from_str(&genres)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?,
            duration: row.get(11)?,
            popularity: popularity.max(0) as u64,
            score: row.get(13)?,
            source,
            access_count: access_count.max(0) as u64,
            last_accessed: parse_timestamp(&last_accessed),
            created_at: parse_timestamp(&created_at),
        })
    }

    /// Rows sharing the canonical id or any provider-native id, oldest first.
    fn find_matches(conn: &Connection, record: &AnimeRecord) -> Result<Vec<AnimeRecord>, StoreError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM anime
             WHERE id = ?1
                OR id = (SELECT id FROM anime_alias WHERE alias_id = ?1)
                OR mal_id = ?2 OR anilist_id = ?3 OR kitsu_id = ?4
             ORDER BY created_at ASC",
            COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![
                record.id.to_string(),
                record.mal_id,
                record.anilist_id,
                record.kitsu_id
            ],
            Self::row_to_record,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn insert(conn: &Connection, record: &AnimeRecord) -> Result<(), StoreError> {
        conn.execute(
            &format!(
                "INSERT INTO anime ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                COLUMNS
            ),
            params![
                record.id.to_string(),
                record.mal_id,
                record.anilist_id,
                record.kitsu_id,
                &record.title,
                &record.synopsis,
                serde_json::to_string(&record.images)?,
                record.year,
                record.episode_count,
                record.status.as_str(),
                serde_json::to_string(&record.genres)?,
                record.duration,
                record.popularity as i64,
                record.score,
                record.source.as_str(),
                record.access_count as i64,
                format_timestamp(record.last_accessed),
                format_timestamp(record.created_at),
            ],
        )?;
        Ok(())
    }

    fn update(conn: &Connection, record: &AnimeRecord) -> Result<(), StoreError> {
        conn.execute(
            "UPDATE anime SET
                mal_id = ?2, anilist_id = ?3, kitsu_id = ?4, title = ?5, synopsis = ?6,
                images = ?7, year = ?8, episode_count = ?9, status = ?10, genres = ?11,
                duration = ?12, popularity = ?13, score = ?14, source = ?15,
                access_count = ?16, last_accessed = ?17, created_at = ?18
             WHERE id = ?1",
            params![
                record.id.to_string(),
                record.mal_id,
                record.anilist_id,
                record.kitsu_id,
                &record.title,
                &record.synopsis,
                serde_json::to_string(&record.images)?,
                record.year,
                record.episode_count,
                record.status.as_str(),
                serde_json::to_string(&record.genres)?,
                record.duration,
                record.popularity as i64,
                record.score,
                record.source.as_str(),
                record.access_count as i64,
                format_timestamp(record.last_accessed),
                format_timestamp(record.created_at),
            ],
        )?;
        Ok(())
    }

    /// Retire `folded` in favour of `target`, keeping `folded` resolvable.
    fn fold_into(conn: &Connection, folded: Uuid, target: Uuid) -> Result<(), StoreError> {
        let (folded, target) = (folded.to_string(), target.to_string());
        conn.execute("DELETE FROM anime WHERE id = ?1", params![folded])?;
        conn.execute(
            "UPDATE anime_alias SET id = ?2 WHERE id = ?1",
            params![folded, target],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO anime_alias (alias_id, id) VALUES (?1, ?2)",
            params![folded, target],
        )?;
        Ok(())
    }

    /// Record by canonical id, following fold aliases.
    fn get_with(conn: &Connection, id: Uuid) -> Result<Option<AnimeRecord>, StoreError> {
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM anime
                     WHERE id = COALESCE((SELECT id FROM anime_alias WHERE alias_id = ?1), ?1)",
                    COLUMNS
                ),
                params![id.to_string()],
                Self::row_to_record,
            )
            .optional()?)
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Access time strictly after `previous`.
fn next_access(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + Duration::nanoseconds(1))
}

impl AnimeStore for SqliteAnimeStore {
    fn upsert(&self, record: &AnimeRecord) -> Result<AnimeRecord, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let matches = Self::find_matches(&tx, record)?;
        let stored = match matches.split_first() {
            None => {
                let mut fresh = record.clone();
                let now = Utc::now();
                fresh.access_count = 1;
                fresh.last_accessed = now;
                fresh.created_at = now;
                Self::insert(&tx, &fresh)?;
                fresh
            }
            Some((primary, duplicates)) => {
                let mut merged = primary.clone();

                // Incoming ids can bridge rows that were stored separately.
                // Fold them into the oldest row before merging new data.
                for duplicate in duplicates {
                    merged.mal_id = merged.mal_id.or(duplicate.mal_id);
                    merged.anilist_id = merged.anilist_id.or(duplicate.anilist_id);
                    merged.kitsu_id = merged.kitsu_id.or(duplicate.kitsu_id);
                    merged.access_count += duplicate.access_count;
                    merged.created_at = merged.created_at.min(duplicate.created_at);
                    Self::fold_into(&tx, duplicate.id, primary.id)?;
                }

                merged.merge_from(record);
                merged.access_count += 1;
                merged.last_accessed = next_access(merged.last_accessed);
                Self::update(&tx, &merged)?;
                merged
            }
        };

        tx.commit()?;
        Ok(stored)
    }

    fn get(&self, id: Uuid) -> Result<AnimeRecord, StoreError> {
        let conn = self.conn()?;
        Self::get_with(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn find_by_provider_id(
        &self,
        provider: Provider,
        native_id: i64,
    ) -> Result<Option<AnimeRecord>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM anime WHERE {} = ?1",
                    COLUMNS,
                    provider.id_column()
                ),
                params![native_id],
                Self::row_to_record,
            )
            .optional()?)
    }

    fn touch(&self, id: Uuid) -> Result<AnimeRecord, StoreError> {
        let conn = self.conn()?;
        let mut record =
            Self::get_with(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        record.access_count += 1;
        record.last_accessed = next_access(record.last_accessed);
        conn.execute(
            "UPDATE anime SET access_count = access_count + 1, last_accessed = ?2 WHERE id = ?1",
            params![record.id.to_string(), format_timestamp(record.last_accessed)],
        )?;
        Ok(record)
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn()?;

        let (total_records, total_accesses, oldest, last): (
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(access_count), 0), MIN(created_at), MAX(last_accessed) FROM anime",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        Ok(StoreStats {
            total_records: total_records.max(0) as u64,
            total_accesses: total_accesses.max(0) as u64,
            oldest_entry: oldest.as_deref().map(parse_timestamp),
            last_access: last.as_deref().map(parse_timestamp),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> SqliteAnimeStore {
        SqliteAnimeStore::in_memory().unwrap()
    }

    fn record(provider: Provider, native_id: i64, title: &str) -> AnimeRecord {
        let now = Utc::now();
        let mut record = AnimeRecord {
            id: AnimeRecord::derive_id(provider, native_id),
            mal_id: None,
            anilist_id: None,
            kitsu_id: None,
            title: title.to_string(),
            synopsis: None,
            images: ImageSet::default(),
            year: Some(1998),
            episode_count: Some(26),
            status: AnimeStatus::Finished,
            genres: vec!["Action".to_string(), "Sci-Fi".to_string()],
            duration: Some(24),
            popularity: 1000,
            score: Some(8.75),
            source: provider,
            access_count: 0,
            last_accessed: now,
            created_at: now,
        };
        match provider {
            Provider::Jikan => record.mal_id = Some(native_id),
            Provider::AniList => record.anilist_id = Some(native_id),
            Provider::Kitsu => record.kitsu_id = Some(native_id),
        }
        record
    }

    #[test]
    fn test_upsert_new_record() {
        let store = create_test_store();
        let stored = store
            .upsert(&record(Provider::Jikan, 1, "Cowboy Bebop"))
            .unwrap();

        assert_eq!(stored.access_count, 1);
        let fetched = store.get(stored.id).unwrap();
        assert_eq!(fetched.title, "Cowboy Bebop");
        assert_eq!(fetched.mal_id, Some(1));
        assert_eq!(fetched.genres, vec!["Action", "Sci-Fi"]);
        assert_eq!(fetched.score, Some(8.75));
        assert_eq!(fetched.status, AnimeStatus::Finished);
        assert_eq!(fetched.source, Provider::Jikan);
    }

    #[test]
    fn test_upsert_existing_increments_access() {
        let store = create_test_store();
        let first = store
            .upsert(&record(Provider::Jikan, 1, "Cowboy Bebop"))
            .unwrap();
        let second = store
            .upsert(&record(Provider::Jikan, 1, "Cowboy Bebop"))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.access_count, 2);
        assert!(second.last_accessed > first.last_accessed);
        assert_eq!(store.stats().unwrap().total_records, 1);
    }

    #[test]
    fn test_upsert_reconciles_across_providers() {
        let store = create_test_store();
        let jikan = store
            .upsert(&record(Provider::Jikan, 1, "Cowboy Bebop"))
            .unwrap();

        // AniList payload that carries the MAL id as well
        let mut anilist = record(Provider::AniList, 1, "Cowboy Bebop");
        anilist.mal_id = Some(1);
        anilist.images.banner = Some("banner.jpg".to_string());
        let stored = store.upsert(&anilist).unwrap();

        assert_eq!(stored.id, jikan.id);
        assert_eq!(stored.mal_id, Some(1));
        assert_eq!(stored.anilist_id, Some(1));
        assert_eq!(stored.source, Provider::AniList);
        assert_eq!(stored.images.banner.as_deref(), Some("banner.jpg"));
        assert_eq!(stored.access_count, 2);
        assert_eq!(store.stats().unwrap().total_records, 1);
    }

    #[test]
    fn test_upsert_folds_bridged_rows() {
        let store = create_test_store();
        let jikan = store
            .upsert(&record(Provider::Jikan, 5, "Bebop"))
            .unwrap();
        store
            .upsert(&record(Provider::Kitsu, 9, "Bebop"))
            .unwrap();
        assert_eq!(store.stats().unwrap().total_records, 2);

        // A record carrying both ids bridges the two rows
        let mut bridge = record(Provider::Kitsu, 9, "Cowboy Bebop");
        bridge.mal_id = Some(5);
        let stored = store.upsert(&bridge).unwrap();

        assert_eq!(stored.id, jikan.id);
        assert_eq!(stored.mal_id, Some(5));
        assert_eq!(stored.kitsu_id, Some(9));
        assert_eq!(stored.access_count, 3);
        assert_eq!(store.stats().unwrap().total_records, 1);
    }

    #[test]
    fn test_folded_id_still_resolves() {
        let store = create_test_store();
        store
            .upsert(&record(Provider::Jikan, 5, "Bebop"))
            .unwrap();
        let kitsu = store
            .upsert(&record(Provider::Kitsu, 9, "Bebop"))
            .unwrap();

        let mut bridge = record(Provider::Kitsu, 9, "Cowboy Bebop");
        bridge.mal_id = Some(5);
        let merged = store.upsert(&bridge).unwrap();
        assert_ne!(merged.id, kitsu.id);

        let by_old_id = store.get(kitsu.id).unwrap();
        assert_eq!(by_old_id.id, merged.id);
        assert_eq!(by_old_id.kitsu_id, Some(9));

        let touched = store.touch(kitsu.id).unwrap();
        assert_eq!(touched.id, merged.id);
        assert_eq!(store.get(merged.id).unwrap().access_count, merged.access_count + 1);
    }

    #[test]
    fn test_alias_follows_repeated_folds() {
        let store = create_test_store();
        store.upsert(&record(Provider::Jikan, 1, "A")).unwrap();
        let anilist = store.upsert(&record(Provider::AniList, 2, "A")).unwrap();
        let kitsu = store.upsert(&record(Provider::Kitsu, 3, "A")).unwrap();

        // Kitsu row absorbs the AniList row first, then both fold into Jikan
        let mut first = record(Provider::Kitsu, 3, "A");
        first.anilist_id = Some(2);
        let middle = store.upsert(&first).unwrap();
        assert_eq!(middle.id, anilist.id);

        let mut second = record(Provider::Jikan, 1, "A");
        second.anilist_id = Some(2);
        let merged = store.upsert(&second).unwrap();

        assert_eq!(store.get(anilist.id).unwrap().id, merged.id);
        assert_eq!(store.get(kitsu.id).unwrap().id, merged.id);
        assert_eq!(store.stats().unwrap().total_records, 1);
    }

    #[test]
    fn test_corrupt_json_column_is_an_error() {
        let store = create_test_store();
        let stored = store
            .upsert(&record(Provider::Jikan, 1, "Cowboy Bebop"))
            .unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE anime SET genres = 'not json' WHERE id = ?1",
                params![stored.id.to_string()],
            )
            .unwrap();

        assert!(matches!(store.get(stored.id), Err(StoreError::Database(_))));
    }

    #[test]
    fn test_null_provider_ids_do_not_collide() {
        let store = create_test_store();
        store
            .upsert(&record(Provider::Kitsu, 1, "Cowboy Bebop"))
            .unwrap();
        store
            .upsert(&record(Provider::Kitsu, 2, "Trigun"))
            .unwrap();
        assert_eq!(store.stats().unwrap().total_records, 2);
    }

    #[test]
    fn test_get_nonexistent() {
        let store = create_test_store();
        let result = store.get(Uuid::new_v4());
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_find_by_provider_id() {
        let store = create_test_store();
        let mut anilist = record(Provider::AniList, 21, "ONE PIECE");
        anilist.mal_id = Some(21);
        let stored = store.upsert(&anilist).unwrap();

        let found = store
            .find_by_provider_id(Provider::Jikan, 21)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, stored.id);
        assert!(store
            .find_by_provider_id(Provider::Kitsu, 21)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_touch_is_monotonic() {
        let store = create_test_store();
        let stored = store
            .upsert(&record(Provider::Jikan, 1, "Cowboy Bebop"))
            .unwrap();

        let mut previous = stored.clone();
        for _ in 0..5 {
            let touched = store.touch(stored.id).unwrap();
            assert_eq!(touched.access_count, previous.access_count + 1);
            assert!(touched.last_accessed > previous.last_accessed);
            previous = touched;
        }
        assert_eq!(store.get(stored.id).unwrap().access_count, 6);
    }

    #[test]
    fn test_touch_nonexistent() {
        let store = create_test_store();
        assert!(matches!(
            store.touch(Uuid::new_v4()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_stats() {
        let store = create_test_store();
        let empty = store.stats().unwrap();
        assert_eq!(empty.total_records, 0);
        assert!(empty.oldest_entry.is_none());

        let stored = store
            .upsert(&record(Provider::Jikan, 1, "Cowboy Bebop"))
            .unwrap();
        store.touch(stored.id).unwrap();
        store
            .upsert(&record(Provider::Jikan, 2, "Trigun"))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.total_accesses, 3);
        assert!(stats.oldest_entry.is_some());
        assert!(stats.last_access.is_some());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("animedex.db");

        let id = {
            let store = SqliteAnimeStore::new(&path).unwrap();
            store
                .upsert(&record(Provider::Jikan, 1, "Cowboy Bebop"))
                .unwrap()
                .id
        };

        let reopened = SqliteAnimeStore::new(&path).unwrap();
        assert_eq!(reopened.get(id).unwrap().title, "Cowboy Bebop");
    }
}
