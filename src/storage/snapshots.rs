// MangaSync - Reading List Catalog Matcher
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! SQLite snapshot store
//!
//! Rows carry serialized JSON payloads; a save replaces the whole table
//! inside one transaction so a crashed save never leaves a half-written
//! snapshot behind.

use crate::error::{MatchError, Result};
use crate::matching::cache::CacheRecord;
use crate::models::{MatchResult, SourceEntry, SourcedEntry};
use crate::storage::database::Database;
use crate::storage::SnapshotStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::collections::HashMap;

/// [`SnapshotStore`] backed by the SQLite [`Database`]
#[derive(Debug, Clone)]
pub struct SqliteSnapshotStore {
    db: Database,
}

impl SqliteSnapshotStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MatchError::storage(format!("invalid timestamp '{}': {}", raw, e)))
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn load_cache_snapshot(&self) -> Result<HashMap<String, CacheRecord>> {
        let rows = sqlx::query("SELECT cache_key, payload, fetched_at FROM cache_records")
            .fetch_all(self.db.pool())
            .await?;

        let mut records = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: String = row.get("cache_key");
            let payload: String = row.get("payload");
            let fetched_at: String = row.get("fetched_at");
            let entries: Vec<SourcedEntry> = serde_json::from_str(&payload)?;
            records.insert(
                key,
                CacheRecord {
                    entries,
                    fetched_at: parse_timestamp(&fetched_at)?,
                },
            );
        }
        Ok(records)
    }

    async fn save_cache_snapshot(&self, records: &HashMap<String, CacheRecord>) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM cache_records")
            .execute(&mut *tx)
            .await?;
        for (key, record) in records {
            sqlx::query("INSERT INTO cache_records (cache_key, payload, fetched_at) VALUES (?, ?, ?)")
                .bind(key.as_str())
                .bind(serde_json::to_string(&record.entries)?)
                .bind(record.fetched_at.to_rfc3339())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_match_results(&self) -> Result<Vec<MatchResult>> {
        let rows = sqlx::query("SELECT payload FROM match_results ORDER BY source_id")
            .fetch_all(self.db.pool())
            .await?;
        rows.into_iter()
            .map(|row| {
                let payload: String = row.get("payload");
                serde_json::from_str(&payload).map_err(MatchError::from)
            })
            .collect()
    }

    async fn save_match_results(&self, results: &[MatchResult]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM match_results")
            .execute(&mut *tx)
            .await?;
        for result in results {
            sqlx::query("INSERT INTO match_results (source_id, payload, updated_at) VALUES (?, ?, ?)")
                .bind(result.source_entry.id)
                .bind(serde_json::to_string(result)?)
                .bind(now.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_pending_entries(&self) -> Result<Vec<SourceEntry>> {
        let rows = sqlx::query("SELECT payload FROM pending_entries ORDER BY source_id")
            .fetch_all(self.db.pool())
            .await?;
        rows.into_iter()
            .map(|row| {
                let payload: String = row.get("payload");
                serde_json::from_str(&payload).map_err(MatchError::from)
            })
            .collect()
    }

    async fn save_pending_entries(&self, entries: &[SourceEntry]) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM pending_entries")
            .execute(&mut *tx)
            .await?;
        for entry in entries {
            sqlx::query("INSERT INTO pending_entries (source_id, payload) VALUES (?, ?)")
                .bind(entry.id)
                .bind(serde_json::to_string(entry)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CatalogEntry, CatalogFormat, CatalogSource, CatalogTitle, Disposition, PublicationStatus,
        ReadingStatus,
    };

    fn sourced(id: i64, english: &str) -> SourcedEntry {
        SourcedEntry {
            entry: CatalogEntry {
                id,
                title: CatalogTitle {
                    english: Some(english.to_string()),
                    romaji: None,
                    native: None,
                },
                synonyms: vec![],
                format: CatalogFormat::Manga,
                status: PublicationStatus::Releasing,
                chapters: None,
                volumes: None,
                is_adult: false,
                cover_url: None,
            },
            origin: CatalogSource::Primary,
        }
    }

    fn source(id: i64, title: &str) -> SourceEntry {
        SourceEntry {
            id,
            title: title.to_string(),
            status: ReadingStatus::Reading,
            chapters_read: 12,
            volumes_read: 2,
            score: Some(8.5),
            catalog_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_cache_snapshot_roundtrip() {
        let store = SqliteSnapshotStore::new(Database::in_memory().await.expect("db"));
        let mut snapshot = HashMap::new();
        snapshot.insert(
            "berserk".to_string(),
            CacheRecord {
                entries: vec![sourced(1, "Berserk")],
                fetched_at: Utc::now(),
            },
        );
        store.save_cache_snapshot(&snapshot).await.expect("save");

        let loaded = store.load_cache_snapshot().await.expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["berserk"].entries[0].entry.id, 1);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let store = SqliteSnapshotStore::new(Database::in_memory().await.expect("db"));
        let mut first = HashMap::new();
        first.insert(
            "old".to_string(),
            CacheRecord {
                entries: vec![],
                fetched_at: Utc::now(),
            },
        );
        store.save_cache_snapshot(&first).await.expect("save");

        let second = HashMap::new();
        store.save_cache_snapshot(&second).await.expect("save empty");
        assert!(store.load_cache_snapshot().await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn test_match_results_roundtrip() {
        let store = SqliteSnapshotStore::new(Database::in_memory().await.expect("db"));
        let mut result = MatchResult::new(source(7, "Berserk"), vec![]);
        result.skip();
        store.save_match_results(&[result]).await.expect("save");

        let loaded = store.load_match_results().await.expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].source_entry.id, 7);
        assert_eq!(loaded[0].disposition, Disposition::Skipped);
    }

    #[tokio::test]
    async fn test_pending_entries_roundtrip() {
        let store = SqliteSnapshotStore::new(Database::in_memory().await.expect("db"));
        store
            .save_pending_entries(&[source(1, "A"), source(2, "B")])
            .await
            .expect("save");
        let loaded = store.load_pending_entries().await.expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].title, "A");
        assert_eq!(loaded[1].title, "B");
    }
}
