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


//! Search result cache
//!
//! Keyed by normalized title, TTL-validated, shared by handle across every
//! orchestrator in the process. Construct one `SearchCache` at application
//! start and pass it around in an `Arc`; there is no hidden global.
//!
//! Records store the post-filter, post-rank entry list plus the fetch
//! timestamp. Filtering and confidence are re-applied fresh when a record
//! is read on the automatic path, because filter configuration may have
//! changed since the write. Entries are immutable snapshots, so
//! last-writer-wins overwrites are safe.

use crate::matching::normalize::normalize;
use crate::models::SourcedEntry;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Default record validity window
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// One cached search result: the ranked entry list and when it was fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub entries: Vec<SourcedEntry>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheRecord {
    pub fn new(entries: Vec<SourcedEntry>) -> Self {
        Self {
            entries,
            fetched_at: Utc::now(),
        }
    }

    /// A record is valid only while `now - fetched_at < ttl`
    pub fn is_valid_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.fetched_at) < ttl
    }
}

/// Process-wide search result cache
#[derive(Debug)]
pub struct SearchCache {
    records: RwLock<HashMap<String, CacheRecord>>,
    ttl: Duration,
}

impl SearchCache {
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Canonical cache key for a title
    pub fn key(title: &str) -> String {
        normalize(title)
    }

    /// Is there a valid (present and unexpired) record under this key?
    pub async fn is_valid(&self, key: &str) -> bool {
        let records = self.records.read().await;
        records
            .get(key)
            .map(|record| record.is_valid_at(Utc::now(), self.ttl))
            .unwrap_or(false)
    }

    /// Fetch the entry list for a key, only if the record is still valid.
    /// Expired records are treated as absent (they will be overwritten by
    /// the remote fetch they force).
    pub async fn get(&self, key: &str) -> Option<Vec<SourcedEntry>> {
        let records = self.records.read().await;
        records
            .get(key)
            .filter(|record| record.is_valid_at(Utc::now(), self.ttl))
            .map(|record| record.entries.clone())
    }

    /// Store the post-filter, post-rank result list for a key
    pub async fn set(&self, key: String, entries: Vec<SourcedEntry>) {
        let mut records = self.records.write().await;
        records.insert(key, CacheRecord::new(entries));
    }

    /// Explicitly drop one record (cache bypass deletes before searching so
    /// a stale record cannot leak into a later automatic read)
    pub async fn remove(&self, key: &str) {
        let mut records = self.records.write().await;
        records.remove(key);
    }

    /// Drop everything
    pub async fn clear(&self) {
        let mut records = self.records.write().await;
        records.clear();
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Merge a persisted snapshot into the live map without discarding
    /// newer in-memory entries: for each key the fresher record wins.
    pub async fn sync_from_persisted(&self, snapshot: HashMap<String, CacheRecord>) {
        let mut records = self.records.write().await;
        for (key, persisted) in snapshot {
            match records.get(&key) {
                Some(live) if live.fetched_at >= persisted.fetched_at => {}
                _ => {
                    records.insert(key, persisted);
                }
            }
        }
    }

    /// Export every record (valid or not) for persistence
    pub async fn snapshot(&self) -> HashMap<String, CacheRecord> {
        self.records.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CatalogEntry, CatalogFormat, CatalogSource, CatalogTitle, PublicationStatus,
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

    fn backdated(entries: Vec<SourcedEntry>, hours_ago: i64) -> CacheRecord {
        CacheRecord {
            entries,
            fetched_at: Utc::now() - Duration::hours(hours_ago),
        }
    }

    #[tokio::test]
    async fn test_key_is_normalized() {
        assert_eq!(SearchCache::key("One-Piece!"), SearchCache::key("one piece"));
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = SearchCache::new(24);
        let key = SearchCache::key("Berserk");
        cache.set(key.clone(), vec![sourced(1, "Berserk")]).await;
        assert!(cache.is_valid(&key).await);
        let entries = cache.get(&key).await.expect("record should be present");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry.id, 1);
    }

    #[tokio::test]
    async fn test_ttl_boundaries() {
        let ttl = Duration::hours(24);
        let fresh = backdated(vec![sourced(1, "A")], 23);
        let stale = backdated(vec![sourced(2, "B")], 25);
        // Written at T: valid at T+TTL-1, invalid at T+TTL+1
        assert!(fresh.is_valid_at(Utc::now(), ttl));
        assert!(!stale.is_valid_at(Utc::now(), ttl));
    }

    #[tokio::test]
    async fn test_expired_record_reads_as_absent() {
        let cache = SearchCache::new(24);
        cache
            .sync_from_persisted(HashMap::from([(
                "old".to_string(),
                backdated(vec![sourced(1, "Old")], 48),
            )]))
            .await;
        assert!(!cache.is_valid("old").await);
        assert!(cache.get("old").await.is_none());
        // The record itself is still there for snapshotting
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_forces_fresh_view() {
        let cache = SearchCache::new(24);
        let key = SearchCache::key("Berserk");
        cache.set(key.clone(), vec![sourced(1, "Berserk")]).await;
        cache.remove(&key).await;
        assert!(cache.get(&key).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_sync_keeps_newer_in_memory_record() {
        let cache = SearchCache::new(24);
        let key = "berserk".to_string();
        cache.set(key.clone(), vec![sourced(1, "Live")]).await;

        cache
            .sync_from_persisted(HashMap::from([
                (key.clone(), backdated(vec![sourced(2, "Persisted")], 5)),
                ("other".to_string(), backdated(vec![sourced(3, "Other")], 1)),
            ]))
            .await;

        let live = cache.get(&key).await.expect("live record kept");
        assert_eq!(live[0].entry.id, 1, "newer in-memory record must win");
        assert!(cache.get("other").await.is_some(), "new keys are merged in");
    }
}
