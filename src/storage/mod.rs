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


//! Persistence boundary
//!
//! The matching core only sees the [`SnapshotStore`] trait; the SQLite
//! implementation lives behind it. Snapshots survive process restarts and
//! are merged back into the live cache via
//! [`SearchCache::sync_from_persisted`](crate::matching::SearchCache::sync_from_persisted).

pub mod database;
pub mod snapshots;

use crate::error::Result;
use crate::matching::cache::CacheRecord;
use crate::models::{MatchResult, SourceEntry};
use async_trait::async_trait;
use std::collections::HashMap;

/// Durable storage for cache snapshots, match results and pending entries
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load_cache_snapshot(&self) -> Result<HashMap<String, CacheRecord>>;
    async fn save_cache_snapshot(&self, records: &HashMap<String, CacheRecord>) -> Result<()>;

    async fn load_match_results(&self) -> Result<Vec<MatchResult>>;
    async fn save_match_results(&self, results: &[MatchResult]) -> Result<()>;

    async fn load_pending_entries(&self) -> Result<Vec<SourceEntry>>;
    async fn save_pending_entries(&self, entries: &[SourceEntry]) -> Result<()>;
}

// Re-export commonly used types
pub use database::Database;
pub use snapshots::SqliteSnapshotStore;
