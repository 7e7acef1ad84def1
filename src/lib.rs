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


//! MangaSync reconciles a reading-list export against a remote media
//! catalog: for every source entry it produces a ranked set of candidate
//! catalog entries with a confidence score and a review disposition.
//!
//! The interesting part lives in [`matching`]: title normalization and
//! scoring, the TTL'd result cache, the rate-limited search loop with a
//! two-catalog fallback cascade, and the batch orchestrator that runs
//! thousands of entries with progress reporting and cooperative
//! cancellation. [`api`] and [`storage`] are the external boundaries.
//!
//! Typical wiring:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mangasync::api::{CatalogClient, ClientConfig};
//! use mangasync::config::MatchConfig;
//! use mangasync::matching::{
//!     BatchContext, BatchMatcher, RequestBudget, SearchCache, SearchEngine,
//! };
//!
//! # async fn wire() -> mangasync::error::Result<()> {
//! let config = MatchConfig::default();
//! let budget = Arc::new(RequestBudget::new(config.rate_limit.clone()));
//! let cache = Arc::new(SearchCache::new(config.cache_ttl_hours));
//! let client = Arc::new(
//!     CatalogClient::new(ClientConfig::default())?.with_budget(Arc::clone(&budget)),
//! );
//! let engine = Arc::new(SearchEngine::new(client.clone(), cache, budget));
//! let matcher = BatchMatcher::new(client, engine);
//! let results = matcher
//!     .match_batch(&[], &config, &BatchContext::new(), false)
//!     .await?;
//! # drop(results);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod matching;
pub mod models;
pub mod storage;

// Re-export the types almost every caller needs
pub use config::{MatchConfig, MatchRule, RateLimitConfig, RuleAction};
pub use error::{MatchError, Result};
pub use matching::{
    BatchContext, BatchMatcher, CancelSignal, MatchProgress, RequestBudget, SearchCache,
    SearchEngine,
};
pub use models::{
    CatalogEntry, CatalogSource, Disposition, MatchCandidate, MatchResult, ReviewAction,
    SourceEntry,
};
