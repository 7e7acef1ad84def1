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


//! Remote catalog boundary
//!
//! The matching core only ever talks to the traits in this module; the
//! concrete clients own every transport concern (endpoints, auth tokens,
//! retries, wire formats). Tests drive the core through mock
//! implementations of the same traits.

pub mod client;
pub mod fallback;

use crate::error::Result;
use crate::matching::progress::CancelSignal;
use crate::models::{CatalogEntry, CatalogSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pagination envelope of a search page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub current_page: u32,
    pub has_next_page: bool,
    /// Total hits if the service reports it
    pub total: Option<u32>,
}

/// One page of search results.
///
/// `page_info` is optional because a malformed response may omit it; the
/// orchestrator treats that as a validation error rather than guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPage {
    pub page_info: Option<PageInfo>,
    pub items: Vec<CatalogEntry>,
}

/// One sub-query of a multi-alias batched search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasedQuery {
    /// Alias key the results come back under
    pub alias: String,
    /// Title to search for
    pub title: String,
}

/// Primary catalog API.
///
/// Every call observes the cancellation signal cooperatively: it is
/// checked before the request goes out, and a request already in flight
/// runs to completion or failure.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Fetch one page of title-search results
    async fn search_page(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        cancel: &CancelSignal,
    ) -> Result<CatalogPage>;

    /// Run many title searches as one aliased request; results come back
    /// keyed by alias. Costs a single request against the rate budget
    /// regardless of alias count.
    async fn search_batched(
        &self,
        queries: &[AliasedQuery],
        per_page: u32,
        cancel: &CancelSignal,
    ) -> Result<HashMap<String, Vec<CatalogEntry>>>;

    /// Fetch catalog entries by id. Callers group ids to the service's
    /// per-request limit.
    async fn fetch_by_ids(&self, ids: &[i64], cancel: &CancelSignal) -> Result<Vec<CatalogEntry>>;
}

/// An alternative catalog consulted only when the primary yields nothing
#[async_trait]
pub trait FallbackSource: Send + Sync {
    /// Which catalog this adapter fronts (used for provenance and for the
    /// per-source enable toggle)
    fn source(&self) -> CatalogSource;

    /// Search the alternative catalog and convert hits into our entry
    /// model
    async fn search_and_convert(
        &self,
        title: &str,
        limit: u32,
        cancel: &CancelSignal,
    ) -> Result<Vec<CatalogEntry>>;
}

pub use client::{CatalogClient, ClientConfig};
pub use fallback::{MangaDexSource, MangaUpdatesSource};
