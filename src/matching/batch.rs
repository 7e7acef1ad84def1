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


//! Batch match orchestration
//!
//! Drives matching for an entire reading list. Entries are categorized
//! into {cached, known-id, uncached}; known ids go out as grouped id
//! fetches, everything else flows through grouped multi-alias searches
//! with a sequential one-at-a-time fallback per miss. Results always
//! compile back into input order no matter which phase (or which remote
//! call) resolved them.
//!
//! Cancellation is cooperative and never destroys progress: it is checked
//! before every remote call and at group boundaries, and a cancelled run
//! returns the results derivable from entries already resolved. A group
//! error that is not a cancellation is absorbed: affected entries get
//! empty results and the run proceeds.

use crate::api::{AliasedQuery, CatalogApi};
use crate::config::MatchConfig;
use crate::error::Result;
use crate::matching::cache::SearchCache;
use crate::matching::progress::{BatchContext, MatchProgress};
use crate::matching::search::{compile_candidates, rank_and_filter, SearchEngine, SearchOptions};
use crate::models::{CatalogEntry, MatchResult, SourceEntry, SourcedEntry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How often the compile loop re-checks the cancellation signal
const COMPILE_CANCEL_INTERVAL: usize = 50;

/// Per-index progress bookkeeping: the resolved entry lists plus the set
/// of indices already reported, so progress fires at most once per index
/// regardless of which phase resolved it.
struct RunState {
    resolved: Vec<Option<Vec<SourcedEntry>>>,
    reported: HashSet<usize>,
    completed: usize,
    total: usize,
}

impl RunState {
    fn new(total: usize) -> Self {
        Self {
            resolved: vec![None; total],
            reported: HashSet::new(),
            completed: 0,
            total,
        }
    }

    fn resolve(&mut self, index: usize, entries: Vec<SourcedEntry>, title: &str, ctx: &BatchContext) {
        self.resolved[index] = Some(entries);
        if self.reported.insert(index) {
            self.completed += 1;
            ctx.report(MatchProgress {
                index,
                completed: self.completed,
                total: self.total,
                title: title.to_string(),
            });
        }
    }
}

/// Orchestrates matching for whole reading lists
pub struct BatchMatcher {
    api: Arc<dyn CatalogApi>,
    engine: Arc<SearchEngine>,
}

impl BatchMatcher {
    pub fn new(api: Arc<dyn CatalogApi>, engine: Arc<SearchEngine>) -> Self {
        Self { api, engine }
    }

    fn cache(&self) -> &Arc<SearchCache> {
        self.engine.cache()
    }

    /// Match one source entry interactively.
    ///
    /// Unlike the batch path, failures propagate so the caller can offer a
    /// retry affordance.
    pub async fn match_single(
        &self,
        entry: &SourceEntry,
        config: &MatchConfig,
        ctx: &BatchContext,
    ) -> Result<MatchResult> {
        let response = self
            .engine
            .search(
                &entry.title,
                Some(&entry.title),
                config,
                ctx,
                SearchOptions::default(),
            )
            .await?;
        Ok(MatchResult::new(entry.clone(), response.candidates))
    }

    /// Warm the cache for a list of titles. Individual search failures are
    /// logged and skipped; cancellation stops the loop.
    pub async fn preload(
        &self,
        titles: &[String],
        config: &MatchConfig,
        ctx: &BatchContext,
    ) -> Result<()> {
        for title in titles {
            if ctx.cancelled() {
                break;
            }
            let key = SearchCache::key(title);
            if self.cache().is_valid(&key).await {
                continue;
            }
            match self.engine.search_title(title, config, ctx).await {
                Ok(_) => {}
                Err(e) if e.is_cancellation() => break,
                Err(e) => warn!(title, error = %e, "preload search failed, skipping"),
            }
        }
        Ok(())
    }

    /// Match an entire list of source entries.
    ///
    /// Output order always equals input order. On cancellation the
    /// returned vector holds only the entries resolved before the signal
    /// fired; cancellation never surfaces as an error from this method.
    pub async fn match_batch(
        &self,
        entries: &[SourceEntry],
        config: &MatchConfig,
        ctx: &BatchContext,
        bypass: bool,
    ) -> Result<Vec<MatchResult>> {
        let total = entries.len();
        let mut state = RunState::new(total);
        let mut cancelled = false;

        // ===== Phase 1: categorize =====
        let mut known_ids: Vec<(usize, i64)> = Vec::new();
        let mut uncached: Vec<usize> = Vec::new();

        if bypass {
            // Bypass marks everything uncached and drops the stale records
            // up front so they cannot serve a later automatic read
            for entry in entries {
                self.cache().remove(&SearchCache::key(&entry.title)).await;
            }
            uncached.extend(0..total);
        } else {
            for (index, entry) in entries.iter().enumerate() {
                if let Some(id) = entry.catalog_id {
                    known_ids.push((index, id));
                    continue;
                }
                let key = SearchCache::key(&entry.title);
                match self.cache().get(&key).await {
                    Some(cached) => state.resolve(index, cached, &entry.title, ctx),
                    None => uncached.push(index),
                }
            }
        }
        info!(
            total,
            cached = state.completed,
            known = known_ids.len(),
            uncached = uncached.len(),
            bypass,
            "batch categorized"
        );

        // ===== Phase 2: known-id fetches =====
        let id_batch_size = config.rate_limit.id_batch_size.max(1);
        for group in known_ids.chunks(id_batch_size) {
            if ctx.cancelled() {
                cancelled = true;
                break;
            }
            let ids: Vec<i64> = group.iter().map(|(_, id)| *id).collect();
            let fetched = {
                let _permit = self.engine.budget().acquire().await?;
                self.api.fetch_by_ids(&ids, &ctx.cancel).await
            };
            match fetched {
                Ok(items) => {
                    let by_id: HashMap<i64, CatalogEntry> =
                        items.into_iter().map(|e| (e.id, e)).collect();
                    for (index, id) in group {
                        match by_id.get(id) {
                            Some(found) => {
                                let title = &entries[*index].title;
                                let sourced = vec![SourcedEntry::primary(found.clone())];
                                self.cache()
                                    .set(SearchCache::key(title), sourced.clone())
                                    .await;
                                state.resolve(*index, sourced, title, ctx);
                            }
                            // Unmatched ids fall through to the title search
                            None => uncached.push(*index),
                        }
                    }
                }
                Err(e) if e.is_cancellation() => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, ids = group.len(), "id batch fetch failed, rerouting to title search");
                    uncached.extend(group.iter().map(|(index, _)| *index));
                }
            }
        }

        // ===== Phase 3: grouped multi-alias searches =====
        if !cancelled {
            cancelled = self
                .run_uncached_phase(entries, &uncached, config, ctx, bypass, &mut state)
                .await?;
        }

        // ===== Phase 4: compile in input order =====
        let mut results: Vec<MatchResult> = Vec::with_capacity(total);
        for (index, entry) in entries.iter().enumerate() {
            if index % COMPILE_CANCEL_INTERVAL == 0 && ctx.cancelled() {
                cancelled = true;
            }
            match &state.resolved[index] {
                Some(sourced) => {
                    let candidates = compile_candidates(
                        sourced.clone(),
                        &entry.title,
                        Some(&entry.title),
                        config,
                    );
                    results.push(MatchResult::new(entry.clone(), candidates));
                }
                // Unresolved and not cancelled: an empty pending result
                None if !cancelled => results.push(MatchResult::new(entry.clone(), Vec::new())),
                // Cancelled: only entries already resolved are returned
                None => {}
            }
        }

        let unresolved = total - state.reported.len();
        info!(
            total,
            returned = results.len(),
            unresolved,
            cancelled,
            "batch compiled"
        );
        Ok(results)
    }

    /// Uncached phase: one multi-alias query per group, sequential
    /// fallback search per miss, adaptive delay between groups.
    ///
    /// Returns whether cancellation fired during the phase.
    async fn run_uncached_phase(
        &self,
        entries: &[SourceEntry],
        uncached: &[usize],
        config: &MatchConfig,
        ctx: &BatchContext,
        bypass: bool,
        state: &mut RunState,
    ) -> Result<bool> {
        let group_size = config.rate_limit.batch_group_size.max(1);
        let groups: Vec<&[usize]> = uncached.chunks(group_size).collect();
        let group_count = groups.len();

        for (group_index, group) in groups.into_iter().enumerate() {
            if ctx.cancelled() {
                return Ok(true);
            }

            // One remote round trip regardless of alias count
            let mut requests_made = 1usize;
            let queries: Vec<AliasedQuery> = group
                .iter()
                .map(|&index| AliasedQuery {
                    alias: alias_for(index),
                    title: entries[index].title.clone(),
                })
                .collect();

            let grouped = {
                let _permit = self.engine.budget().acquire().await?;
                self.api
                    .search_batched(&queries, config.per_page, &ctx.cancel)
                    .await
            };

            let mut misses: Vec<usize> = Vec::new();
            match grouped {
                Ok(mut by_alias) => {
                    for &index in group {
                        let title = &entries[index].title;
                        let raw = by_alias.remove(&alias_for(index)).unwrap_or_default();
                        let kept = rank_and_filter(raw, title, Some(title), config);
                        if kept.is_empty() {
                            misses.push(index);
                            continue;
                        }
                        let sourced: Vec<SourcedEntry> =
                            kept.into_iter().map(SourcedEntry::primary).collect();
                        if !bypass {
                            self.cache()
                                .set(SearchCache::key(title), sourced.clone())
                                .await;
                        }
                        state.resolve(index, sourced, title, ctx);
                    }
                }
                Err(e) if e.is_cancellation() => return Ok(true),
                Err(e) => {
                    // Absorbed: affected entries get empty results and the
                    // run proceeds to the next group
                    warn!(
                        group = group_index,
                        size = group.len(),
                        error = %e,
                        "group query failed, absorbing"
                    );
                    for &index in group {
                        state.resolve(index, Vec::new(), &entries[index].title, ctx);
                    }
                }
            }

            // Sequential one-at-a-time fallback for members the grouped
            // query could not resolve, including the alternative-catalog
            // cascade
            for &index in &misses {
                if ctx.cancelled() {
                    return Ok(true);
                }
                let title = &entries[index].title;
                requests_made += 1;
                let opts = SearchOptions { page: None, bypass };
                match self.engine.search(title, Some(title), config, ctx, opts).await {
                    Ok(response) => {
                        let sourced: Vec<SourcedEntry> = response
                            .candidates
                            .into_iter()
                            .map(|c| SourcedEntry {
                                entry: c.entry,
                                origin: c.source,
                            })
                            .collect();
                        state.resolve(index, sourced, title, ctx);
                    }
                    Err(e) if e.is_cancellation() => return Ok(true),
                    Err(e) => {
                        // Transient per-entry failure does not abort
                        // sibling work in the group
                        warn!(title, error = %e, "fallback search failed, entry gets empty results");
                        state.resolve(index, Vec::new(), title, ctx);
                    }
                }
            }

            let delay = self
                .engine
                .budget()
                .group_delay(requests_made, group_index + 1 == group_count);
            if !delay.is_zero() {
                debug!(group = group_index, delay_ms = delay.as_millis() as u64, "inter-group delay");
                tokio::time::sleep(delay).await;
            }
        }

        Ok(false)
    }
}

fn alias_for(index: usize) -> String {
    format!("q{}", index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_round_trip() {
        assert_eq!(alias_for(0), "q0");
        assert_eq!(alias_for(17), "q17");
    }

    #[test]
    fn test_run_state_reports_once_per_index() {
        let ctx = BatchContext::new();
        let mut state = RunState::new(3);
        state.resolve(1, Vec::new(), "A", &ctx);
        assert_eq!(state.completed, 1);
        // Re-resolving the same index (e.g. a re-routed entry) must not
        // double-report
        state.resolve(1, Vec::new(), "A", &ctx);
        assert_eq!(state.completed, 1);
        state.resolve(0, Vec::new(), "B", &ctx);
        assert_eq!(state.completed, 2);
    }
}
