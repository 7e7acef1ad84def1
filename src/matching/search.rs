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


//! Single-title search orchestration
//!
//! One search walks a fixed pipeline: cache (or bypass), rate-limit
//! permit, pagination loop against the primary catalog, ranking,
//! filtering, and, only when nothing usable remains, the fallback cascade
//! across the alternative catalogs. The ranked set is written back to the
//! cache so a later automatic search short-circuits.
//!
//! Failure semantics: a network or validation error aborts the search and
//! propagates; there is no silent partial-page return. Not-found is not an
//! error, it is an empty candidate list.

use crate::api::{CatalogApi, FallbackSource};
use crate::config::MatchConfig;
use crate::error::{MatchError, Result};
use crate::matching::cache::SearchCache;
use crate::matching::filter::{apply_system_filters, floored_confidence};
use crate::matching::progress::BatchContext;
use crate::matching::rate_limit::RequestBudget;
use crate::matching::score::{confidence, match_score, title_type_priority};
use crate::models::{CatalogEntry, MatchCandidate, SourcedEntry};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-call search options
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    /// Fetch exactly this page instead of walking all pages
    pub page: Option<u32>,
    /// Ignore and invalidate any cached record, forcing a fresh remote
    /// search; the fresh result is not written back
    pub bypass: bool,
}

/// Result of one title search
#[derive(Debug, Clone)]
pub struct SearchResponse {
    /// Ranked candidates, best first
    pub candidates: Vec<MatchCandidate>,
    /// Whether this response was served from a valid cache record
    pub from_cache: bool,
}

/// Orchestrates single-title searches against the primary catalog and the
/// fallback cascade
pub struct SearchEngine {
    api: Arc<dyn CatalogApi>,
    fallbacks: Vec<Arc<dyn FallbackSource>>,
    cache: Arc<SearchCache>,
    budget: Arc<RequestBudget>,
}

impl SearchEngine {
    pub fn new(
        api: Arc<dyn CatalogApi>,
        cache: Arc<SearchCache>,
        budget: Arc<RequestBudget>,
    ) -> Self {
        Self {
            api,
            fallbacks: Vec::new(),
            cache,
            budget,
        }
    }

    /// Register a fallback catalog. Cascade order follows registration
    /// order.
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackSource>) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    pub fn cache(&self) -> &Arc<SearchCache> {
        &self.cache
    }

    pub fn budget(&self) -> &Arc<RequestBudget> {
        &self.budget
    }

    /// Search without source-entry context (no skip/accept rules applied)
    pub async fn search_title(
        &self,
        title: &str,
        config: &MatchConfig,
        ctx: &BatchContext,
    ) -> Result<SearchResponse> {
        self.search(title, None, config, ctx, SearchOptions::default())
            .await
    }

    /// Full search pipeline.
    ///
    /// `source_context` is the owning source entry's title when the search
    /// runs on behalf of one; it gates user skip/accept rules.
    pub async fn search(
        &self,
        title: &str,
        source_context: Option<&str>,
        config: &MatchConfig,
        ctx: &BatchContext,
        opts: SearchOptions,
    ) -> Result<SearchResponse> {
        if title.trim().is_empty() {
            return Err(MatchError::invalid_input("search title is empty"));
        }

        let key = SearchCache::key(title);

        if opts.bypass {
            // Delete, don't just ignore: a stale record must not leak into
            // a later automatic read
            self.cache.remove(&key).await;
        } else if opts.page.is_none() {
            if let Some(entries) = self.cache.get(&key).await {
                debug!(title, "search cache hit");
                let candidates = compile_candidates(entries, title, source_context, config);
                return Ok(SearchResponse {
                    candidates,
                    from_cache: true,
                });
            }
        }

        ctx.ensure_active()?;
        let raw = self.fetch_pages(title, config, ctx, opts.page).await?;
        debug!(title, hits = raw.len(), "primary catalog search finished");

        let kept = rank_and_filter(raw, title, source_context, config);

        let sourced = if kept.is_empty() {
            self.fallback_cascade(title, config, ctx).await?
        } else {
            kept.into_iter().map(SourcedEntry::primary).collect()
        };

        let candidates = compile_candidates(sourced, title, source_context, config);

        if !opts.bypass {
            let ranked_set: Vec<SourcedEntry> = candidates
                .iter()
                .map(|c| SourcedEntry {
                    entry: c.entry.clone(),
                    origin: c.source,
                })
                .collect();
            self.cache.set(key, ranked_set).await;
        }

        Ok(SearchResponse {
            candidates,
            from_cache: false,
        })
    }

    /// Pagination loop against the primary catalog.
    ///
    /// Holds one rate-limit permit for the whole loop. Every page must
    /// carry its pagination envelope; a page without one is a validation
    /// error. Accumulation stops at the configured cap, at the last page,
    /// or (unless one specific page was requested) on cancellation.
    async fn fetch_pages(
        &self,
        title: &str,
        config: &MatchConfig,
        ctx: &BatchContext,
        requested_page: Option<u32>,
    ) -> Result<Vec<CatalogEntry>> {
        let _permit = self.budget.acquire().await?;
        let single_page = requested_page.is_some();
        let mut page = requested_page.unwrap_or(1);
        let mut items: Vec<CatalogEntry> = Vec::new();

        loop {
            ctx.ensure_active()?;
            let response = self
                .api
                .search_page(title, page, config.per_page, &ctx.cancel)
                .await?;
            let info = response.page_info.ok_or_else(|| {
                MatchError::invalid_response(
                    format!("search page {} for '{}' is missing page info", page, title),
                    None,
                )
            })?;
            items.extend(response.items);

            if single_page {
                break;
            }
            let keep_going = info.has_next_page
                && items.len() < config.max_search_results
                && !ctx.cancelled();
            if !keep_going {
                break;
            }
            page += 1;
        }

        items.truncate(config.max_search_results);
        Ok(items)
    }

    /// Query the alternative catalogs sequentially, merging hits and
    /// deduplicating by catalog id. Each source is independently toggled;
    /// a failing source is logged and skipped (cancellation still
    /// propagates).
    async fn fallback_cascade(
        &self,
        title: &str,
        config: &MatchConfig,
        ctx: &BatchContext,
    ) -> Result<Vec<SourcedEntry>> {
        let mut merged: Vec<SourcedEntry> = Vec::new();
        let mut seen: HashSet<i64> = HashSet::new();

        for fallback in &self.fallbacks {
            let origin = fallback.source();
            if !config.source_enabled(origin) {
                continue;
            }
            ctx.ensure_active()?;
            let _permit = self.budget.acquire().await?;

            match fallback
                .search_and_convert(title, config.fallback_result_limit, &ctx.cancel)
                .await
            {
                Ok(entries) => {
                    debug!(
                        title,
                        source = origin.label(),
                        hits = entries.len(),
                        "fallback catalog consulted"
                    );
                    for entry in entries {
                        if seen.insert(entry.id) {
                            merged.push(SourcedEntry { entry, origin });
                        }
                    }
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    warn!(
                        title,
                        source = origin.label(),
                        error = %e,
                        "fallback catalog failed, continuing cascade"
                    );
                }
            }
        }

        Ok(merged)
    }
}

/// Rank raw hits, apply system filters, and fall back to a capped raw
/// subset when filtering empties a non-empty set.
///
/// Shared by the single-search pipeline and the batched multi-alias path
/// so both treat raw hits identically.
pub(crate) fn rank_and_filter(
    raw: Vec<CatalogEntry>,
    title: &str,
    source_context: Option<&str>,
    config: &MatchConfig,
) -> Vec<CatalogEntry> {
    let (scored_all, ranked) = rank_entries(raw, title, config);
    let kept = apply_system_filters(ranked, config, source_context);
    if kept.is_empty() && !scored_all.is_empty() {
        // Filtering emptied a non-empty raw set: a capped raw subset
        // beats reporting "no match"
        scored_all
            .into_iter()
            .take(config.raw_fallback_limit)
            .collect()
    } else {
        kept
    }
}

/// Score-rank raw search hits.
///
/// Returns `(all hits sorted by score, thresholded hits)`. When the
/// threshold rejects everything but hits exist, the single best hit is
/// kept anyway: one low-confidence candidate beats an empty review list.
fn rank_entries(
    raw: Vec<CatalogEntry>,
    title: &str,
    config: &MatchConfig,
) -> (Vec<CatalogEntry>, Vec<CatalogEntry>) {
    let mut scored: Vec<(f64, CatalogEntry)> = raw
        .into_iter()
        .map(|entry| (match_score(&entry, title), entry))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let kept: Vec<CatalogEntry> = scored
        .iter()
        .filter(|(score, _)| *score >= config.min_match_score)
        .map(|(_, entry)| entry.clone())
        .collect();

    let all: Vec<CatalogEntry> = scored.into_iter().map(|(_, entry)| entry).collect();
    let kept = if kept.is_empty() {
        all.iter().take(1).cloned().collect()
    } else {
        kept
    };
    (all, kept)
}

/// Turn a (possibly cached) sourced entry list into ranked candidates.
///
/// Filtering and confidence run fresh on every call, because filter
/// configuration may have changed since the list was cached. The
/// accept-rule confidence floor is applied here and only here, so the
/// cached-read path and batch compilation cannot diverge.
pub(crate) fn compile_candidates(
    sourced: Vec<SourcedEntry>,
    search_title: &str,
    source_context: Option<&str>,
    config: &MatchConfig,
) -> Vec<MatchCandidate> {
    let entries: Vec<CatalogEntry> = sourced.iter().map(|s| s.entry.clone()).collect();
    let kept_ids: HashSet<i64> = apply_system_filters(entries, config, source_context)
        .into_iter()
        .map(|entry| entry.id)
        .collect();

    let mut seen: HashSet<i64> = HashSet::new();
    let mut ranked: Vec<(MatchCandidate, u8)> = sourced
        .into_iter()
        .filter(|s| kept_ids.contains(&s.entry.id))
        .filter(|s| seen.insert(s.entry.id))
        .map(|s| {
            let mut conf = confidence(search_title, &s.entry);
            if let Some(source_title) = source_context {
                conf = floored_confidence(conf, config, source_title, &s.entry);
            }
            let priority = title_type_priority(&s.entry, search_title);
            (
                MatchCandidate {
                    entry: s.entry,
                    confidence: conf,
                    source: s.origin,
                },
                priority,
            )
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.0.confidence
            .cmp(&a.0.confidence)
            .then_with(|| b.1.cmp(&a.1))
    });
    ranked.into_iter().map(|(candidate, _)| candidate).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogFormat, CatalogSource, CatalogTitle, PublicationStatus};

    fn entry(id: i64, english: &str) -> CatalogEntry {
        CatalogEntry {
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
        }
    }

    #[test]
    fn test_rank_keeps_at_least_one() {
        let config = MatchConfig::default();
        let raw = vec![entry(1, "Completely Unrelated"), entry(2, "Another Thing")];
        let (all, kept) = rank_entries(raw, "Berserk", &config);
        assert_eq!(all.len(), 2);
        assert_eq!(kept.len(), 1, "one low-confidence item survives");
    }

    #[test]
    fn test_rank_orders_by_score() {
        let config = MatchConfig::default();
        let raw = vec![entry(1, "Berserk Spinoff Extra"), entry(2, "Berserk")];
        let (_, kept) = rank_entries(raw, "Berserk", &config);
        assert_eq!(kept[0].id, 2);
    }

    #[test]
    fn test_compile_candidates_sorted_and_deduped() {
        let config = MatchConfig::default();
        let sourced = vec![
            SourcedEntry::primary(entry(2, "Berserk Gaiden")),
            SourcedEntry::primary(entry(1, "Berserk")),
            SourcedEntry {
                entry: entry(1, "Berserk"),
                origin: CatalogSource::MangaDex,
            },
        ];
        let candidates = compile_candidates(sourced, "Berserk", None, &config);
        assert_eq!(candidates.len(), 2, "duplicate catalog ids collapse");
        assert_eq!(candidates[0].entry.id, 1);
        assert!(candidates[0].confidence > candidates[1].confidence);
        // First occurrence wins: provenance stays primary
        assert_eq!(candidates[0].source, CatalogSource::Primary);
    }
}
