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


//! Matching configuration
//!
//! All tuning values live here as plain configurable fields with defaults.
//! Filter configuration is read fresh on every cache hit, so changing a
//! toggle takes effect without invalidating cached search results.

use crate::matching::normalize::normalize;
use crate::models::{CatalogEntry, CatalogFormat, CatalogSource};
use serde::{Deserialize, Serialize};

/// What a user-defined rule does to a matching candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Force-include: the candidate survives and gets a confidence floor
    Accept,
    /// Force-exclude: the candidate is removed. Takes precedence over
    /// accept rules matching the same candidate.
    Skip,
}

/// User-defined accept/skip rule.
///
/// A rule applies to source entries whose title matches `source_title`
/// (normalized comparison) and targets catalog entries either by id or by
/// normalized title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRule {
    pub source_title: String,
    #[serde(default)]
    pub catalog_id: Option<i64>,
    #[serde(default)]
    pub catalog_title: Option<String>,
    pub action: RuleAction,
}

impl MatchRule {
    /// Does this rule apply to searches for the given source title?
    pub fn applies_to(&self, source_title: &str) -> bool {
        normalize(&self.source_title) == normalize(source_title)
    }

    /// Does this rule target the given catalog entry?
    pub fn targets(&self, entry: &CatalogEntry) -> bool {
        if let Some(id) = self.catalog_id {
            if id == entry.id {
                return true;
            }
        }
        if let Some(ref title) = self.catalog_title {
            let wanted = normalize(title);
            if !wanted.is_empty() && entry.all_titles().any(|t| normalize(t) == wanted) {
                return true;
            }
        }
        false
    }
}

/// Rate-limit and batching tuning.
///
/// The thresholds and multipliers for the adaptive inter-group delay are
/// tuning values, not load-bearing logic; adjust freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Remote service request budget per minute
    pub requests_per_minute: u32,
    /// Source entries per multi-alias batched query
    pub batch_group_size: usize,
    /// Catalog ids per id-batch fetch (remote per-request id limit)
    pub id_batch_size: usize,
    /// Lower clamp for the adaptive inter-group delay
    pub min_group_delay_ms: u64,
    /// Upper clamp for the adaptive inter-group delay
    pub max_group_delay_ms: u64,
    /// Remaining-budget hint at or below which the delay doubles
    pub low_budget_threshold: u32,
    /// Remaining-budget hint at or below which the delay grows 1.5x
    pub mid_budget_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 90,
            batch_group_size: 30,
            id_batch_size: 50,
            min_group_delay_ms: 500,
            max_group_delay_ms: 15_000,
            low_budget_threshold: 10,
            mid_budget_threshold: 30,
        }
    }
}

/// Matching configuration: filter toggles, per-source enables, custom
/// rules, and search tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Catalog formats considered at all; everything else is stripped
    pub include_formats: Vec<CatalogFormat>,
    /// Strip one-shot entries from results
    pub ignore_one_shots: bool,
    /// Strip adult-content entries from results
    pub ignore_adult_content: bool,
    /// Consult the MangaDex-style fallback catalog when the primary
    /// search comes up empty
    pub enable_mangadex: bool,
    /// Consult the MangaUpdates-style fallback catalog when the primary
    /// search comes up empty
    pub enable_mangaupdates: bool,
    /// User-defined accept/skip rules
    pub custom_rules: Vec<MatchRule>,
    /// Results requested per search page
    pub per_page: u32,
    /// Cap on accumulated results across pages of one search
    pub max_search_results: usize,
    /// Candidates fetched from each fallback catalog
    pub fallback_result_limit: u32,
    /// Minimum match score for a candidate to be kept in ranking
    pub min_match_score: f64,
    /// How many raw results to keep when filtering empties a non-empty set
    pub raw_fallback_limit: usize,
    /// Cache record validity window, in hours
    pub cache_ttl_hours: i64,
    pub rate_limit: RateLimitConfig,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            include_formats: CatalogFormat::default_included(),
            ignore_one_shots: false,
            ignore_adult_content: true,
            enable_mangadex: true,
            enable_mangaupdates: true,
            custom_rules: Vec::new(),
            per_page: 25,
            max_search_results: 50,
            fallback_result_limit: 10,
            min_match_score: 0.4,
            raw_fallback_limit: 5,
            cache_ttl_hours: 24,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl MatchConfig {
    /// Is the given fallback catalog enabled?
    pub fn source_enabled(&self, source: CatalogSource) -> bool {
        match source {
            CatalogSource::Primary => true,
            CatalogSource::MangaDex => self.enable_mangadex,
            CatalogSource::MangaUpdates => self.enable_mangaupdates,
        }
    }

    /// Rules applying to the given source title
    pub fn rules_for<'a>(&'a self, source_title: &str) -> Vec<&'a MatchRule> {
        self.custom_rules
            .iter()
            .filter(|rule| rule.applies_to(source_title))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogTitle, PublicationStatus};

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
    fn test_rule_applies_normalized() {
        let rule = MatchRule {
            source_title: "One-Piece".to_string(),
            catalog_id: Some(30013),
            catalog_title: None,
            action: RuleAction::Accept,
        };
        assert!(rule.applies_to("one piece"));
        assert!(rule.applies_to("ONE PIECE"));
        assert!(!rule.applies_to("two piece"));
    }

    #[test]
    fn test_rule_targets_by_id_or_title() {
        let by_id = MatchRule {
            source_title: "x".to_string(),
            catalog_id: Some(42),
            catalog_title: None,
            action: RuleAction::Skip,
        };
        assert!(by_id.targets(&entry(42, "Whatever")));
        assert!(!by_id.targets(&entry(43, "Whatever")));

        let by_title = MatchRule {
            source_title: "x".to_string(),
            catalog_id: None,
            catalog_title: Some("Vinland Saga".to_string()),
            action: RuleAction::Skip,
        };
        assert!(by_title.targets(&entry(7, "Vinland Saga")));
        assert!(!by_title.targets(&entry(7, "Vagabond")));
    }

    #[test]
    fn test_source_enabled_toggles() {
        let mut config = MatchConfig::default();
        assert!(config.source_enabled(CatalogSource::Primary));
        config.enable_mangadex = false;
        assert!(!config.source_enabled(CatalogSource::MangaDex));
        assert!(config.source_enabled(CatalogSource::MangaUpdates));
    }
}
