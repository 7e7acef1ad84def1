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


//! Content filtering and user rules
//!
//! System filters strip formats the user never wants to see (prose
//! variants, optionally one-shots and adult content). User skip rules
//! remove specific candidates; accept rules never remove anything, they
//! mark a surviving candidate so its confidence is raised to a floor.
//!
//! Skip rules always take precedence over accept rules targeting the same
//! candidate. `accept_rule_floor` is the single floor authority for every
//! call site (cached reads and batch compilation alike), so the two paths
//! cannot drift apart.

use crate::config::{MatchConfig, MatchRule, RuleAction};
use crate::matching::normalize::normalize;
use crate::models::{CatalogEntry, CatalogFormat};

/// Confidence floor for an accept rule whose target title matches the
/// source title exactly
pub const EXACT_ACCEPT_FLOOR: u8 = 90;

/// Confidence floor for any other accept rule match
pub const ACCEPT_FLOOR: u8 = 75;

/// The one authoritative accept-rule confidence floor
pub fn accept_rule_floor(exact_title: bool) -> u8 {
    if exact_title {
        EXACT_ACCEPT_FLOOR
    } else {
        ACCEPT_FLOOR
    }
}

/// Apply system content filters, then user skip rules.
///
/// Skip rules only apply when a source title is supplied; plain title
/// searches without source context keep rule-targeted candidates.
pub fn apply_system_filters(
    entries: Vec<CatalogEntry>,
    config: &MatchConfig,
    source_title: Option<&str>,
) -> Vec<CatalogEntry> {
    let mut kept: Vec<CatalogEntry> = entries
        .into_iter()
        .filter(|entry| config.include_formats.contains(&entry.format))
        .filter(|entry| !(config.ignore_one_shots && entry.format == CatalogFormat::OneShot))
        .filter(|entry| !(config.ignore_adult_content && entry.is_adult))
        .collect();

    if let Some(title) = source_title {
        let skip_rules: Vec<&MatchRule> = config
            .rules_for(title)
            .into_iter()
            .filter(|rule| rule.action == RuleAction::Skip)
            .collect();
        if !skip_rules.is_empty() {
            kept.retain(|entry| !skip_rules.iter().any(|rule| rule.targets(entry)));
        }
    }

    kept
}

/// Find the accept rule applying to this candidate, if any.
///
/// Returns `None` when a skip rule also targets the candidate: skip wins.
pub fn find_accept_rule<'a>(
    config: &'a MatchConfig,
    source_title: &str,
    entry: &CatalogEntry,
) -> Option<&'a MatchRule> {
    let rules = config.rules_for(source_title);
    if rules
        .iter()
        .any(|rule| rule.action == RuleAction::Skip && rule.targets(entry))
    {
        return None;
    }
    rules
        .into_iter()
        .find(|rule| rule.action == RuleAction::Accept && rule.targets(entry))
}

/// Is an accept-rule match "exact": does some title of the entry equal the
/// source title after normalization?
pub fn is_exact_title_match(entry: &CatalogEntry, source_title: &str) -> bool {
    let wanted = normalize(source_title);
    !wanted.is_empty() && entry.all_titles().any(|t| normalize(t) == wanted)
}

/// Raise a candidate's confidence to the accept-rule floor if a rule marks
/// it. Returns the (possibly unchanged) confidence.
pub fn floored_confidence(
    confidence: u8,
    config: &MatchConfig,
    source_title: &str,
    entry: &CatalogEntry,
) -> u8 {
    match find_accept_rule(config, source_title, entry) {
        Some(_) => confidence.max(accept_rule_floor(is_exact_title_match(entry, source_title))),
        None => confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogTitle, PublicationStatus};

    fn entry(id: i64, english: &str, format: CatalogFormat, adult: bool) -> CatalogEntry {
        CatalogEntry {
            id,
            title: CatalogTitle {
                english: Some(english.to_string()),
                romaji: None,
                native: None,
            },
            synonyms: vec![],
            format,
            status: PublicationStatus::Releasing,
            chapters: None,
            volumes: None,
            is_adult: adult,
            cover_url: None,
        }
    }

    fn rule(source: &str, id: Option<i64>, action: RuleAction) -> MatchRule {
        MatchRule {
            source_title: source.to_string(),
            catalog_id: id,
            catalog_title: None,
            action,
        }
    }

    #[test]
    fn test_format_filter_strips_novels() {
        let config = MatchConfig::default();
        let kept = apply_system_filters(
            vec![
                entry(1, "Berserk", CatalogFormat::Manga, false),
                entry(2, "Berserk (novel)", CatalogFormat::Novel, false),
                entry(3, "Berserk LN", CatalogFormat::LightNovel, false),
            ],
            &config,
            None,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
    }

    #[test]
    fn test_one_shot_filter_is_conditional() {
        let mut config = MatchConfig::default();
        let entries = vec![
            entry(1, "Lookback", CatalogFormat::OneShot, false),
            entry(2, "Chainsaw Man", CatalogFormat::Manga, false),
        ];
        assert_eq!(apply_system_filters(entries.clone(), &config, None).len(), 2);
        config.ignore_one_shots = true;
        let kept = apply_system_filters(entries, &config, None);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 2);
    }

    #[test]
    fn test_adult_filter() {
        let mut config = MatchConfig::default();
        config.ignore_adult_content = true;
        let kept = apply_system_filters(
            vec![
                entry(1, "Safe", CatalogFormat::Manga, false),
                entry(2, "Not Safe", CatalogFormat::Manga, true),
            ],
            &config,
            None,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
    }

    #[test]
    fn test_skip_rule_needs_source_context() {
        let mut config = MatchConfig::default();
        config.custom_rules.push(rule("Berserk", Some(2), RuleAction::Skip));
        let entries = vec![
            entry(1, "Berserk", CatalogFormat::Manga, false),
            entry(2, "Berserk Spinoff", CatalogFormat::Manga, false),
        ];
        // Without source context the skip rule does not fire
        assert_eq!(apply_system_filters(entries.clone(), &config, None).len(), 2);
        let kept = apply_system_filters(entries, &config, Some("Berserk"));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
    }

    #[test]
    fn test_skip_takes_precedence_over_accept() {
        let mut config = MatchConfig::default();
        config.custom_rules.push(rule("Berserk", Some(1), RuleAction::Accept));
        config.custom_rules.push(rule("Berserk", Some(1), RuleAction::Skip));
        let e = entry(1, "Berserk", CatalogFormat::Manga, false);
        assert!(find_accept_rule(&config, "Berserk", &e).is_none());
    }

    #[test]
    fn test_accept_floor_exact_vs_loose() {
        assert_eq!(accept_rule_floor(true), EXACT_ACCEPT_FLOOR);
        assert_eq!(accept_rule_floor(false), ACCEPT_FLOOR);

        let mut config = MatchConfig::default();
        config.custom_rules.push(rule("Berserk", Some(1), RuleAction::Accept));

        // Exact title: floor 90, low confidence lifted
        let exact = entry(1, "Berserk", CatalogFormat::Manga, false);
        assert_eq!(floored_confidence(12, &config, "Berserk", &exact), EXACT_ACCEPT_FLOOR);

        // Non-exact title: lower floor
        let loose = entry(1, "Berserk Gaiden", CatalogFormat::Manga, false);
        assert_eq!(floored_confidence(12, &config, "Berserk", &loose), ACCEPT_FLOOR);

        // Confidence already above the floor stays put
        assert_eq!(floored_confidence(97, &config, "Berserk", &exact), 97);
    }

    #[test]
    fn test_no_rule_no_floor() {
        let config = MatchConfig::default();
        let e = entry(1, "Berserk", CatalogFormat::Manga, false);
        assert_eq!(floored_confidence(12, &config, "Berserk", &e), 12);
    }
}
