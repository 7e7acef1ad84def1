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


//! Match scoring
//!
//! Computes a 0-1 match score between a source title and a catalog entry,
//! and maps it onto a 0-100 confidence percentage.
//!
//! The score is the best-of across the entry's English/romaji/native titles
//! and every synonym, each compared with a layered similarity function:
//! exact or article-only equality, season/part numbering, containment of
//! the whole search term, and word overlap with order preservation.
//!
//! The confidence mapping is a monotonic piecewise-linear staircase. The
//! bands are deliberately conservative near the ceiling so an automated
//! match never claims more certainty than the string evidence supports.

use crate::matching::normalize::{differs_only_by_articles, normalize, season_pattern};
use crate::models::CatalogEntry;

/// Credit granted for a prefix word match (vs 1.0 for an exact word match)
const PREFIX_WORD_CREDIT: f64 = 0.75;

/// Minimum prefix length for a partial word match to count
const PREFIX_MIN_LEN: usize = 4;

/// Minimum fraction of search words that must align for the word layer
const WORD_ALIGN_THRESHOLD: f64 = 0.75;

/// Penalty multiplier when matched words appear out of relative order
const ORDER_PENALTY: f64 = 0.7;

/// Best match score across every title variant and synonym of the entry
pub fn match_score(entry: &CatalogEntry, source_title: &str) -> f64 {
    entry
        .all_titles()
        .map(|candidate| title_similarity(candidate, source_title))
        .fold(0.0, f64::max)
}

/// Map a source title and entry to a 0-100 confidence percentage
pub fn confidence(source_title: &str, entry: &CatalogEntry) -> u8 {
    score_to_confidence(match_score(entry, source_title))
}

/// Layered similarity between one candidate title and the search term
pub fn title_similarity(candidate: &str, search: &str) -> f64 {
    let cand = normalize(candidate);
    let term = normalize(search);
    if cand.is_empty() || term.is_empty() {
        return 0.0;
    }
    if cand == term || differs_only_by_articles(&cand, &term) {
        return 1.0;
    }

    let season = season_pattern(&cand, &term);
    if season > 0.0 {
        return season;
    }

    let mut best: f64 = 0.0;

    // Containment of the complete search term, weighted by how much of the
    // candidate it represents: "berserk" inside "berserk deluxe edition"
    // scores higher than inside a long spin-off title.
    if cand.contains(&term) {
        let coverage = term.len() as f64 / cand.len() as f64;
        best = 0.70 + 0.25 * coverage;
    }

    best.max(word_overlap(&cand, &term)).clamp(0.0, 1.0)
}

/// Word-level overlap with order preservation and prefix partial credit.
///
/// Only accepted when at least 75% of the search words align; full credit
/// requires the matched words to keep their relative order.
fn word_overlap(cand: &str, term: &str) -> f64 {
    let cand_words: Vec<&str> = cand.split(' ').collect();
    let term_words: Vec<&str> = term.split(' ').collect();
    if term_words.is_empty() {
        return 0.0;
    }

    let mut credit = 0.0;
    let mut matched_positions: Vec<usize> = Vec::new();

    for word in &term_words {
        let exact = cand_words.iter().position(|c| c == word);
        let position = exact.or_else(|| {
            cand_words.iter().position(|c| shares_prefix(c, word))
        });
        if let Some(pos) = position {
            credit += if exact.is_some() { 1.0 } else { PREFIX_WORD_CREDIT };
            matched_positions.push(pos);
        }
    }

    let align = credit / term_words.len() as f64;
    if align < WORD_ALIGN_THRESHOLD {
        return 0.0;
    }

    let ordered = matched_positions.windows(2).all(|w| w[0] < w[1]);
    let order_factor = if ordered { 1.0 } else { ORDER_PENALTY };
    // A candidate drowning the matched words in many extra words is a
    // weaker match than one made of little else
    let cand_coverage = matched_positions.len() as f64 / cand_words.len() as f64;
    align * order_factor * (0.55 + 0.35 * cand_coverage)
}

/// Two words share a usable prefix when one starts with the other and the
/// common part is at least `PREFIX_MIN_LEN` long
fn shares_prefix(a: &str, b: &str) -> bool {
    let len = a.len().min(b.len());
    len >= PREFIX_MIN_LEN && (a.starts_with(b) || b.starts_with(a))
}

/// Piecewise-linear confidence staircase over the 0-1 match score.
///
/// Bands: >=0.97 -> 99, 0.94-0.97 -> 90-96, 0.87-0.94 -> 80-90,
/// 0.75-0.87 -> 65-80, 0.50-0.75 -> 40-65, 0.20-0.50 -> 15-40,
/// <0.20 -> 0-15. Monotonically non-decreasing in the score.
pub fn score_to_confidence(score: f64) -> u8 {
    let score = score.clamp(0.0, 1.0);
    let confidence = if score <= 0.0 {
        0.0
    } else if score >= 0.97 {
        99.0
    } else if score >= 0.94 {
        90.0 + (score - 0.94) / 0.03 * 6.0
    } else if score >= 0.87 {
        80.0 + (score - 0.87) / 0.07 * 10.0
    } else if score >= 0.75 {
        65.0 + (score - 0.75) / 0.12 * 15.0
    } else if score >= 0.50 {
        40.0 + (score - 0.50) / 0.25 * 25.0
    } else if score >= 0.20 {
        15.0 + (score - 0.20) / 0.30 * 25.0
    } else {
        score / 0.20 * 15.0
    };
    confidence.floor() as u8
}

/// Coarse tie-break rank by which title field produced the best score:
/// primary English beats romaji beats native beats synonyms.
///
/// Only used to order candidates of equal confidence.
pub fn title_type_priority(entry: &CatalogEntry, source_title: &str) -> u8 {
    let fields: [(Option<&str>, u8); 3] = [
        (entry.title.english.as_deref(), 3),
        (entry.title.romaji.as_deref(), 2),
        (entry.title.native.as_deref(), 1),
    ];

    let mut best_rank = 0;
    let mut best_score = entry
        .synonyms
        .iter()
        .map(|s| title_similarity(s, source_title))
        .fold(0.0, f64::max);

    // Iterate lowest rank first so that on a tie the higher rank wins
    for (field, rank) in fields.iter().rev() {
        if let Some(title) = field {
            let score = title_similarity(title, source_title);
            if score >= best_score && score > 0.0 {
                best_score = score;
                best_rank = *rank;
            }
        }
    }
    best_rank
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogFormat, CatalogTitle, PublicationStatus};

    fn entry_with_titles(
        english: Option<&str>,
        romaji: Option<&str>,
        native: Option<&str>,
        synonyms: &[&str],
    ) -> CatalogEntry {
        CatalogEntry {
            id: 1,
            title: CatalogTitle {
                english: english.map(str::to_string),
                romaji: romaji.map(str::to_string),
                native: native.map(str::to_string),
            },
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
            format: CatalogFormat::Manga,
            status: PublicationStatus::Releasing,
            chapters: None,
            volumes: None,
            is_adult: false,
            cover_url: None,
        }
    }

    #[test]
    fn test_score_bounds() {
        let entry = entry_with_titles(Some("Berserk"), Some("Berserk"), None, &["Berserk Saga"]);
        for title in ["Berserk", "berserk", "Something Else Entirely", ""] {
            let score = match_score(&entry, title);
            assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
        }
    }

    #[test]
    fn test_exact_match_scores_one() {
        let entry = entry_with_titles(Some("Vinland Saga"), None, None, &[]);
        assert_eq!(match_score(&entry, "Vinland Saga"), 1.0);
        assert_eq!(match_score(&entry, "vinland-saga"), 1.0);
    }

    #[test]
    fn test_article_difference_scores_one() {
        let entry = entry_with_titles(Some("The Promised Neverland"), None, None, &[]);
        assert_eq!(match_score(&entry, "Promised Neverland"), 1.0);
    }

    #[test]
    fn test_synonym_match_counts() {
        let entry = entry_with_titles(
            Some("Attack on Titan"),
            Some("Shingeki no Kyojin"),
            None,
            &["AoT"],
        );
        assert_eq!(match_score(&entry, "shingeki no kyojin"), 1.0);
        assert_eq!(match_score(&entry, "aot"), 1.0);
    }

    #[test]
    fn test_season_numbering_scores_fixed() {
        let entry = entry_with_titles(Some("One Piece"), None, None, &[]);
        assert_eq!(match_score(&entry, "One Piece Season 2"), 0.95);
    }

    #[test]
    fn test_containment_weighted_by_coverage() {
        let short = title_similarity("Berserk Deluxe", "Berserk");
        let long = title_similarity("Berserk Deluxe Edition Volume Collection", "Berserk");
        assert!(short > long);
        assert!(short < 1.0);
        assert!(long >= 0.70);
    }

    #[test]
    fn test_word_overlap_requires_alignment() {
        // 1 of 3 words -> rejected by the 75% alignment threshold
        assert_eq!(word_overlap("fire punch", "fire emblem heroes"), 0.0);
        // all words present, order preserved
        let ordered = word_overlap("the seven deadly sins", "seven deadly sins");
        assert!(ordered > 0.8);
        // all words present but shuffled gets the order penalty
        let shuffled = word_overlap("sins deadly seven", "seven deadly sins");
        assert!(shuffled < ordered);
        assert!(shuffled > 0.0);
    }

    #[test]
    fn test_unrelated_titles_score_low() {
        let entry = entry_with_titles(Some("Naruto"), None, None, &[]);
        assert!(match_score(&entry, "Bleach") < 0.2);
    }

    #[test]
    fn test_confidence_staircase_bands() {
        assert_eq!(score_to_confidence(0.0), 0);
        assert_eq!(score_to_confidence(1.0), 99);
        assert_eq!(score_to_confidence(0.97), 99);
        assert_eq!(score_to_confidence(0.98), 99);
        assert!((90..=96).contains(&score_to_confidence(0.95)));
        assert!((80..=90).contains(&score_to_confidence(0.90)));
        assert!((65..=80).contains(&score_to_confidence(0.80)));
        assert!((40..=65).contains(&score_to_confidence(0.60)));
        assert!((15..=40).contains(&score_to_confidence(0.30)));
        assert!(score_to_confidence(0.1) <= 15);
    }

    #[test]
    fn test_confidence_monotonic() {
        let mut last = 0;
        for i in 0..=100 {
            let score = i as f64 / 100.0;
            let conf = score_to_confidence(score);
            assert!(conf >= last, "confidence dropped at score {}", score);
            last = conf;
        }
    }

    #[test]
    fn test_title_type_priority_ranks() {
        let entry = entry_with_titles(
            Some("Attack on Titan"),
            Some("Shingeki no Kyojin"),
            Some("進撃の巨人"),
            &["AoT"],
        );
        assert_eq!(title_type_priority(&entry, "Attack on Titan"), 3);
        assert_eq!(title_type_priority(&entry, "Shingeki no Kyojin"), 2);
        assert_eq!(title_type_priority(&entry, "進撃の巨人"), 1);
        assert_eq!(title_type_priority(&entry, "AoT"), 0);
    }
}
