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


//! Core data model
//!
//! Two independently-curated naming schemes meet here: the user's imported
//! reading list ([`SourceEntry`]) and the remote catalog ([`CatalogEntry`]).
//! A [`MatchResult`] is the durable unit of work tying one source entry to
//! its ranked candidates and a review disposition.
//!
//! Catalog entries are read-only snapshots: they are never mutated, only
//! replaced by fresher fetches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reading state of a source entry, as imported from the list export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    Reading,
    Completed,
    OnHold,
    Dropped,
    PlanToRead,
}

/// Publication format of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CatalogFormat {
    Manga,
    Manhwa,
    Manhua,
    Novel,
    LightNovel,
    OneShot,
    Doujinshi,
    Unknown,
}

impl CatalogFormat {
    /// Formats included in matching by default; prose variants are not
    pub fn default_included() -> Vec<CatalogFormat> {
        vec![
            CatalogFormat::Manga,
            CatalogFormat::Manhwa,
            CatalogFormat::Manhua,
            CatalogFormat::OneShot,
            CatalogFormat::Doujinshi,
        ]
    }
}

/// Publication status of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationStatus {
    Releasing,
    Finished,
    Hiatus,
    Cancelled,
    NotYetReleased,
    Unknown,
}

/// Which catalog a candidate came from.
///
/// `Primary` is the main catalog; the others are consulted only as a
/// fallback when the primary search yields nothing usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    Primary,
    MangaDex,
    MangaUpdates,
}

impl CatalogSource {
    pub fn label(&self) -> &'static str {
        match self {
            CatalogSource::Primary => "primary",
            CatalogSource::MangaDex => "MangaDex",
            CatalogSource::MangaUpdates => "MangaUpdates",
        }
    }
}

/// Multilingual title of a catalog entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTitle {
    #[serde(default)]
    pub english: Option<String>,
    #[serde(default)]
    pub romaji: Option<String>,
    #[serde(default)]
    pub native: Option<String>,
}

impl CatalogTitle {
    /// Best display title: English, then romaji, then native
    pub fn display(&self) -> &str {
        self.english
            .as_deref()
            .or(self.romaji.as_deref())
            .or(self.native.as_deref())
            .unwrap_or("")
    }

    /// All non-empty title variants
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        [
            self.english.as_deref(),
            self.romaji.as_deref(),
            self.native.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|t| !t.is_empty())
    }
}

/// One media record from the remote catalog. Read-only snapshot data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub title: CatalogTitle,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub format: CatalogFormat,
    pub status: PublicationStatus,
    #[serde(default)]
    pub chapters: Option<i32>,
    #[serde(default)]
    pub volumes: Option<i32>,
    #[serde(default)]
    pub is_adult: bool,
    #[serde(default)]
    pub cover_url: Option<String>,
}

impl CatalogEntry {
    /// All comparable title strings: the three title variants plus synonyms
    pub fn all_titles(&self) -> impl Iterator<Item = &str> {
        self.title
            .variants()
            .chain(self.synonyms.iter().map(String::as_str).filter(|s| !s.is_empty()))
    }
}

/// A catalog entry tagged with the catalog it was found in.
///
/// This is what the search cache stores, so provenance survives a cache
/// round trip while confidence is still recomputed fresh at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcedEntry {
    pub entry: CatalogEntry,
    pub origin: CatalogSource,
}

impl SourcedEntry {
    pub fn primary(entry: CatalogEntry) -> Self {
        Self {
            entry,
            origin: CatalogSource::Primary,
        }
    }
}

/// One item from the user's imported reading list.
///
/// Immutable once imported except by explicit edit; owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub id: i64,
    pub title: String,
    pub status: ReadingStatus,
    #[serde(default)]
    pub chapters_read: i32,
    #[serde(default)]
    pub volumes_read: i32,
    #[serde(default)]
    pub score: Option<f32>,
    /// Catalog id already known for this entry (e.g. from a previous run),
    /// letting the batch orchestrator skip the title search
    #[serde(default)]
    pub catalog_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A catalog entry paired with the confidence that it matches a given
/// source entry. Ephemeral, computed per search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub entry: CatalogEntry,
    /// Matching certainty, 0-100
    pub confidence: u8,
    /// Which catalog this candidate was found in
    pub source: CatalogSource,
}

/// Lifecycle state of a match result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Awaiting user review
    Pending,
    /// Auto- or user-confirmed against the best candidate
    Matched,
    /// User picked a candidate by hand
    Manual,
    /// User decided not to link this entry
    Skipped,
}

/// The durable unit of matching work: one source entry, its ranked
/// candidates (best first), an optional selected catalog entry, and the
/// review disposition.
///
/// Invariant: `selected` is always present when the disposition is
/// `Matched` or `Manual`. Candidate order determines the default selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub source_entry: SourceEntry,
    pub candidates: Vec<MatchCandidate>,
    pub selected: Option<CatalogEntry>,
    pub disposition: Disposition,
}

impl MatchResult {
    /// Create a pending result with ranked candidates
    pub fn new(source_entry: SourceEntry, candidates: Vec<MatchCandidate>) -> Self {
        Self {
            source_entry,
            candidates,
            selected: None,
            disposition: Disposition::Pending,
        }
    }

    /// The default selection: the highest-ranked candidate, if any
    pub fn best_candidate(&self) -> Option<&MatchCandidate> {
        self.candidates.first()
    }

    /// Accept the best candidate as the match
    pub fn accept_best(&mut self) -> bool {
        match self.candidates.first() {
            Some(best) => {
                self.selected = Some(best.entry.clone());
                self.disposition = Disposition::Matched;
                true
            }
            None => false,
        }
    }

    /// Select a specific catalog entry by hand
    pub fn select_manual(&mut self, entry: CatalogEntry) {
        self.selected = Some(entry);
        self.disposition = Disposition::Manual;
    }

    /// Skip this entry; any selection is discarded
    pub fn skip(&mut self) {
        self.selected = None;
        self.disposition = Disposition::Skipped;
    }

    /// Return to pending for re-review (e.g. after a re-match)
    pub fn reset(&mut self) {
        self.selected = None;
        self.disposition = Disposition::Pending;
    }
}

/// A review action targets either one result or a whole batch.
///
/// Tagged variant with exhaustive handling; handlers match on it rather
/// than sniffing the payload shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "results", rename_all = "snake_case")]
pub enum ReviewAction {
    Single(MatchResult),
    Batch(Vec<MatchResult>),
}

impl ReviewAction {
    pub fn results(&self) -> &[MatchResult] {
        match self {
            ReviewAction::Single(result) => std::slice::from_ref(result),
            ReviewAction::Batch(results) => results,
        }
    }

    pub fn into_results(self) -> Vec<MatchResult> {
        match self {
            ReviewAction::Single(result) => vec![result],
            ReviewAction::Batch(results) => results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn source(id: i64, title: &str) -> SourceEntry {
        SourceEntry {
            id,
            title: title.to_string(),
            status: ReadingStatus::Reading,
            chapters_read: 0,
            volumes_read: 0,
            score: None,
            catalog_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_selection_invariant() {
        let candidate = MatchCandidate {
            entry: entry(1, "Berserk"),
            confidence: 99,
            source: CatalogSource::Primary,
        };
        let mut result = MatchResult::new(source(10, "Berserk"), vec![candidate]);
        assert_eq!(result.disposition, Disposition::Pending);
        assert!(result.selected.is_none());

        assert!(result.accept_best());
        assert_eq!(result.disposition, Disposition::Matched);
        assert!(result.selected.is_some());

        result.skip();
        assert_eq!(result.disposition, Disposition::Skipped);
        assert!(result.selected.is_none());
    }

    #[test]
    fn test_accept_best_without_candidates() {
        let mut result = MatchResult::new(source(10, "Unknown Title"), vec![]);
        assert!(!result.accept_best());
        assert_eq!(result.disposition, Disposition::Pending);
    }

    #[test]
    fn test_title_display_preference() {
        let title = CatalogTitle {
            english: None,
            romaji: Some("Shingeki no Kyojin".to_string()),
            native: Some("進撃の巨人".to_string()),
        };
        assert_eq!(title.display(), "Shingeki no Kyojin");
    }

    #[test]
    fn test_review_action_exhaustive() {
        let single = ReviewAction::Single(MatchResult::new(source(1, "A"), vec![]));
        assert_eq!(single.results().len(), 1);
        let batch = ReviewAction::Batch(vec![
            MatchResult::new(source(1, "A"), vec![]),
            MatchResult::new(source(2, "B"), vec![]),
        ]);
        assert_eq!(batch.into_results().len(), 2);
    }
}
