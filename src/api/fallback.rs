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


//! Alternative catalog adapters
//!
//! Two independent REST services consulted only when the primary catalog
//! yields nothing usable. Each adapter converts the foreign record shape
//! into our [`CatalogEntry`] model; provenance is carried by the
//! [`CatalogSource`] the adapter reports.
//!
//! The MangaDex-style service keys records by UUID. The adapter derives a
//! stable negative synthetic id from the UUID (FNV-1a fold) so merged
//! result sets can still deduplicate by id without ever colliding with
//! positive primary-catalog ids.

use crate::api::FallbackSource;
use crate::error::{MatchError, Result};
use crate::matching::progress::CancelSignal;
use crate::models::{CatalogEntry, CatalogFormat, CatalogSource, CatalogTitle, PublicationStatus};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

const FALLBACK_TIMEOUT_SECS: u64 = 20;

fn build_client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(FALLBACK_TIMEOUT_SECS))
        .user_agent(user_agent)
        .build()
        .map_err(MatchError::from)
}

/// Stable negative synthetic id for services without numeric ids
fn synthetic_id(key: &str) -> i64 {
    // FNV-1a, folded into the negative id space
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    -((hash & 0x7fff_ffff_ffff_ffff) as i64).max(1)
}

// ===== MangaDex-style adapter =====

/// REST adapter for a MangaDex-style catalog
#[derive(Debug)]
pub struct MangaDexSource {
    client: Client,
    base_url: String,
}

impl MangaDexSource {
    pub fn new() -> Result<Self> {
        Self::with_base_url("https://api.mangadex.org")
    }

    pub fn with_base_url<S: Into<String>>(base_url: S) -> Result<Self> {
        Ok(Self {
            client: build_client("MangaSync/0.1 (matcher)")?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl FallbackSource for MangaDexSource {
    fn source(&self) -> CatalogSource {
        CatalogSource::MangaDex
    }

    async fn search_and_convert(
        &self,
        title: &str,
        limit: u32,
        cancel: &CancelSignal,
    ) -> Result<Vec<CatalogEntry>> {
        if cancel.is_cancelled() {
            return Err(MatchError::Cancelled);
        }

        let url = format!("{}/manga", self.base_url);
        let limit = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("title", title), ("limit", limit.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MatchError::api_failed(
                "MangaDex search failed",
                Some(status.as_u16()),
                Some(url),
            ));
        }

        let body: MangaDexResponse = response.json().await.map_err(|e| {
            MatchError::invalid_response(format!("MangaDex response parse error: {}", e), None)
        })?;
        Ok(body.data.into_iter().map(CatalogEntry::from).collect())
    }
}

#[derive(Debug, Deserialize)]
struct MangaDexResponse {
    #[serde(default)]
    data: Vec<MangaDexManga>,
}

#[derive(Debug, Deserialize)]
struct MangaDexManga {
    id: String,
    attributes: MangaDexAttributes,
}

#[derive(Debug, Deserialize)]
struct MangaDexAttributes {
    #[serde(default)]
    title: HashMap<String, String>,
    #[serde(rename = "altTitles", default)]
    alt_titles: Vec<HashMap<String, String>>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "contentRating", default)]
    content_rating: Option<String>,
    #[serde(rename = "lastChapter", default)]
    last_chapter: Option<String>,
    #[serde(rename = "lastVolume", default)]
    last_volume: Option<String>,
    #[serde(rename = "originalLanguage", default)]
    original_language: Option<String>,
}

impl From<MangaDexManga> for CatalogEntry {
    fn from(manga: MangaDexManga) -> Self {
        let attrs = manga.attributes;
        let english = attrs.title.get("en").cloned();
        let romaji = attrs.title.get("ja-ro").cloned().or_else(|| {
            attrs
                .alt_titles
                .iter()
                .find_map(|t| t.get("ja-ro").cloned())
        });
        let native = attrs.title.get("ja").cloned().or_else(|| {
            attrs.alt_titles.iter().find_map(|t| t.get("ja").cloned())
        });
        let synonyms: Vec<String> = attrs
            .alt_titles
            .iter()
            .flat_map(|t| t.values().cloned())
            .collect();

        let format = match attrs.original_language.as_deref() {
            Some("ko") => CatalogFormat::Manhwa,
            Some("zh") | Some("zh-hk") => CatalogFormat::Manhua,
            _ => CatalogFormat::Manga,
        };
        let status = match attrs.status.as_deref() {
            Some("ongoing") => PublicationStatus::Releasing,
            Some("completed") => PublicationStatus::Finished,
            Some("hiatus") => PublicationStatus::Hiatus,
            Some("cancelled") => PublicationStatus::Cancelled,
            _ => PublicationStatus::Unknown,
        };

        CatalogEntry {
            id: synthetic_id(&manga.id),
            title: CatalogTitle {
                english,
                romaji,
                native,
            },
            synonyms,
            format,
            status,
            chapters: attrs.last_chapter.and_then(|c| c.parse().ok()),
            volumes: attrs.last_volume.and_then(|v| v.parse().ok()),
            is_adult: matches!(
                attrs.content_rating.as_deref(),
                Some("erotica") | Some("pornographic")
            ),
            cover_url: None,
        }
    }
}

// ===== MangaUpdates-style adapter =====

/// REST adapter for a MangaUpdates-style catalog
#[derive(Debug)]
pub struct MangaUpdatesSource {
    client: Client,
    base_url: String,
}

impl MangaUpdatesSource {
    pub fn new() -> Result<Self> {
        Self::with_base_url("https://api.mangaupdates.com")
    }

    pub fn with_base_url<S: Into<String>>(base_url: S) -> Result<Self> {
        Ok(Self {
            client: build_client("MangaSync/0.1 (matcher)")?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl FallbackSource for MangaUpdatesSource {
    fn source(&self) -> CatalogSource {
        CatalogSource::MangaUpdates
    }

    async fn search_and_convert(
        &self,
        title: &str,
        limit: u32,
        cancel: &CancelSignal,
    ) -> Result<Vec<CatalogEntry>> {
        if cancel.is_cancelled() {
            return Err(MatchError::Cancelled);
        }

        let url = format!("{}/v1/series/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "search": title, "perpage": limit }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MatchError::api_failed(
                "MangaUpdates search failed",
                Some(status.as_u16()),
                Some(url),
            ));
        }

        let body: MangaUpdatesResponse = response.json().await.map_err(|e| {
            MatchError::invalid_response(format!("MangaUpdates response parse error: {}", e), None)
        })?;
        Ok(body
            .results
            .into_iter()
            .map(|r| CatalogEntry::from(r.record))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct MangaUpdatesResponse {
    #[serde(default)]
    results: Vec<MangaUpdatesResult>,
}

#[derive(Debug, Deserialize)]
struct MangaUpdatesResult {
    record: MangaUpdatesRecord,
}

#[derive(Debug, Deserialize)]
struct MangaUpdatesRecord {
    series_id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    associated: Vec<MangaUpdatesAssociated>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    latest_chapter: Option<i32>,
    #[serde(default)]
    genres: Vec<MangaUpdatesGenre>,
}

#[derive(Debug, Deserialize)]
struct MangaUpdatesAssociated {
    title: String,
}

#[derive(Debug, Deserialize)]
struct MangaUpdatesGenre {
    genre: String,
}

impl From<MangaUpdatesRecord> for CatalogEntry {
    fn from(record: MangaUpdatesRecord) -> Self {
        let format = match record.kind.as_deref() {
            Some("Manhwa") => CatalogFormat::Manhwa,
            Some("Manhua") => CatalogFormat::Manhua,
            Some("Novel") => CatalogFormat::Novel,
            Some("Doujinshi") => CatalogFormat::Doujinshi,
            Some("Manga") | None => CatalogFormat::Manga,
            Some(_) => CatalogFormat::Unknown,
        };
        let status = match record.completed {
            Some(true) => PublicationStatus::Finished,
            Some(false) => PublicationStatus::Releasing,
            None => PublicationStatus::Unknown,
        };
        let is_adult = record
            .genres
            .iter()
            .any(|g| matches!(g.genre.as_str(), "Adult" | "Hentai"));

        CatalogEntry {
            // MangaUpdates ids are numeric but live in a different id
            // space; negate them so they cannot collide with primary ids
            id: -record.series_id.abs().max(1),
            title: CatalogTitle {
                english: record.title,
                romaji: None,
                native: None,
            },
            synonyms: record.associated.into_iter().map(|a| a.title).collect(),
            format,
            status,
            chapters: record.latest_chapter,
            volumes: None,
            is_adult,
            cover_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_id_is_stable_and_negative() {
        let a = synthetic_id("b73aa0f5-7f09-43ac-9bd2-d94f162aaa41");
        let b = synthetic_id("b73aa0f5-7f09-43ac-9bd2-d94f162aaa41");
        let c = synthetic_id("some-other-uuid");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < 0);
        assert!(c < 0);
    }

    #[test]
    fn test_mangadex_conversion() {
        let json = r#"{
            "id": "b73aa0f5-7f09-43ac-9bd2-d94f162aaa41",
            "attributes": {
                "title": { "en": "Berserk" },
                "altTitles": [ { "ja": "ベルセルク" }, { "ja-ro": "Beruseruku" } ],
                "status": "ongoing",
                "contentRating": "suggestive",
                "lastChapter": "380",
                "lastVolume": "41",
                "originalLanguage": "ja"
            }
        }"#;
        let manga: MangaDexManga = serde_json::from_str(json).expect("manga parses");
        let entry = CatalogEntry::from(manga);
        assert!(entry.id < 0);
        assert_eq!(entry.title.english.as_deref(), Some("Berserk"));
        assert_eq!(entry.title.romaji.as_deref(), Some("Beruseruku"));
        assert_eq!(entry.status, PublicationStatus::Releasing);
        assert_eq!(entry.chapters, Some(380));
        assert!(!entry.is_adult);
    }

    #[test]
    fn test_mangadex_adult_rating() {
        let json = r#"{
            "id": "x",
            "attributes": { "title": {}, "contentRating": "pornographic" }
        }"#;
        let manga: MangaDexManga = serde_json::from_str(json).expect("manga parses");
        let entry = CatalogEntry::from(manga);
        assert!(entry.is_adult);
    }

    #[test]
    fn test_mangaupdates_conversion() {
        let json = r#"{
            "series_id": 1234,
            "title": "Vinland Saga",
            "associated": [ { "title": "ヴィンランド・サガ" } ],
            "type": "Manga",
            "completed": false,
            "latest_chapter": 210,
            "genres": [ { "genre": "Action" } ]
        }"#;
        let record: MangaUpdatesRecord = serde_json::from_str(json).expect("record parses");
        let entry = CatalogEntry::from(record);
        assert_eq!(entry.id, -1234);
        assert_eq!(entry.title.english.as_deref(), Some("Vinland Saga"));
        assert_eq!(entry.synonyms.len(), 1);
        assert_eq!(entry.status, PublicationStatus::Releasing);
        assert_eq!(entry.format, CatalogFormat::Manga);
    }
}
