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


//! GraphQL client for the primary catalog
//!
//! Wraps `reqwest::Client` with:
//! - default headers, timeouts and connection pooling
//! - bounded retry with exponential backoff on transient failures
//! - HTTP 429 handling honoring `Retry-After`
//! - rate-limit-remaining header tracking fed into the shared
//!   [`RequestBudget`]
//! - GraphQL error envelope decoding
//!
//! Retry strategy: at most 3 attempts (1 initial + 2 retries), backoff
//! 1s/2s between attempts. Retries cover network errors and 5xx server
//! errors. 429 is surfaced immediately with its retry delay, other 4xx
//! responses are not retried.

use crate::api::{AliasedQuery, CatalogApi, CatalogPage, PageInfo};
use crate::error::{MatchError, Result};
use crate::matching::progress::CancelSignal;
use crate::matching::rate_limit::RequestBudget;
use crate::models::{CatalogEntry, CatalogFormat, CatalogTitle, PublicationStatus};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Maximum retry attempts (1 initial + 2 retries = 3 total)
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Initial retry delay in seconds (exponential backoff: 1s, 2s)
const INITIAL_RETRY_DELAY_SECS: u64 = 1;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default rate-limit wait when the service omits Retry-After
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// GraphQL media fields requested everywhere an entry comes back
const MEDIA_FIELDS: &str = "id title { english romaji native } synonyms format status chapters volumes isAdult coverImage { large }";

/// Configuration for [`CatalogClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub user_agent: String,
    /// Optional bearer token for authenticated requests
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graphql.anilist.co".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: MAX_RETRY_ATTEMPTS,
            user_agent: "MangaSync/0.1 (matcher)".to_string(),
            token: None,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn token<S: Into<String>>(mut self, token: S) -> Self {
        self.config.token = Some(token.into());
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// HTTP client for the primary catalog's GraphQL endpoint
pub struct CatalogClient {
    client: Client,
    config: ClientConfig,
    /// Shared budget fed with rate-limit-remaining headers, when attached
    budget: Option<Arc<RequestBudget>>,
}

impl CatalogClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| MatchError::invalid_input(format!("invalid user agent: {}", e)))?,
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            config,
            budget: None,
        })
    }

    /// Attach the shared request budget so rate-limit headers feed the
    /// adaptive inter-group delay
    pub fn with_budget(mut self, budget: Arc<RequestBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = self.config.token {
            let value = format!("Bearer {}", token);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value)
                    .map_err(|e| MatchError::invalid_input(format!("invalid token: {}", e)))?,
            );
        }
        Ok(headers)
    }

    fn note_rate_headers(&self, response: &Response) {
        if let Some(budget) = &self.budget {
            let remaining = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u32>().ok());
            if let Some(remaining) = remaining {
                budget.note_remaining(remaining);
            }
        }
    }

    fn extract_retry_after(response: &Response) -> u64 {
        response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
    }

    fn is_retryable_network_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request()
    }

    /// Execute one GraphQL request with retry and backoff.
    ///
    /// Cancellation is observed cooperatively before every attempt; an
    /// attempt already in flight runs to completion.
    async fn post_graphql<T>(&self, query: &str, variables: Value, cancel: &CancelSignal) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let mut attempts = 0;
        let mut last_error: Option<MatchError> = None;

        while attempts < self.config.max_retries {
            attempts += 1;
            if cancel.is_cancelled() {
                return Err(MatchError::Cancelled);
            }

            let headers = self.auth_headers()?;
            let request = self
                .client
                .post(&self.config.base_url)
                .headers(headers)
                .json(&json!({ "query": query, "variables": variables }));

            match request.send().await {
                Ok(response) => {
                    self.note_rate_headers(&response);
                    let status = response.status();

                    if status.is_success() {
                        return self.decode_envelope(response).await;
                    }

                    match status {
                        StatusCode::TOO_MANY_REQUESTS => {
                            return Err(MatchError::RateLimitExceeded {
                                retry_after_seconds: Self::extract_retry_after(&response),
                                endpoint: self.config.base_url.clone(),
                            });
                        }
                        s if s.is_server_error() && attempts < self.config.max_retries => {
                            let body = response.text().await.unwrap_or_default();
                            last_error = Some(MatchError::api_failed(
                                format!("server error: {}", body),
                                Some(s.as_u16()),
                                Some(self.config.base_url.clone()),
                            ));
                            let delay = Duration::from_secs(
                                INITIAL_RETRY_DELAY_SECS * 2_u64.pow(attempts - 1),
                            );
                            sleep(delay).await;
                            continue;
                        }
                        s => {
                            let body = response.text().await.unwrap_or_default();
                            return Err(MatchError::api_failed(
                                format!("catalog request failed: {}", body),
                                Some(s.as_u16()),
                                Some(self.config.base_url.clone()),
                            ));
                        }
                    }
                }
                Err(e) if attempts < self.config.max_retries
                    && Self::is_retryable_network_error(&e) =>
                {
                    last_error = Some(MatchError::network_error(
                        format!("request failed: {}", e),
                        true,
                    ));
                    let delay =
                        Duration::from_secs(INITIAL_RETRY_DELAY_SECS * 2_u64.pow(attempts - 1));
                    sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    return Err(MatchError::network_error(
                        format!("request failed: {}", e),
                        false,
                    ));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            MatchError::api_failed(
                format!("request failed after {} attempts", attempts),
                None,
                Some(self.config.base_url.clone()),
            )
        }))
    }

    /// Read the response body and unwrap the GraphQL envelope
    async fn decode_envelope<T>(&self, response: Response) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            MatchError::api_failed(
                format!("failed to read response body: {}", e),
                Some(status.as_u16()),
                Some(self.config.base_url.clone()),
            )
        })?;

        let envelope: GraphQlEnvelope<T> = serde_json::from_str(&body).map_err(|e| {
            MatchError::invalid_response(
                format!("GraphQL parse error: {} at line {} col {}", e, e.line(), e.column()),
                Some(truncate_body(&body)),
            )
        })?;

        if let Some(errors) = envelope.errors {
            if !errors.is_empty() {
                let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
                return Err(MatchError::invalid_response(
                    format!("GraphQL errors: {}", messages.join("; ")),
                    Some(truncate_body(&body)),
                ));
            }
        }

        envelope
            .data
            .ok_or_else(|| MatchError::invalid_response("GraphQL response has no data", None))
    }
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("base_url", &self.config.base_url)
            .field("authenticated", &self.config.token.is_some())
            .finish_non_exhaustive()
    }
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 800;
    if body.len() <= LIMIT {
        body.to_string()
    } else {
        let mut end = LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}

fn search_query() -> String {
    format!(
        "query ($search: String, $page: Int, $perPage: Int) {{ Page(page: $page, perPage: $perPage) {{ pageInfo {{ currentPage hasNextPage total }} media(search: $search, type: MANGA) {{ {} }} }} }}",
        MEDIA_FIELDS
    )
}

fn ids_query() -> String {
    format!(
        "query ($ids: [Int], $perPage: Int) {{ Page(page: 1, perPage: $perPage) {{ pageInfo {{ currentPage hasNextPage total }} media(id_in: $ids, type: MANGA) {{ {} }} }} }}",
        MEDIA_FIELDS
    )
}

/// Build one aliased query spanning many title searches. Costs a single
/// request regardless of alias count.
fn batched_query(queries: &[AliasedQuery], per_page: u32) -> String {
    let mut body = String::from("query {");
    for q in queries {
        // serde_json produces a quoted, escaped GraphQL string literal
        let literal = serde_json::to_string(&q.title).unwrap_or_else(|_| "\"\"".to_string());
        body.push_str(&format!(
            " {}: Page(page: 1, perPage: {}) {{ media(search: {}, type: MANGA) {{ {} }} }}",
            q.alias, per_page, literal, MEDIA_FIELDS
        ));
    }
    body.push_str(" }");
    body
}

#[async_trait]
impl CatalogApi for CatalogClient {
    async fn search_page(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        cancel: &CancelSignal,
    ) -> Result<CatalogPage> {
        let variables = json!({ "search": query, "page": page, "perPage": per_page });
        let data: SearchData = self
            .post_graphql(&search_query(), variables, cancel)
            .await?;
        let page = data.page.ok_or_else(|| {
            MatchError::invalid_response("search response is missing the page container", None)
        })?;
        Ok(page.into())
    }

    async fn search_batched(
        &self,
        queries: &[AliasedQuery],
        per_page: u32,
        cancel: &CancelSignal,
    ) -> Result<HashMap<String, Vec<CatalogEntry>>> {
        if queries.is_empty() {
            return Ok(HashMap::new());
        }
        let body = batched_query(queries, per_page);
        let data: HashMap<String, BatchPageDto> =
            self.post_graphql(&body, Value::Null, cancel).await?;
        Ok(data
            .into_iter()
            .map(|(alias, page)| {
                (
                    alias,
                    page.media.into_iter().map(CatalogEntry::from).collect(),
                )
            })
            .collect())
    }

    async fn fetch_by_ids(&self, ids: &[i64], cancel: &CancelSignal) -> Result<Vec<CatalogEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let variables = json!({ "ids": ids, "perPage": ids.len() });
        let data: SearchData = self.post_graphql(&ids_query(), variables, cancel).await?;
        let page = data.page.ok_or_else(|| {
            MatchError::invalid_response("id fetch response is missing the page container", None)
        })?;
        Ok(page.media.into_iter().map(CatalogEntry::from).collect())
    }
}

// ===== WIRE FORMAT =====

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(rename = "Page")]
    page: Option<PageDto>,
}

#[derive(Debug, Deserialize)]
struct PageDto {
    #[serde(rename = "pageInfo", default)]
    page_info: Option<PageInfoDto>,
    #[serde(default)]
    media: Vec<MediaDto>,
}

impl From<PageDto> for CatalogPage {
    fn from(dto: PageDto) -> Self {
        CatalogPage {
            page_info: dto.page_info.map(|info| PageInfo {
                current_page: info.current_page,
                has_next_page: info.has_next_page,
                total: info.total,
            }),
            items: dto.media.into_iter().map(CatalogEntry::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BatchPageDto {
    #[serde(default)]
    media: Vec<MediaDto>,
}

#[derive(Debug, Deserialize)]
struct PageInfoDto {
    #[serde(rename = "currentPage", default = "default_page")]
    current_page: u32,
    #[serde(rename = "hasNextPage", default)]
    has_next_page: bool,
    #[serde(default)]
    total: Option<u32>,
}

fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct MediaDto {
    id: i64,
    #[serde(default)]
    title: Option<TitleDto>,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    chapters: Option<i32>,
    #[serde(default)]
    volumes: Option<i32>,
    #[serde(rename = "isAdult", default)]
    is_adult: bool,
    #[serde(rename = "coverImage", default)]
    cover_image: Option<CoverDto>,
}

#[derive(Debug, Default, Deserialize)]
struct TitleDto {
    #[serde(default)]
    english: Option<String>,
    #[serde(default)]
    romaji: Option<String>,
    #[serde(default)]
    native: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoverDto {
    #[serde(default)]
    large: Option<String>,
}

fn parse_format(format: Option<&str>) -> CatalogFormat {
    match format {
        Some("MANGA") => CatalogFormat::Manga,
        Some("MANHWA") => CatalogFormat::Manhwa,
        Some("MANHUA") => CatalogFormat::Manhua,
        Some("NOVEL") => CatalogFormat::Novel,
        Some("LIGHT_NOVEL") => CatalogFormat::LightNovel,
        Some("ONE_SHOT") => CatalogFormat::OneShot,
        Some("DOUJINSHI") => CatalogFormat::Doujinshi,
        _ => CatalogFormat::Unknown,
    }
}

fn parse_status(status: Option<&str>) -> PublicationStatus {
    match status {
        Some("RELEASING") => PublicationStatus::Releasing,
        Some("FINISHED") => PublicationStatus::Finished,
        Some("HIATUS") => PublicationStatus::Hiatus,
        Some("CANCELLED") => PublicationStatus::Cancelled,
        Some("NOT_YET_RELEASED") => PublicationStatus::NotYetReleased,
        _ => PublicationStatus::Unknown,
    }
}

impl From<MediaDto> for CatalogEntry {
    fn from(dto: MediaDto) -> Self {
        let title = dto.title.unwrap_or_default();
        CatalogEntry {
            id: dto.id,
            title: CatalogTitle {
                english: title.english,
                romaji: title.romaji,
                native: title.native,
            },
            synonyms: dto.synonyms,
            format: parse_format(dto.format.as_deref()),
            status: parse_status(dto.status.as_deref()),
            chapters: dto.chapters,
            volumes: dto.volumes,
            is_adult: dto.is_adult,
            cover_url: dto.cover_image.and_then(|c| c.large),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::builder()
            .base_url("https://example.test/graphql")
            .timeout(Duration::from_secs(5))
            .max_retries(5)
            .user_agent("Test/1.0")
            .token("secret")
            .build();
        assert_eq!(config.base_url, "https://example.test/graphql");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_batched_query_escapes_titles() {
        let queries = vec![
            AliasedQuery {
                alias: "q0".to_string(),
                title: "Oshi no \"Ko\"".to_string(),
            },
            AliasedQuery {
                alias: "q3".to_string(),
                title: "Berserk".to_string(),
            },
        ];
        let body = batched_query(&queries, 10);
        assert!(body.starts_with("query {"));
        assert!(body.contains("q0: Page"));
        assert!(body.contains(r#"search: "Oshi no \"Ko\"""#));
        assert!(body.contains("q3: Page"));
    }

    #[test]
    fn test_media_conversion() {
        let json = r#"{
            "id": 30002,
            "title": { "english": "Berserk", "romaji": "Berserk", "native": "ベルセルク" },
            "synonyms": ["Berserk: The Prototype"],
            "format": "MANGA",
            "status": "RELEASING",
            "chapters": null,
            "volumes": 41,
            "isAdult": false,
            "coverImage": { "large": "https://img.example/berserk.jpg" }
        }"#;
        let dto: MediaDto = serde_json::from_str(json).expect("media dto parses");
        let entry = CatalogEntry::from(dto);
        assert_eq!(entry.id, 30002);
        assert_eq!(entry.format, CatalogFormat::Manga);
        assert_eq!(entry.status, PublicationStatus::Releasing);
        assert_eq!(entry.volumes, Some(41));
        assert_eq!(entry.title.display(), "Berserk");
    }

    #[test]
    fn test_envelope_with_errors() {
        let body = r#"{ "data": null, "errors": [{ "message": "rate limited" }] }"#;
        let envelope: GraphQlEnvelope<SearchData> =
            serde_json::from_str(body).expect("envelope parses");
        assert!(envelope.data.as_ref().map(|d| d.page.is_none()).unwrap_or(true));
        assert_eq!(envelope.errors.unwrap()[0].message, "rate limited");
    }

    #[test]
    fn test_page_dto_missing_page_info() {
        let body = r#"{ "media": [] }"#;
        let dto: PageDto = serde_json::from_str(body).expect("page dto parses");
        let page = CatalogPage::from(dto);
        assert!(page.page_info.is_none());
    }
}
