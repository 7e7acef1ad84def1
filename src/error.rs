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


//! Error types for MangaSync
//!
//! Errors are categorized by where they surface in the matching pipeline:
//! remote API failures, malformed responses, rate limiting, persistence, and
//! cancellation. Cancellation is deliberately its own variant so that the
//! batch orchestrator can resolve it into a partial-results return instead
//! of letting it reach the caller as an ordinary failure.
//!
//! "No match found" is NOT an error anywhere in this crate: it is an empty
//! candidate list with the result left in its pending disposition.

use thiserror::Error;

/// Result type alias using our MatchError type
pub type Result<T> = std::result::Result<T, MatchError>;

/// Main error type for MangaSync
#[derive(Error, Debug)]
pub enum MatchError {
    // ===== Remote API Errors =====

    /// Generic catalog API request failure
    #[error("Catalog request failed: {message}")]
    ApiRequestFailed {
        message: String,
        /// HTTP status code if available
        status_code: Option<u16>,
        /// Endpoint or query that failed
        endpoint: Option<String>,
    },

    /// Catalog returned a response whose shape we cannot work with
    /// (e.g. a search page without page info)
    #[error("Invalid catalog response: {message}")]
    InvalidApiResponse {
        message: String,
        /// Response body snippet for debugging
        response_body: Option<String>,
    },

    /// Catalog rate limiting (HTTP 429)
    #[error("Catalog rate limit exceeded. Retry after {retry_after_seconds} seconds")]
    RateLimitExceeded {
        /// Seconds to wait before retrying
        retry_after_seconds: u64,
        /// Endpoint that was rate limited
        endpoint: String,
    },

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    // ===== Input/Configuration Errors =====

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Required field is missing
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    // ===== Persistence Errors =====

    /// Snapshot store failure (load or save)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A persisted record we expected is absent
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    // ===== General Errors =====

    /// Operation was cancelled by the user or by an abort signal.
    /// Always propagated, never swallowed; the batch orchestrator turns it
    /// into a partial-results return.
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation timed out
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// Helper methods for creating common errors
impl MatchError {
    /// Create an ApiRequestFailed error
    pub fn api_failed<S: Into<String>>(
        message: S,
        status_code: Option<u16>,
        endpoint: Option<String>,
    ) -> Self {
        MatchError::ApiRequestFailed {
            message: message.into(),
            status_code,
            endpoint,
        }
    }

    /// Create an InvalidApiResponse error
    pub fn invalid_response<S: Into<String>>(message: S, response_body: Option<String>) -> Self {
        MatchError::InvalidApiResponse {
            message: message.into(),
            response_body,
        }
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        MatchError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Create an InvalidInput error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        MatchError::InvalidInput(message.into())
    }

    /// Create an InternalError
    pub fn internal<S: Into<String>>(message: S) -> Self {
        MatchError::InternalError(message.into())
    }

    /// Create a StorageError
    pub fn storage<S: Into<String>>(message: S) -> Self {
        MatchError::StorageError(message.into())
    }

    /// Check if this error is the cancellation signal.
    ///
    /// The batch orchestrator uses this to distinguish "stop and compile
    /// what we have" from errors that should be absorbed per group.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, MatchError::Cancelled)
    }

    /// Check if error is retryable (transient network issues, rate limits,
    /// 5xx server responses).
    ///
    /// The matching core does not retry automatically beyond its adaptive
    /// delays; this is for interactive callers deciding whether to offer a
    /// retry affordance.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MatchError::NetworkError { is_transient: true, .. }
                | MatchError::Timeout(_)
                | MatchError::RateLimitExceeded { .. }
                | MatchError::ApiRequestFailed { status_code: Some(500..=599), .. }
        )
    }

    /// Get retry delay in seconds for rate-limited requests, if known
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            MatchError::RateLimitExceeded { retry_after_seconds, .. } => {
                Some(*retry_after_seconds)
            }
            _ => None,
        }
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            MatchError::RateLimitExceeded { retry_after_seconds, .. } => {
                format!(
                    "The catalog is rate limiting us. Please wait {} seconds before trying again.",
                    retry_after_seconds
                )
            }
            MatchError::NetworkError { is_transient: true, .. } => {
                "A network error occurred. Please check your connection and try again.".to_string()
            }
            MatchError::Cancelled => "The operation was cancelled.".to_string(),
            MatchError::InvalidApiResponse { message, .. } => {
                format!("The catalog returned an unexpected response: {}", message)
            }
            _ => self.to_string(),
        }
    }
}
