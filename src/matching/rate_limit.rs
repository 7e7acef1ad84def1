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


//! Shared request budget
//!
//! One `RequestBudget` instance is shared by every orchestrator talking to
//! the remote catalog. It does two things:
//!
//! - a one-permit semaphore keeps fallback title searches to at most one
//!   in flight at a time (batched multi-alias queries go through the same
//!   permit but cost a single request regardless of alias count);
//! - a rolling remaining-budget hint, fed from rate-limit response
//!   headers, drives the adaptive delay between batch groups.

use crate::config::RateLimitConfig;
use crate::error::{MatchError, Result};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Shared rate-limit permit pool and budget estimate
#[derive(Debug)]
pub struct RequestBudget {
    permits: Semaphore,
    config: RateLimitConfig,
    /// Last remaining-request count reported by the remote service
    remaining: Mutex<Option<u32>>,
}

impl RequestBudget {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            permits: Semaphore::new(1),
            config,
            remaining: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Suspend until the budget allows one more request.
    ///
    /// The permit is held for the duration of the remote call (or the
    /// whole pagination loop of one search) and released on drop.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|e| MatchError::internal(format!("budget semaphore closed: {}", e)))
    }

    /// Record the remaining-budget hint from a rate-limit response header
    pub fn note_remaining(&self, remaining: u32) {
        if let Ok(mut guard) = self.remaining.lock() {
            *guard = Some(remaining);
        }
    }

    pub fn remaining_hint(&self) -> Option<u32> {
        self.remaining.lock().ok().and_then(|guard| *guard)
    }

    /// Adaptive delay between batch groups.
    ///
    /// Base delay is the share of a minute the group's requests consumed;
    /// the rolling remaining-budget hint scales it up when the budget runs
    /// low. Clamped to the configured range, zero after the final group.
    pub fn group_delay(&self, requests_in_group: usize, is_last_group: bool) -> Duration {
        if is_last_group || requests_in_group == 0 {
            return Duration::ZERO;
        }

        let per_minute = self.config.requests_per_minute.max(1) as f64;
        let base_ms = requests_in_group as f64 / per_minute * 60_000.0;

        let multiplier = match self.remaining_hint() {
            Some(r) if r <= self.config.low_budget_threshold => 2.0,
            Some(r) if r <= self.config.mid_budget_threshold => 1.5,
            _ => 1.0,
        };

        let delay_ms = (base_ms * multiplier)
            .clamp(
                self.config.min_group_delay_ms as f64,
                self.config.max_group_delay_ms as f64,
            )
            .round() as u64;
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget() -> RequestBudget {
        RequestBudget::new(RateLimitConfig {
            requests_per_minute: 60,
            batch_group_size: 30,
            id_batch_size: 50,
            min_group_delay_ms: 500,
            max_group_delay_ms: 10_000,
            low_budget_threshold: 10,
            mid_budget_threshold: 30,
        })
    }

    #[tokio::test]
    async fn test_single_permit_serializes_callers() {
        let budget = budget();
        let first = budget.acquire().await.expect("first permit");
        // The pool has exactly one permit, so a second try fails while the
        // first is held
        assert!(budget.permits.try_acquire().is_err());
        drop(first);
        assert!(budget.permits.try_acquire().is_ok());
    }

    #[test]
    fn test_group_delay_scales_with_requests() {
        let budget = budget();
        // 6 requests at 60/min is 6 seconds worth of budget
        assert_eq!(budget.group_delay(6, false), Duration::from_millis(6_000));
        // 1 request clamps up to the minimum
        assert_eq!(budget.group_delay(1, false), Duration::from_millis(1_000));
    }

    #[test]
    fn test_group_delay_clamped() {
        let budget = budget();
        assert_eq!(budget.group_delay(1000, false), Duration::from_millis(10_000));
        let tiny = budget.group_delay(1, false);
        assert!(tiny >= Duration::from_millis(500));
    }

    #[test]
    fn test_group_delay_skipped_after_final_group() {
        let budget = budget();
        assert_eq!(budget.group_delay(6, true), Duration::ZERO);
    }

    #[test]
    fn test_low_budget_stretches_delay() {
        let budget = budget();
        let normal = budget.group_delay(6, false);
        budget.note_remaining(25);
        let mid = budget.group_delay(6, false);
        budget.note_remaining(5);
        let low = budget.group_delay(6, false);
        assert!(mid > normal);
        assert!(low > mid);
        assert_eq!(low, Duration::from_millis(10_000), "clamped at max");
    }
}
