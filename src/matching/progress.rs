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


//! Progress reporting and cooperative cancellation
//!
//! Both are explicit context objects handed through every call boundary
//! rather than closures capturing outer mutable state. Cancellation is
//! cooperative: the signal is consulted at every suspension point (before
//! acquiring a rate-limit permit, around page fetches, at group
//! boundaries), and a call already in flight runs to completion.

use crate::error::{MatchError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Progress snapshot for one resolved batch entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProgress {
    /// Input index of the entry that just resolved
    pub index: usize,
    /// Entries resolved so far (monotonically increasing)
    pub completed: usize,
    /// Total entries in the batch
    pub total: usize,
    /// Title of the entry that just resolved, for display
    pub title: String,
}

/// Callback type for progress updates
pub type ProgressCallback = Arc<dyn Fn(MatchProgress) + Send + Sync>;

/// Caller-supplied cancellation predicate, consulted alongside the signal
pub type CancelPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Shared cancellation signal.
///
/// Cloning shares the underlying flag; once cancelled, every clone
/// observes it.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal. Irreversible for the lifetime of the flag.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Context object carried through a search or batch run: abort signal,
/// optional caller predicate, optional progress sink.
#[derive(Clone, Default)]
pub struct BatchContext {
    pub cancel: CancelSignal,
    pub should_cancel: Option<CancelPredicate>,
    pub progress: Option<ProgressCallback>,
}

impl BatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_should_cancel(mut self, predicate: CancelPredicate) -> Self {
        self.should_cancel = Some(predicate);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Has either the abort signal or the caller predicate fired?
    pub fn cancelled(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        match &self.should_cancel {
            Some(predicate) => predicate(),
            None => false,
        }
    }

    /// Error out with `MatchError::Cancelled` if cancellation fired
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancelled() {
            Err(MatchError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Emit a progress update, if a sink is attached
    pub fn report(&self, progress: MatchProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }
}

impl std::fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("has_predicate", &self.should_cancel.is_some())
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cancel_signal_shared_across_clones() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_cancelled());
        signal.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_context_consults_predicate_and_signal() {
        let ctx = BatchContext::new();
        assert!(ctx.ensure_active().is_ok());

        let ctx = BatchContext::new().with_should_cancel(Arc::new(|| true));
        assert!(ctx.cancelled());
        assert!(matches!(ctx.ensure_active(), Err(MatchError::Cancelled)));

        let ctx = BatchContext::new();
        ctx.cancel.cancel();
        assert!(ctx.cancelled());
    }

    #[test]
    fn test_progress_sink_receives_updates() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_callback = Arc::clone(&seen);
        let ctx = BatchContext::new().with_progress(Arc::new(move |p: MatchProgress| {
            seen_in_callback.fetch_add(p.index + 1, Ordering::SeqCst);
        }));
        ctx.report(MatchProgress {
            index: 4,
            completed: 1,
            total: 10,
            title: "Berserk".to_string(),
        });
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }
}
