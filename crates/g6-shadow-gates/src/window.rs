//! Window store — per-key rolling parity and churn state.
//!
//! One [`GateState`] per `(index, rule)` key, owned by a [`GateStore`] that
//! guards the whole key→state map with a single mutex. Windows are true
//! fixed-size recency FIFOs, not statistical samples: the oldest entry is
//! evicted on overflow. The protected-diff counter is cumulative and never
//! windowed — repeated protected violations must not age out.
//!
//! Decisions for the same key must be applied in cycle order (the caller's
//! contract); keys may be processed concurrently across worker threads.

use crate::engine::Decision;
use crate::snapshot::GateKey;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, PoisonError};

// =============================================================================
// GateState
// =============================================================================

/// Rolling gating state for one `(index, rule)` key.
///
/// Invariants: window lengths never exceed their capacities, and
/// `ok_streak ≤ parity window length`.
#[derive(Debug, Default)]
pub struct GateState {
    parity_window: VecDeque<bool>,
    churn_window: VecDeque<String>,
    ok_streak: u32,
    protected_diff_count: u64,
    /// Sticky canary exposure flag. The only piece of true memory beyond
    /// the windows and counters; cleared only by a rollback condition.
    pub(crate) canary_active: bool,
    /// Last emitted decision, kept for idempotent re-reads and diagnostics.
    pub(crate) last_decision: Option<Decision>,
}

impl GateState {
    /// Record one cycle's outcome into both windows.
    ///
    /// Evicts oldest-first when a window is at capacity, increments the
    /// streak on success and resets it to zero on failure, and bumps the
    /// cumulative protected-diff counter on a protected hit.
    pub fn record(
        &mut self,
        parity_ok: bool,
        fingerprint: &str,
        protected_hit: bool,
        capacity_parity: usize,
        capacity_churn: usize,
    ) {
        if capacity_parity > 0 {
            while self.parity_window.len() >= capacity_parity {
                self.parity_window.pop_front();
            }
            self.parity_window.push_back(parity_ok);
        }
        if capacity_churn > 0 {
            while self.churn_window.len() >= capacity_churn {
                self.churn_window.pop_front();
            }
            self.churn_window.push_back(fingerprint.to_string());
        }

        if parity_ok {
            self.ok_streak = (self.ok_streak + 1).min(self.parity_window.len() as u32);
        } else {
            self.ok_streak = 0;
        }
        if protected_hit {
            self.protected_diff_count += 1;
        }
    }

    /// Current parity window fill.
    pub fn window_len(&self) -> usize {
        self.parity_window.len()
    }

    /// Fraction of parity-ok entries in the window; `None` when empty.
    pub fn parity_ok_ratio(&self) -> Option<f64> {
        if self.parity_window.is_empty() {
            return None;
        }
        let ok = self.parity_window.iter().filter(|&&ok| ok).count();
        Some(ok as f64 / self.parity_window.len() as f64)
    }

    /// Consecutive-success counter, reset on any parity failure.
    pub fn ok_streak(&self) -> u32 {
        self.ok_streak
    }

    /// Cumulative protected-field diff count (monotonic, never windowed).
    pub fn protected_diff_count(&self) -> u64 {
        self.protected_diff_count
    }

    /// Current churn window fill.
    pub fn churn_window_len(&self) -> usize {
        self.churn_window.len()
    }

    /// Number of distinct fingerprints in the churn window.
    pub fn hash_distinct(&self) -> usize {
        self.churn_window.iter().collect::<BTreeSet<_>>().len()
    }

    /// Distinct-fingerprint ratio over the churn window; 0 when empty.
    pub fn hash_churn_ratio(&self) -> f64 {
        if self.churn_window.is_empty() {
            return 0.0;
        }
        self.hash_distinct() as f64 / self.churn_window.len() as f64
    }
}

// =============================================================================
// GateStore
// =============================================================================

/// Concurrency-safe map from [`GateKey`] to [`GateState`].
///
/// States are created lazily on first observation and never evicted. One
/// decision per key per collection cycle (sub-second to minute intervals)
/// makes a single global mutex sufficient; contention is negligible.
#[derive(Debug, Default)]
pub struct GateStore {
    states: Mutex<BTreeMap<GateKey, GateState>>,
}

impl GateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the state for `key`, creating empty windows on first
    /// observation. The map lock is held for the duration of `f`.
    pub fn with_state<T>(&self, key: &GateKey, f: impl FnOnce(&mut GateState) -> T) -> T {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(key.clone()).or_default();
        f(state)
    }

    /// Run `f` against the state for `key` without creating it.
    pub fn read_state<T>(&self, key: &GateKey, f: impl FnOnce(&GateState) -> T) -> Option<T> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.get(key).map(f)
    }

    /// Drop all state for `key`. Returns `true` when state existed.
    ///
    /// This is the only path out of a protected rollback short of a process
    /// restart.
    pub fn reset(&self, key: &GateKey) -> bool {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.remove(key).is_some()
    }

    /// Number of keys observed so far (unbounded-growth dimension).
    pub fn key_count(&self) -> usize {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.len()
    }
}
