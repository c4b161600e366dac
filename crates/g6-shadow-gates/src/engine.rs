//! Gating engine — per-cycle decision state machine.
//!
//! [`ShadowGateEngine::decide`] is the single entry point consumed by the
//! collection orchestrator: diff, fingerprint, window record, and state
//! evaluation run in that order and produce one [`Decision`] per
//! `(index, rule)` per cycle.
//!
//! ## Evaluation Priority
//! 1. `off` short-circuits before any window mutation
//! 2. Forced demote override (`G6_SHADOW_FORCE_DEMOTE`)
//! 3. Protected rollback (cumulative counter, permanent until state reset)
//! 4. Churn rollback (canary/promote only)
//! 5. Mode logic: dryrun / canary / promote
//!
//! The engine re-evaluates fully on every call; the sticky `canary_active`
//! flag is the only decision memory beyond the windows and counters. A
//! promoted key stays promoted across cycles only as long as the windows
//! keep qualifying it.

use crate::config::{GateMode, GatingConfig};
use crate::diff::diff;
use crate::fingerprint::fingerprint;
use crate::sink::DecisionSink;
use crate::snapshot::{GateKey, Snapshot, SnapshotMeta};
use crate::window::{GateState, GateStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// =============================================================================
// Decision Reasons — Frozen for audit stability
// =============================================================================

/// Stable decision reason strings.
pub mod reasons {
    pub const DISABLED: &str = "disabled";
    pub const FORCED_DEMOTE: &str = "forced_demote";
    pub const ROLLBACK_PROTECTED: &str = "rollback_protected";
    pub const ROLLBACK_CHURN: &str = "rollback_churn";
    pub const DRYRUN_NO_PROMO: &str = "dryrun_no_promo";
    pub const CANARY_EXCLUDED: &str = "canary_excluded";
    pub const CANARY_ACTIVE: &str = "canary_active";
    pub const CANARY_OBSERVING: &str = "canary_observing";
    pub const WAITING_HYSTERESIS: &str = "waiting_hysteresis";
    pub const PROTECTED_BLOCK: &str = "protected_block";
    pub const RATIO_BELOW_TARGET: &str = "ratio_below_target";
    pub const STREAK_BELOW_THRESHOLD: &str = "streak_below_threshold";
    pub const PROMOTED: &str = "promoted";
}

/// Number of deterministic canary sampling buckets.
const CANARY_BUCKETS: u64 = 10_000;

/// Hard floor on churn-window fill before churn rollback can trigger. A
/// near-empty window always shows a distinct ratio of 1.0, which must not
/// read as instability.
const MIN_CHURN_SAMPLES: usize = 3;

// =============================================================================
// Decision
// =============================================================================

/// One gating decision, recomputed and returned on every call.
///
/// Attached by the orchestrator to the cycle result for promotion
/// enforcement, audit, and metrics. Not persisted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Global gating phase in effect
    pub mode: GateMode,
    /// Whether the shadow output is promoted for this key
    pub promote: bool,
    /// Whether the key has canary exposure
    pub canary: bool,
    /// Frozen reason string (see [`reasons`])
    pub reason: String,
    /// Current parity window fill
    pub window_size: usize,
    /// Parity-ok fraction over the window; `None` when no window accumulates
    pub parity_ok_ratio: Option<f64>,
    /// Distinct fingerprints in the churn window
    pub hash_distinct: usize,
    /// Distinct-fingerprint ratio over the churn window
    pub hash_churn_ratio: f64,
    /// Configured churn-window capacity in effect
    pub churn_window_size: usize,
    /// Whether this cycle's diff touched a protected field
    pub protected_diff: bool,
    /// Set on promotion when the operator configured authoritative handover
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authoritative: Option<bool>,
}

// =============================================================================
// ShadowGateEngine
// =============================================================================

/// Per-process gating engine: immutable config plus the per-key state store.
pub struct ShadowGateEngine {
    config: GatingConfig,
    store: GateStore,
    sink: Option<Box<dyn DecisionSink>>,
}

impl ShadowGateEngine {
    /// Create an engine with a fresh, empty state store.
    pub fn new(config: GatingConfig) -> Self {
        Self {
            config,
            store: GateStore::new(),
            sink: None,
        }
    }

    /// Attach a best-effort decision sink (metrics adapter seam).
    pub fn with_sink(mut self, sink: Box<dyn DecisionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &GatingConfig {
        &self.config
    }

    /// Decide promote/canary/rollback for one key, one cycle.
    ///
    /// Must be called in cycle order per key; different keys may be decided
    /// concurrently from worker threads.
    pub fn decide(
        &self,
        key: &GateKey,
        legacy: &Snapshot,
        shadow: &Snapshot,
        meta: &SnapshotMeta,
    ) -> Decision {
        let diff_result = diff(legacy, shadow);
        let fp = fingerprint(shadow, meta);

        // Off mode never touches the store; no windows accumulate.
        if self.config.mode == GateMode::Off {
            return Decision {
                mode: GateMode::Off,
                promote: false,
                canary: false,
                reason: reasons::DISABLED.to_string(),
                window_size: 0,
                parity_ok_ratio: None,
                hash_distinct: 0,
                hash_churn_ratio: 0.0,
                churn_window_size: 0,
                protected_diff: false,
                authoritative: None,
            };
        }

        let protected_hit = diff_result.touches(&self.config.protected_fields);
        // A protected-field mismatch always counts as a parity failure,
        // even when it is the only diff.
        let parity_ok = diff_result.is_clean() && !protected_hit;

        let decision = self.store.with_state(key, |state| {
            state.record(
                parity_ok,
                &fp,
                protected_hit,
                self.config.parity_window,
                self.config.churn_window,
            );
            let decision = self.evaluate(key, state, &fp, protected_hit);
            state.last_decision = Some(decision.clone());
            decision
        });

        self.observe(key, &decision);
        decision
    }

    /// Last decision emitted for a key, if any (idempotent re-read).
    pub fn last_decision(&self, key: &GateKey) -> Option<Decision> {
        self.store
            .read_state(key, |state| state.last_decision.clone())
            .flatten()
    }

    /// Drop all rolling state for a key. Returns `true` when state existed.
    pub fn reset(&self, key: &GateKey) -> bool {
        self.store.reset(key)
    }

    /// Number of keys observed so far.
    pub fn key_count(&self) -> usize {
        self.store.key_count()
    }

    fn evaluate(
        &self,
        key: &GateKey,
        state: &mut GateState,
        fp: &str,
        protected_hit: bool,
    ) -> Decision {
        let cfg = &self.config;
        let mode = cfg.mode;
        let window_size = state.window_len();
        let parity_ok_ratio = state.parity_ok_ratio();
        let hash_distinct = state.hash_distinct();
        let hash_churn_ratio = state.hash_churn_ratio();
        let churn_window_size = cfg.churn_window;

        let mk = |promote: bool, canary: bool, reason: &str| Decision {
            mode,
            promote,
            canary,
            reason: reason.to_string(),
            window_size,
            parity_ok_ratio,
            hash_distinct,
            hash_churn_ratio,
            churn_window_size,
            protected_diff: protected_hit,
            authoritative: None,
        };

        // Forced override outranks everything. Config-driven, so the sticky
        // canary flag is left intact for when the operator lifts it.
        if cfg.force_demote {
            return mk(false, false, reasons::FORCED_DEMOTE);
        }

        // Protected rollback: cumulative counter, permanent until reset.
        if state.protected_diff_count() >= cfg.rollback_protected_threshold {
            state.canary_active = false;
            return mk(false, false, reasons::ROLLBACK_PROTECTED);
        }

        // Churn rollback applies only once the key carries exposure risk.
        if matches!(mode, GateMode::Canary | GateMode::Promote)
            && state.churn_window_len() >= cfg.min_samples.max(MIN_CHURN_SAMPLES)
            && hash_churn_ratio >= cfg.rollback_churn_ratio
        {
            state.canary_active = false;
            return mk(false, false, reasons::ROLLBACK_CHURN);
        }

        match mode {
            // Handled in decide(); kept total for match exhaustiveness.
            GateMode::Off => mk(false, false, reasons::DISABLED),

            GateMode::Dryrun => mk(false, false, reasons::DRYRUN_NO_PROMO),

            GateMode::Canary => {
                if let Some(allow) = &cfg.canary_indices {
                    if !allow.is_empty() && !allow.contains(&key.index) {
                        return mk(false, false, reasons::CANARY_EXCLUDED);
                    }
                }
                if !canary_bucket_included(fp, cfg.canary_pct) {
                    return mk(false, false, reasons::CANARY_EXCLUDED);
                }
                let target_met = parity_ok_ratio
                    .map_or(cfg.canary_target <= 0.0, |r| r >= cfg.canary_target);
                if target_met {
                    state.canary_active = true;
                }
                if state.canary_active {
                    // Canary grants traffic exposure only, never authority.
                    mk(false, true, reasons::CANARY_ACTIVE)
                } else {
                    mk(false, false, reasons::CANARY_OBSERVING)
                }
            }

            GateMode::Promote => {
                let canary = state.canary_active;
                if window_size < cfg.min_samples {
                    return mk(false, canary, reasons::WAITING_HYSTERESIS);
                }
                if protected_hit {
                    return mk(false, canary, reasons::PROTECTED_BLOCK);
                }
                if parity_ok_ratio.unwrap_or(0.0) < cfg.ok_target {
                    return mk(false, canary, reasons::RATIO_BELOW_TARGET);
                }
                if state.ok_streak() < cfg.ok_streak_threshold {
                    return mk(false, canary, reasons::STREAK_BELOW_THRESHOLD);
                }
                let mut decision = mk(true, canary, reasons::PROMOTED);
                if cfg.authoritative {
                    decision.authoritative = Some(true);
                }
                decision
            }
        }
    }

    /// Trace the decision and feed the optional sink. Telemetry is
    /// best-effort and never blocks or fails a gating decision.
    fn observe(&self, key: &GateKey, decision: &Decision) {
        match decision.reason.as_str() {
            reasons::FORCED_DEMOTE | reasons::ROLLBACK_PROTECTED | reasons::ROLLBACK_CHURN => {
                warn!(
                    key = %key,
                    reason = %decision.reason,
                    churn_ratio = decision.hash_churn_ratio,
                    "shadow gate demotion"
                );
            }
            reasons::PROMOTED => {
                info!(
                    key = %key,
                    ratio = ?decision.parity_ok_ratio,
                    authoritative = ?decision.authoritative,
                    "shadow gate promotion"
                );
            }
            reasons::CANARY_ACTIVE => {
                info!(key = %key, ratio = ?decision.parity_ok_ratio, "shadow gate canary active");
            }
            _ => {
                debug!(key = %key, reason = %decision.reason, "shadow gate decision");
            }
        }

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.on_decision(key, decision) {
                warn!(key = %key, error = %e, "decision sink failed");
            }
        }
    }
}

/// Deterministic percentage sampling: the same fingerprint always lands in
/// the same bucket, so canary membership is stable across cycles as long as
/// the output itself is stable.
fn canary_bucket_included(fp: &str, pct: f64) -> bool {
    if pct >= 1.0 {
        return true;
    }
    if pct <= 0.0 {
        return false;
    }
    let head = &fp[..fp.len().min(16)];
    let value = u64::from_str_radix(head, 16).unwrap_or(0);
    let cutoff = (pct * CANARY_BUCKETS as f64).round() as u64;
    value % CANARY_BUCKETS < cutoff
}
