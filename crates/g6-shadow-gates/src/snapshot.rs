//! Snapshot types — structural summary of one pipeline run.
//!
//! A [`Snapshot`] describes the output of one collection cycle for one
//! `(index, expiry-rule)` key. Both the legacy and the shadow pipeline emit
//! one per cycle; the gating core diffs and fingerprints them and then
//! discards them — snapshots are never retained across cycles.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Field Names — Frozen for protected-field config and audit stability
// =============================================================================

/// Stable snapshot field names.
///
/// These are the names the diff classifier reports in
/// [`DiffResult::diff_fields`](crate::DiffResult) and the names accepted by
/// the `protected_fields` configuration.
pub mod fields {
    pub const EXPIRY_DATE: &str = "expiry_date";
    pub const STRIKE_COUNT: &str = "strike_count";
    pub const INSTRUMENT_COUNT: &str = "instrument_count";
    pub const ENRICHED_KEYS: &str = "enriched_keys";
}

// =============================================================================
// GateKey
// =============================================================================

/// Identity of one independent gating state: `(index, expiry-rule)`.
///
/// Keys are created lazily on first observation and live for the process
/// lifetime. Cardinality is a handful of indices × expiry rules in practice;
/// the store never evicts, so unbounded key cardinality means unbounded
/// memory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GateKey {
    /// Index name (e.g. `NIFTY`, `BANKNIFTY`)
    pub index: String,
    /// Expiry rule (e.g. `this_week`, `next_month`)
    pub rule: String,
}

impl GateKey {
    pub fn new(index: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            rule: rule.into(),
        }
    }
}

impl fmt::Display for GateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.rule)
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Structural summary of one pipeline run for one `(index, rule)`.
///
/// Unknown upstream keys are dropped at deserialization; the core only ever
/// reads the fields below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Resolved expiry date, absent when expiry resolution failed upstream
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    /// Number of strikes collected
    #[serde(default)]
    pub strike_count: u32,
    /// Number of instruments fetched
    #[serde(default)]
    pub instrument_count: u32,
    /// Number of instruments with enriched quote data
    #[serde(default)]
    pub enriched_keys: u32,
    /// Strike values; ordering is NOT stable across runs for the same
    /// logical set, so the diff classifier never compares this list raw
    #[serde(default)]
    pub strikes: Vec<f64>,
}

/// Auxiliary per-run facts consumed only by the fingerprint function.
///
/// The type carries exactly the fixed read set; arbitrary extra meta keys
/// emitted upstream cannot influence the fingerprint because they never
/// reach it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Strike coverage in [0,1]
    #[serde(default)]
    pub coverage_strike: f64,
    /// Field coverage in [0,1]
    #[serde(default)]
    pub coverage_field: f64,
    /// Persistence-simulation option count
    #[serde(default)]
    pub option_count: u64,
    /// Persistence-simulation put/call ratio
    #[serde(default)]
    pub pcr: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_key_display_and_ordering() {
        let a = GateKey::new("BANKNIFTY", "this_week");
        let b = GateKey::new("NIFTY", "this_week");
        assert_eq!(a.to_string(), "BANKNIFTY:this_week");
        assert!(a < b);
    }

    #[test]
    fn test_snapshot_deserialize_ignores_unknown_keys() {
        let snap: Snapshot = serde_json::from_str(
            r#"{
                "expiry_date": "2026-09-03",
                "strike_count": 10,
                "instrument_count": 20,
                "enriched_keys": 18,
                "strikes": [24000.0, 24100.0],
                "provider_latency_ms": 42
            }"#,
        )
        .unwrap();
        assert_eq!(snap.strike_count, 10);
        assert_eq!(snap.strikes.len(), 2);
    }

    #[test]
    fn test_meta_deserialize_ignores_unknown_keys() {
        let meta: SnapshotMeta = serde_json::from_str(
            r#"{
                "coverage_strike": 0.9,
                "coverage_field": 0.8,
                "option_count": 120,
                "pcr": 1.05,
                "debug_note": "ignored"
            }"#,
        )
        .unwrap();
        assert_eq!(meta.option_count, 120);
    }
}
