//! Diff classifier — field-level comparison between legacy and shadow runs.
//!
//! Compares a fixed, explicit field set with exact equality. The raw
//! `strikes` list is deliberately excluded: its ordering is unstable across
//! runs and would produce false positives (the fingerprint covers strike
//! content order-invariantly instead).

use crate::snapshot::{fields, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Result of one legacy-vs-shadow snapshot comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Number of mismatching fields
    pub diff_count: usize,
    /// Names of mismatching fields (see [`fields`])
    pub diff_fields: BTreeSet<String>,
}

impl DiffResult {
    /// `true` when no compared field differs.
    pub fn is_clean(&self) -> bool {
        self.diff_count == 0
    }

    /// `true` when any mismatching field is in the given protected set.
    pub fn touches(&self, protected: &BTreeSet<String>) -> bool {
        self.diff_fields.iter().any(|f| protected.contains(f))
    }
}

/// Compare the legacy snapshot against the shadow snapshot for one cycle.
///
/// Pure and infallible for any well-formed snapshot pair. Absent expiry
/// dates compare as a distinguished value, so `None == None` is agreement.
pub fn diff(legacy: &Snapshot, shadow: &Snapshot) -> DiffResult {
    let mut diff_fields = BTreeSet::new();

    if legacy.expiry_date != shadow.expiry_date {
        diff_fields.insert(fields::EXPIRY_DATE.to_string());
    }
    if legacy.strike_count != shadow.strike_count {
        diff_fields.insert(fields::STRIKE_COUNT.to_string());
    }
    if legacy.instrument_count != shadow.instrument_count {
        diff_fields.insert(fields::INSTRUMENT_COUNT.to_string());
    }
    if legacy.enriched_keys != shadow.enriched_keys {
        diff_fields.insert(fields::ENRICHED_KEYS.to_string());
    }

    DiffResult {
        diff_count: diff_fields.len(),
        diff_fields,
    }
}
