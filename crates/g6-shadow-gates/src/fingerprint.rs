//! Parity fingerprint — deterministic digest over the shadow run.
//!
//! The fingerprint detects output churn across cycles without full-content
//! comparison. It must be order-invariant with respect to the `strikes`
//! list: the list is sorted ascending before the head sample is taken, so
//! two runs producing the same strike multiset fingerprint identically
//! regardless of collection order.
//!
//! The canonical input is a versioned, colon-delimited string over a fixed
//! field set; meta keys outside that set never reach the digest.

use crate::snapshot::{Snapshot, SnapshotMeta};
use sha2::{Digest, Sha256};

/// Number of leading (sorted) strikes sampled into the fingerprint.
pub const FINGERPRINT_HEAD_STRIKES: usize = 5;

/// Canonical input prefix. Bump on any format change.
const FINGERPRINT_VERSION: &str = "shadow_fingerprint_v1";

/// Sentinel for an absent expiry date.
const ABSENT_EXPIRY: &str = "none";

/// Compute the parity fingerprint for one shadow run.
///
/// Deterministic, infallible, and invariant under permutation of
/// `snapshot.strikes`. Output is the full lowercase-hex SHA-256 of the
/// canonical field serialization.
pub fn fingerprint(snapshot: &Snapshot, meta: &SnapshotMeta) -> String {
    let mut strikes = snapshot.strikes.clone();
    strikes.sort_by(f64::total_cmp);
    strikes.truncate(FINGERPRINT_HEAD_STRIKES);
    let head = strikes
        .iter()
        .map(|s| format!("{s:.4}"))
        .collect::<Vec<_>>()
        .join(",");

    let expiry = snapshot
        .expiry_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ABSENT_EXPIRY.to_string());

    let canonical = format!(
        "{FINGERPRINT_VERSION}:{expiry}:{}:{}:{}:[{head}]:{:.6}:{:.6}:{}:{:.6}",
        snapshot.strike_count,
        snapshot.instrument_count,
        snapshot.enriched_keys,
        meta.coverage_strike,
        meta.coverage_field,
        meta.option_count,
        meta.pcr,
    );

    hex::encode(Sha256::digest(canonical.as_bytes()))
}
