//! # G6 Shadow Gates
//!
//! Decision core for migrating the G6 market-data collection pipeline from
//! the legacy monolithic implementation to the new modular one without a
//! hard cutover.
//!
//! ## Pipeline Position
//! Every collection cycle runs both implementations against the same inputs.
//! For each `(index, expiry-rule)` key this crate:
//! 1. Diffs the shadow snapshot against the legacy snapshot (field level)
//! 2. Fingerprints the shadow output (order-invariant digest)
//! 3. Records the outcome into per-key rolling windows
//! 4. Emits a promote/canary/rollback [`Decision`] with an auditable reason
//!
//! ## Hard Laws
//! - Deterministic: same inputs and window state → same decision
//! - No I/O inside the decision path; calls complete in microseconds
//! - Protected-field violations are cumulative and never age out
//! - All maps and field sets are BTree-ordered (deterministic iteration)
//!
//! ## Usage
//! ```ignore
//! use g6_shadow_gates::{GateKey, GatingConfig, ShadowGateEngine};
//!
//! let config = GatingConfig::from_env()?;
//! let engine = ShadowGateEngine::new(config);
//!
//! // Once per (index, rule) per collection cycle:
//! let decision = engine.decide(&key, &legacy_snapshot, &shadow_snapshot, &meta);
//! if decision.promote {
//!     // new pipeline output is authoritative for this key
//! }
//! ```

pub mod config;
pub mod diff;
pub mod engine;
pub mod fingerprint;
pub mod sink;
pub mod snapshot;
pub mod window;

pub use config::{GateMode, GatingConfig};
pub use diff::{diff, DiffResult};
pub use engine::{reasons, Decision, ShadowGateEngine};
pub use fingerprint::fingerprint;
pub use sink::{DecisionSink, TracingSink};
pub use snapshot::{fields, GateKey, Snapshot, SnapshotMeta};
pub use window::{GateState, GateStore};

/// Gate error.
///
/// The decision path itself is infallible; errors surface only from
/// configuration loading and from best-effort decision sinks.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("decision sink error: {0}")]
    Sink(String),
}
