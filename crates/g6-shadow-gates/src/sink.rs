//! Decision sink — collaborator seam for metrics and telemetry.
//!
//! The orchestrator wires its own counters/gauges behind this trait (e.g.
//! the Prometheus exporter it already runs). Sink failures are surfaced as
//! errors so the caller decides what to do with them; the engine itself
//! treats telemetry as best-effort and only logs a warning — a failing sink
//! must never block a gating decision.

use crate::engine::Decision;
use crate::snapshot::GateKey;
use crate::GateError;

/// Consumer of emitted gating decisions.
pub trait DecisionSink: Send + Sync {
    fn on_decision(&self, key: &GateKey, decision: &Decision) -> Result<(), GateError>;
}

/// Sink that re-emits every decision as a structured tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DecisionSink for TracingSink {
    fn on_decision(&self, key: &GateKey, decision: &Decision) -> Result<(), GateError> {
        tracing::info!(
            key = %key,
            mode = %decision.mode,
            promote = decision.promote,
            canary = decision.canary,
            reason = %decision.reason,
            window_size = decision.window_size,
            parity_ok_ratio = ?decision.parity_ok_ratio,
            hash_churn_ratio = decision.hash_churn_ratio,
            "shadow gate decision"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GateMode, GatingConfig};
    use crate::engine::{reasons, ShadowGateEngine};
    use crate::snapshot::{Snapshot, SnapshotMeta};
    use std::sync::{Arc, Mutex};

    /// Sink that records decisions and optionally fails, for exercising the
    /// best-effort contract.
    struct RecordingSink {
        seen: Arc<Mutex<Vec<(GateKey, Decision)>>>,
        fail: bool,
    }

    impl DecisionSink for RecordingSink {
        fn on_decision(&self, key: &GateKey, decision: &Decision) -> Result<(), GateError> {
            self.seen
                .lock()
                .unwrap()
                .push((key.clone(), decision.clone()));
            if self.fail {
                return Err(GateError::Sink("registry unavailable".to_string()));
            }
            Ok(())
        }
    }

    fn snap() -> Snapshot {
        Snapshot {
            strike_count: 10,
            instrument_count: 20,
            enriched_keys: 20,
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_sink_receives_every_decision() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let engine = ShadowGateEngine::new(GatingConfig {
            mode: GateMode::Dryrun,
            ..GatingConfig::default()
        })
        .with_sink(Box::new(RecordingSink {
            seen: Arc::clone(&seen),
            fail: false,
        }));

        let key = GateKey::new("NIFTY", "this_week");
        engine.decide(&key, &snap(), &snap(), &SnapshotMeta::default());
        engine.decide(&key, &snap(), &snap(), &SnapshotMeta::default());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, key);
        assert_eq!(seen[1].1.reason, reasons::DRYRUN_NO_PROMO);
    }

    #[test]
    fn test_failing_sink_never_blocks_a_decision() {
        let engine = ShadowGateEngine::new(GatingConfig {
            mode: GateMode::Dryrun,
            ..GatingConfig::default()
        })
        .with_sink(Box::new(RecordingSink {
            seen: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }));

        let key = GateKey::new("NIFTY", "this_week");
        let d = engine.decide(&key, &snap(), &snap(), &SnapshotMeta::default());
        assert_eq!(d.reason, reasons::DRYRUN_NO_PROMO);
        assert_eq!(d.window_size, 1);
    }
}
