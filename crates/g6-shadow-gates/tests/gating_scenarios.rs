//! End-to-end gating scenarios through the public API.

use chrono::NaiveDate;
use g6_shadow_gates::{
    fields, reasons, GateKey, GateMode, GatingConfig, ShadowGateEngine, Snapshot, SnapshotMeta,
};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn snap(strike_count: u32) -> Snapshot {
    Snapshot {
        expiry_date: NaiveDate::from_ymd_opt(2026, 9, 3),
        strike_count,
        instrument_count: strike_count * 2,
        enriched_keys: strike_count * 2,
        strikes: (0..strike_count)
            .map(|i| 24000.0 + 100.0 * i as f64)
            .collect(),
    }
}

fn meta() -> SnapshotMeta {
    SnapshotMeta {
        coverage_strike: 0.95,
        coverage_field: 0.9,
        option_count: 120,
        pcr: 1.05,
    }
}

fn key() -> GateKey {
    GateKey::new("NIFTY", "this_week")
}

#[test]
fn alternating_diffs_fill_a_window_of_five() {
    init_tracing();
    let engine = ShadowGateEngine::new(GatingConfig {
        mode: GateMode::Dryrun,
        parity_window: 5,
        churn_window: 5,
        ..GatingConfig::default()
    });
    let k = key();

    // Six cycles alternating clean/dirty: the first outcome is evicted.
    let mut last = None;
    for cycle in 0..6u32 {
        let shadow = if cycle % 2 == 0 { snap(10) } else { snap(11) };
        let d = engine.decide(&k, &snap(10), &shadow, &meta());
        assert!(!d.promote);
        assert_eq!(d.reason, reasons::DRYRUN_NO_PROMO);
        last = Some(d);
    }

    let d = last.unwrap();
    assert_eq!(d.window_size, 5);
    // Last five outcomes: dirty, clean, dirty, clean, dirty.
    let ratio = d.parity_ok_ratio.unwrap();
    assert!((0.4..=0.6).contains(&ratio), "ratio {ratio}");
    assert!((ratio - 0.4).abs() < 1e-9);
}

#[test]
fn three_clean_cycles_promote() {
    let engine = ShadowGateEngine::new(GatingConfig {
        mode: GateMode::Promote,
        min_samples: 3,
        ok_target: 0.0,
        ok_streak_threshold: 2,
        ..GatingConfig::default()
    });
    let k = key();

    for expected in [reasons::WAITING_HYSTERESIS, reasons::WAITING_HYSTERESIS] {
        let d = engine.decide(&k, &snap(10), &snap(10), &meta());
        assert!(!d.promote);
        assert_eq!(d.reason, expected);
    }
    let d = engine.decide(&k, &snap(10), &snap(10), &meta());
    assert!(d.promote);
    assert_eq!(d.reason, reasons::PROMOTED);
}

#[test]
fn protected_diff_blocks_an_otherwise_qualified_key() {
    let engine = ShadowGateEngine::new(GatingConfig {
        mode: GateMode::Promote,
        min_samples: 3,
        ok_target: 0.0,
        ok_streak_threshold: 2,
        protected_fields: [fields::EXPIRY_DATE.to_string()].into(),
        ..GatingConfig::default()
    });
    let k = key();

    for _ in 0..3 {
        engine.decide(&k, &snap(10), &snap(10), &meta());
    }
    assert!(engine.last_decision(&k).unwrap().promote);

    let mut shadow = snap(10);
    shadow.expiry_date = NaiveDate::from_ymd_opt(2026, 9, 10);
    let d = engine.decide(&k, &snap(10), &shadow, &meta());
    assert!(!d.promote);
    assert!(d.protected_diff);
    assert_eq!(d.reason, reasons::PROTECTED_BLOCK);
}

#[test]
fn protected_rollback_is_permanent_until_reset() {
    let engine = ShadowGateEngine::new(GatingConfig {
        mode: GateMode::Promote,
        min_samples: 1,
        ok_target: 0.0,
        ok_streak_threshold: 1,
        protected_fields: [fields::ENRICHED_KEYS.to_string()].into(),
        rollback_protected_threshold: 2,
        ..GatingConfig::default()
    });
    let k = key();

    let mut shadow = snap(10);
    shadow.enriched_keys = 0;

    // First protected diff blocks the cycle but is below the threshold.
    let d = engine.decide(&k, &snap(10), &shadow, &meta());
    assert_eq!(d.reason, reasons::PROTECTED_BLOCK);
    // Second one crosses it.
    let d = engine.decide(&k, &snap(10), &shadow, &meta());
    assert_eq!(d.reason, reasons::ROLLBACK_PROTECTED);

    // Twenty clean cycles later the rollback still holds.
    for _ in 0..20 {
        let d = engine.decide(&k, &snap(10), &snap(10), &meta());
        assert!(!d.promote);
        assert_eq!(d.reason, reasons::ROLLBACK_PROTECTED);
    }
}

#[test]
fn decision_ratios_stay_in_bounds_over_mixed_traffic() {
    let engine = ShadowGateEngine::new(GatingConfig {
        mode: GateMode::Promote,
        parity_window: 7,
        churn_window: 4,
        min_samples: 3,
        ..GatingConfig::default()
    });
    let k = key();

    let mut m = meta();
    for cycle in 0..40u64 {
        let shadow = snap(10 + (cycle % 3) as u32);
        m.option_count = 100 + cycle % 5;
        let d = engine.decide(&k, &snap(10), &shadow, &m);

        assert!(d.window_size <= 7);
        if let Some(ratio) = d.parity_ok_ratio {
            assert!((0.0..=1.0).contains(&ratio));
        }
        assert!(d.hash_distinct <= 4);
        assert!((0.0..=1.0).contains(&d.hash_churn_ratio));
        assert_eq!(d.churn_window_size, 4);
    }
}

#[test]
fn keys_gate_independently_across_threads() {
    init_tracing();
    let engine = Arc::new(ShadowGateEngine::new(GatingConfig {
        mode: GateMode::Promote,
        min_samples: 3,
        ok_target: 1.0,
        ok_streak_threshold: 3,
        ..GatingConfig::default()
    }));

    let handles: Vec<_> = ["NIFTY", "BANKNIFTY", "FINNIFTY", "SENSEX"]
        .into_iter()
        .map(|index| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let k = GateKey::new(index, "this_week");
                // BANKNIFTY alone sees a persistent mismatch.
                let shadow = if index == "BANKNIFTY" { snap(11) } else { snap(10) };
                let mut last = None;
                for _ in 0..5 {
                    last = Some(engine.decide(&k, &snap(10), &shadow, &meta()));
                }
                (k, last.unwrap())
            })
        })
        .collect();

    for handle in handles {
        let (k, d) = handle.join().unwrap();
        if k.index == "BANKNIFTY" {
            assert!(!d.promote);
            assert_eq!(d.reason, reasons::RATIO_BELOW_TARGET);
        } else {
            assert!(d.promote, "{k} should promote: {}", d.reason);
        }
    }
    assert_eq!(engine.key_count(), 4);
}
