//! Gating configuration — one immutable struct, built once at startup.
//!
//! Thresholds are never read ad hoc inside decision logic; the orchestrator
//! builds a [`GatingConfig`] (from the environment or from its JSON config
//! tree) and injects it into the engine constructor. Malformed values fail
//! here, at load time — a bad environment value can never crash an in-flight
//! decision.

use crate::GateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Environment Keys — Frozen
// =============================================================================

/// Stable environment variable names.
pub mod env_keys {
    pub const MODE: &str = "G6_SHADOW_MODE";
    pub const PARITY_WINDOW: &str = "G6_SHADOW_PARITY_WINDOW";
    pub const CHURN_WINDOW: &str = "G6_SHADOW_CHURN_WINDOW";
    pub const MIN_SAMPLES: &str = "G6_SHADOW_MIN_SAMPLES";
    pub const OK_TARGET: &str = "G6_SHADOW_OK_TARGET";
    pub const OK_STREAK: &str = "G6_SHADOW_OK_STREAK";
    pub const CANARY_INDICES: &str = "G6_SHADOW_CANARY_INDICES";
    pub const CANARY_PCT: &str = "G6_SHADOW_CANARY_PCT";
    pub const CANARY_TARGET: &str = "G6_SHADOW_CANARY_TARGET";
    pub const PROTECTED_FIELDS: &str = "G6_SHADOW_PROTECTED_FIELDS";
    pub const ROLLBACK_PROTECTED: &str = "G6_SHADOW_ROLLBACK_PROTECTED";
    pub const ROLLBACK_CHURN_RATIO: &str = "G6_SHADOW_ROLLBACK_CHURN_RATIO";
    pub const FORCE_DEMOTE: &str = "G6_SHADOW_FORCE_DEMOTE";
    pub const AUTHORITATIVE: &str = "G6_SHADOW_AUTHORITATIVE";
}

// =============================================================================
// GateMode
// =============================================================================

/// Global gating phase, operator-set for the whole process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// Gating disabled; no windows accumulate.
    #[default]
    Off,
    /// Observation only; windows accumulate, promotion never granted.
    Dryrun,
    /// Sampled traffic exposure without authority.
    Canary,
    /// Full promotion eligibility.
    Promote,
}

impl fmt::Display for GateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Dryrun => "dryrun",
            Self::Canary => "canary",
            Self::Promote => "promote",
        };
        f.write_str(name)
    }
}

impl FromStr for GateMode {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "dryrun" => Ok(Self::Dryrun),
            "canary" => Ok(Self::Canary),
            "promote" => Ok(Self::Promote),
            other => Err(GateError::Config(format!("unknown gate mode {other:?}"))),
        }
    }
}

// =============================================================================
// GatingConfig
// =============================================================================

/// Process-wide gating configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingConfig {
    /// Global gating phase
    #[serde(default)]
    pub mode: GateMode,

    /// Parity FIFO capacity
    #[serde(default = "default_parity_window")]
    pub parity_window: usize,

    /// Fingerprint-churn FIFO capacity (independent of parity capacity)
    #[serde(default = "default_churn_window")]
    pub churn_window: usize,

    /// Minimum parity-window fill before promotion is considered; also the
    /// minimum churn-window fill before churn rollback can trigger
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Minimum parity-ok ratio for promotion
    #[serde(default = "default_ok_target")]
    pub ok_target: f64,

    /// Minimum consecutive-success streak for promotion
    #[serde(default = "default_ok_streak")]
    pub ok_streak_threshold: u32,

    /// Allowlist restricting canary eligibility; `None` means unrestricted
    #[serde(default)]
    pub canary_indices: Option<BTreeSet<String>>,

    /// Deterministic percentage sampling for canary inclusion, in [0,1]
    #[serde(default = "default_canary_pct")]
    pub canary_pct: f64,

    /// Minimum parity-ok ratio for canary activation (default permissive)
    #[serde(default = "default_canary_target")]
    pub canary_target: f64,

    /// Snapshot field names whose diff always forces parity failure and
    /// feeds the cumulative rollback counter (see [`crate::fields`])
    #[serde(default)]
    pub protected_fields: BTreeSet<String>,

    /// Cumulative protected-diff count triggering permanent rollback
    #[serde(default = "default_rollback_protected")]
    pub rollback_protected_threshold: u64,

    /// Churn-ratio threshold triggering rollback
    #[serde(default = "default_rollback_churn_ratio")]
    pub rollback_churn_ratio: f64,

    /// Unconditional override denying promotion and canary exposure
    #[serde(default)]
    pub force_demote: bool,

    /// Whether a successful promotion also marks the key authoritative
    #[serde(default)]
    pub authoritative: bool,
}

fn default_parity_window() -> usize {
    10
}
fn default_churn_window() -> usize {
    10
}
fn default_min_samples() -> usize {
    5
}
fn default_ok_target() -> f64 {
    0.98
}
fn default_ok_streak() -> u32 {
    5
}
fn default_canary_pct() -> f64 {
    1.0
}
fn default_canary_target() -> f64 {
    0.0
}
fn default_rollback_protected() -> u64 {
    3
}
fn default_rollback_churn_ratio() -> f64 {
    0.9
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            mode: GateMode::default(),
            parity_window: default_parity_window(),
            churn_window: default_churn_window(),
            min_samples: default_min_samples(),
            ok_target: default_ok_target(),
            ok_streak_threshold: default_ok_streak(),
            canary_indices: None,
            canary_pct: default_canary_pct(),
            canary_target: default_canary_target(),
            protected_fields: BTreeSet::new(),
            rollback_protected_threshold: default_rollback_protected(),
            rollback_churn_ratio: default_rollback_churn_ratio(),
            force_demote: false,
            authoritative: false,
        }
    }
}

impl GatingConfig {
    /// Build from `G6_SHADOW_*` environment variables, falling back to
    /// defaults for unset keys. Fails on any malformed value.
    pub fn from_env() -> Result<Self, GateError> {
        let mut cfg = Self::default();

        if let Some(raw) = read_env(env_keys::MODE)? {
            cfg.mode = raw.parse()?;
        }
        cfg.parity_window = parse_env(env_keys::PARITY_WINDOW, cfg.parity_window)?;
        cfg.churn_window = parse_env(env_keys::CHURN_WINDOW, cfg.churn_window)?;
        cfg.min_samples = parse_env(env_keys::MIN_SAMPLES, cfg.min_samples)?;
        cfg.ok_target = parse_env(env_keys::OK_TARGET, cfg.ok_target)?;
        cfg.ok_streak_threshold = parse_env(env_keys::OK_STREAK, cfg.ok_streak_threshold)?;
        if let Some(raw) = read_env(env_keys::CANARY_INDICES)? {
            let set = parse_name_set(&raw);
            cfg.canary_indices = if set.is_empty() { None } else { Some(set) };
        }
        cfg.canary_pct = parse_env(env_keys::CANARY_PCT, cfg.canary_pct)?;
        cfg.canary_target = parse_env(env_keys::CANARY_TARGET, cfg.canary_target)?;
        if let Some(raw) = read_env(env_keys::PROTECTED_FIELDS)? {
            cfg.protected_fields = parse_name_set(&raw);
        }
        cfg.rollback_protected_threshold = parse_env(
            env_keys::ROLLBACK_PROTECTED,
            cfg.rollback_protected_threshold,
        )?;
        cfg.rollback_churn_ratio =
            parse_env(env_keys::ROLLBACK_CHURN_RATIO, cfg.rollback_churn_ratio)?;
        cfg.force_demote = parse_env_flag(env_keys::FORCE_DEMOTE, cfg.force_demote)?;
        cfg.authoritative = parse_env_flag(env_keys::AUTHORITATIVE, cfg.authoritative)?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Range-check threshold values.
    pub fn validate(&self) -> Result<(), GateError> {
        for (name, value) in [
            ("ok_target", self.ok_target),
            ("canary_pct", self.canary_pct),
            ("canary_target", self.canary_target),
            ("rollback_churn_ratio", self.rollback_churn_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(GateError::Config(format!(
                    "{name} must be in [0,1], got {value}"
                )));
            }
        }
        if self.parity_window == 0 {
            return Err(GateError::Config("parity_window must be >= 1".to_string()));
        }
        if self.churn_window == 0 {
            return Err(GateError::Config("churn_window must be >= 1".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Environment Parsing
// =============================================================================

fn read_env(key: &str) -> Result<Option<String>, GateError> {
    match std::env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(GateError::Config(format!("{key}: {e}"))),
    }
}

fn parse_env<T: FromStr>(key: &str, fallback: T) -> Result<T, GateError>
where
    T::Err: fmt::Display,
{
    match read_env(key)? {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| GateError::Config(format!("{key}: invalid value {raw:?}: {e}"))),
        None => Ok(fallback),
    }
}

fn parse_env_flag(key: &str, fallback: bool) -> Result<bool, GateError> {
    match read_env(key)? {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(GateError::Config(format!(
                "{key}: invalid boolean {other:?}"
            ))),
        },
        None => Ok(fallback),
    }
}

fn parse_name_set(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
