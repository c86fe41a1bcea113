//! Vessel state and the per-vessel state machine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One of the three subpopulation compartments within a vessel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subpopulation {
    pub fraction: f64,
    pub viability: f64,
    pub ic50_shift: f64,
}

/// `(compound, exposure_id, subpop)` — the key commitment delays are
/// stored under.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentKey {
    pub compound: String,
    pub exposure_id: u64,
    pub subpop: String,
}

/// Per-compound dosing metadata, keyed by compound name. Exposure ids are
/// monotonic per vessel, incremented on each `treat_with_compound` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompoundMeta {
    pub next_exposure_id: u64,
    pub exposure_ids: HashMap<String, Vec<u64>>,
    pub commitment_delays: HashMap<CommitmentKey, f64>,
}

/// Per-cause death accounting. Invariant:
/// `death_compound + death_confluence + death_unknown == 1 - viability`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeathLedger {
    pub death_compound: f64,
    pub death_confluence: f64,
    pub death_unknown: f64,
}

impl DeathLedger {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.death_compound + self.death_confluence + self.death_unknown
    }
}

/// The per-vessel state machine. `Terminal` is absorbing: viability is
/// monotone non-increasing (excluding growth-in-count) once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VesselPhase {
    Empty,
    Seeded,
    Treated,
    PostCommit,
    Terminal,
}

/// A single well with full biological state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vessel {
    pub id: String,
    pub cell_line: String,
    pub phase: VesselPhase,
    pub cell_count: i64,
    pub viability: f64,
    pub confluence: f64,
    pub subpopulations: HashMap<String, Subpopulation>,
    /// compound -> concentration (uM); 0 once fully washed, never removed.
    pub compound_concentrations: HashMap<String, f64>,
    /// compound -> hours since first dose of the current exposure.
    pub compound_start_time: HashMap<String, f64>,
    pub compound_meta: CompoundMeta,
    pub death: DeathLedger,
    /// Deterministic per-well baseline shift applied to morphology
    /// channels, fixed at seed time.
    pub baseline_shift: HashMap<String, f64>,
    /// Hours of simulated time elapsed for this vessel.
    pub elapsed_h: f64,
}

impl Vessel {
    /// The weighted-mean viability over subpopulations. Recomputed, never
    /// stored redundantly as the source of truth — `self.viability` is kept
    /// in sync by callers after every mutation and cross-checked by
    /// `assert_weighted_mean_consistent`.
    #[must_use]
    pub fn weighted_mean_viability(&self) -> f64 {
        self.subpopulations
            .values()
            .map(|s| s.fraction * s.viability)
            .sum()
    }

    /// Runtime assertion from §4.1: "A runtime assertion verifies
    /// `|vessel.viability - weighted_mean| < 1e-9`".
    #[must_use]
    pub fn weighted_mean_consistent(&self) -> bool {
        (self.viability - self.weighted_mean_viability()).abs() < 1e-9
    }

    /// Resync `self.viability` from subpopulation state, then check the
    /// death-ledger conservation invariant holds within tolerance.
    pub fn resync_viability(&mut self) {
        self.viability = self.weighted_mean_viability();
    }

    #[must_use]
    pub fn death_ledger_consistent(&self) -> bool {
        (self.death.total() - (1.0 - self.viability)).abs() < 1e-9
    }

    /// Whether this vessel has permanently reached zero viability.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.phase == VesselPhase::Terminal
    }

    /// Transition on reaching (or re-reaching) zero viability. Absorbing:
    /// once terminal, always terminal.
    pub fn maybe_enter_terminal(&mut self) {
        if self.viability <= 0.0 {
            self.phase = VesselPhase::Terminal;
        }
    }

    /// Transition seeded/treated -> post-commit once every subpop's
    /// commitment delay for the current exposures has elapsed.
    pub fn maybe_enter_post_commit(&mut self, max_commitment_delay_elapsed: bool) {
        if self.phase == VesselPhase::Treated && max_commitment_delay_elapsed {
            self.phase = VesselPhase::PostCommit;
        }
    }
}
