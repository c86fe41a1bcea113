//! `BeliefState`: what has been learned, and whether the instruments are
//! trusted (§4.2).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cellassay_core::{ActionKind, BocpdDetector, ConformalPredictor, GateConfig};

use crate::gates::{Assay, GateRecord, GateTransition};
use crate::mechanism::MechanismPosterior;

/// Health-debt pressure level exposed to the Policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthPressure {
    Low,
    Medium,
    High,
}

/// A belief mutation's provenance, mirrored into `cellassay_core::EvidenceEvent`
/// by the Loop at write time.
#[derive(Debug, Clone)]
pub struct BeliefMutation {
    pub description: String,
    pub supporting_conditions: Vec<String>,
    pub metric_source: String,
    pub delta_entropy_bits: f64,
    pub gates_earned: Vec<String>,
    pub gates_lost: Vec<String>,
}

/// The Loop's sole mutable belief store. Policy and the Controller receive
/// read-only views and return proposed edits the Loop applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeliefState {
    pub calibration_entropy_bits: f64,
    pub gates: BTreeMap<Assay, GateRecord>,
    pub mechanism_posterior: MechanismPosterior,
    pub health_debt: f64,
    pub health_debt_history: Vec<f64>,
    pub cycles_since_calibration: u64,
    pub last_action: Option<ActionKind>,
    pub consecutive_replicates: u32,
    /// Noise-width conformal predictors per assay, feeding calibration
    /// entropy's "noise CI width" term.
    #[serde(skip)]
    conformal_by_assay: BTreeMap<Assay, ConformalPredictor>,
    /// Change-point detectors over each assay's residual stream, ahead of
    /// the conformal predictor: a detected regime shift resets the
    /// predictor's calibration window instead of averaging across it.
    #[serde(skip)]
    bocpd_by_assay: BTreeMap<Assay, BocpdDetector>,
}

impl BeliefState {
    #[must_use]
    pub fn new() -> Self {
        let mut gates = BTreeMap::new();
        gates.insert(Assay::Ldh, GateRecord::new());
        gates.insert(Assay::CellPainting, GateRecord::new());
        gates.insert(Assay::ScRna, GateRecord::new());
        Self {
            calibration_entropy_bits: 8.0,
            gates,
            mechanism_posterior: MechanismPosterior::uninformative(),
            health_debt: 0.0,
            health_debt_history: Vec::new(),
            cycles_since_calibration: 0,
            last_action: None,
            consecutive_replicates: 0,
            conformal_by_assay: BTreeMap::new(),
            bocpd_by_assay: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_gate_earned(&self, assay: Assay) -> bool {
        self.gates.get(&assay).is_some_and(|g| g.earned)
    }

    /// Update one assay's gate from a resolved observation. Real evidence
    /// only: callers must not invoke this with proxy metrics.
    pub fn update_gate(
        &mut self,
        cfg: &GateConfig,
        assay: Assay,
        df_total: f64,
        rel_width: f64,
        metric_source_is_real: bool,
    ) -> GateTransition {
        let change_point = self
            .bocpd_by_assay
            .entry(assay)
            .or_insert_with(|| BocpdDetector::new(0.02, 0.5, 200))
            .observe(rel_width);

        let predictor = self
            .conformal_by_assay
            .entry(assay)
            .or_insert_with(|| ConformalPredictor::new(200, 0.9));
        if change_point.is_some() {
            *predictor = ConformalPredictor::new(200, 0.9);
        }
        predictor.observe(rel_width);

        self.gates
            .entry(assay)
            .or_insert_with(GateRecord::new)
            .update(cfg, df_total, rel_width, metric_source_is_real)
    }

    /// Aggregate calibration entropy from its five contributing terms
    /// (noise CI width, gate uncertainty, edge-effect, pattern, coverage).
    pub fn estimate_calibration_uncertainty(&self) -> f64 {
        let gate_uncertainty: f64 = self
            .gates
            .values()
            .map(|g| if g.earned { 0.0 } else { 1.0 })
            .sum();
        let noise_width: f64 = self
            .conformal_by_assay
            .values()
            .filter_map(|c| c.predict().map(|interval| interval.upper - interval.lower))
            .sum();
        self.calibration_entropy_bits + gate_uncertainty * 0.5 + noise_width * 0.25
    }

    /// QC-driven health-debt accumulation/decay (§4.2).
    pub fn apply_qc_outcome(&mut self, increment: f64, decay: f64, had_violation: bool) {
        if had_violation {
            self.health_debt += increment;
        } else {
            self.health_debt = (self.health_debt - decay).max(0.0);
        }
        self.health_debt_history.push(self.health_debt);
    }

    pub fn apply_mitigation_decay(&mut self, decay: f64) {
        self.health_debt = (self.health_debt - decay).max(0.0);
        self.health_debt_history.push(self.health_debt);
    }

    #[must_use]
    pub fn health_pressure(&self, medium: f64, high: f64) -> HealthPressure {
        if self.health_debt >= high {
            HealthPressure::High
        } else if self.health_debt >= medium {
            HealthPressure::Medium
        } else {
            HealthPressure::Low
        }
    }

    pub fn record_action(&mut self, action: ActionKind) {
        if action.is_calibration() {
            self.cycles_since_calibration = 0;
        } else {
            self.cycles_since_calibration += 1;
        }
        if action == ActionKind::Replicate {
            self.consecutive_replicates += 1;
        } else {
            self.consecutive_replicates = 0;
        }
        self.last_action = Some(action);
    }
}

impl Default for BeliefState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellassay_core::GateConfig;

    #[test]
    fn fresh_belief_has_no_gates_earned() {
        let belief = BeliefState::new();
        assert!(!belief.is_gate_earned(Assay::Ldh));
        assert!(!belief.is_gate_earned(Assay::CellPainting));
    }

    #[test]
    fn update_gate_with_real_evidence_can_earn() {
        let mut belief = BeliefState::new();
        let cfg = GateConfig::default();
        let transition = belief.update_gate(&cfg, Assay::Ldh, 50.0, 0.1, true);
        assert_eq!(transition, GateTransition::Earned);
        assert!(belief.is_gate_earned(Assay::Ldh));
    }

    #[test]
    fn proxy_evidence_never_earns_a_gate() {
        let mut belief = BeliefState::new();
        let cfg = GateConfig::default();
        belief.update_gate(&cfg, Assay::Ldh, 50.0, 0.1, false);
        assert!(!belief.is_gate_earned(Assay::Ldh));
    }

    #[test]
    fn health_debt_decays_on_clean_cycles() {
        let mut belief = BeliefState::new();
        belief.apply_qc_outcome(0.2, 0.05, true);
        belief.apply_qc_outcome(0.2, 0.05, true);
        let after_violations = belief.health_debt;
        belief.apply_qc_outcome(0.2, 0.05, false);
        assert!(belief.health_debt < after_violations);
    }

    #[test]
    fn record_action_resets_calibration_counter() {
        let mut belief = BeliefState::new();
        belief.record_action(ActionKind::Explore);
        belief.record_action(ActionKind::Explore);
        assert_eq!(belief.cycles_since_calibration, 2);
        belief.record_action(ActionKind::Calibrate);
        assert_eq!(belief.cycles_since_calibration, 0);
    }

    #[test]
    fn consecutive_replicate_counter_resets_on_other_action() {
        let mut belief = BeliefState::new();
        belief.record_action(ActionKind::Replicate);
        belief.record_action(ActionKind::Replicate);
        assert_eq!(belief.consecutive_replicates, 2);
        belief.record_action(ActionKind::Explore);
        assert_eq!(belief.consecutive_replicates, 0);
    }
}
