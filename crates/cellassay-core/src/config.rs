//! Run configuration: the one `RunContext` every subsystem reads from.
//!
//! Centralizing every tunable here means the commitment-delay CV, the gate
//! thresholds, and the policy weights all live in one auditable place
//! instead of being scattered as magic numbers through the VM, Belief, and
//! Policy crates.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Plate format. Determines well count and which positions are "edge".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlateFormat {
    Wells96,
    Wells384,
}

impl PlateFormat {
    #[must_use]
    pub const fn rows(self) -> u32 {
        match self {
            Self::Wells96 => 8,
            Self::Wells384 => 16,
        }
    }

    #[must_use]
    pub const fn cols(self) -> u32 {
        match self {
            Self::Wells96 => 12,
            Self::Wells384 => 24,
        }
    }

    #[must_use]
    pub const fn well_count(self) -> u32 {
        self.rows() * self.cols()
    }
}

/// Plate layout constraints supplied by an external facility-planning
/// collaborator. Opaque beyond what the World needs to allocate positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateLayoutConfig {
    pub format: PlateFormat,
    /// Row/col pairs (0-indexed) excluded from use (commonly plate corners).
    pub excluded_positions: Vec<(u32, u32)>,
}

impl Default for PlateLayoutConfig {
    fn default() -> Self {
        Self {
            format: PlateFormat::Wells96,
            excluded_positions: vec![(0, 0), (0, 11), (7, 0), (7, 11)],
        }
    }
}

impl PlateLayoutConfig {
    /// Whether `(row, col)` sits on the plate perimeter, i.e. is an "edge"
    /// well rather than a "center" one. A derived property of coordinates,
    /// never stored on the well itself.
    #[must_use]
    pub fn position_class(&self, row: u32, col: u32) -> PositionClass {
        let rows = self.format.rows();
        let cols = self.format.cols();
        if row == 0 || col == 0 || row == rows - 1 || col == cols - 1 {
            PositionClass::Edge
        } else {
            PositionClass::Center
        }
    }

    #[must_use]
    pub fn usable_positions(&self) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        for r in 0..self.format.rows() {
            for c in 0..self.format.cols() {
                if !self.excluded_positions.contains(&(r, c)) {
                    out.push((r, c));
                }
            }
        }
        out
    }
}

/// Derived from physical well coordinates; never stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionClass {
    Edge,
    Center,
}

impl PositionClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Edge => "edge",
            Self::Center => "center",
        }
    }
}

/// Gate thresholds for "is this assay's measurement trusted".
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateConfig {
    /// Minimum total degrees of freedom before a gate can be earned.
    pub df_min: f64,
    /// Maximum relative CI half-width (from conformal prediction) for a
    /// gate to be earned.
    pub rel_width_max: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            df_min: 12.0,
            rel_width_max: 0.35,
        }
    }
}

/// Weights used by the Policy's EIV scoring formulas (§4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PolicyWeights {
    pub k_uncertainty: f64,
    pub k_debt: f64,
    pub k_plate: f64,
    pub k_time: f64,
    pub k_health: f64,
    pub w_confidence: f64,
    pub w_time: f64,
    pub w_ops: f64,
    /// Minimum cycles between calibrations (`MIN_GAP`).
    pub min_calibration_gap: u64,
    /// Margin an argmax action must beat `last_action`'s score by.
    pub action_switch_penalty: f64,
    /// Consecutive REPLICATEs allowed before EXPLORE is forced.
    pub max_consecutive_replicates: u32,
}

impl Default for PolicyWeights {
    fn default() -> Self {
        Self {
            k_uncertainty: 1.0,
            k_debt: 1.0,
            k_plate: 1.0,
            k_time: 0.05,
            k_health: 1.0,
            w_confidence: 1.0,
            w_time: 0.02,
            w_ops: 0.1,
            min_calibration_gap: 3,
            action_switch_penalty: 0.15,
            max_consecutive_replicates: 2,
        }
    }
}

/// Epistemic Controller thresholds and repayment schedule (§4.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EpistemicConfig {
    /// `α` in `effective_cost = base_cost · (1 + α·debt)`.
    pub alpha_cost_inflation: f64,
    /// Cap on cost inflation for calibration actions.
    pub calibration_inflation_cap: f64,
    /// Debt threshold above which non-calibration actions are refused.
    pub refusal_threshold_bits: f64,
    /// Wells the budget must always retain for calibration affordability.
    pub calibration_reserve_wells: u32,
    /// Base repayment (bits) for any resolved calibration claim.
    pub repayment_base_bits: f64,
    /// Maximum bonus repayment (bits) tied to measured noise improvement.
    pub repayment_bonus_cap_bits: f64,
    /// Calibrations at or below this well count cannot repay ≥ 1.0 bits.
    pub trivial_calibration_wells: u32,
}

impl Default for EpistemicConfig {
    fn default() -> Self {
        Self {
            alpha_cost_inflation: 0.5,
            calibration_inflation_cap: 1.5,
            refusal_threshold_bits: 2.0,
            calibration_reserve_wells: 12,
            repayment_base_bits: 0.25,
            repayment_bonus_cap_bits: 0.75,
            trivial_calibration_wells: 3,
        }
    }
}

/// Health-debt accumulation/decay schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthDebtConfig {
    pub qc_violation_increment: f64,
    pub clean_cycle_decay: f64,
    pub mitigation_decay: f64,
    pub medium_pressure_threshold: f64,
    pub high_pressure_threshold: f64,
}

impl Default for HealthDebtConfig {
    fn default() -> Self {
        Self {
            qc_violation_increment: 0.2,
            clean_cycle_decay: 0.05,
            mitigation_decay: 0.3,
            medium_pressure_threshold: 0.5,
            high_pressure_threshold: 1.0,
        }
    }
}

/// Commitment-delay lognormal shape, per §4.1 and the open question in §9
/// ("tunable guardrails, not biological claims — keep them in config").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommitmentDelayConfig {
    pub coefficient_of_variation: f64,
    pub min_hours: f64,
    pub max_hours: f64,
    /// Mean commitment delay at `dose == IC50` (hours), scaled by
    /// `1/sqrt(1 + dose/IC50)` for higher doses.
    pub base_mean_hours: f64,
}

impl Default for CommitmentDelayConfig {
    fn default() -> Self {
        Self {
            coefficient_of_variation: 0.25,
            min_hours: 1.5,
            max_hours: 48.0,
            base_mean_hours: 12.0,
        }
    }
}

/// Measurement-stack tunables (§4.1.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Probability per measurement of a heavy-tail Student-t shock.
    pub heavy_tail_frequency: f64,
    pub heavy_tail_clip_min: f64,
    pub heavy_tail_clip_max: f64,
    pub student_t_dof: f64,
    pub detector_floor_sigma: f64,
    pub adc_bits: u32,
    /// If `adc_bits > 0` this must be `Some`, else `measure` raises.
    pub adc_ceiling: Option<f64>,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            heavy_tail_frequency: 0.0,
            heavy_tail_clip_min: 0.2,
            heavy_tail_clip_max: 5.0,
            student_t_dof: 4.0,
            detector_floor_sigma: 0.01,
            adc_bits: 0,
            adc_ceiling: None,
        }
    }
}

impl MeasurementConfig {
    /// Validates the `bits>0` requires-ceiling contract from §4.1.1 step 8.
    pub fn validate(&self, channel: &str) -> Result<()> {
        if self.adc_bits > 0 && self.adc_ceiling.is_none() {
            return Err(Error::QuantizationMissingCeiling {
                channel: channel.to_string(),
            });
        }
        Ok(())
    }
}

/// The full, serializable run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub seed: u64,
    pub initial_budget_wells: u32,
    pub max_cycles: u64,
    pub plate_layout: PlateLayoutConfig,
    pub gates: GateConfig,
    pub policy_weights: PolicyWeights,
    pub epistemic: EpistemicConfig,
    pub health_debt: HealthDebtConfig,
    pub commitment_delay: CommitmentDelayConfig,
    pub measurement: MeasurementConfig,
    /// Exploration budget reserve the CALIBRATE scorer must respect
    /// (`k_plate · 1` in §4.4 assumes a 96-well-equivalent denominator).
    pub exploration_reserve_wells: u32,
}

impl RunConfig {
    #[must_use]
    pub fn new(seed: u64, initial_budget_wells: u32, max_cycles: u64) -> Self {
        Self {
            seed,
            initial_budget_wells,
            max_cycles,
            plate_layout: PlateLayoutConfig::default(),
            gates: GateConfig::default(),
            policy_weights: PolicyWeights::default(),
            epistemic: EpistemicConfig::default(),
            health_debt: HealthDebtConfig::default(),
            commitment_delay: CommitmentDelayConfig::default(),
            measurement: MeasurementConfig::default(),
            exploration_reserve_wells: 96,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_budget_wells == 0 {
            return Err(Error::Config("initial_budget_wells must be > 0".into()));
        }
        if self.max_cycles == 0 {
            return Err(Error::Config("max_cycles must be > 0".into()));
        }
        if self.epistemic.calibration_reserve_wells > self.initial_budget_wells {
            return Err(Error::Config(
                "calibration_reserve_wells exceeds initial_budget_wells".into(),
            ));
        }
        Ok(())
    }
}

/// Read-only pricing lookup supplied by an external inventory collaborator
/// (§6: "opaque `get_price(key) -> float`"). Kept as a trait so tests can
/// substitute a fixed table without touching a real catalog.
pub trait PricingTable: Send + Sync {
    fn get_price(&self, key: &str) -> f64;
}

/// A flat, in-memory pricing table: the default for tests and for the CLI
/// when no external catalog is wired in.
#[derive(Debug, Clone, Default)]
pub struct FlatPricingTable {
    pub default_price: f64,
    pub overrides: std::collections::HashMap<String, f64>,
}

impl PricingTable for FlatPricingTable {
    fn get_price(&self, key: &str) -> f64 {
        self.overrides.get(key).copied().unwrap_or(self.default_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_class_is_derived_from_coordinates() {
        let layout = PlateLayoutConfig::default();
        assert_eq!(layout.position_class(0, 5), PositionClass::Edge);
        assert_eq!(layout.position_class(3, 3), PositionClass::Center);
        assert_eq!(layout.position_class(7, 11), PositionClass::Edge);
    }

    #[test]
    fn excluded_positions_are_not_usable() {
        let layout = PlateLayoutConfig::default();
        let usable = layout.usable_positions();
        assert!(!usable.contains(&(0, 0)));
        assert_eq!(usable.len() as u32, layout.format.well_count() - 4);
    }

    #[test]
    fn quantization_requires_ceiling_when_bits_positive() {
        let cfg = MeasurementConfig {
            adc_bits: 8,
            adc_ceiling: None,
            ..MeasurementConfig::default()
        };
        assert!(cfg.validate("ldh").is_err());
    }

    #[test]
    fn run_config_rejects_reserve_larger_than_budget() {
        let mut cfg = RunConfig::new(1, 10, 5);
        cfg.epistemic.calibration_reserve_wells = 20;
        assert!(cfg.validate().is_err());
    }
}
