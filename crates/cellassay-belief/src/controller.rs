//! Epistemic Controller: claim/resolve cycle, debt, inflation, refusals
//! (§4.3).

use serde::{Deserialize, Serialize};

use cellassay_core::{ActionKind, EpistemicConfig};

/// A proposed claim accompanying an action: an asserted confidence
/// shrinkage or probability mass shift.
#[derive(Debug, Clone, Copy)]
pub struct Claim {
    pub claimed_bits: f64,
}

/// What actually happened once the claim resolved against evidence.
#[derive(Debug, Clone, Copy)]
pub struct Resolution {
    pub realized_bits: f64,
    pub wells_used: u32,
    pub noise_improvement: f64,
}

/// Outcome of admissibility check: either the proposal is admitted, or
/// refused with enough context to write a full provenance record.
#[derive(Debug, Clone)]
pub enum Admissibility {
    Admitted { cost_inflation_factor: f64 },
    Refused {
        reason: String,
        missing_gates: Vec<String>,
    },
}

/// Tracks debt in bits and converts it into cost inflation and refusals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EpistemicController {
    pub debt_bits: f64,
    pub cumulative_refusals: u64,
    pub insolvent: bool,
}

impl EpistemicController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            debt_bits: 0.0,
            cumulative_refusals: 0,
            insolvent: false,
        }
    }

    /// Record a claim vs. its resolution, accruing debt proportional to
    /// asymmetric miscalibration: overclaiming (claimed > realized) costs
    /// more than underclaiming.
    pub fn resolve_claim(&mut self, _cfg: &EpistemicConfig, claim: Claim, resolution: Resolution) -> f64 {
        let miscalibration = claim.claimed_bits - resolution.realized_bits;
        let delta = if miscalibration > 0.0 {
            miscalibration * 1.5
        } else {
            miscalibration.abs() * 0.25
        };
        self.debt_bits = (self.debt_bits + delta).max(0.0);
        delta
    }

    /// Repay debt from a resolved calibration claim: base 0.25 bits plus up
    /// to 0.75 bonus tied to measured noise improvement, with trivial
    /// (≤3-well) calibrations capped below 1.0 bits total.
    pub fn repay_from_calibration(&mut self, cfg: &EpistemicConfig, resolution: Resolution) -> f64 {
        let bonus = (resolution.noise_improvement * cfg.repayment_bonus_cap_bits)
            .min(cfg.repayment_bonus_cap_bits);
        let mut repayment = cfg.repayment_base_bits + bonus;
        if resolution.wells_used <= cfg.trivial_calibration_wells {
            repayment = repayment.min(0.99);
        }
        self.debt_bits = (self.debt_bits - repayment).max(0.0);
        repayment
    }

    /// `effective_cost = base_cost * (1 + alpha*debt)`, capped at
    /// `calibration_inflation_cap` for calibration actions so calibration
    /// remains always reachable.
    #[must_use]
    pub fn cost_inflation_factor(&self, cfg: &EpistemicConfig, action: ActionKind) -> f64 {
        let raw = 1.0 + cfg.alpha_cost_inflation * self.debt_bits;
        if action.is_calibration() {
            raw.min(cfg.calibration_inflation_cap)
        } else {
            raw
        }
    }

    /// Decide admissibility for `action` given the current debt, gate
    /// state, and remaining budget.
    pub fn check_admissibility(
        &mut self,
        cfg: &EpistemicConfig,
        action: ActionKind,
        missing_gates: Vec<String>,
        budget_remaining: u32,
        action_cost: u32,
    ) -> Admissibility {
        let inflation = self.cost_inflation_factor(cfg, action);

        if action.is_calibration() {
            if budget_remaining >= cfg.calibration_reserve_wells {
                return Admissibility::Admitted {
                    cost_inflation_factor: inflation,
                };
            }
            return Admissibility::Refused {
                reason: "calibration reserve exhausted".to_string(),
                missing_gates,
            };
        }

        if self.debt_bits >= cfg.refusal_threshold_bits {
            self.cumulative_refusals += 1;
            return Admissibility::Refused {
                reason: format!("debt {} >= refusal threshold {}", self.debt_bits, cfg.refusal_threshold_bits),
                missing_gates,
            };
        }

        let effective_cost = (f64::from(action_cost) * inflation).ceil() as u32;
        if effective_cost > budget_remaining {
            self.cumulative_refusals += 1;
            return Admissibility::Refused {
                reason: "insufficient budget after cost inflation".to_string(),
                missing_gates,
            };
        }

        Admissibility::Admitted {
            cost_inflation_factor: inflation,
        }
    }

    /// True once even the cheapest calibration is unaffordable: the loop
    /// must declare epistemic deadlock and terminate.
    #[must_use]
    pub fn is_deadlocked(&self, cfg: &EpistemicConfig, budget_remaining: u32, cheapest_calibration_cost: u32) -> bool {
        budget_remaining < cfg.calibration_reserve_wells.min(cheapest_calibration_cost)
            && budget_remaining < cheapest_calibration_cost
    }

    pub fn mark_insolvent(&mut self) {
        self.insolvent = true;
    }
}

impl Default for EpistemicController {
    fn default() -> Self {
        Self::new()
    }
}
