//! Runtime invariant assertions and conservation checks (§4.5, §8).
//!
//! These are not defensive programming for hypothetical states: every
//! function here corresponds to an explicitly numbered invariant or
//! testable property in the design. A violation is always a contract
//! violation (`Error::InvariantViolation`), never silently tolerated.

#![forbid(unsafe_code)]

use cellassay_core::error::{Error, Result};
use cellassay_vm::Vessel;

/// Invariant 4: `initial_wells == spent + remaining` after every cycle.
pub fn assert_budget_conserved(initial_wells: u32, spent: u32, remaining: u32) -> Result<()> {
    if spent + remaining != initial_wells {
        return Err(Error::InvariantViolation(format!(
            "budget not conserved: initial={initial_wells} spent={spent} remaining={remaining}"
        )));
    }
    Ok(())
}

/// Property 4 (death ledger): `death_compound + death_confluence +
/// death_unknown == 1 - viability`, within 1e-9.
pub fn assert_death_ledger_conserved(vessel: &Vessel) -> Result<()> {
    if !vessel.death_ledger_consistent() {
        return Err(Error::InvariantViolation(format!(
            "death ledger inconsistent for vessel {}: total={} expected={}",
            vessel.id,
            vessel.death.total(),
            1.0 - vessel.viability
        )));
    }
    Ok(())
}

/// Property 6: `|vessel.viability - sum(f_i * v_i)| < 1e-9` after every VM
/// operation.
pub fn assert_weighted_mean_consistent(vessel: &Vessel) -> Result<()> {
    if !vessel.weighted_mean_consistent() {
        return Err(Error::InvariantViolation(format!(
            "weighted-mean invariant violated for vessel {}: viability={} weighted_mean={}",
            vessel.id,
            vessel.viability,
            vessel.weighted_mean_viability()
        )));
    }
    Ok(())
}

/// Property 5: viability is monotone non-increasing, ignoring
/// growth-in-count (no resurrection).
pub fn assert_viability_non_increasing(previous: f64, current: f64) -> Result<()> {
    if current > previous + 1e-9 {
        return Err(Error::InvariantViolation(format!(
            "viability increased without resurrection: {previous} -> {current}"
        )));
    }
    Ok(())
}

/// Property 7: debt is non-decreasing except on resolved calibration
/// claims.
pub fn assert_debt_monotonic(previous: f64, current: f64, was_calibration_repayment: bool) -> Result<()> {
    if current < previous - 1e-9 && !was_calibration_repayment {
        return Err(Error::InvariantViolation(format!(
            "debt decreased ({previous} -> {current}) without a calibration repayment"
        )));
    }
    Ok(())
}

/// Invariant 1: cycle indices are positive integers, strictly increasing.
pub fn assert_cycle_monotonic(previous: u64, current: u64) -> Result<()> {
    if current <= previous {
        return Err(Error::InvariantViolation(format!(
            "cycle index did not strictly increase: {previous} -> {current}"
        )));
    }
    Ok(())
}

/// Asserts a calibration proposal's wells carry no treatment identity.
/// Re-exported thin wrapper so the Loop can call one guard surface instead
/// of reaching into `cellassay-core` directly for this particular check.
pub fn assert_calibration_has_no_treatment_identity(proposal: &cellassay_core::Proposal) -> Result<()> {
    if proposal.is_calibration && !cellassay_core::has_no_treatment_identity(proposal) {
        return Err(Error::InvariantViolation(format!(
            "calibration proposal '{}' carries treatment identity",
            proposal.template_name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_conservation_catches_leak() {
        assert!(assert_budget_conserved(240, 100, 100).is_err());
        assert!(assert_budget_conserved(240, 100, 140).is_ok());
    }

    #[test]
    fn cycle_monotonic_rejects_repeat_or_decrease() {
        assert!(assert_cycle_monotonic(3, 3).is_err());
        assert!(assert_cycle_monotonic(3, 2).is_err());
        assert!(assert_cycle_monotonic(3, 4).is_ok());
    }

    #[test]
    fn viability_non_increasing_rejects_resurrection() {
        assert!(assert_viability_non_increasing(0.5, 0.6).is_err());
        assert!(assert_viability_non_increasing(0.5, 0.4).is_ok());
    }

    #[test]
    fn debt_monotonic_allows_decrease_only_with_repayment() {
        assert!(assert_debt_monotonic(1.0, 0.5, false).is_err());
        assert!(assert_debt_monotonic(1.0, 0.5, true).is_ok());
        assert!(assert_debt_monotonic(1.0, 1.5, false).is_ok());
    }

    #[test]
    fn calibration_proposal_with_treatment_identity_rejected() {
        use cellassay_core::{Proposal, WellSpec};
        let proposal = Proposal {
            template_name: "calibrate_cell_paint_baseline".into(),
            wells: vec![WellSpec {
                well_id: "A1".into(),
                cell_line: "HeLa".into(),
                compounds: vec![("paclitaxel".into(), 1.0)],
                timepoint_h: 24.0,
                assay: "cell_painting".into(),
            }],
            layout_seed: 1,
            is_calibration: true,
        };
        assert!(assert_calibration_has_no_treatment_identity(&proposal).is_err());
    }
}
