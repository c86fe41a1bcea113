//! Per-assay gates and the measurement ladder (§4.2).
//!
//! A gate is earned when `df_total >= DF_MIN` AND `rel_width <=
//! REL_WIDTH_MAX` AND `metric_source == "real"`. Proxy evidence can update
//! beliefs passively but can never itself earn a gate.

use serde::{Deserialize, Serialize};

use cellassay_core::GateConfig;

/// The assays a gate can be earned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assay {
    Ldh,
    CellPainting,
    ScRna,
}

impl Assay {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ldh => "ldh",
            Self::CellPainting => "cell_painting",
            Self::ScRna => "scrna",
        }
    }

    /// The gate(s) this assay's ladder rung requires before it can be
    /// trusted: scRNA's `scrna_upgrade_probe` requires Cell-Painting; LDH
    /// and Cell-Painting are themselves required before any
    /// biological-claim template.
    #[must_use]
    pub const fn ladder_requires(self) -> &'static [Assay] {
        match self {
            Self::Ldh | Self::CellPainting => &[],
            Self::ScRna => &[Self::CellPainting],
        }
    }
}

/// The trust state of one assay's measurement quality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateRecord {
    pub df_total: f64,
    pub rel_width: f64,
    pub metric_source_is_real: bool,
    pub earned: bool,
}

impl GateRecord {
    #[must_use]
    pub fn new() -> Self {
        Self {
            df_total: 0.0,
            rel_width: f64::INFINITY,
            metric_source_is_real: false,
            earned: false,
        }
    }

    /// Recompute `earned` from the current df/rel_width/source reading and
    /// return whether the gate transitioned (earned, lost, unchanged).
    pub fn update(
        &mut self,
        cfg: &GateConfig,
        df_total: f64,
        rel_width: f64,
        metric_source_is_real: bool,
    ) -> GateTransition {
        self.df_total = df_total;
        self.rel_width = rel_width;
        self.metric_source_is_real = metric_source_is_real;

        let was_earned = self.earned;
        let now_earned =
            metric_source_is_real && df_total >= cfg.df_min && rel_width <= cfg.rel_width_max;
        self.earned = now_earned;

        match (was_earned, now_earned) {
            (false, true) => GateTransition::Earned,
            (true, false) => GateTransition::Lost,
            _ => GateTransition::Unchanged,
        }
    }
}

impl Default for GateRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to a gate on the most recent update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    Earned,
    Lost,
    Unchanged,
}

/// Whether a given assay's ladder prerequisites are all satisfied by the
/// currently-earned gate set.
#[must_use]
pub fn ladder_satisfied(assay: Assay, is_earned: impl Fn(Assay) -> bool) -> bool {
    assay.ladder_requires().iter().all(|req| is_earned(*req))
}

/// Whether LDH + Cell-Painting (the prerequisite for any biological-claim
/// template) are both earned.
#[must_use]
pub fn biological_claim_ready(is_earned: impl Fn(Assay) -> bool) -> bool {
    is_earned(Assay::Ldh) && is_earned(Assay::CellPainting)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_requires_real_source_even_with_good_stats() {
        let cfg = GateConfig::default();
        let mut gate = GateRecord::new();
        let transition = gate.update(&cfg, 50.0, 0.1, false);
        assert!(!gate.earned);
        assert_eq!(transition, GateTransition::Unchanged);
    }

    #[test]
    fn gate_earned_transition_then_lost_on_drift() {
        let cfg = GateConfig::default();
        let mut gate = GateRecord::new();
        assert_eq!(gate.update(&cfg, 50.0, 0.1, true), GateTransition::Earned);
        assert!(gate.earned);
        assert_eq!(gate.update(&cfg, 5.0, 0.9, true), GateTransition::Lost);
        assert!(!gate.earned);
    }

    #[test]
    fn scrna_ladder_requires_cell_painting() {
        assert!(!ladder_satisfied(Assay::ScRna, |_| false));
        assert!(ladder_satisfied(Assay::ScRna, |a| a == Assay::CellPainting));
        assert!(ladder_satisfied(Assay::Ldh, |_| false));
    }

    #[test]
    fn biological_claim_requires_both_ldh_and_cell_painting() {
        assert!(!biological_claim_ready(|a| a == Assay::Ldh));
        assert!(biological_claim_ready(|_| true));
    }
}
