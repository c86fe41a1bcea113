//! The `Action` tagged union and well-level proposal types.
//!
//! Modeled as a Rust enum rather than dynamic dispatch over "action kinds":
//! scoring is a per-variant function returning a common [`Score`], and
//! selection is argmax with a hysteresis predicate (see `cellassay-policy`).

use serde::{Deserialize, Serialize};

/// One of the six action kinds the Policy can select between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Explore,
    Calibrate,
    Replicate,
    Mitigate,
    NoDetection,
    None,
}

impl ActionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Explore => "EXPLORE",
            Self::Calibrate => "CALIBRATE",
            Self::Replicate => "REPLICATE",
            Self::Mitigate => "MITIGATE",
            Self::NoDetection => "NO_DETECTION",
            Self::None => "NONE",
        }
    }

    /// Whether this action is exempt from debt-based refusal (§4.3).
    #[must_use]
    pub const fn is_calibration(self) -> bool {
        matches!(self, Self::Calibrate)
    }

    /// Whether this action is a terminal outcome (§9 open question:
    /// NO_DETECTION and a concrete COMMIT are distinct terminal outcomes).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::NoDetection)
    }
}

/// A single well's treatment instructions within a [`Proposal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellSpec {
    pub well_id: String,
    pub cell_line: String,
    /// `(compound, dose_uM)` pairs; empty for untreated/DMSO-only wells.
    pub compounds: Vec<(String, f64)>,
    pub timepoint_h: f64,
    pub assay: String,
}

/// A set of `WellSpec`s for one cycle. Immutable once returned from Policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub template_name: String,
    pub wells: Vec<WellSpec>,
    pub layout_seed: u64,
    pub is_calibration: bool,
}

impl Proposal {
    #[must_use]
    pub fn well_count(&self) -> u32 {
        self.wells.len() as u32
    }
}

/// Asserted by the CALIBRATE template: a calibration plate carries no
/// treatment identity at all (DMSO + sentinels only).
#[must_use]
pub fn has_no_treatment_identity(proposal: &Proposal) -> bool {
    proposal
        .wells
        .iter()
        .all(|w| w.compounds.iter().all(|(_, dose)| *dose == 0.0))
}

/// Common scoring output across all action variants (§4.4, §9: "a common
/// `Score` record").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Score {
    pub action: ActionKindScore,
    pub value: f64,
}

/// Pairs a score value with the action kind it belongs to, so a slice of
/// `Score`s can be argmax'd without losing provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKindScore {
    Explore,
    Calibrate,
    Replicate,
    Mitigate,
    NoDetection,
}

impl From<ActionKindScore> for ActionKind {
    fn from(value: ActionKindScore) -> Self {
        match value {
            ActionKindScore::Explore => Self::Explore,
            ActionKindScore::Calibrate => Self::Calibrate,
            ActionKindScore::Replicate => Self::Replicate,
            ActionKindScore::Mitigate => Self::Mitigate,
            ActionKindScore::NoDetection => Self::NoDetection,
        }
    }
}
