//! Error taxonomy for the cell-biology screening agent.
//!
//! Per the error-handling design, only two classes of failure are
//! represented as an [`Error`]: *contract violations* (fatal, caught at the
//! loop boundary and terminated with exit code 1) and *epistemic deadlock*
//! (terminal, exit code 2). Epistemic refusals and QC-flag events are not
//! errors — they are recovered locally and written to their own ledgers.

use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can escape a cycle boundary.
#[derive(Debug, Error)]
pub enum Error {
    // ── Biology VM contract violations ──────────────────────────────────
    #[error("vessel already exists: {0}")]
    VesselAlreadyExists(String),

    #[error("unknown vessel: {0}")]
    UnknownVessel(String),

    #[error("unknown compound: {0}")]
    UnknownCompound(String),

    #[error("unknown cell line: {0}")]
    UnknownCellLine(String),

    #[error("invalid IC50 for compound {compound} on cell line {cell_line}: {ic50}")]
    InvalidIc50 {
        compound: String,
        cell_line: String,
        ic50: f64,
    },

    #[error("negative cell count for vessel {vessel}: {count}")]
    NegativeCellCount { vessel: String, count: i64 },

    #[error(
        "missing commitment delay for vessel {vessel}, compound {compound}, exposure {exposure_id}, subpop {subpop} at a lethal dose"
    )]
    MissingCommitmentDelay {
        vessel: String,
        compound: String,
        exposure_id: u64,
        subpop: String,
    },

    #[error("runtime invariant violated: {0}")]
    InvariantViolation(String),

    #[error("RNG stream {stream} called from unlisted caller {caller}")]
    RngStreamMisuse {
        stream: &'static str,
        caller: &'static str,
    },

    #[error("ADC quantization configured with bits > 0 but no ceiling for channel {channel}")]
    QuantizationMissingCeiling { channel: String },

    // ── Epistemic / budget terminal conditions ──────────────────────────
    #[error(
        "epistemic deadlock at cycle {cycle}: cheapest calibration costs {cheapest_cost} wells, only {budget_remaining} remain"
    )]
    EpistemicDeadlock {
        cycle: u64,
        cheapest_cost: u32,
        budget_remaining: u32,
    },

    // ── Configuration / infrastructure ───────────────────────────────────
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable error category, written into diagnostics.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::VesselAlreadyExists(_) => "VESSEL_ALREADY_EXISTS",
            Self::UnknownVessel(_) => "UNKNOWN_VESSEL",
            Self::UnknownCompound(_) => "UNKNOWN_COMPOUND",
            Self::UnknownCellLine(_) => "UNKNOWN_CELL_LINE",
            Self::InvalidIc50 { .. } => "INVALID_IC50",
            Self::NegativeCellCount { .. } => "NEGATIVE_CELL_COUNT",
            Self::MissingCommitmentDelay { .. } => "MISSING_COMMITMENT_DELAY",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
            Self::RngStreamMisuse { .. } => "RNG_STREAM_MISUSE",
            Self::QuantizationMissingCeiling { .. } => "QUANTIZATION_MISSING_CEILING",
            Self::EpistemicDeadlock { .. } => "EPISTEMIC_DEADLOCK",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error represents the dedicated deadlock terminal path
    /// (exit code 2) rather than a generic contract violation (exit code 1).
    #[must_use]
    pub const fn is_epistemic_deadlock(&self) -> bool {
        matches!(self, Self::EpistemicDeadlock { .. })
    }

    /// The process exit code this error should map to, per the CLI contract.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.is_epistemic_deadlock() { 2 } else { 1 }
    }
}
