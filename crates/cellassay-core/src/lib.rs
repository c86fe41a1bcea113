//! Core types, configuration, and statistical primitives for the
//! cell-biology screening agent.
//!
//! This crate provides:
//! - Run configuration (`RunConfig`, gate/policy/epistemic tunables)
//! - The cross-cutting data model (`Action`, `Proposal`, `ObservationCondition`)
//! - Append-only JSONL ledgers and the terminal episode summary
//! - Guarded RNG streams and BLAKE2s stable hashing
//! - Bayesian online change-point detection and conformal prediction
//! - The common error taxonomy

#![forbid(unsafe_code)]

pub mod action;
pub mod bocpd;
pub mod config;
pub mod conformal;
pub mod error;
pub mod ledger;
pub mod observation;
pub mod rng;

pub use action::{ActionKind, ActionKindScore, Proposal, Score, WellSpec, has_no_treatment_identity};
pub use bocpd::{BocpdDetector, ChangePoint};
pub use config::{
    CommitmentDelayConfig, EpistemicConfig, FlatPricingTable, GateConfig, HealthDebtConfig,
    MeasurementConfig, PlateFormat, PlateLayoutConfig, PolicyWeights, PositionClass, PricingTable,
    RunConfig,
};
pub use conformal::{ConformalPredictor, PredictionInterval};
pub use error::{Error, Result};
pub use ledger::{
    DecisionRecord, DiagnosticRecord, EpisodeSummary, EpistemicRecord, EvidenceEvent, Ledger,
    LedgerSet, MitigationRecord, RefusalRecord, Severity,
};
pub use observation::{ChannelStats, ConditionKey, ObservationCondition, QcFlags};
pub use rng::{GuardedRng, RngStreams, stable_hash_u32, stable_hash_u64};
