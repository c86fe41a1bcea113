//! Belief state and epistemic accountability.
//!
//! The Loop owns the single [`BeliefState`] and [`EpistemicController`]
//! instance for an episode; Policy reads a `&BeliefState` to score
//! candidate actions and the Controller decides admissibility before the
//! World executes anything.

#![forbid(unsafe_code)]

pub mod belief;
pub mod controller;
pub mod gates;
pub mod mechanism;

pub use belief::{BeliefMutation, BeliefState, HealthPressure};
pub use controller::{Admissibility, Claim, EpistemicController, Resolution};
pub use gates::{Assay, GateRecord, GateTransition, biological_claim_ready, ladder_satisfied};
pub use mechanism::MechanismPosterior;
