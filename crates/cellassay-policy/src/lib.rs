//! Action selection: EIV scoring, hysteresis, and proposal templates.

#![forbid(unsafe_code)]

pub mod scoring;
pub mod templates;

pub use scoring::{
    ScoringContext, score_calibrate, score_explore, score_mitigate, score_no_detection,
    score_replicate, select_action,
};
pub use templates::build_proposal;
