//! World: translates a `Proposal` into Biology VM calls and aggregates
//! wells into `ObservationCondition`s.

#![forbid(unsafe_code)]

pub mod condition;
pub mod execute;
pub mod layout;

pub use condition::build_conditions;
pub use execute::{WellResult, execute_proposal, group_by_condition};
pub use layout::allocate_positions;
