//! `RunContext`: the explicit, passed-around state every subsystem reads
//! from. No global mutable RNG or config (§9).

use cellassay_core::RunConfig;
use cellassay_vm::ParamTables;

/// Everything the Loop needs to construct once per episode and thread
/// through every cycle.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub seed: u64,
    pub config: RunConfig,
    pub params: ParamTables,
}

impl RunContext {
    #[must_use]
    pub fn new(seed: u64, config: RunConfig, params: ParamTables) -> Self {
        Self { seed, config, params }
    }
}
