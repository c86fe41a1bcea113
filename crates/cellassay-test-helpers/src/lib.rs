//! Deterministic fixture builders shared by the other crates' test modules.
//!
//! Every cellassay crate was independently re-declaring the same
//! `HeLa` / `paclitaxel` fixture in its own `#[cfg(test)]` module. This
//! crate is the single place that content lives, as a dev-dependency.

use cellassay_core::RunConfig;
use cellassay_vm::{CellLineParams, CompoundParams, ParamTables};

/// A single cell line (`HeLa`) and a single compound (paclitaxel), enough
/// for any test that only needs one of each.
#[must_use]
pub fn minimal_params() -> ParamTables {
    let mut params = ParamTables::default();
    params.cell_lines.insert(
        "HeLa".to_string(),
        CellLineParams::typical("HeLa", 40_000.0, 0.03),
    );
    params.compounds.insert(
        "paclitaxel".to_string(),
        CompoundParams {
            name: "paclitaxel".to_string(),
            ic50_um: 0.1,
            hill_slope: 1.5,
            mechanism: "microtubule".to_string(),
            stress_axis: "mitotic".to_string(),
        },
    );
    params
}

/// Two cell lines and three compounds spanning distinct mechanism buckets,
/// for tests that exercise mechanism-posterior discrimination or cross-line
/// comparisons.
#[must_use]
pub fn rich_params() -> ParamTables {
    let mut params = minimal_params();
    params.cell_lines.insert(
        "A549".to_string(),
        CellLineParams::typical("A549", 35_000.0, 0.025),
    );
    params.compounds.insert(
        "staurosporine".to_string(),
        CompoundParams {
            name: "staurosporine".to_string(),
            ic50_um: 0.05,
            hill_slope: 1.2,
            mechanism: "kinase_inhibition".to_string(),
            stress_axis: "apoptotic".to_string(),
        },
    );
    params.compounds.insert(
        "tunicamycin".to_string(),
        CompoundParams {
            name: "tunicamycin".to_string(),
            ic50_um: 2.0,
            hill_slope: 1.0,
            mechanism: "er_stress".to_string(),
            stress_axis: "unfolded_protein_response".to_string(),
        },
    );
    params
}

/// A `RunConfig` sized for fast unit tests: small budget, few cycles.
#[must_use]
pub fn tiny_run_config(seed: u64) -> RunConfig {
    RunConfig::new(seed, 240, 8)
}

/// A temp directory scoped to the caller; ledgers are written underneath.
///
/// # Panics
/// Panics if a temp directory cannot be created, which only happens under
/// filesystem exhaustion and is not worth propagating in test code.
#[must_use]
pub fn ledger_scratch_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("create scratch dir for ledger output")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_params_has_hela_and_paclitaxel() {
        let params = minimal_params();
        assert!(params.cell_line("HeLa").is_some());
        assert!(params.compound("paclitaxel").is_some());
    }

    #[test]
    fn rich_params_has_three_distinct_mechanisms() {
        let params = rich_params();
        let mechanisms: std::collections::BTreeSet<_> = params
            .compounds
            .values()
            .map(|c| c.mechanism.clone())
            .collect();
        assert_eq!(mechanisms.len(), 3);
    }
}
