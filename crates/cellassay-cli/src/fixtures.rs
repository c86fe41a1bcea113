//! A small built-in compound/cell-line panel so `cellassay run` produces a
//! meaningful episode without requiring an external catalog file.
//!
//! Per scope, the numeric content here (IC50s, mechanisms) is exactly the
//! kind of detail an external collaborator supplies in production; this is
//! a stand-in panel for local runs and `--self-test`, not a curated assay
//! catalog.

use cellassay_vm::{CellLineParams, CompoundParams, ParamTables};

#[must_use]
pub fn default_params() -> ParamTables {
    let mut params = ParamTables::default();

    params.cell_lines.insert(
        "HeLa".to_string(),
        CellLineParams::typical("HeLa", 40_000.0, 0.03),
    );
    params.cell_lines.insert(
        "A549".to_string(),
        CellLineParams::typical("A549", 35_000.0, 0.025),
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
