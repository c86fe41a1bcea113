//! Read-only parameter tables for compounds and cell lines.
//!
//! Per scope, the *numeric content* of these tables (EC50s, Hill slopes,
//! baseline morphology) is an external collaborator's concern — this module
//! only prescribes the shape the VM consumes and loads it once at startup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One compound's dose-response and mechanism metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundParams {
    pub name: String,
    /// Half-maximal inhibitory concentration, micromolar.
    pub ic50_um: f64,
    pub hill_slope: f64,
    /// Which posterior mechanism bucket this compound's effect belongs to.
    pub mechanism: String,
    /// Dominant cellular-stress axis this compound perturbs.
    pub stress_axis: String,
}

/// Subpopulation template within a cell line: a named fraction of the
/// population with its own IC50 shift multiplier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubpopTemplate {
    pub fraction: f64,
    pub ic50_shift: f64,
}

/// One cell line's baseline morphology and subpopulation structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellLineParams {
    pub name: String,
    /// Typical fractions 0.25 / 0.50 / 0.25 across resistant/median/sensitive.
    pub subpopulations: HashMap<String, SubpopTemplate>,
    pub baseline_morphology: HashMap<String, f64>,
    pub proliferation_index: f64,
    pub carrying_capacity: f64,
}

impl CellLineParams {
    /// A three-way resistant/median/sensitive split matching the typical
    /// 0.25/0.50/0.25 fractions named in §4.1.
    #[must_use]
    pub fn typical(name: &str, carrying_capacity: f64, proliferation_index: f64) -> Self {
        let mut subpopulations = HashMap::new();
        subpopulations.insert(
            "resistant".to_string(),
            SubpopTemplate {
                fraction: 0.25,
                ic50_shift: 1.5,
            },
        );
        subpopulations.insert(
            "median".to_string(),
            SubpopTemplate {
                fraction: 0.50,
                ic50_shift: 1.0,
            },
        );
        subpopulations.insert(
            "sensitive".to_string(),
            SubpopTemplate {
                fraction: 0.25,
                ic50_shift: 0.6,
            },
        );
        Self {
            name: name.to_string(),
            subpopulations,
            baseline_morphology: HashMap::new(),
            proliferation_index,
            carrying_capacity,
        }
    }
}

/// The read-only mapping loaded once at VM startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamTables {
    pub compounds: HashMap<String, CompoundParams>,
    pub cell_lines: HashMap<String, CellLineParams>,
}

impl ParamTables {
    #[must_use]
    pub fn compound(&self, name: &str) -> Option<&CompoundParams> {
        self.compounds.get(name)
    }

    #[must_use]
    pub fn cell_line(&self, name: &str) -> Option<&CellLineParams> {
        self.cell_lines.get(name)
    }
}
