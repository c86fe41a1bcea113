//! Proposal execution: one independent `BiologyVm` per well, run in
//! parallel, collected in input order, then sorted by a stable key before
//! aggregation (§5).

use std::collections::BTreeMap;

use cellassay_core::error::Result;
use cellassay_core::{CommitmentDelayConfig, MeasurementConfig, PlateLayoutConfig, WellSpec};
use cellassay_vm::{AssayReadout, BiologyVm, ParamTables};
use rayon::prelude::*;

use crate::layout::allocate_positions;

/// One well's outcome, tagged with everything the `World`'s aggregation
/// groups by, plus the physical position it was run at.
#[derive(Debug, Clone)]
pub struct WellResult {
    pub well_id: String,
    pub position: (u32, u32),
    pub cell_line: String,
    pub compound: String,
    pub dose_um: f64,
    pub timepoint_h: f64,
    pub readout: AssayReadout,
}

/// The stable sort key from §5: `(plate_id, cell_line, well_id, compound,
/// dose, timepoint)`.
fn stable_key(plate_id: &str, r: &WellResult) -> (String, String, String, String, u64, u64) {
    (
        plate_id.to_string(),
        r.cell_line.clone(),
        r.well_id.clone(),
        r.compound.clone(),
        r.dose_um.to_bits(),
        r.timepoint_h.to_bits(),
    )
}

/// Run every well in `wells` independently and in parallel. Workers
/// receive `(well_spec, run_seed, deterministic_batch_seed)` — no shared
/// RNG — derived from `run_seed` and the well's index so results never
/// depend on which thread executed which well.
pub fn execute_proposal(
    plate_id: &str,
    run_seed: u64,
    wells: &[WellSpec],
    layout: &PlateLayoutConfig,
    layout_seed: u64,
    params: &ParamTables,
    commitment_cfg: &CommitmentDelayConfig,
    measurement_cfg: &MeasurementConfig,
) -> Result<Vec<WellResult>> {
    let positions = allocate_positions(layout, layout_seed, wells.len());

    let mut results: Vec<Result<WellResult>> = wells
        .par_iter()
        .enumerate()
        .map(|(i, well)| {
            let batch_seed = cellassay_core::stable_hash_u64(run_seed, &format!("well:{i}:{}", well.well_id));
            run_single_well(batch_seed, well, params.clone(), *commitment_cfg, *measurement_cfg)
        })
        .collect();

    let mut collected = Vec::with_capacity(results.len());
    for (i, result) in results.drain(..).enumerate() {
        let mut well_result = result?;
        well_result.position = positions.get(i).copied().unwrap_or((0, 0));
        collected.push(well_result);
    }

    collected.sort_by(|a, b| stable_key(plate_id, a).cmp(&stable_key(plate_id, b)));
    Ok(collected)
}

fn run_single_well(
    seed: u64,
    well: &WellSpec,
    params: ParamTables,
    commitment_cfg: CommitmentDelayConfig,
    measurement_cfg: MeasurementConfig,
) -> Result<WellResult> {
    let mut vm = BiologyVm::new(seed, params, commitment_cfg, measurement_cfg);
    vm.seed_vessel(&well.well_id, &well.cell_line, 10_000, 0.95)?;

    let (compound, dose) = well
        .compounds
        .first()
        .cloned()
        .unwrap_or_else(|| ("DMSO".to_string(), 0.0));
    if compound != "DMSO" && dose > 0.0 {
        vm.treat_with_compound(&well.well_id, &compound, dose)?;
    }
    vm.advance_time(&well.well_id, well.timepoint_h)?;
    let readout = vm.measure(&well.well_id, &well.assay)?;

    Ok(WellResult {
        well_id: well.well_id.clone(),
        position: (0, 0),
        cell_line: well.cell_line.clone(),
        compound,
        dose_um: dose,
        timepoint_h: well.timepoint_h,
        readout,
    })
}

/// Group executed wells by `(compound, dose, timepoint, cell_line,
/// position_class)`, deriving position class from coordinates.
#[must_use]
pub fn group_by_condition<'a>(
    layout: &PlateLayoutConfig,
    results: &'a [WellResult],
) -> BTreeMap<(String, u64, u64, String, &'static str), Vec<&'a WellResult>> {
    let mut groups: BTreeMap<(String, u64, u64, String, &'static str), Vec<&WellResult>> = BTreeMap::new();
    for result in results {
        let position_class = layout.position_class(result.position.0, result.position.1).as_str();
        let key = (
            result.compound.clone(),
            result.dose_um.to_bits(),
            result.timepoint_h.to_bits(),
            result.cell_line.clone(),
            position_class,
        );
        groups.entry(key).or_default().push(result);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellassay_vm::{CellLineParams, CompoundParams};

    fn params() -> ParamTables {
        let mut p = ParamTables::default();
        p.cell_lines.insert("HeLa".to_string(), CellLineParams::typical("HeLa", 40_000.0, 0.03));
        p.compounds.insert(
            "paclitaxel".to_string(),
            CompoundParams {
                name: "paclitaxel".to_string(),
                ic50_um: 0.1,
                hill_slope: 1.5,
                mechanism: "microtubule".to_string(),
                stress_axis: "mitotic".to_string(),
            },
        );
        p
    }

    fn wells() -> Vec<WellSpec> {
        vec![
            WellSpec {
                well_id: "w0".into(),
                cell_line: "HeLa".into(),
                compounds: vec![("DMSO".into(), 0.0)],
                timepoint_h: 24.0,
                assay: "cell_painting".into(),
            },
            WellSpec {
                well_id: "w1".into(),
                cell_line: "HeLa".into(),
                compounds: vec![("paclitaxel".into(), 1.0)],
                timepoint_h: 24.0,
                assay: "cell_painting".into(),
            },
        ]
    }

    #[test]
    fn execution_order_is_independent_of_thread_count() {
        let layout = PlateLayoutConfig::default();
        let a = execute_proposal("p1", 42, &wells(), &layout, 1, &params(), &CommitmentDelayConfig::default(), &MeasurementConfig::default()).unwrap();
        let b = execute_proposal("p1", 42, &wells(), &layout, 1, &params(), &CommitmentDelayConfig::default(), &MeasurementConfig::default()).unwrap();
        let ids_a: Vec<_> = a.iter().map(|r| r.well_id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|r| r.well_id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn results_are_sorted_by_stable_key() {
        let layout = PlateLayoutConfig::default();
        let results = execute_proposal("p1", 42, &wells(), &layout, 1, &params(), &CommitmentDelayConfig::default(), &MeasurementConfig::default()).unwrap();
        let keys: Vec<_> = results.iter().map(|r| stable_key("p1", r)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn grouping_buckets_by_condition() {
        let layout = PlateLayoutConfig::default();
        let results = execute_proposal("p1", 42, &wells(), &layout, 1, &params(), &CommitmentDelayConfig::default(), &MeasurementConfig::default()).unwrap();
        let groups = group_by_condition(&layout, &results);
        assert_eq!(groups.values().map(std::vec::Vec::len).sum::<usize>(), results.len());
    }
}
