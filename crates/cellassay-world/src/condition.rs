//! Reduce grouped `WellResult`s into `ObservationCondition`s.

use std::collections::BTreeMap;

use cellassay_core::{ConditionKey, ObservationCondition, PlateLayoutConfig, PositionClass, QcFlags};

use crate::execute::{WellResult, group_by_condition};

fn position_class_from_str(s: &str) -> PositionClass {
    match s {
        "edge" => PositionClass::Edge,
        _ => PositionClass::Center,
    }
}

/// Aggregate all executed wells into one `ObservationCondition` per
/// `(compound, dose, timepoint, cell_line, position_class)` group.
/// QC flags are computed over the morphology channel spread within each
/// group as a stand-in for a dedicated spatial QC pass.
#[must_use]
pub fn build_conditions(layout: &PlateLayoutConfig, results: &[WellResult]) -> Vec<ObservationCondition> {
    let groups = group_by_condition(layout, results);
    groups
        .into_iter()
        .map(|((compound, dose_bits, timepoint_bits, cell_line, position_class), wells)| {
            let viability: Vec<f64> = wells.iter().filter_map(|w| w.readout.viability).collect();
            let ldh: Vec<Option<f64>> = wells.iter().map(|w| w.readout.ldh).collect();

            let mut morphology: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
            for well in &wells {
                for (channel, reading) in &well.readout.morphology {
                    morphology.entry(channel.clone()).or_default().push(*reading);
                }
            }

            let qc = compute_qc_flags(&wells);

            ObservationCondition::aggregate(
                ConditionKey {
                    compound,
                    dose_um: f64::from_bits(dose_bits),
                    timepoint_h: f64::from_bits(timepoint_bits),
                    cell_line,
                    position_class: position_class_from_str(position_class),
                },
                &viability,
                &ldh,
                &morphology,
                qc,
            )
        })
        .collect()
}

fn compute_qc_flags(wells: &[&WellResult]) -> QcFlags {
    let viabilities: Vec<f64> = wells.iter().filter_map(|w| w.readout.viability).collect();
    let nuclei_cv = if viabilities.len() > 1 {
        let mean = viabilities.iter().sum::<f64>() / viabilities.len() as f64;
        let variance =
            viabilities.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / viabilities.len() as f64;
        if mean.abs() > 1e-9 { variance.sqrt() / mean } else { 0.0 }
    } else {
        0.0
    };
    QcFlags {
        morans_i: 0.0,
        nuclei_cv,
        segmentation_quality: 1.0,
    }
}
