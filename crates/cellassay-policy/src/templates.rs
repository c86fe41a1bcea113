//! Action -> proposal template mapping (§4.4).

use cellassay_core::{ActionKind, Proposal, WellSpec, has_no_treatment_identity};

/// Build the proposal for `action`, given the previous cycle's proposal
/// (needed by REPLICATE) and a fresh `layout_seed`.
#[must_use]
pub fn build_proposal(
    action: ActionKind,
    layout_seed: u64,
    cell_line: &str,
    candidate_compounds: &[(String, f64)],
    previous: Option<&Proposal>,
) -> Proposal {
    match action {
        ActionKind::Calibrate => calibrate_template(layout_seed, cell_line),
        ActionKind::Replicate => replicate_template(layout_seed, previous),
        ActionKind::Mitigate => mitigate_template(layout_seed, previous),
        ActionKind::Explore => explore_template(layout_seed, cell_line, candidate_compounds),
        ActionKind::NoDetection | ActionKind::None => terminal_template(layout_seed),
    }
}

fn control_well(well_id: &str, cell_line: &str) -> WellSpec {
    WellSpec {
        well_id: well_id.to_string(),
        cell_line: cell_line.to_string(),
        compounds: vec![("DMSO".to_string(), 0.0)],
        timepoint_h: 24.0,
        assay: "cell_painting".to_string(),
    }
}

/// Control-only plate of DMSO + sentinels, center-heavy layout, no
/// compounds — asserted by `has_no_treatment_identity`.
fn calibrate_template(layout_seed: u64, cell_line: &str) -> Proposal {
    let wells: Vec<WellSpec> = (0..24)
        .map(|i| control_well(&format!("cal_{i}"), cell_line))
        .collect();
    let proposal = Proposal {
        template_name: "calibrate_cell_paint_baseline".to_string(),
        wells,
        layout_seed,
        is_calibration: true,
    };
    debug_assert!(has_no_treatment_identity(&proposal));
    proposal
}

/// Duplicate the previous proposal with doubled replicates and a new
/// `layout_seed`.
fn replicate_template(layout_seed: u64, previous: Option<&Proposal>) -> Proposal {
    let Some(previous) = previous else {
        return Proposal {
            template_name: "replicate_fallback_baseline".to_string(),
            wells: Vec::new(),
            layout_seed,
            is_calibration: false,
        };
    };
    let mut wells = previous.wells.clone();
    let doubled: Vec<WellSpec> = previous
        .wells
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let mut replica = w.clone();
            replica.well_id = format!("{}_rep{i}", w.well_id);
            replica
        })
        .collect();
    wells.extend(doubled);
    Proposal {
        template_name: format!("replicate_{}", previous.template_name),
        wells,
        layout_seed,
        is_calibration: false,
    }
}

/// Replate with shuffled positions (the `World` performs the actual
/// position shuffle from `layout_seed`; here we only carry the same wells
/// forward under a new seed and template tag).
fn mitigate_template(layout_seed: u64, previous: Option<&Proposal>) -> Proposal {
    let wells = previous.map(|p| p.wells.clone()).unwrap_or_default();
    Proposal {
        template_name: "mitigation_replate".to_string(),
        wells,
        layout_seed,
        is_calibration: false,
    }
}

/// Dose-response or mechanism-probe template chosen to maximize expected
/// posterior entropy reduction. The concrete dose ladder is a policy
/// concern external collaborators tune; here a fixed half-log ladder
/// across the candidate compounds stands in for that choice.
fn explore_template(layout_seed: u64, cell_line: &str, candidate_compounds: &[(String, f64)]) -> Proposal {
    let doses = [0.0, 0.1, 0.3, 1.0, 3.0, 10.0];
    let mut wells = Vec::new();
    for (compound, ic50) in candidate_compounds {
        for (i, dose_multiple) in doses.iter().enumerate() {
            wells.push(WellSpec {
                well_id: format!("{compound}_{i}"),
                cell_line: cell_line.to_string(),
                compounds: if *dose_multiple == 0.0 {
                    vec![("DMSO".to_string(), 0.0)]
                } else {
                    vec![(compound.clone(), ic50 * dose_multiple)]
                },
                timepoint_h: 24.0,
                assay: "cell_painting".to_string(),
            });
        }
    }
    Proposal {
        template_name: "dose_response".to_string(),
        wells,
        layout_seed,
        is_calibration: false,
    }
}

fn terminal_template(layout_seed: u64) -> Proposal {
    Proposal {
        template_name: "terminal_no_wells".to_string(),
        wells: Vec::new(),
        layout_seed,
        is_calibration: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibrate_template_has_no_treatment_identity() {
        let proposal = build_proposal(ActionKind::Calibrate, 1, "HeLa", &[], None);
        assert!(has_no_treatment_identity(&proposal));
        assert!(proposal.is_calibration);
    }

    #[test]
    fn replicate_template_doubles_well_count() {
        let previous = build_proposal(
            ActionKind::Explore,
            1,
            "HeLa",
            &[("paclitaxel".to_string(), 0.1)],
            None,
        );
        let replica = build_proposal(ActionKind::Replicate, 2, "HeLa", &[], Some(&previous));
        assert_eq!(replica.well_count(), previous.well_count() * 2);
        assert_ne!(replica.layout_seed, previous.layout_seed);
    }

    #[test]
    fn explore_template_includes_dmso_control_and_treated_wells() {
        let proposal = build_proposal(
            ActionKind::Explore,
            1,
            "HeLa",
            &[("paclitaxel".to_string(), 0.1)],
            None,
        );
        assert!(proposal.wells.iter().any(|w| w.compounds[0].0 == "DMSO"));
        assert!(proposal.wells.iter().any(|w| w.compounds[0].0 == "paclitaxel"));
    }
}
