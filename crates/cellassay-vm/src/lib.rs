//! Deterministic biological virtual machine.
//!
//! Owns all vessel state exclusively; `cellassay-world` is the only caller
//! that should construct a [`BiologyVm`] during normal operation.

#![forbid(unsafe_code)]

pub mod measurement;
pub mod params;
pub mod vessel;
pub mod vm;

pub use measurement::{AssayReadout as MeasurementReadout, RawReading};
pub use params::{CellLineParams, CompoundParams, ParamTables, SubpopTemplate};
pub use vessel::{CommitmentKey, CompoundMeta, DeathLedger, Subpopulation, Vessel, VesselPhase};
pub use vm::{AssayReadout, BiologyVm};

#[cfg(test)]
mod tests {
    use super::*;
    use cellassay_core::{CommitmentDelayConfig, MeasurementConfig};

    fn test_params() -> ParamTables {
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

    fn vm() -> BiologyVm {
        BiologyVm::new(
            42,
            test_params(),
            CommitmentDelayConfig::default(),
            MeasurementConfig::default(),
        )
    }

    #[test]
    fn seed_vessel_rejects_duplicate_id() {
        let mut vm = vm();
        vm.seed_vessel("A1", "HeLa", 10_000, 0.95).unwrap();
        assert!(vm.seed_vessel("A1", "HeLa", 10_000, 0.95).is_err());
    }

    #[test]
    fn seed_vessel_weighted_mean_matches_initial_viability() {
        let mut vm = vm();
        vm.seed_vessel("A1", "HeLa", 10_000, 0.9).unwrap();
        let vessel = vm.vessel("A1").unwrap();
        assert!(vessel.weighted_mean_consistent());
        assert!((vessel.viability - 0.9).abs() < 1e-9);
    }

    #[test]
    fn treat_then_advance_keeps_weighted_mean_invariant() {
        let mut vm = vm();
        vm.seed_vessel("A1", "HeLa", 10_000, 0.95).unwrap();
        vm.treat_with_compound("A1", "paclitaxel", 1.0).unwrap();
        for _ in 0..12 {
            vm.advance_time("A1", 8.0).unwrap();
            let vessel = vm.vessel("A1").unwrap();
            assert!(vessel.weighted_mean_consistent());
        }
    }

    #[test]
    fn viability_never_increases_under_treatment() {
        let mut vm = vm();
        vm.seed_vessel("A1", "HeLa", 10_000, 0.95).unwrap();
        vm.treat_with_compound("A1", "paclitaxel", 5.0).unwrap();
        let mut last = vm.vessel("A1").unwrap().viability;
        for _ in 0..20 {
            vm.advance_time("A1", 4.0).unwrap();
            let current = vm.vessel("A1").unwrap().viability;
            assert!(current <= last + 1e-12, "viability increased: {last} -> {current}");
            last = current;
        }
    }

    #[test]
    fn measure_does_not_mutate_vessel_state() {
        let mut vm = vm();
        vm.seed_vessel("A1", "HeLa", 10_000, 0.9).unwrap();
        vm.treat_with_compound("A1", "paclitaxel", 1.0).unwrap();
        vm.advance_time("A1", 24.0).unwrap();
        let before = vm.vessel("A1").unwrap().clone();
        let _ = vm.measure("A1", "cell_painting").unwrap();
        let after = vm.vessel("A1").unwrap();
        assert!((before.viability - after.viability).abs() < 1e-12);
        assert_eq!(before.cell_count, after.cell_count);
        assert!((before.death.total() - after.death.total()).abs() < 1e-12);
    }

    #[test]
    fn unknown_vessel_is_rejected() {
        let mut vm = vm();
        assert!(vm.treat_with_compound("ghost", "paclitaxel", 1.0).is_err());
        assert!(vm.advance_time("ghost", 1.0).is_err());
        assert!(vm.measure("ghost", "cell_painting").is_err());
    }

    #[test]
    fn unknown_compound_is_rejected() {
        let mut vm = vm();
        vm.seed_vessel("A1", "HeLa", 10_000, 0.9).unwrap();
        assert!(vm.treat_with_compound("A1", "not_a_real_compound", 1.0).is_err());
    }
}
