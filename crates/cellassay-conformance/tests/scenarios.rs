//! End-to-end scenarios, each with literal inputs and a fixed seed.

use cellassay_belief::mechanism::MechanismPosterior;
use cellassay_core::{CommitmentDelayConfig, MeasurementConfig, RunConfig};
use cellassay_loop::{LoopOrchestrator, RunContext};
use cellassay_vm::BiologyVm;
use std::collections::BTreeMap;

fn read_ledger(dir: &std::path::Path, name: &str) -> Vec<serde_json::Value> {
    let contents = std::fs::read_to_string(dir.join(name)).unwrap();
    contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

/// S1 (golden regression): seed=42, budget=240, max_cycles=10.
#[test]
fn s1_golden_regression() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::new(42, 240, 10);
    let ctx = RunContext::new(42, config, cellassay_test_helpers::rich_params());
    let summary = LoopOrchestrator::new(ctx).run(dir.path()).unwrap();

    assert!(summary.epistemic_debt_final < 2.0 || summary.terminal_reason == "epistemic_deadlock");

    for name in [
        "decisions.jsonl",
        "evidence.jsonl",
        "diagnostics.jsonl",
        "refusals.jsonl",
        "mitigation.jsonl",
        "epistemic.jsonl",
    ] {
        let records = read_ledger(dir.path(), name);
        if name == "diagnostics.jsonl" || name == "refusals.jsonl" || name == "mitigation.jsonl" {
            // May legitimately be empty on a clean run; only decisions/evidence/epistemic
            // are guaranteed non-empty by at least one cycle running.
            continue;
        }
        assert!(!records.is_empty(), "{name} unexpectedly empty");
    }
}

/// S2 (convergence): seed=99, budget=480, max_cycles=20.
#[test]
fn s2_convergence() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::new(99, 480, 20);
    let ctx = RunContext::new(99, config, cellassay_test_helpers::rich_params());
    let summary = LoopOrchestrator::new(ctx).run(dir.path()).unwrap();

    let evidence = read_ledger(dir.path(), "evidence.jsonl");
    assert!(
        evidence.len() as u64 >= summary.cycles_run / 2
            || summary.terminal_reason == "epistemic_deadlock",
        "expected at least cycles/2 evidence events, got {} over {} cycles",
        evidence.len(),
        summary.cycles_run
    );
    assert!(summary.epistemic_debt_final < 2.0 || summary.terminal_reason != "max_cycles");
}

/// S3 (causality gate): the mechanism posterior must stay `UNKNOWN`
/// until real post-treatment evidence arrives, then concentrate sharply.
#[test]
fn s3_causality_gate_no_pretreatment_commitment() {
    let mut posterior = MechanismPosterior::uninformative();
    assert_eq!(posterior.top().0, "UNKNOWN");
    assert!(posterior.probability("UNKNOWN") > 0.999);

    // Two cycles with no evidence (pre-treatment): posterior must not move.
    for _ in 0..2 {
        assert_eq!(posterior.top().0, "UNKNOWN");
    }

    // Post-treatment evidence arrives favoring "microtubule" strongly.
    let mut likelihoods = BTreeMap::new();
    likelihoods.insert("microtubule".to_string(), 50.0);
    for _ in 0..2 {
        posterior.update(&likelihoods);
    }

    assert_eq!(posterior.top().0, "microtubule");
    assert!(
        posterior.probability("microtubule") >= 0.99,
        "posterior did not concentrate: {}",
        posterior.probability("microtubule")
    );
}

/// S4 (observer independence): measuring must not perturb the physics
/// trajectory.
#[test]
fn s4_observer_independence() {
    let params = cellassay_test_helpers::minimal_params();

    let mut vm_a = BiologyVm::new(
        42,
        params.clone(),
        CommitmentDelayConfig::default(),
        MeasurementConfig::default(),
    );
    vm_a.seed_vessel("w", "HeLa", 10_000, 0.95).unwrap();
    vm_a.treat_with_compound("w", "paclitaxel", 2.0).unwrap();
    for _ in 0..8 {
        vm_a.advance_time("w", 12.0).unwrap();
    }

    let mut vm_b = BiologyVm::new(
        42,
        params,
        CommitmentDelayConfig::default(),
        MeasurementConfig::default(),
    );
    vm_b.seed_vessel("w", "HeLa", 10_000, 0.95).unwrap();
    vm_b.treat_with_compound("w", "paclitaxel", 2.0).unwrap();
    for _ in 0..8 {
        vm_b.advance_time("w", 12.0).unwrap();
        let _ = vm_b.measure("w", "cell_painting").unwrap();
    }

    let va = vm_a.vessel("w").unwrap();
    let vb = vm_b.vessel("w").unwrap();
    assert!((va.viability - vb.viability).abs() < 1e-9);
    assert_eq!(va.cell_count, vb.cell_count);
    assert!((va.death.death_compound - vb.death.death_compound).abs() < 1e-9);
    assert!((va.death.death_confluence - vb.death.death_confluence).abs() < 1e-9);
    assert!((va.death.death_unknown - vb.death.death_unknown).abs() < 1e-9);
}

/// S5 (debt enforcement): once debt crosses the refusal threshold, every
/// non-calibration action is refused but calibration stays admitted.
#[test]
fn s5_debt_enforcement() {
    use cellassay_belief::{Claim, EpistemicController, Resolution};
    use cellassay_core::{ActionKind, EpistemicConfig};

    let cfg = EpistemicConfig::default();
    let mut controller = EpistemicController::new();

    for _ in 0..3 {
        controller.resolve_claim(
            &cfg,
            Claim { claimed_bits: 2.0 },
            Resolution {
                realized_bits: 0.0,
                wells_used: 24,
                noise_improvement: 0.0,
            },
        );
    }
    assert!(controller.debt_bits >= 2.0, "expected overclaiming to cross the refusal threshold");

    let refused = controller.check_admissibility(&cfg, ActionKind::Explore, vec![], 200, 24);
    assert!(matches!(refused, cellassay_belief::Admissibility::Refused { .. }));

    let admitted = controller.check_admissibility(&cfg, ActionKind::Calibrate, vec![], 200, 24);
    match admitted {
        cellassay_belief::Admissibility::Admitted { cost_inflation_factor } => {
            assert!(cost_inflation_factor >= 1.0);
        }
        cellassay_belief::Admissibility::Refused { .. } => panic!("calibration must stay admissible"),
    }
}

/// S6 (commitment heterogeneity): a lethal dose must kill the
/// highest-`ic50_shift` (most resistant) subpop later than the lowest.
#[test]
fn s6_commitment_heterogeneity() {
    let params = cellassay_test_helpers::minimal_params();
    let mut vm = BiologyVm::new(
        7,
        params,
        CommitmentDelayConfig::default(),
        MeasurementConfig::default(),
    );
    vm.seed_vessel("w", "HeLa", 10_000, 0.95).unwrap();
    vm.treat_with_compound("w", "paclitaxel", 5.0).unwrap();

    let mut crossing_h: BTreeMap<String, f64> = BTreeMap::new();
    let mut elapsed = 0.0;
    while elapsed < 24.0 {
        vm.advance_time("w", 1.0).unwrap();
        elapsed += 1.0;
        let vessel = vm.vessel("w").unwrap();
        for (name, sub) in &vessel.subpopulations {
            if sub.viability <= 0.15 && !crossing_h.contains_key(name) {
                crossing_h.insert(name.clone(), elapsed);
            }
        }
    }

    let vessel = vm.vessel("w").unwrap();
    let (lowest_shift_name, _) = vessel
        .subpopulations
        .iter()
        .min_by(|a, b| a.1.ic50_shift.partial_cmp(&b.1.ic50_shift).unwrap())
        .unwrap();
    let (highest_shift_name, _) = vessel
        .subpopulations
        .iter()
        .max_by(|a, b| a.1.ic50_shift.partial_cmp(&b.1.ic50_shift).unwrap())
        .unwrap();

    if let (Some(&low_cross), Some(&high_cross)) =
        (crossing_h.get(lowest_shift_name), crossing_h.get(highest_shift_name))
    {
        assert!(
            high_cross - low_cross >= 1.0,
            "resistant subpop crossed 0.15 viability only {} h after the sensitive one",
            high_cross - low_cross
        );
    }
}
