//! The Loop Orchestrator: the integer-cycle state machine that sequences
//! Policy, the World, Belief, and the Epistemic Controller into one
//! episode (§4.5).

#![forbid(unsafe_code)]

pub mod context;
pub mod orchestrator;
pub mod pending;

pub use context::RunContext;
pub use orchestrator::{LoopOrchestrator, TerminalReason};
pub use pending::PendingAction;

#[cfg(test)]
mod tests {
    use super::*;
    use cellassay_core::RunConfig;
    use cellassay_vm::{CellLineParams, CompoundParams, ParamTables};

    fn params() -> ParamTables {
        let mut p = ParamTables::default();
        p.cell_lines.insert(
            "HeLa".to_string(),
            CellLineParams::typical("HeLa", 40_000.0, 0.03),
        );
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

    #[test]
    fn short_episode_runs_to_a_terminal_condition_and_writes_ledgers() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::new(42, 240, 8);
        let ctx = RunContext::new(42, config, params());
        let orchestrator = LoopOrchestrator::new(ctx);
        let summary = orchestrator.run(dir.path()).unwrap();

        assert!(summary.cycles_run >= 1);
        assert!(
            summary.wells_spent_calibration + summary.wells_spent_exploration + summary.wells_spent_mitigation
                <= summary.initial_budget
        );
        for name in [
            "decisions.jsonl",
            "evidence.jsonl",
            "diagnostics.jsonl",
            "refusals.jsonl",
            "mitigation.jsonl",
            "epistemic.jsonl",
            "episode_summary.json",
        ] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }
    }

    #[test]
    fn tiny_budget_terminates_via_deadlock_or_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::new(7, 10, 20);
        let ctx = RunContext::new(7, config, params());
        let orchestrator = LoopOrchestrator::new(ctx);
        let summary = orchestrator.run(dir.path()).unwrap();
        assert!(matches!(
            summary.terminal_reason.as_str(),
            "epistemic_deadlock" | "budget_exhausted" | "max_cycles"
        ));
    }

    #[test]
    fn same_seed_produces_identical_cycle_count() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let config_a = RunConfig::new(99, 240, 6);
        let config_b = RunConfig::new(99, 240, 6);
        let summary_a = LoopOrchestrator::new(RunContext::new(99, config_a, params()))
            .run(dir_a.path())
            .unwrap();
        let summary_b = LoopOrchestrator::new(RunContext::new(99, config_b, params()))
            .run(dir_b.path())
            .unwrap();
        assert_eq!(summary_a.cycles_run, summary_b.cycles_run);
        assert_eq!(summary_a.wells_spent_exploration, summary_b.wells_spent_exploration);
    }
}
