//! The Loop Orchestrator: the integer-cycle state machine (§4.5).

use std::collections::BTreeMap;
use std::path::Path;

use cellassay_belief::{Assay, BeliefState, Claim, EpistemicController, Resolution};
use cellassay_core::error::{Error, Result};
use cellassay_core::{
    ActionKind, DecisionRecord, DiagnosticRecord, EpisodeSummary, EpistemicRecord, EvidenceEvent,
    LedgerSet, MitigationRecord, Proposal, RefusalRecord, Severity,
};
use cellassay_policy::{ScoringContext, build_proposal, select_action};
use cellassay_world::{build_conditions, execute_proposal};

use crate::context::RunContext;
use crate::pending::PendingAction;

fn guard_cycle_and_budget(
    previous_cycle: u64,
    cycle: u64,
    initial_budget: u32,
    spent: u32,
    remaining: u32,
) -> Result<()> {
    cellassay_guard::assert_cycle_monotonic(previous_cycle, cycle)?;
    cellassay_guard::assert_budget_conserved(initial_budget, spent, remaining)?;
    Ok(())
}

/// Why an episode stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    BudgetExhausted,
    MaxCycles,
    EpistemicDeadlock,
    ExplicitTerminal,
}

impl TerminalReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BudgetExhausted => "budget_exhausted",
            Self::MaxCycles => "max_cycles",
            Self::EpistemicDeadlock => "epistemic_deadlock",
            Self::ExplicitTerminal => "explicit_terminal",
        }
    }

    /// Exit-code mapping from §6: 2 deadlock, 3 budget exhausted without
    /// deadlock, 0 otherwise.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::EpistemicDeadlock => 2,
            Self::BudgetExhausted => 3,
            Self::MaxCycles | Self::ExplicitTerminal => 0,
        }
    }
}

/// Drives one full episode from cycle 1 to termination, owning belief,
/// the controller, and the budget. The sole mutator of `BeliefState` and
/// the sole owner of the ledgers.
pub struct LoopOrchestrator {
    ctx: RunContext,
    belief: BeliefState,
    controller: EpistemicController,
    budget_remaining: u32,
    wells_spent_calibration: u32,
    wells_spent_exploration: u32,
    wells_spent_mitigation: u32,
    cycle: u64,
    previous_cycle: u64,
    pending: Option<PendingAction>,
    previous_proposal: Option<Proposal>,
    distinct_templates: std::collections::BTreeSet<String>,
    calibration_decisions: Vec<String>,
    gates_earned_total: Vec<String>,
    gates_lost_total: Vec<String>,
    mitigation_count: u32,
    entropy_start_bits: f64,
}

impl LoopOrchestrator {
    #[must_use]
    pub fn new(ctx: RunContext) -> Self {
        let belief = BeliefState::new();
        let entropy_start_bits = belief.estimate_calibration_uncertainty();
        Self {
            budget_remaining: ctx.config.initial_budget_wells,
            belief,
            controller: EpistemicController::new(),
            wells_spent_calibration: 0,
            wells_spent_exploration: 0,
            wells_spent_mitigation: 0,
            cycle: 0,
            previous_cycle: 0,
            pending: None,
            previous_proposal: None,
            distinct_templates: std::collections::BTreeSet::new(),
            calibration_decisions: Vec::new(),
            gates_earned_total: Vec::new(),
            gates_lost_total: Vec::new(),
            mitigation_count: 0,
            entropy_start_bits,
            ctx,
        }
    }

    /// Run the episode to completion, writing all ledgers under `out_dir`,
    /// and return the terminal summary.
    pub fn run(mut self, out_dir: &Path) -> Result<EpisodeSummary> {
        let mut ledgers = LedgerSet::open(out_dir)?;
        let initial_budget = self.ctx.config.initial_budget_wells;

        let reason = loop {
            self.cycle += 1;
            if self.cycle > self.ctx.config.max_cycles {
                self.cycle -= 1;
                break TerminalReason::MaxCycles;
            }

            let cheapest_calibration_cost = 24;
            if self.controller.is_deadlocked(
                &self.ctx.config.epistemic,
                self.budget_remaining,
                cheapest_calibration_cost,
            ) {
                ledgers.diagnostics.append(DiagnosticRecord {
                    cycle: self.cycle,
                    timestamp: timestamp(),
                    event_type: "diagnostic".to_string(),
                    severity: Severity::Fatal,
                    message: "epistemic deadlock: cheapest calibration unaffordable".to_string(),
                    qc_flags: vec![],
                })?;
                tracing::warn!(
                    cycle = self.cycle,
                    budget_remaining = self.budget_remaining,
                    debt_bits = self.controller.debt_bits,
                    "episode entering epistemic deadlock"
                );
                break TerminalReason::EpistemicDeadlock;
            }

            guard_cycle_and_budget(
                self.previous_cycle,
                self.cycle,
                initial_budget,
                self.wells_spent_calibration + self.wells_spent_exploration + self.wells_spent_mitigation,
                self.budget_remaining,
            )?;
            self.previous_cycle = self.cycle;

            if let Some(pending) = self.pending.take() {
                self.run_pending_cycle(pending, &mut ledgers)?;
                continue;
            }

            match self.run_science_cycle(&mut ledgers)? {
                CycleOutcome::Continue => {}
                CycleOutcome::BudgetExhausted => break TerminalReason::BudgetExhausted,
                CycleOutcome::Terminal => break TerminalReason::ExplicitTerminal,
            }
        };

        assert_eq!(
            self.wells_spent_calibration + self.wells_spent_exploration + self.wells_spent_mitigation
                + self.budget_remaining,
            initial_budget,
            "budget conservation violated at episode end"
        );

        let summary = EpisodeSummary {
            seed: self.ctx.seed,
            initial_budget,
            cycles_run: self.cycle,
            terminal_reason: reason.as_str().to_string(),
            wells_spent_calibration: self.wells_spent_calibration,
            wells_spent_exploration: self.wells_spent_exploration,
            wells_spent_mitigation: self.wells_spent_mitigation,
            entropy_reduction_bits: (self.entropy_start_bits - self.belief.estimate_calibration_uncertainty())
                .max(0.0),
            gates_earned: self.gates_earned_total.clone(),
            gates_lost: self.gates_lost_total.clone(),
            mitigation_count: self.mitigation_count,
            health_debt_final: self.belief.health_debt,
            epistemic_debt_final: self.controller.debt_bits,
            calibration_decisions: self.calibration_decisions.clone(),
            distinct_templates: self.distinct_templates.iter().cloned().collect(),
            efficiency_bits_per_plate_equivalent: {
                let plates = f64::from(initial_budget - self.budget_remaining) / 96.0;
                if plates > 0.0 {
                    (self.entropy_start_bits - self.belief.estimate_calibration_uncertainty()).max(0.0) / plates
                } else {
                    0.0
                }
            },
        };
        ledgers.write_summary(&summary)?;
        tracing::info!(
            seed = summary.seed,
            cycles_run = summary.cycles_run,
            terminal_reason = %summary.terminal_reason,
            epistemic_debt_final = summary.epistemic_debt_final,
            "episode finished"
        );
        Ok(summary)
    }

    fn run_pending_cycle(&mut self, pending: PendingAction, ledgers: &mut LedgerSet) -> Result<()> {
        let action = pending.action_kind();
        let proposal = build_proposal(action, self.cycle, "HeLa", &[], self.previous_proposal.as_ref());
        let wells = proposal.well_count();
        self.spend(action, wells)?;
        self.distinct_templates.insert(proposal.template_name.clone());

        let before = self.belief.health_debt;
        match pending {
            PendingAction::Mitigation => {
                self.belief.apply_mitigation_decay(self.ctx.config.health_debt.mitigation_decay);
                self.mitigation_count += 1;
                ledgers.mitigation.append(MitigationRecord {
                    cycle: self.cycle,
                    timestamp: timestamp(),
                    event_type: "mitigation".to_string(),
                    reason: "qc_flag_severity_exceeded".to_string(),
                    wells_used: wells,
                    health_debt_before: before,
                    health_debt_after: self.belief.health_debt,
                })?;
            }
            PendingAction::ForceCalibration => {
                self.calibration_decisions.push(proposal.template_name.clone());
                let repayment = self.controller.repay_from_calibration(
                    &self.ctx.config.epistemic,
                    Resolution {
                        realized_bits: 0.5,
                        wells_used: wells,
                        noise_improvement: 0.5,
                    },
                );
                ledgers.epistemic.append(EpistemicRecord {
                    cycle: self.cycle,
                    timestamp: timestamp(),
                    event_type: "epistemic".to_string(),
                    claimed_bits: 0.0,
                    realized_bits: repayment,
                    debt_delta: -repayment,
                    debt_total: self.controller.debt_bits,
                    cost_inflation_factor: 1.0,
                    insolvent: self.controller.insolvent,
                })?;
            }
        }

        self.previous_proposal = Some(proposal);
        self.belief.record_action(action);
        Ok(())
    }

    fn run_science_cycle(&mut self, ledgers: &mut LedgerSet) -> Result<CycleOutcome> {
        let ctx = ScoringContext {
            budget_remaining: self.budget_remaining,
            proposed_wells_explore: 36,
            proposed_wells_calibrate: 24,
            proposed_wells_mitigate: 24,
            expected_information_gain_bits: self.belief.mechanism_posterior.entropy_bits().max(0.1),
            calibrated_confidence: 1.0 - (self.belief.mechanism_posterior.entropy_bits() / 3.0).min(1.0),
            elapsed_hours: f64::from(self.cycle as u32) * 24.0,
            operations_count: f64::from(self.cycle as u32),
            debt_bits: self.controller.debt_bits,
            debt_target_bits: 0.0,
        };

        let (action, candidates) = select_action(
            &self.ctx.config.policy_weights,
            &self.belief,
            &ctx,
            self.ctx.config.epistemic.calibration_reserve_wells,
            self.belief.health_pressure(
                self.ctx.config.health_debt.medium_pressure_threshold,
                self.ctx.config.health_debt.high_pressure_threshold,
            ) as u8 as f64
                * 0.2,
            0.5,
            (self.controller.debt_bits - self.ctx.config.epistemic.refusal_threshold_bits).max(0.0),
        );

        if action == ActionKind::NoDetection {
            ledgers.decisions.append(DecisionRecord {
                cycle: self.cycle,
                timestamp: timestamp(),
                event_type: "decision".to_string(),
                action: action.as_str().to_string(),
                template_name: "terminal_no_wells".to_string(),
                score: candidates.first().map_or(0.0, |s| s.value),
                runner_up_scores: score_pairs(&candidates),
                wells_used: 0,
                budget_remaining: self.budget_remaining,
                cost_inflation_factor: 1.0,
            })?;
            return Ok(CycleOutcome::Terminal);
        }

        let candidate_compounds: Vec<(String, f64)> = self
            .ctx
            .params
            .compounds
            .values()
            .map(|c| (c.name.clone(), c.ic50_um))
            .collect();
        let proposal = build_proposal(action, self.cycle, "HeLa", &candidate_compounds, self.previous_proposal.as_ref());
        let wells = proposal.well_count().max(1);

        let missing_gates: Vec<String> = [Assay::Ldh, Assay::CellPainting]
            .into_iter()
            .filter(|a| !self.belief.is_gate_earned(*a))
            .map(|a| a.as_str().to_string())
            .collect();

        let admissibility = self.controller.check_admissibility(
            &self.ctx.config.epistemic,
            action,
            missing_gates.clone(),
            self.budget_remaining,
            wells,
        );

        let cost_inflation_factor = match admissibility {
            cellassay_belief::Admissibility::Admitted { cost_inflation_factor } => cost_inflation_factor,
            cellassay_belief::Admissibility::Refused { reason, missing_gates } => {
                ledgers.refusals.append(RefusalRecord {
                    cycle: self.cycle,
                    timestamp: timestamp(),
                    event_type: "refusal".to_string(),
                    attempted_template: proposal.template_name.clone(),
                    missing_gates,
                    debt: self.controller.debt_bits,
                    budget_remaining: self.budget_remaining,
                    enforcement_layer: reason.clone(),
                })?;
                tracing::warn!(
                    cycle = self.cycle,
                    attempted_template = %proposal.template_name,
                    enforcement_layer = %reason,
                    debt_bits = self.controller.debt_bits,
                    "action refused, forcing calibration next cycle"
                );
                self.pending = Some(PendingAction::ForceCalibration);
                return Ok(CycleOutcome::Continue);
            }
        };

        if wells > self.budget_remaining {
            return Ok(CycleOutcome::BudgetExhausted);
        }

        let uncertainty_pre = self.belief.estimate_calibration_uncertainty();

        self.spend(action, wells)?;
        self.distinct_templates.insert(proposal.template_name.clone());
        if action == ActionKind::Calibrate {
            self.calibration_decisions.push(proposal.template_name.clone());
        }

        let results = execute_proposal(
            "plate",
            self.ctx.seed,
            &proposal.wells,
            &self.ctx.config.plate_layout,
            proposal.layout_seed,
            &self.ctx.params,
            &self.ctx.config.commitment_delay,
            &self.ctx.config.measurement,
        )?;
        let conditions = build_conditions(&self.ctx.config.plate_layout, &results);

        let mut had_qc_violation = false;
        for condition in &conditions {
            had_qc_violation |= condition.qc.exceeds_severity(0.5, 0.3, 0.5);
            let rel_width = condition.viability.map_or(1.0, |(mean, std)| {
                if mean.abs() > 1e-9 { std / mean } else { 1.0 }
            });
            let transition = self.belief.update_gate(
                &self.ctx.config.gates,
                Assay::CellPainting,
                f64::from(condition.n_wells),
                rel_width,
                true,
            );
            match transition {
                cellassay_belief::GateTransition::Earned => {
                    self.gates_earned_total.push("cell_painting".to_string());
                }
                cellassay_belief::GateTransition::Lost => {
                    self.gates_lost_total.push("cell_painting".to_string());
                }
                cellassay_belief::GateTransition::Unchanged => {}
            }
        }
        self.belief.apply_qc_outcome(
            self.ctx.config.health_debt.qc_violation_increment,
            self.ctx.config.health_debt.clean_cycle_decay,
            had_qc_violation,
        );

        if action == ActionKind::Explore {
            let mut likelihoods = BTreeMap::new();
            for well in &proposal.wells {
                if let Some((name, _)) = well.compounds.first() {
                    if let Some(params) = self.ctx.params.compound(name) {
                        likelihoods.insert(params.mechanism.clone(), 5.0);
                    }
                }
            }
            if !likelihoods.is_empty() {
                self.belief.mechanism_posterior.update(&likelihoods);
            }
        }

        let uncertainty_post = self.belief.estimate_calibration_uncertainty();
        let realized_gain = (uncertainty_pre - uncertainty_post).max(0.0);

        ledgers.evidence.append(EvidenceEvent {
            cycle: self.cycle,
            timestamp: timestamp(),
            event_type: "evidence".to_string(),
            description: format!("{} observation conditions aggregated", conditions.len()),
            supporting_conditions: results.iter().map(|r| r.well_id.clone()).collect(),
            metric_source: "real".to_string(),
            delta_entropy_bits: -(realized_gain),
            gates_earned: vec![],
            gates_lost: vec![],
        })?;

        let claimed_gain = ctx.expected_information_gain_bits;
        let debt_delta = self.controller.resolve_claim(
            &self.ctx.config.epistemic,
            Claim { claimed_bits: claimed_gain },
            Resolution {
                realized_bits: realized_gain,
                wells_used: wells,
                noise_improvement: realized_gain,
            },
        );
        ledgers.epistemic.append(EpistemicRecord {
            cycle: self.cycle,
            timestamp: timestamp(),
            event_type: "epistemic".to_string(),
            claimed_bits: claimed_gain,
            realized_bits: realized_gain,
            debt_delta,
            debt_total: self.controller.debt_bits,
            cost_inflation_factor,
            insolvent: self.controller.insolvent,
        })?;

        ledgers.decisions.append(DecisionRecord {
            cycle: self.cycle,
            timestamp: timestamp(),
            event_type: "decision".to_string(),
            action: action.as_str().to_string(),
            template_name: proposal.template_name.clone(),
            score: candidates.first().map_or(0.0, |s| s.value),
            runner_up_scores: score_pairs(&candidates),
            wells_used: wells,
            budget_remaining: self.budget_remaining,
            cost_inflation_factor,
        })?;

        if had_qc_violation {
            self.pending = Some(PendingAction::Mitigation);
        } else if uncertainty_post > self.entropy_start_bits * 1.5
            && self.belief.consecutive_replicates < self.ctx.config.policy_weights.max_consecutive_replicates
        {
            self.pending = Some(PendingAction::ForceCalibration);
        }

        self.previous_proposal = Some(proposal);
        self.belief.record_action(action);
        Ok(CycleOutcome::Continue)
    }

    fn spend(&mut self, action: ActionKind, wells: u32) -> Result<()> {
        if wells > self.budget_remaining {
            return Err(Error::InvariantViolation(format!(
                "attempted to spend {wells} wells with only {} remaining",
                self.budget_remaining
            )));
        }
        self.budget_remaining -= wells;
        match action {
            ActionKind::Calibrate => self.wells_spent_calibration += wells,
            ActionKind::Mitigate => self.wells_spent_mitigation += wells,
            _ => self.wells_spent_exploration += wells,
        }
        Ok(())
    }
}

enum CycleOutcome {
    Continue,
    BudgetExhausted,
    Terminal,
}

fn score_pairs(scores: &[cellassay_core::Score]) -> Vec<(String, f64)> {
    scores
        .iter()
        .map(|s| (ActionKind::from(s.action).as_str().to_string(), s.value))
        .collect()
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
