//! Expected-Information-Value scoring for the four scored action kinds
//! (§4.4). `NONE` never enters scoring; it is the default when nothing
//! else applies.

use cellassay_belief::{Assay, BeliefState, biological_claim_ready};
use cellassay_core::{ActionKind, ActionKindScore, PolicyWeights, Score};

/// Inputs the Policy needs beyond `BeliefState` to score one cycle's
/// candidates. Kept as a plain struct so the Loop can construct it from
/// budget/QC state without the Policy reaching into the World directly.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext {
    pub budget_remaining: u32,
    pub proposed_wells_explore: u32,
    pub proposed_wells_calibrate: u32,
    pub proposed_wells_mitigate: u32,
    pub expected_information_gain_bits: f64,
    pub calibrated_confidence: f64,
    pub elapsed_hours: f64,
    pub operations_count: f64,
    pub debt_bits: f64,
    pub debt_target_bits: f64,
}

/// `score_calibrate` (§4.4): penalized if `cycles_since_calibration <
/// MIN_GAP` or the plate-reserve can't be afforded.
#[must_use]
pub fn score_calibrate(weights: &PolicyWeights, belief: &BeliefState, ctx: &ScoringContext, reserve_wells: u32) -> Score {
    let uncertainty = belief.estimate_calibration_uncertainty();
    let mut value = weights.k_uncertainty * 0.7 * uncertainty
        + weights.k_debt * 0.3 * (ctx.debt_bits - ctx.debt_target_bits).max(0.0)
        - weights.k_plate
        - weights.k_time;

    if belief.cycles_since_calibration < weights.min_calibration_gap {
        value -= 10.0;
    }
    if ctx.budget_remaining < reserve_wells {
        value -= 10.0;
    }

    Score {
        action: ActionKindScore::Calibrate,
        value,
    }
}

/// `score_explore` (§4.4).
#[must_use]
pub fn score_explore(weights: &PolicyWeights, belief: &BeliefState, ctx: &ScoringContext, health_risk: f64) -> Score {
    let value = ctx.expected_information_gain_bits
        - weights.k_health * health_risk
        - weights.k_plate * (f64::from(ctx.proposed_wells_explore) / 96.0)
        - weights.k_time;
    let _ = belief;
    Score {
        action: ActionKindScore::Explore,
        value,
    }
}

/// `score_mitigate` (§4.4): `reduction * (excess/debt)`.
#[must_use]
pub fn score_mitigate(weights: &PolicyWeights, ctx: &ScoringContext, reduction: f64, excess: f64) -> Score {
    let ratio = if ctx.debt_bits > 0.0 {
        excess / ctx.debt_bits
    } else {
        0.0
    };
    let value = weights.k_debt * reduction * ratio
        - weights.k_plate * (f64::from(ctx.proposed_wells_mitigate) / 96.0)
        - weights.k_time;
    Score {
        action: ActionKindScore::Mitigate,
        value,
    }
}

/// `score_no_detection` (§4.4).
#[must_use]
pub fn score_no_detection(weights: &PolicyWeights, ctx: &ScoringContext) -> Score {
    let value = weights.w_confidence * ctx.calibrated_confidence
        - weights.w_time * ctx.elapsed_hours
        - weights.w_ops * ctx.operations_count;
    Score {
        action: ActionKindScore::NoDetection,
        value,
    }
}

/// `score_replicate`: not formula-specified in §4.4's bullet list, but
/// implied by the hysteresis/cap rules; modeled as exploitation of the
/// existing design's expected-gain term with a reduced uncertainty weight
/// (a replicate narrows an existing estimate rather than exploring new
/// structure) and the same plate/time costs as Explore.
#[must_use]
pub fn score_replicate(weights: &PolicyWeights, ctx: &ScoringContext) -> Score {
    let value = 0.5 * ctx.expected_information_gain_bits
        - weights.k_plate * (f64::from(ctx.proposed_wells_explore) / 96.0)
        - weights.k_time;
    Score {
        action: ActionKindScore::Replicate,
        value,
    }
}

/// Score every candidate action, applying the hysteresis predicate and the
/// consecutive-replicate cap, and return the selected `ActionKind` plus
/// every candidate's score (for the decision ledger's `runner_up_scores`).
#[must_use]
pub fn select_action(
    weights: &PolicyWeights,
    belief: &BeliefState,
    ctx: &ScoringContext,
    reserve_wells: u32,
    health_risk: f64,
    mitigation_reduction: f64,
    mitigation_excess: f64,
) -> (ActionKind, Vec<Score>) {
    let mut candidates = vec![
        score_calibrate(weights, belief, ctx, reserve_wells),
        score_explore(weights, belief, ctx, health_risk),
        score_no_detection(weights, ctx),
        score_mitigate(weights, ctx, mitigation_reduction, mitigation_excess),
    ];

    let replicate_allowed = belief.consecutive_replicates < weights.max_consecutive_replicates;
    if replicate_allowed {
        candidates.push(score_replicate(weights, ctx));
    }

    if !biological_claim_ready(|a| belief.is_gate_earned(a)) {
        candidates.retain(|s| matches!(s.action, ActionKindScore::Calibrate | ActionKindScore::Explore));
    }

    candidates.sort_by(|a, b| b.value.partial_cmp(&a.value).expect("scores are finite"));

    let best = candidates.first().copied().expect("at least Calibrate and Explore always scored");
    let best_action: ActionKind = best.action.into();

    let selected = match belief.last_action {
        Some(last) if last != ActionKind::None && last != best_action => {
            let last_score = candidates
                .iter()
                .find(|s| ActionKind::from(s.action) == last)
                .map_or(f64::NEG_INFINITY, |s| s.value);
            if best.value - last_score > weights.action_switch_penalty {
                best_action
            } else {
                last
            }
        }
        _ => best_action,
    };

    (selected, candidates)
}
