//! The nine-step measurement stack (§4.1.1). Order is contractual.
//!
//! Only `rng_assay` may advance during any of these steps; `measure` is the
//! sole whitelisted caller of that stream ([`cellassay_core::rng::RngStreams`]).

use std::collections::BTreeMap;

use cellassay_core::MeasurementConfig;
use cellassay_core::error::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal, StudentT};

use crate::vessel::Vessel;

/// Raw per-well readout for one morphology (or LDH/viability) channel,
/// before cross-well aggregation. `None` once SNR-masked.
pub type RawReading = Option<f64>;

/// Deterministic signal formation (step 1): a pure function of vessel
/// state and the channel's baseline, no randomness.
#[must_use]
pub fn biological_signal(vessel: &Vessel, baseline: f64, stress_response: f64) -> f64 {
    let baseline_shift = vessel
        .baseline_shift
        .get("global")
        .copied()
        .unwrap_or(0.0);
    baseline + baseline_shift + stress_response * (1.0 - vessel.viability)
}

/// Step 2: viability / washout / debris multiplicative factors.
#[must_use]
pub fn viability_washout_factor(vessel: &Vessel) -> f64 {
    let debris_penalty = 1.0 - 0.2 * (1.0 - vessel.viability);
    vessel.viability.max(0.05) * debris_penalty
}

/// Step 3: lognormal biological noise, with a `heavy_tail_frequency` chance
/// of a correlated Student-t shock applied to every channel in the same
/// measurement.
pub fn biological_noise_multiplier(
    cfg: &MeasurementConfig,
    rng: &mut impl Rng,
    sigma: f64,
    shock: Option<f64>,
) -> f64 {
    let lognormal = Normal::new(0.0, sigma).expect("sigma must be finite and >= 0");
    let base = lognormal.sample(rng).exp();
    match shock {
        Some(t) => base * t.clamp(cfg.heavy_tail_clip_min, cfg.heavy_tail_clip_max).exp(),
        None => base,
    }
}

/// Sample the single correlated heavy-tail shock for this measurement
/// call, shared across all channels (outliers correlated, per §4.1.1 step 3).
pub fn sample_heavy_tail_shock(cfg: &MeasurementConfig, rng: &mut impl Rng) -> Option<f64> {
    if rng.gen_bool(cfg.heavy_tail_frequency) {
        let dist = StudentT::new(cfg.student_t_dof).expect("dof must be > 0");
        Some(dist.sample(rng))
    } else {
        None
    }
}

/// Step 4: plating artefacts — inflated variance at early timepoints.
#[must_use]
pub fn plating_artefact_factor(timepoint_h: f64) -> f64 {
    if timepoint_h < 6.0 {
        1.0 + (6.0 - timepoint_h) / 6.0 * 0.3
    } else {
        1.0
    }
}

/// Step 5: technical noise — plate/day/operator multipliers.
pub fn technical_noise_multiplier(rng: &mut impl Rng, sigma: f64) -> f64 {
    let dist = Normal::new(1.0, sigma).expect("sigma must be finite and >= 0");
    dist.sample(rng).max(0.0)
}

/// Step 6: additive detector floor noise, clamped non-negative.
pub fn detector_floor(rng: &mut impl Rng, sigma: f64) -> f64 {
    let dist = Normal::new(0.0, sigma).expect("sigma must be finite and >= 0");
    dist.sample(rng).max(0.0)
}

/// Step 7: soft-knee saturation ceiling.
#[must_use]
pub fn saturate(value: f64, ceiling: f64, knee: f64) -> f64 {
    if value <= knee {
        value
    } else {
        knee + (ceiling - knee) * (1.0 - (-(value - knee) / (ceiling - knee)).exp())
    }
}

/// Step 8: ADC quantization. `round_half_up(y/step)*step`; no-op if
/// `step == 0` and `ceiling == 0`; raises if `bits > 0` with no ceiling.
pub fn quantize(cfg: &MeasurementConfig, channel: &str, value: f64) -> Result<f64> {
    cfg.validate(channel)?;
    if cfg.adc_bits == 0 {
        return Ok(value);
    }
    let ceiling = cfg.adc_ceiling.ok_or_else(|| Error::QuantizationMissingCeiling {
        channel: channel.to_string(),
    })?;
    let step = ceiling / f64::from((1u32 << cfg.adc_bits) - 1);
    if step == 0.0 {
        return Ok(value);
    }
    Ok(round_half_up(value / step) * step)
}

fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Step 9: pipeline/feature-extraction affine drift.
#[must_use]
pub fn pipeline_drift(value: f64, slope: f64, intercept: f64) -> f64 {
    slope * value + intercept
}

/// SNR floor below which a channel reading is masked to `None` rather than
/// laundered to 0.
#[must_use]
pub fn snr_mask(value: f64, noise_floor: f64, snr_threshold: f64) -> RawReading {
    if noise_floor <= 0.0 {
        return Some(value);
    }
    if (value / noise_floor).abs() < snr_threshold {
        None
    } else {
        Some(value)
    }
}

/// Run the full nine-step stack for one channel on one vessel. `rng` must
/// be the guarded `rng_assay` stream. `shock` is the single correlated
/// heavy-tail draw for this `measure` call, sampled once by the caller and
/// passed to every channel so outliers are correlated across channels.
#[allow(clippy::too_many_arguments)]
pub fn measure_channel(
    cfg: &MeasurementConfig,
    rng: &mut impl Rng,
    channel: &str,
    vessel: &Vessel,
    baseline: f64,
    stress_response: f64,
    timepoint_h: f64,
    noise_sigma: f64,
    technical_sigma: f64,
    ceiling: f64,
    knee: f64,
    drift_slope: f64,
    drift_intercept: f64,
    snr_threshold: f64,
    shock: Option<f64>,
) -> Result<RawReading> {
    let signal = biological_signal(vessel, baseline, stress_response);
    let after_washout = signal * viability_washout_factor(vessel);
    let after_bio_noise = after_washout * biological_noise_multiplier(cfg, rng, noise_sigma, shock);
    let after_plating = after_bio_noise * plating_artefact_factor(timepoint_h);
    let after_technical = after_plating * technical_noise_multiplier(rng, technical_sigma);
    let after_floor = after_technical + detector_floor(rng, cfg.detector_floor_sigma);
    let after_saturation = saturate(after_floor, ceiling, knee);
    let after_quant = quantize(cfg, channel, after_saturation)?;
    let after_drift = pipeline_drift(after_quant, drift_slope, drift_intercept);

    Ok(snr_mask(after_drift, after_technical.max(1e-9), snr_threshold))
}

/// Aggregate raw per-well readings for one channel across a batch of
/// wells, preserving `None` for channels masked in every well. Used by the
/// `World` crate's condition aggregation, exposed here so VM-level callers
/// (tests, the S4 scenario) can pre-check usability before handing off.
#[must_use]
pub fn collect_channel(name: &str, readings: &[RawReading]) -> BTreeMap<String, Vec<RawReading>> {
    let mut map = BTreeMap::new();
    map.insert(name.to_string(), readings.to_vec());
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_is_noop_when_bits_zero() {
        let cfg = MeasurementConfig::default();
        assert!((quantize(&cfg, "ldh", 3.14159).unwrap() - 3.14159).abs() < 1e-12);
    }

    #[test]
    fn quantize_raises_when_bits_positive_without_ceiling() {
        let cfg = MeasurementConfig {
            adc_bits: 8,
            adc_ceiling: None,
            ..MeasurementConfig::default()
        };
        assert!(quantize(&cfg, "ldh", 1.0).is_err());
    }

    #[test]
    fn quantize_rounds_to_step() {
        let cfg = MeasurementConfig {
            adc_bits: 2,
            adc_ceiling: Some(3.0),
            ..MeasurementConfig::default()
        };
        // step = 3 / (2^2 - 1) = 1.0
        let quantized = quantize(&cfg, "ldh", 1.6).unwrap();
        assert!((quantized - 2.0).abs() < 1e-9);
    }

    #[test]
    fn saturate_approaches_ceiling_asymptotically() {
        let knee = 10.0;
        let ceiling = 20.0;
        let near_ceiling = saturate(1000.0, ceiling, knee);
        assert!(near_ceiling < ceiling);
        assert!(near_ceiling > knee);
        assert!((saturate(5.0, ceiling, knee) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn snr_mask_hides_low_snr_without_zeroing() {
        assert_eq!(snr_mask(0.001, 1.0, 3.0), None);
        assert_eq!(snr_mask(10.0, 1.0, 3.0), Some(10.0));
    }
}
