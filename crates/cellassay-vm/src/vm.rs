//! The Biological Virtual Machine: `{seed, treat, advance_time, measure}`.
//!
//! Produces observer-independent trajectories: the biology-state sequence
//! at any time is a pure function of `(seed, schedule)`, independent of
//! whether and when `measure` is called. `measure` reads state without
//! mutating it and only `rng_assay` may advance inside it.

use std::collections::HashMap;

use cellassay_core::error::{Error, Result};
use cellassay_core::{CommitmentDelayConfig, MeasurementConfig, RngStreams};
use rand::Rng;
use rand_distr::{Distribution, LogNormal};

use crate::measurement::{self, RawReading};
use crate::params::ParamTables;
use crate::vessel::{CommitmentKey, CompoundMeta, DeathLedger, Subpopulation, Vessel, VesselPhase};

/// Per-assay readout bundle returned by `measure`.
#[derive(Debug, Clone)]
pub struct AssayReadout {
    pub viability: RawReading,
    pub ldh: RawReading,
    pub morphology: HashMap<String, RawReading>,
}

/// The deterministic simulator owning all vessel state for one episode.
pub struct BiologyVm {
    vessels: HashMap<String, Vessel>,
    params: ParamTables,
    rng: RngStreams,
    commitment_cfg: CommitmentDelayConfig,
    measurement_cfg: MeasurementConfig,
}

impl BiologyVm {
    #[must_use]
    pub fn new(
        seed: u64,
        params: ParamTables,
        commitment_cfg: CommitmentDelayConfig,
        measurement_cfg: MeasurementConfig,
    ) -> Self {
        Self {
            vessels: HashMap::new(),
            params,
            rng: RngStreams::from_seed(seed),
            commitment_cfg,
            measurement_cfg,
        }
    }

    #[must_use]
    pub fn vessel(&self, id: &str) -> Option<&Vessel> {
        self.vessels.get(id)
    }

    /// Snapshot `(growth, treatment, assay)` stream fingerprints. Used by
    /// `--self-test` to prove `measure` never perturbs the physics streams.
    #[must_use]
    pub fn rng_fingerprints(&self) -> (u64, u64, u64) {
        (
            self.rng.growth.state_fingerprint(),
            self.rng.treatment.state_fingerprint(),
            self.rng.assay.state_fingerprint(),
        )
    }

    /// Create a vessel with initialized subpopulations and a deterministic
    /// per-well baseline shift. Fails if `id` already exists.
    pub fn seed_vessel(
        &mut self,
        id: &str,
        cell_line: &str,
        initial_count: i64,
        initial_viability: f64,
    ) -> Result<()> {
        if self.vessels.contains_key(id) {
            return Err(Error::VesselAlreadyExists(id.to_string()));
        }
        if initial_count < 0 {
            return Err(Error::NegativeCellCount {
                vessel: id.to_string(),
                count: initial_count,
            });
        }
        let cl = self
            .params
            .cell_line(cell_line)
            .ok_or_else(|| Error::UnknownCellLine(cell_line.to_string()))?
            .clone();

        let mut subpopulations = HashMap::new();
        for (name, template) in &cl.subpopulations {
            subpopulations.insert(
                name.clone(),
                Subpopulation {
                    fraction: template.fraction,
                    viability: initial_viability,
                    ic50_shift: template.ic50_shift,
                },
            );
        }

        let baseline_rng = self.rng.growth.borrow("seed_vessel")?;
        let mut baseline_shift = HashMap::new();
        baseline_shift.insert("global".to_string(), baseline_rng.gen_range(-0.05..0.05));

        let vessel = Vessel {
            id: id.to_string(),
            cell_line: cell_line.to_string(),
            phase: VesselPhase::Seeded,
            cell_count: initial_count,
            viability: initial_viability,
            confluence: f64::from(initial_count as u32) / cl.carrying_capacity,
            subpopulations,
            compound_concentrations: HashMap::new(),
            compound_start_time: HashMap::new(),
            compound_meta: CompoundMeta::default(),
            death: DeathLedger::default(),
            baseline_shift,
            elapsed_h: 0.0,
        };
        self.vessels.insert(id.to_string(), vessel);
        Ok(())
    }

    /// Assign a monotonic `exposure_id`, sample per-subpop commitment
    /// delays, and apply instant kill if the dose causes an immediate drop.
    pub fn treat_with_compound(&mut self, id: &str, compound: &str, dose_um: f64) -> Result<()> {
        let compound_params = self
            .params
            .compound(compound)
            .ok_or_else(|| Error::UnknownCompound(compound.to_string()))?
            .clone();
        if compound_params.ic50_um <= 0.0 {
            return Err(Error::InvalidIc50 {
                compound: compound.to_string(),
                cell_line: self
                    .vessels
                    .get(id)
                    .map_or_else(|| "unknown".to_string(), |v| v.cell_line.clone()),
                ic50: compound_params.ic50_um,
            });
        }

        let exposure_id = {
            let vessel = self
                .vessels
                .get_mut(id)
                .ok_or_else(|| Error::UnknownVessel(id.to_string()))?;
            let exposure_id = vessel.compound_meta.next_exposure_id;
            vessel.compound_meta.next_exposure_id += 1;
            vessel
                .compound_meta
                .exposure_ids
                .entry(compound.to_string())
                .or_default()
                .push(exposure_id);
            vessel.compound_concentrations.insert(compound.to_string(), dose_um);
            vessel.compound_start_time.insert(compound.to_string(), vessel.elapsed_h);
            vessel.phase = match vessel.phase {
                VesselPhase::Empty => return Err(Error::UnknownVessel(id.to_string())),
                _ => VesselPhase::Treated,
            };
            exposure_id
        };

        let subpop_names: Vec<String> = self
            .vessels
            .get(id)
            .expect("checked above")
            .subpopulations
            .keys()
            .cloned()
            .collect();

        for subpop_name in &subpop_names {
            let ic50_shift = self.vessels[id].subpopulations[subpop_name].ic50_shift;
            let ic50_shifted = compound_params.ic50_um * ic50_shift;
            let delay = self.sample_commitment_delay(dose_um, ic50_shifted)?;
            let vessel = self.vessels.get_mut(id).expect("checked above");
            vessel.compound_meta.commitment_delays.insert(
                CommitmentKey {
                    compound: compound.to_string(),
                    exposure_id,
                    subpop: subpop_name.clone(),
                },
                delay,
            );

            // Instant kill: dose far exceeds the shifted IC50 so a
            // fraction dies immediately, independent of hazard integration.
            let ratio = dose_um / ic50_shifted;
            if ratio >= 4.0 {
                let instant_kill_fraction = (1.0 - (-0.5 * (ratio - 4.0)).exp()).min(0.9);
                let subpop = vessel.subpopulations.get_mut(subpop_name).expect("just inserted");
                let before = subpop.viability;
                subpop.viability = (subpop.viability * (1.0 - instant_kill_fraction)).max(0.0);
                let delta = before - subpop.viability;
                let weighted_delta = delta * subpop.fraction;
                vessel.death.death_compound += weighted_delta;
            }
        }

        let vessel = self.vessels.get_mut(id).expect("checked above");
        vessel.resync_viability();
        vessel.maybe_enter_terminal();
        Ok(())
    }

    fn sample_commitment_delay(&mut self, dose_um: f64, ic50_shifted: f64) -> Result<f64> {
        let mean = self.commitment_cfg.base_mean_hours / (1.0 + dose_um / ic50_shifted).sqrt();
        let cv = self.commitment_cfg.coefficient_of_variation;
        let sigma_sq = (1.0 + cv * cv).ln();
        let mu = mean.ln() - sigma_sq / 2.0;
        let dist = LogNormal::new(mu, sigma_sq.sqrt()).map_err(|e| Error::Internal(e.to_string()))?;
        let rng = self.rng.treatment.borrow("treat_with_compound")?;
        let sample = dist.sample(rng);
        Ok(sample.clamp(self.commitment_cfg.min_hours, self.commitment_cfg.max_hours))
    }

    /// Integrate biology forward by `dt_h` hours: growth, per-subpop
    /// attrition hazard gated on commitment delay, then resync.
    pub fn advance_time(&mut self, id: &str, dt_h: f64) -> Result<()> {
        let compound_params = self.params.compounds.clone();
        let cell_line_name = self
            .vessels
            .get(id)
            .ok_or_else(|| Error::UnknownVessel(id.to_string()))?
            .cell_line
            .clone();
        let cell_line = self.params.cell_line(&cell_line_name).cloned();

        let growth_jitter = {
            let rng = self.rng.growth.borrow("advance_time")?;
            rng.gen_range(-0.15..0.15)
        };

        let vessel = self
            .vessels
            .get_mut(id)
            .ok_or_else(|| Error::UnknownVessel(id.to_string()))?;
        if vessel.is_terminal() {
            vessel.elapsed_h += dt_h;
            return Ok(());
        }

        // Logistic proliferation toward carrying capacity, scaled by
        // viability (dead cells do not divide) and jittered by rng_growth.
        if let Some(cl) = &cell_line {
            if vessel.cell_count > 0 && cl.carrying_capacity > 0.0 {
                let current = f64::from(vessel.cell_count as u32);
                let headroom = (1.0 - current / cl.carrying_capacity).max(0.0);
                let rate = (cl.proliferation_index * (1.0 + growth_jitter)).max(0.0);
                let growth = current * rate * headroom * vessel.viability * dt_h;
                if growth.is_finite() && growth > 0.0 {
                    vessel.cell_count += growth.round() as i64;
                }
            }
            vessel.confluence = (f64::from(vessel.cell_count as u32) / cl.carrying_capacity.max(1.0)).min(1.0);
        }

        let mut hazard_shares: HashMap<String, f64> = HashMap::new();
        let mut max_commitment_elapsed = true;

        for (subpop_name, subpop) in &mut vessel.subpopulations {
            let mut total_hazard = 0.0;
            for (compound, &dose) in &vessel.compound_concentrations {
                if dose <= 0.0 {
                    continue;
                }
                let Some(params) = compound_params.get(compound) else {
                    continue;
                };
                let ic50_shifted = params.ic50_um * subpop.ic50_shift;
                let ratio = dose / ic50_shifted;
                if ratio < 1.0 || subpop.viability >= 0.5 {
                    continue;
                }
                let start = vessel.compound_start_time.get(compound).copied().unwrap_or(0.0);
                let time_since = vessel.elapsed_h - start;

                let exposure_ids = vessel
                    .compound_meta
                    .exposure_ids
                    .get(compound)
                    .cloned()
                    .unwrap_or_default();
                let Some(&latest_exposure) = exposure_ids.last() else {
                    continue;
                };
                let key = CommitmentKey {
                    compound: compound.clone(),
                    exposure_id: latest_exposure,
                    subpop: subpop_name.clone(),
                };
                let Some(&delay) = vessel.compound_meta.commitment_delays.get(&key) else {
                    return Err(Error::MissingCommitmentDelay {
                        vessel: id.to_string(),
                        compound: compound.clone(),
                        exposure_id: latest_exposure,
                        subpop: subpop_name.clone(),
                    });
                };
                if time_since <= delay {
                    max_commitment_elapsed = false;
                    continue;
                }

                let hill = ratio.powf(params.hill_slope) / (1.0 + ratio.powf(params.hill_slope));
                total_hazard += hill * 0.5;
            }
            if total_hazard > 0.0 {
                let before = subpop.viability;
                subpop.viability = (subpop.viability * (-total_hazard * dt_h).exp()).max(0.0);
                hazard_shares.insert(subpop_name.clone(), (before - subpop.viability) * subpop.fraction);
            }
        }

        vessel.resync_viability();
        for delta in hazard_shares.values() {
            vessel.death.death_compound += delta;
        }

        vessel.elapsed_h += dt_h;
        vessel.maybe_enter_terminal();
        vessel.maybe_enter_post_commit(max_commitment_elapsed);

        debug_assert!(
            vessel.weighted_mean_consistent(),
            "weighted-mean invariant violated after advance_time"
        );
        if !vessel.weighted_mean_consistent() {
            return Err(Error::InvariantViolation(format!(
                "vessel {id}: viability {} != weighted mean {}",
                vessel.viability,
                vessel.weighted_mean_viability()
            )));
        }
        Ok(())
    }

    /// Read vessel state through the measurement stack without mutating
    /// it. Only `rng_assay` may advance.
    pub fn measure(&mut self, id: &str, assay: &str) -> Result<AssayReadout> {
        let vessel = self
            .vessels
            .get(id)
            .ok_or_else(|| Error::UnknownVessel(id.to_string()))?
            .clone();
        let cfg = self.measurement_cfg;
        let rng = self.rng.assay.borrow("measure")?;

        // Sampled once per `measure` call and shared across every channel
        // below so a heavy-tail event shows up as a correlated outlier
        // across channels, not an independent one per channel.
        let shock = measurement::sample_heavy_tail_shock(&cfg, rng);

        let viability = measurement::measure_channel(
            &cfg, rng, "viability", &vessel, vessel.viability, 0.0, vessel.elapsed_h, 0.05, 0.03,
            1.2, 1.0, 1.0, 0.0, 2.0, shock,
        )?;
        let ldh = measurement::measure_channel(
            &cfg, rng, "ldh", &vessel, 1.0 - vessel.viability, 0.5, vessel.elapsed_h, 0.08, 0.03,
            5.0, 4.0, 1.0, 0.0, 2.0, shock,
        )?;

        let mut morphology = HashMap::new();
        if assay == "cell_painting" {
            for channel in ["nucleus_area", "cell_area", "texture_entropy"] {
                let reading = measurement::measure_channel(
                    &cfg, rng, channel, &vessel, 100.0, 30.0, vessel.elapsed_h, 0.1, 0.04, 500.0,
                    400.0, 1.0, 0.0, 2.0, shock,
                )?;
                morphology.insert(channel.to_string(), reading);
            }
        }

        Ok(AssayReadout {
            viability,
            ldh,
            morphology,
        })
    }
}
