//! Aggregated measurement output: `ObservationCondition`.
//!
//! Wells are grouped by `(compound, dose, timepoint, cell_line,
//! position_class)` and reduced to per-channel mean/std. A channel whose
//! SNR sits below the policy floor is masked to `None` — never laundered
//! to 0 — so downstream aggregation must explicitly handle the absence of
//! a reading rather than silently averaging in a zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::PositionClass;

/// QC flags computed over a condition's constituent wells.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QcFlags {
    pub morans_i: f64,
    pub nuclei_cv: f64,
    pub segmentation_quality: f64,
}

impl QcFlags {
    /// Whether this condition's QC crossed a severity threshold that
    /// should schedule a mitigation cycle (§4.5 step 9).
    #[must_use]
    pub fn exceeds_severity(&self, morans_i_max: f64, nuclei_cv_max: f64, seg_quality_min: f64) -> bool {
        self.morans_i > morans_i_max
            || self.nuclei_cv > nuclei_cv_max
            || self.segmentation_quality < seg_quality_min
    }
}

/// Mean/std for one morphology or viability channel. `None` when the
/// channel's SNR fell below the usability floor for every contributing
/// well.
pub type ChannelStats = Option<(f64, f64)>;

/// The key a `World` aggregation groups wells by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionKey {
    pub compound: String,
    pub dose_um: f64,
    pub timepoint_h: f64,
    pub cell_line: String,
    pub position_class: PositionClass,
}

/// One aggregated readout for a `(compound, dose, timepoint, cell_line,
/// position_class)` tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationCondition {
    pub key: ConditionKey,
    pub n_wells: u32,
    pub viability: ChannelStats,
    pub ldh: ChannelStats,
    /// Morphology channel name to `(mean, std)`, `None` when SNR-masked.
    pub morphology_channels: BTreeMap<String, ChannelStats>,
    pub qc: QcFlags,
    /// Channels that survived SNR masking for at least one well.
    pub usable_channels: Vec<String>,
}

impl ObservationCondition {
    /// Reduce per-well raw readings into a condition. `raw_morphology`
    /// entries are `None` for an individual well when that well's channel
    /// was masked; the aggregate is `None` only if *every* well's reading
    /// for that channel was masked.
    #[must_use]
    pub fn aggregate(
        key: ConditionKey,
        viability_readings: &[f64],
        ldh_readings: &[Option<f64>],
        raw_morphology: &BTreeMap<String, Vec<Option<f64>>>,
        qc: QcFlags,
    ) -> Self {
        let n_wells = viability_readings.len() as u32;
        let viability = mean_std(viability_readings.iter().copied().map(Some));
        let ldh = mean_std(ldh_readings.iter().copied());

        let mut morphology_channels = BTreeMap::new();
        let mut usable_channels = Vec::new();
        for (channel, readings) in raw_morphology {
            let stats = mean_std(readings.iter().copied());
            if stats.is_some() {
                usable_channels.push(channel.clone());
            }
            morphology_channels.insert(channel.clone(), stats);
        }

        Self {
            key,
            n_wells,
            viability,
            ldh,
            morphology_channels,
            qc,
            usable_channels,
        }
    }
}

/// Mean and population std over the `Some` values in `readings`, skipping
/// `None`s entirely (never treating an absent reading as 0). Returns `None`
/// if no value survived masking.
fn mean_std(readings: impl Iterator<Item = Option<f64>>) -> ChannelStats {
    let values: Vec<f64> = readings.flatten().collect();
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ConditionKey {
        ConditionKey {
            compound: "paclitaxel".into(),
            dose_um: 1.0,
            timepoint_h: 24.0,
            cell_line: "HeLa".into(),
            position_class: PositionClass::Center,
        }
    }

    #[test]
    fn fully_masked_channel_aggregates_to_none_not_zero() {
        let mut morphology = BTreeMap::new();
        morphology.insert("nucleus_area".to_string(), vec![None, None, None]);
        let cond = ObservationCondition::aggregate(
            key(),
            &[0.9, 0.85, 0.88],
            &[Some(1.0), Some(1.1), None],
            &morphology,
            QcFlags {
                morans_i: 0.1,
                nuclei_cv: 0.1,
                segmentation_quality: 0.9,
            },
        );
        assert!(cond.morphology_channels["nucleus_area"].is_none());
        assert!(!cond.usable_channels.contains(&"nucleus_area".to_string()));
        assert!(cond.ldh.is_some());
    }

    #[test]
    fn partially_masked_channel_averages_only_unmasked() {
        let mut morphology = BTreeMap::new();
        morphology.insert("cell_area".to_string(), vec![Some(10.0), None, Some(20.0)]);
        let cond = ObservationCondition::aggregate(
            key(),
            &[0.9, 0.85, 0.88],
            &[Some(1.0), Some(1.1), Some(1.2)],
            &morphology,
            QcFlags {
                morans_i: 0.1,
                nuclei_cv: 0.1,
                segmentation_quality: 0.9,
            },
        );
        let (mean, _) = cond.morphology_channels["cell_area"].unwrap();
        assert!((mean - 15.0).abs() < 1e-9);
    }

    #[test]
    fn qc_severity_threshold() {
        let qc = QcFlags {
            morans_i: 0.6,
            nuclei_cv: 0.1,
            segmentation_quality: 0.9,
        };
        assert!(qc.exceeds_severity(0.5, 0.3, 0.5));
        assert!(!qc.exceeds_severity(0.7, 0.3, 0.5));
    }
}
