//! Mechanism posterior: a distribution over concrete mechanisms plus
//! `UNKNOWN`.
//!
//! §8 scenario S3 requires no mechanism commitment pre-treatment: the
//! posterior must start (and stay, absent evidence) concentrated on
//! `UNKNOWN`, and only move once real evidence from a post-treatment
//! measurement arrives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const UNKNOWN: &str = "UNKNOWN";

/// A normalized posterior over mechanism names, always including `UNKNOWN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MechanismPosterior {
    mass: BTreeMap<String, f64>,
}

impl MechanismPosterior {
    /// Start fully concentrated on `UNKNOWN` — no pre-treatment
    /// mechanism commitment.
    #[must_use]
    pub fn uninformative() -> Self {
        let mut mass = BTreeMap::new();
        mass.insert(UNKNOWN.to_string(), 1.0);
        Self { mass }
    }

    #[must_use]
    pub fn top(&self) -> (&str, f64) {
        self.mass
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).expect("probabilities are finite"))
            .map(|(k, v)| (k.as_str(), *v))
            .unwrap_or((UNKNOWN, 1.0))
    }

    #[must_use]
    pub fn probability(&self, mechanism: &str) -> f64 {
        self.mass.get(mechanism).copied().unwrap_or(0.0)
    }

    /// Bayesian update given a likelihood function over candidate
    /// mechanisms, renormalized. `metric_source` gates whether this update
    /// is permitted to move probability mass at all: proxy evidence may
    /// nudge the posterior only under an explicit opt-in by the caller
    /// (Belief only calls this with real evidence for mechanism claims).
    pub fn update(&mut self, likelihoods: &BTreeMap<String, f64>) {
        for (mechanism, likelihood) in likelihoods {
            let prior = self.mass.get(mechanism).copied().unwrap_or(0.0);
            self.mass.insert(mechanism.clone(), prior * likelihood.max(1e-12));
        }
        let unknown_prior = self.mass.get(UNKNOWN).copied().unwrap_or(1.0);
        self.mass.entry(UNKNOWN.to_string()).or_insert(unknown_prior);

        let total: f64 = self.mass.values().sum();
        if total > 0.0 {
            for value in self.mass.values_mut() {
                *value /= total;
            }
        }
    }

    /// Shannon entropy of the posterior, in bits.
    #[must_use]
    pub fn entropy_bits(&self) -> f64 {
        self.mass
            .values()
            .filter(|p| **p > 0.0)
            .map(|p| -p * p.log2())
            .sum()
    }

    #[must_use]
    pub fn is_unknown_dominant(&self) -> bool {
        self.top().0 == UNKNOWN
    }
}

impl Default for MechanismPosterior {
    fn default() -> Self {
        Self::uninformative()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_fully_on_unknown() {
        let posterior = MechanismPosterior::uninformative();
        assert_eq!(posterior.top().0, UNKNOWN);
        assert!((posterior.top().1 - 1.0).abs() < 1e-12);
        assert!((posterior.entropy_bits() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn strong_likelihood_concentrates_posterior() {
        let mut posterior = MechanismPosterior::uninformative();
        posterior.mass.insert("microtubule".to_string(), 1.0);
        let mut likelihoods = BTreeMap::new();
        likelihoods.insert("microtubule".to_string(), 1000.0);
        likelihoods.insert(UNKNOWN.to_string(), 1.0);
        for _ in 0..4 {
            posterior.update(&likelihoods);
        }
        assert_eq!(posterior.top().0, "microtubule");
        assert!(posterior.top().1 >= 0.99);
    }

    #[test]
    fn posterior_stays_normalized() {
        let mut posterior = MechanismPosterior::uninformative();
        posterior.mass.insert("oxidative".to_string(), 0.3);
        let mut likelihoods = BTreeMap::new();
        likelihoods.insert("oxidative".to_string(), 2.0);
        posterior.update(&likelihoods);
        let total: f64 = posterior.mass.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
