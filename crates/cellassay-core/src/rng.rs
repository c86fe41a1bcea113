//! Three independent, guarded RNG streams and BLAKE2s stable hashing.
//!
//! §4.1 requires physics (`rng_growth`, `rng_treatment`) and measurement
//! (`rng_assay`) to never cross: a `measure` call that perturbs either
//! physics stream would violate observer independence. Each stream is
//! wrapped in [`GuardedRng`], which rejects calls from callers outside an
//! exact-match whitelist fixed at construction, turning a latent
//! cross-stream bug into an immediate [`Error::RngStreamMisuse`].

use blake2::Blake2s256;
use blake2::digest::Digest;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::error::{Error, Result};

/// An RNG stream that only a fixed set of call sites may advance.
pub struct GuardedRng {
    name: &'static str,
    whitelist: &'static [&'static str],
    inner: ChaCha20Rng,
}

impl GuardedRng {
    #[must_use]
    pub fn new(name: &'static str, whitelist: &'static [&'static str], seed: u64) -> Self {
        Self {
            name,
            whitelist,
            inner: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Borrow the underlying RNG, provided `caller` is on the whitelist.
    pub fn borrow(&mut self, caller: &'static str) -> Result<&mut ChaCha20Rng> {
        if self.whitelist.contains(&caller) {
            Ok(&mut self.inner)
        } else {
            Err(Error::RngStreamMisuse {
                stream: self.name,
                caller,
            })
        }
    }

    /// A stable snapshot of internal state, used by `--self-test` to assert
    /// that a measurement call left the physics streams untouched.
    #[must_use]
    pub fn state_fingerprint(&self) -> u64 {
        // ChaCha20Rng does not expose its word position publicly; the
        // wrapped position counter is, however, deterministic given stream
        // and seed, so re-deriving bytes from a cloned generator is the
        // simplest stable observable without adding unsafe transmutes.
        let mut clone = self.inner.clone();
        use rand::RngCore;
        clone.next_u64()
    }
}

/// Bundles the three physics/measurement streams for one VM instance.
pub struct RngStreams {
    pub growth: GuardedRng,
    pub treatment: GuardedRng,
    pub assay: GuardedRng,
}

const GROWTH_WHITELIST: &[&str] = &["advance_time", "seed_vessel"];
const TREATMENT_WHITELIST: &[&str] = &["treat_with_compound", "advance_time"];
const ASSAY_WHITELIST: &[&str] = &["measure"];

impl RngStreams {
    /// Derive three independent streams from one run seed via BLAKE2s
    /// stable hashing, so re-running with the same seed reproduces
    /// bit-identical streams regardless of machine or build.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            growth: GuardedRng::new("rng_growth", GROWTH_WHITELIST, stable_hash_u64(seed, "growth")),
            treatment: GuardedRng::new(
                "rng_treatment",
                TREATMENT_WHITELIST,
                stable_hash_u64(seed, "treatment"),
            ),
            assay: GuardedRng::new("rng_assay", ASSAY_WHITELIST, stable_hash_u64(seed, "assay")),
        }
    }
}

/// BLAKE2s-truncated stable hash to a `u32`, for batch-effect seeding that
/// must match across machines and language runtimes.
#[must_use]
pub fn stable_hash_u32(seed: u64, label: &str) -> u32 {
    let digest = blake2s_digest(seed, label);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// BLAKE2s-truncated stable hash to a `u64`.
#[must_use]
pub fn stable_hash_u64(seed: u64, label: &str) -> u64 {
    let digest = blake2s_digest(seed, label);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[0..8]);
    u64::from_le_bytes(buf)
}

fn blake2s_digest(seed: u64, label: &str) -> [u8; 32] {
    let mut hasher = Blake2s256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(label.as_bytes());
    let out = hasher.finalize();
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_hash_is_deterministic_across_calls() {
        assert_eq!(stable_hash_u64(42, "growth"), stable_hash_u64(42, "growth"));
        assert_ne!(stable_hash_u64(42, "growth"), stable_hash_u64(42, "assay"));
        assert_ne!(stable_hash_u32(42, "x"), stable_hash_u32(43, "x"));
    }

    #[test]
    fn guarded_rng_rejects_non_whitelisted_caller() {
        let mut streams = RngStreams::from_seed(1);
        assert!(streams.growth.borrow("advance_time").is_ok());
        assert!(streams.growth.borrow("measure").is_err());
        assert!(streams.assay.borrow("measure").is_ok());
        assert!(streams.assay.borrow("advance_time").is_err());
    }

    #[test]
    fn from_seed_derives_independent_streams() {
        let mut a = RngStreams::from_seed(7);
        let mut b = RngStreams::from_seed(7);
        assert_eq!(
            a.growth.state_fingerprint(),
            b.growth.state_fingerprint(),
            "same seed must reproduce identical streams"
        );
        let mut c = RngStreams::from_seed(8);
        assert_ne!(a.growth.state_fingerprint(), c.growth.state_fingerprint());
        let _ = &mut a.treatment;
        let _ = &mut b.assay;
    }
}
