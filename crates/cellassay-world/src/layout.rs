//! Physical plate position allocation.
//!
//! Position class (edge/center) is always derived from coordinates
//! (`PlateLayoutConfig::position_class`) — never stored separately on a
//! well — so REPLATE can reuse the same wells under a new `layout_seed`
//! without carrying stale position-class tags.

use cellassay_core::PlateLayoutConfig;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;

/// Deterministically shuffle the plate's usable positions by `layout_seed`
/// and return the first `count`. A different `layout_seed` (as used by
/// REPLICATE/MITIGATE) yields a different spatial layout even for the same
/// well count.
#[must_use]
pub fn allocate_positions(layout: &PlateLayoutConfig, layout_seed: u64, count: usize) -> Vec<(u32, u32)> {
    let mut positions = layout.usable_positions();
    let mut rng = ChaCha20Rng::seed_from_u64(layout_seed);
    positions.shuffle(&mut rng);
    positions.truncate(count);
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn different_seeds_give_different_layouts() {
        let layout = PlateLayoutConfig::default();
        let a = allocate_positions(&layout, 1, 20);
        let b = allocate_positions(&layout, 2, 20);
        assert_ne!(a, b);
    }

    #[test]
    fn same_seed_is_deterministic() {
        let layout = PlateLayoutConfig::default();
        let a = allocate_positions(&layout, 7, 10);
        let b = allocate_positions(&layout, 7, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn never_allocates_excluded_positions() {
        let layout = PlateLayoutConfig::default();
        let allocated = allocate_positions(&layout, 3, 90);
        for pos in &layout.excluded_positions {
            assert!(!allocated.contains(pos));
        }
    }
}
