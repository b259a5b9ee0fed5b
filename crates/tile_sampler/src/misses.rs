pub mod bounds;
pub mod dense;
pub mod quota;
pub mod sampler;

pub use bounds::{InspireBounds, TileBoundsSource};
pub use dense::find_misses_dense;
pub use quota::find_misses_per_tile;
pub use sampler::{FootprintShape, TileArea, find_one_miss};

use crate::{dictionary::{HitDictionary, MissDictionary}, error::Result};
use indicatif::ProgressBar;
use rand::{SeedableRng, rngs::StdRng};

/// How the miss quota is spread over tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissStrategy {
    /// `total_hits / tiles` misses on every tile, tiles sampled in parallel
    #[default]
    QuotaPerTile,
    /// One global quota shared by one thread per tile, for tightly packed hits
    Dense,
}

#[derive(Debug, Clone)]
pub struct MissOptions {
    pub shape: FootprintShape,
    pub workers: usize,
    pub max_attempts: usize,
    /// Fixed seed for reproducible sampling; fresh entropy when `None`
    pub seed: Option<u64>,
}

/// Generate miss footprints for every tile of `hits` with the chosen strategy.
pub fn find_misses(
    hits: &HitDictionary,
    bounds: &dyn TileBoundsSource,
    strategy: MissStrategy,
    options: &MissOptions,
    progress: &ProgressBar,
) -> Result<MissDictionary> {
    match strategy {
        MissStrategy::QuotaPerTile => find_misses_per_tile(hits, bounds, options, progress),
        MissStrategy::Dense => find_misses_dense(hits, bounds, options, progress),
    }
}

pub(crate) fn tile_rng(seed: Option<u64>, tile_index: usize) -> StdRng {
    match seed {
        Some(seed) => {
            StdRng::seed_from_u64(seed ^ (tile_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
        }
        None => StdRng::from_entropy(),
    }
}
