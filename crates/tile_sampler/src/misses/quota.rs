use crate::{
    dictionary::{AoiRecord, HitDictionary, MissDictionary},
    error::{Result, SamplerError},
    misses::{MissOptions, bounds::TileBoundsSource, sampler::{TileArea, find_one_miss}, tile_rng},
};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use rayon::{ThreadPoolBuilder, prelude::*};

/// Misses requested on every tile: `total_hits / tiles`, remainder dropped.
pub fn per_tile_quota(total_hits: usize, tile_count: usize) -> usize {
    if tile_count == 0 {
        0
    } else {
        total_hits / tile_count
    }
}

/// Quota-per-tile sampling: every tile gets the same share, tiles run in parallel with no
/// shared state, and the per-tile results are merged afterwards.
///
/// Tiles whose bounds cannot be resolved are skipped and contribute no misses.
pub fn find_misses_per_tile(
    hits: &HitDictionary,
    bounds: &dyn TileBoundsSource,
    options: &MissOptions,
    progress: &ProgressBar,
) -> Result<MissDictionary> {
    let keys: Vec<&str> = hits.tile_keys().collect();
    let total_hits = hits.total_records();
    let quota = per_tile_quota(total_hits, keys.len());
    info!(
        "Sampling {quota} misses on each of {} tiles ({total_hits} hits)",
        keys.len()
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .build()
        .map_err(|e| SamplerError::Config(format!("cannot build worker pool: {e}")))?;

    let results: Vec<Option<(String, Vec<AoiRecord>)>> = pool.install(|| {
        keys.par_iter()
            .enumerate()
            .map(|(index, key)| {
                let result = sample_tile(index, key, hits, bounds, options, total_hits, quota);
                progress.inc(1);
                result
            })
            .collect()
    });

    let mut misses = MissDictionary::new();
    for (key, records) in results.into_iter().flatten() {
        misses.insert_tile(key, records);
    }
    info!(
        "Found {} misses on {} tiles",
        misses.total_records(),
        misses.tile_count()
    );
    Ok(misses)
}

fn sample_tile(
    index: usize,
    key: &str,
    hits: &HitDictionary,
    bounds: &dyn TileBoundsSource,
    options: &MissOptions,
    total_hits: usize,
    quota: usize,
) -> Option<(String, Vec<AoiRecord>)> {
    let tile = match bounds
        .tile_area(key)
        .and_then(|polygon| TileArea::new(key, polygon))
    {
        Ok(tile) => tile,
        Err(e) => {
            warn!("Skipping tile {key} for misses: {e}");
            return None;
        }
    };

    let tile_hits = hits.records(key);
    let first_id = (total_hits + index * quota) as u64;
    let mut rng = tile_rng(options.seed, index);
    let mut records = Vec::with_capacity(quota);

    for n in 0..quota {
        match find_one_miss(
            &tile,
            &options.shape,
            tile_hits,
            &records,
            &mut rng,
            options.max_attempts,
        ) {
            Ok(footprint) => records.push(AoiRecord::miss(first_id + n as u64, footprint)),
            Err(e) => {
                warn!("Tile {key}: kept {} of {quota} misses: {e}", records.len());
                break;
            }
        }
    }
    debug!("Tile {key}: {} misses", records.len());
    Some((key.to_string(), records))
}
