use crate::{
    dictionary::{AoiRecord, HitDictionary, MissDictionary},
    error::Result,
    misses::{MissOptions, bounds::TileBoundsSource, sampler::{TileArea, find_one_miss}, tile_rng},
};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
};

const CLAIM_RETRY: Duration = Duration::from_millis(1);

/// Progress shared by the dense-mode tile threads.
///
/// `claimed` counts slots held by threads that are still sampling plus misses already
/// accepted; `accepted` counts only the latter and also hands out id offsets.
struct SharedQuota {
    quota: usize,
    claimed: AtomicUsize,
    accepted: AtomicUsize,
}

impl SharedQuota {
    fn new(quota: usize) -> Self {
        Self {
            quota,
            claimed: AtomicUsize::new(0),
            accepted: AtomicUsize::new(0),
        }
    }

    /// Increment first, then compare: a thread only proceeds with a slot it owns.
    fn claim(&self) -> bool {
        if self.claimed.fetch_add(1, Ordering::SeqCst) < self.quota {
            return true;
        }
        self.release();
        false
    }

    fn release(&self) {
        self.claimed.fetch_sub(1, Ordering::SeqCst);
    }

    /// Turn a claimed slot into an accepted miss and return its id offset.
    fn accept(&self) -> u64 {
        self.accepted.fetch_add(1, Ordering::SeqCst) as u64
    }

    fn filled(&self) -> bool {
        self.accepted.load(Ordering::SeqCst) >= self.quota
    }
}

/// Dense sampling: one global quota equal to the hit count, shared by one thread per
/// tile over the first `workers` tiles.
///
/// Each thread owns its tile's miss list; only the quota counter, the id counter and the
/// progress bar are shared. A tile whose bounds cannot be resolved contributes nothing and
/// the other threads fill the quota.
pub fn find_misses_dense(
    hits: &HitDictionary,
    bounds: &dyn TileBoundsSource,
    options: &MissOptions,
    progress: &ProgressBar,
) -> Result<MissDictionary> {
    let total_hits = hits.total_records();
    let keys: Vec<&str> = hits.tile_keys().take(options.workers.max(1)).collect();
    info!(
        "Dense sampling of {total_hits} misses across {} tile threads",
        keys.len()
    );

    let shared = SharedQuota::new(total_hits);

    let results: Vec<Option<(String, Vec<AoiRecord>)>> = thread::scope(|scope| {
        let handles: Vec<_> = keys
            .iter()
            .enumerate()
            .map(|(index, &key)| {
                let shared = &shared;
                scope.spawn(move || {
                    sample_tile(index, key, hits, bounds, options, total_hits, shared, progress)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
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

#[allow(clippy::too_many_arguments)]
fn sample_tile(
    index: usize,
    key: &str,
    hits: &HitDictionary,
    bounds: &dyn TileBoundsSource,
    options: &MissOptions,
    total_hits: usize,
    shared: &SharedQuota,
    progress: &ProgressBar,
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
    let mut rng = tile_rng(options.seed, index);
    let mut records: Vec<AoiRecord> = Vec::new();

    // A failed claim only ends the thread once the quota is filled; slots still held by
    // other threads may be given back when their tile runs out of room.
    loop {
        if !shared.claim() {
            if shared.filled() {
                break;
            }
            thread::sleep(CLAIM_RETRY);
            continue;
        }
        match find_one_miss(
            &tile,
            &options.shape,
            tile_hits,
            &records,
            &mut rng,
            options.max_attempts,
        ) {
            Ok(footprint) => {
                let id = total_hits as u64 + shared.accept();
                records.push(AoiRecord::miss(id, footprint));
                progress.inc(1);
            }
            Err(e) => {
                shared.release();
                warn!("Tile {key} is full after {} misses: {e}", records.len());
                break;
            }
        }
    }
    debug!("Tile {key}: {} misses", records.len());
    Some((key.to_string(), records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{geometry::Footprint, misses::sampler::FootprintShape};
    use geo::Polygon;
    use std::collections::{HashMap, HashSet};

    fn tile_polygon(x: f64) -> Polygon<f64> {
        Footprint::from_bounds(x, 0.0, x + 40.0, 40.0).to_polygon()
    }

    fn packed_hits(tiles: &[(&str, f64)], per_tile: usize) -> HitDictionary {
        let mut dict = HitDictionary::new();
        let mut id = 0;
        for &(key, x) in tiles {
            for i in 0..per_tile {
                let cx = x + 2.0 + 3.0 * (i % 10) as f64;
                let cy = 2.0 + 3.0 * (i / 10) as f64;
                dict.push(key, AoiRecord::hit(id, Footprint::from_bounds(cx, cy, cx + 1.0, cy + 1.0), 1));
                id += 1;
            }
        }
        dict
    }

    fn options(workers: usize, max_attempts: usize) -> MissOptions {
        MissOptions {
            shape: FootprintShape::Planar { side: 1.0 },
            workers,
            max_attempts,
            seed: Some(9),
        }
    }

    fn bounds_for(tiles: &[(&str, f64)]) -> HashMap<String, Polygon<f64>> {
        tiles.iter().map(|&(k, x)| (k.to_string(), tile_polygon(x))).collect()
    }

    #[test]
    fn test_global_quota_is_met_exactly() {
        let tiles = [("A", 0.0), ("B", 100.0), ("C", 200.0)];
        let hits = packed_hits(&tiles, 10);
        let progress = ProgressBar::hidden();

        let misses =
            find_misses_dense(&hits, &bounds_for(&tiles), &options(3, 10_000), &progress).unwrap();

        assert_eq!(misses.total_records(), 30);
        assert_eq!(progress.position(), 30);
        let ids: HashSet<u64> = misses.iter().flat_map(|(_, r)| r.iter().map(|m| m.id)).collect();
        assert_eq!(ids, (30..60).collect());
    }

    #[test]
    fn test_no_overlap_with_hits_or_misses() {
        let tiles = [("A", 0.0), ("B", 100.0)];
        let hits = packed_hits(&tiles, 20);
        let misses =
            find_misses_dense(&hits, &bounds_for(&tiles), &options(2, 10_000), &ProgressBar::hidden())
                .unwrap();

        for (key, tile_misses) in &misses {
            for (i, m) in tile_misses.iter().enumerate() {
                assert!(hits.records(key).iter().all(|h| !h.footprint.intersects(&m.footprint)));
                assert!(tile_misses[i + 1..].iter().all(|o| !o.footprint.intersects(&m.footprint)));
                assert!(m.footprint.is_within(&tile_polygon(if key == "A" { 0.0 } else { 100.0 })));
            }
        }
    }

    #[test]
    fn test_unresolvable_tile_leaves_quota_to_others() {
        let tiles = [("A", 0.0), ("B", 100.0)];
        let hits = packed_hits(&tiles, 5);
        let bounds = HashMap::from([("B".to_string(), tile_polygon(100.0))]);

        let misses = find_misses_dense(&hits, &bounds, &options(2, 10_000), &ProgressBar::hidden())
            .unwrap();
        assert!(!misses.contains_tile("A"));
        assert_eq!(misses.records("B").len(), 10);
    }

    #[test]
    fn test_slot_given_back_by_full_tile_is_refilled() {
        let tiles = [("A", 0.0), ("B", 100.0)];
        let mut hits = HitDictionary::new();
        // tile A is covered completely, so every candidate there is rejected
        hits.push("A", AoiRecord::hit(0, Footprint::from_bounds(-1.0, -1.0, 41.0, 41.0), 1));
        hits.push("A", AoiRecord::hit(1, Footprint::from_bounds(5.0, 5.0, 6.0, 6.0), 1));
        hits.push("B", AoiRecord::hit(2, Footprint::from_bounds(105.0, 5.0, 106.0, 6.0), 1));
        hits.push("B", AoiRecord::hit(3, Footprint::from_bounds(110.0, 5.0, 111.0, 6.0), 1));

        let misses = find_misses_dense(
            &hits,
            &bounds_for(&tiles),
            &options(2, 200_000),
            &ProgressBar::hidden(),
        )
        .unwrap();

        assert_eq!(misses.records("A").len(), 0);
        assert_eq!(misses.records("B").len(), 4);
        let ids: HashSet<u64> = misses.records("B").iter().map(|m| m.id).collect();
        assert_eq!(ids, (4..8).collect());
    }

    #[test]
    fn test_thread_count_limits_tiles() {
        let tiles = [("A", 0.0), ("B", 100.0), ("C", 200.0)];
        let hits = packed_hits(&tiles, 4);
        let misses =
            find_misses_dense(&hits, &bounds_for(&tiles), &options(1, 10_000), &ProgressBar::hidden())
                .unwrap();
        assert_eq!(misses.tile_count(), 1);
        assert_eq!(misses.records("A").len(), 12);
    }

    #[test]
    fn test_shared_quota_claims_never_exceed() {
        let shared = SharedQuota::new(100);
        let granted: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| (0..50).filter(|_| shared.claim()).count()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(granted, 100);
    }
}
