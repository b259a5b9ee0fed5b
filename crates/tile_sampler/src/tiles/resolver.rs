use crate::{
    dictionary::{AoiRecord, HitDictionary},
    error::Result,
    tiles::{
        catalog::{CatalogQuery, DateWindow, SensorFilter, TileCatalog},
        registry::{Assignment, HitRegistry},
        store::ImageryStore,
    },
};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use std::{fs, path::Path, thread};

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub workers: usize,
    pub window: DateWindow,
    pub filter: SensorFilter,
}

/// Tile keys already present under `tile_dir` (file stem of each entry).
pub fn existing_tiles(tile_dir: &Path) -> Result<Vec<String>> {
    if !tile_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut keys = Vec::new();
    for entry in fs::read_dir(tile_dir)? {
        let path = entry?.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.starts_with('.') {
            continue;
        }
        keys.push(stem.to_string());
    }
    keys.sort();
    keys.dedup();
    Ok(keys)
}

/// Resolve every AoI to a covering tile and download each new tile once.
///
/// AoIs are dealt round-robin to `options.workers` threads sharing one [`HitRegistry`].
/// Tiles already on disk are pre-registered and never downloaded again. Catalog and
/// download failures are logged and do not stop the worker.
pub fn resolve_and_download(
    aois: &[AoiRecord],
    catalog: &dyn TileCatalog,
    store: &dyn ImageryStore,
    tile_dir: &Path,
    options: &ResolveOptions,
    progress: &ProgressBar,
) -> Result<HitDictionary> {
    fs::create_dir_all(tile_dir)?;

    let on_disk = existing_tiles(tile_dir)?;
    info!("Already downloaded {} tiles", on_disk.len());
    let registry = HitRegistry::seeded(on_disk);

    let workers = options.workers.max(1);
    thread::scope(|scope| {
        for shard in 0..workers {
            let registry = &registry;
            scope.spawn(move || {
                let assigned = aois.iter().skip(shard).step_by(workers);
                for aoi in assigned {
                    resolve_one(aoi, catalog, store, tile_dir, options, registry);
                    progress.inc(1);
                }
                debug!("Resolver worker {shard} finished");
            });
        }
    });

    let hits = registry.into_inner();
    info!(
        "Resolved {} hits onto {} tiles",
        hits.total_records(),
        hits.tile_count()
    );
    Ok(hits)
}

fn resolve_one(
    aoi: &AoiRecord,
    catalog: &dyn TileCatalog,
    store: &dyn ImageryStore,
    tile_dir: &Path,
    options: &ResolveOptions,
    registry: &HitRegistry,
) {
    let query = CatalogQuery::new(&aoi.footprint, options.window, options.filter.clone());
    let candidates = match catalog.search(&query) {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!("Catalog query failed for AoI {}: {e}", aoi.id);
            return;
        }
    };

    match registry.assign(&candidates, *aoi) {
        None => warn!("No tile found for AoI {}. Continuing", aoi.id),
        Some(Assignment::Existing(key)) => debug!("AoI {} joins tile {key}", aoi.id),
        Some(Assignment::New(key)) => {
            info!("Found AoI {} in a new tile: {key}. Downloading", aoi.id);
            fetch_or_discard(store, &key, tile_dir);
        }
    }
}

/// Fetch one tile; on failure remove whatever the store left behind so the tile is not
/// seeded as downloaded on the next run.
fn fetch_or_discard(store: &dyn ImageryStore, key: &str, tile_dir: &Path) -> bool {
    match store.fetch(key, tile_dir) {
        Ok(_) => true,
        Err(e) => {
            warn!("Download of tile {key} failed, will retry on a later run: {e}");
            let partial = tile_dir.join(key);
            if partial.is_dir()
                && let Err(e) = fs::remove_dir_all(&partial)
            {
                warn!("Could not remove partial tile {}: {e}", partial.display());
            }
            false
        }
    }
}

/// Download every tile of `hits` that is not on disk yet, e.g. after a resumed run whose
/// earlier downloads failed. Returns the number of tiles fetched successfully.
pub fn download_missing(
    hits: &HitDictionary,
    store: &dyn ImageryStore,
    tile_dir: &Path,
) -> Result<usize> {
    fs::create_dir_all(tile_dir)?;
    let on_disk = existing_tiles(tile_dir)?;
    let missing: Vec<&str> = hits
        .tile_keys()
        .filter(|key| on_disk.binary_search_by(|k| k.as_str().cmp(key)).is_err())
        .collect();
    if missing.is_empty() {
        return Ok(0);
    }

    info!("Retrying download of {} missing tiles", missing.len());
    Ok(missing
        .into_iter()
        .filter(|key| fetch_or_discard(store, key, tile_dir))
        .count())
}
