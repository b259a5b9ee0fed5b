use crate::{
    aoi::{extract_hits, read_feature_collection},
    checkpoint::{self, CheckpointKind, hit_checkpoint_path, miss_checkpoint_path},
    config::PipelineConfig,
    dictionary::{HitDictionary, MissDictionary, TileDictionary, merge_dictionaries},
    error::Result,
    export::{SubsetJob, SubsetStage},
    misses::{MissStrategy, TileBoundsSource, find_misses},
    progress::stage_bar,
    tiles::{ImageryStore, TileCatalog, download_missing, resolve_and_download},
};
use log::{error, info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveHits,
    FindMisses,
    Merge,
    Done,
    Failed,
}

/// External services the pipeline drives.
pub struct Collaborators {
    pub catalog: Box<dyn TileCatalog>,
    pub store: Box<dyn ImageryStore>,
    pub bounds: Box<dyn TileBoundsSource>,
    pub subset: Box<dyn SubsetStage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub merged: TileDictionary,
    pub hit_count: usize,
    pub miss_count: usize,
    pub hits_from_checkpoint: bool,
    pub misses_from_checkpoint: bool,
}

pub struct Pipeline {
    config: PipelineConfig,
    collaborators: Collaborators,
    stage: Stage,
}

/// A stage checkpoint is reused only if it exists, the tiles it refers to are on disk,
/// and no clean run was requested.
fn checkpoint_usable(checkpoint: &Path, tile_dir: &Path, clean: bool) -> bool {
    if clean || !checkpoint.is_file() {
        return false;
    }
    match fs::read_dir(tile_dir) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            collaborators,
            stage: Stage::ResolveHits,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn hit_checkpoint(&self) -> PathBuf {
        hit_checkpoint_path(&self.config.dataset.checkpoint_dir, &self.config.dataset.name)
    }

    fn miss_checkpoint(&self) -> PathBuf {
        miss_checkpoint_path(&self.config.dataset.checkpoint_dir, &self.config.dataset.name)
    }

    /// Run every remaining stage; any stage error leaves the pipeline in [`Stage::Failed`].
    pub fn run(&mut self) -> Result<PipelineOutcome> {
        match self.run_stages() {
            Ok(outcome) => {
                self.stage = Stage::Done;
                Ok(outcome)
            }
            Err(e) => {
                error!("Pipeline failed during {:?}: {}", self.stage, e);
                self.stage = Stage::Failed;
                Err(e)
            }
        }
    }

    fn run_stages(&mut self) -> Result<PipelineOutcome> {
        self.stage = Stage::ResolveHits;
        let (hits, hits_from_checkpoint) = self.resolve_hits()?;

        self.stage = Stage::FindMisses;
        let (misses, misses_from_checkpoint) = self.find_misses(&hits)?;

        self.stage = Stage::Merge;
        let merged = self.merge_and_hand_off(&hits, &misses)?;

        Ok(PipelineOutcome {
            merged,
            hit_count: hits.total_records(),
            miss_count: misses.total_records(),
            hits_from_checkpoint,
            misses_from_checkpoint,
        })
    }

    fn resolve_hits(&self) -> Result<(HitDictionary, bool)> {
        let checkpoint = self.hit_checkpoint();
        let tile_dir = self.config.tile_dir();
        if checkpoint_usable(&checkpoint, &tile_dir, self.config.clean) {
            info!("Loading hits from {}", checkpoint.display());
            let hits = checkpoint::load(&checkpoint, CheckpointKind::Hits)?;
            download_missing(&hits, self.collaborators.store.as_ref(), &tile_dir)?;
            return Ok((hits, true));
        }

        let collection = read_feature_collection(&self.config.dataset.input)?;
        let aois = extract_hits(
            &collection.features,
            self.config.sampling.confidence,
            self.config.sampling.size_px,
        )?;

        let progress = stage_bar(aois.len() as u64, "resolving tiles");
        let hits = resolve_and_download(
            &aois,
            self.collaborators.catalog.as_ref(),
            self.collaborators.store.as_ref(),
            &tile_dir,
            &self.config.resolve_options(),
            &progress,
        )?;
        progress.finish_and_clear();

        checkpoint::save(&checkpoint, CheckpointKind::Hits, &hits)?;
        info!("Hit checkpoint written to {}", checkpoint.display());
        Ok((hits, false))
    }

    fn find_misses(&self, hits: &HitDictionary) -> Result<(MissDictionary, bool)> {
        if self.config.sampling.skip_misses {
            info!("Miss sampling disabled");
            return Ok((MissDictionary::new(), false));
        }

        let checkpoint = self.miss_checkpoint();
        if checkpoint_usable(&checkpoint, &self.config.tile_dir(), self.config.clean) {
            info!("Loading misses from {}", checkpoint.display());
            let misses = checkpoint::load(&checkpoint, CheckpointKind::Misses)?;
            return Ok((misses, true));
        }

        if hits.is_empty() {
            warn!("No hits were resolved; nothing to sample misses against");
        }

        let strategy = self.config.miss_strategy();
        let len = match strategy {
            MissStrategy::QuotaPerTile => hits.tile_count(),
            MissStrategy::Dense => hits.total_records(),
        };
        let progress = stage_bar(len as u64, "sampling misses");
        let misses = find_misses(
            hits,
            self.collaborators.bounds.as_ref(),
            strategy,
            &self.config.miss_options(),
            &progress,
        )?;
        progress.finish_and_clear();

        checkpoint::save(&checkpoint, CheckpointKind::Misses, &misses)?;
        info!("Miss checkpoint written to {}", checkpoint.display());
        Ok((misses, false))
    }

    fn merge_and_hand_off(
        &self,
        hits: &HitDictionary,
        misses: &MissDictionary,
    ) -> Result<TileDictionary> {
        let merged = merge_dictionaries(hits, misses);
        info!(
            "Merged {} records on {} tiles",
            merged.total_records(),
            merged.tile_count()
        );

        let tile_dir = self.config.tile_dir();
        let subset_dir = self.config.subset_dir();
        let output_dir = self.config.output_dir();
        let job = SubsetJob {
            merged: &merged,
            tile_dir: &tile_dir,
            subset_dir: &subset_dir,
            output_dir: &output_dir,
            dataset: &self.config.dataset.name,
            size_px: self.config.sampling.size_px,
            workers: self.config.worker_count(),
        };
        self.collaborators.subset.run(&job)?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::SamplerError,
        export::ManifestExport,
        tiles::CatalogQuery,
    };
    use geo::{LineString, Polygon};
    use std::{
        collections::HashMap,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use tempfile::TempDir;

    const TILE: &str = "S2A_MSIL1C_20240101T000000_N0510_R000_T31UFT_20240101T000000";

    struct OneTileCatalog {
        calls: Arc<AtomicUsize>,
    }

    impl TileCatalog for OneTileCatalog {
        fn search(&self, _query: &CatalogQuery) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![TILE.to_string()])
        }
    }

    #[derive(Default)]
    struct DirStore {
        fetches: Arc<AtomicUsize>,
    }

    impl ImageryStore for DirStore {
        fn fetch(&self, tile_key: &str, tile_dir: &Path) -> Result<PathBuf> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let dir = tile_dir.join(tile_key);
            fs::create_dir_all(&dir)?;
            fs::write(dir.join("B04.jp2"), b"raster")?;
            Ok(dir)
        }
    }

    struct RecordingSubset {
        seen: Arc<Mutex<Vec<(usize, u32)>>>,
    }

    impl SubsetStage for RecordingSubset {
        fn run(&self, job: &SubsetJob<'_>) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push((job.merged.total_records(), job.size_px));
            Ok(())
        }
    }

    fn unit_square() -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]),
            vec![],
        )
    }

    fn write_input(dir: &Path) -> PathBuf {
        let path = dir.join("hits.geojson");
        let body = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"Point","coordinates":[0.2,0.2]},"properties":{"Confidence":1}},
            {"type":"Feature","geometry":{"type":"Point","coordinates":[0.5,0.5]},"properties":{"Confidence":2}},
            {"type":"Feature","geometry":{"type":"Point","coordinates":[0.8,0.8]},"properties":{"Confidence":3}},
            {"type":"Feature","geometry":{"type":"Point","coordinates":[0.3,0.7]},"properties":{"Confidence":5}}
        ]}"#;
        fs::write(&path, body).unwrap();
        path
    }

    fn config(dir: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.dataset.name = "mines".to_string();
        config.dataset.input = write_input(dir);
        config.dataset.tile_dir = Some(dir.join("tiles"));
        config.dataset.subset_dir = Some(dir.join("tifs"));
        config.dataset.output_dir = Some(dir.join("jpgs"));
        config.dataset.checkpoint_dir = dir.join("dicts");
        config.workers = 2;
        config.sampling.seed = Some(5);
        config
    }

    struct Harness {
        catalog_calls: Arc<AtomicUsize>,
        fetches: Arc<AtomicUsize>,
        subset_seen: Arc<Mutex<Vec<(usize, u32)>>>,
    }

    fn pipeline(config: PipelineConfig) -> (Pipeline, Harness) {
        let harness = Harness {
            catalog_calls: Arc::new(AtomicUsize::new(0)),
            fetches: Arc::new(AtomicUsize::new(0)),
            subset_seen: Arc::new(Mutex::new(Vec::new())),
        };
        let bounds: HashMap<String, Polygon<f64>> =
            HashMap::from([(TILE.to_string(), unit_square())]);
        let collaborators = Collaborators {
            catalog: Box::new(OneTileCatalog {
                calls: Arc::clone(&harness.catalog_calls),
            }),
            store: Box::new(DirStore {
                fetches: Arc::clone(&harness.fetches),
            }),
            bounds: Box::new(bounds),
            subset: Box::new(RecordingSubset {
                seen: Arc::clone(&harness.subset_seen),
            }),
        };
        (Pipeline::new(config, collaborators).unwrap(), harness)
    }

    #[test]
    fn test_full_run() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, harness) = pipeline(config(dir.path()));
        assert_eq!(pipeline.stage(), Stage::ResolveHits);

        let outcome = pipeline.run().unwrap();

        assert_eq!(pipeline.stage(), Stage::Done);
        assert_eq!(outcome.hit_count, 3);
        assert_eq!(outcome.miss_count, 3);
        assert!(!outcome.hits_from_checkpoint);
        assert!(!outcome.misses_from_checkpoint);
        assert_eq!(outcome.merged.records(TILE).len(), 6);
        assert_eq!(harness.catalog_calls.load(Ordering::SeqCst), 3);
        assert_eq!(*harness.subset_seen.lock().unwrap(), vec![(6, 256)]);

        let dicts = dir.path().join("dicts");
        assert!(dicts.join("mines.dictionary").is_file());
        assert!(dicts.join("mines_misses.dictionary").is_file());
    }

    #[test]
    fn test_second_run_resumes_from_checkpoints() {
        let dir = TempDir::new().unwrap();
        let (mut first, _) = pipeline(config(dir.path()));
        let first_outcome = first.run().unwrap();

        let (mut second, harness) = pipeline(config(dir.path()));
        let outcome = second.run().unwrap();

        assert!(outcome.hits_from_checkpoint);
        assert!(outcome.misses_from_checkpoint);
        assert_eq!(harness.catalog_calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.merged, first_outcome.merged);
    }

    #[test]
    fn test_clean_run_ignores_checkpoints() {
        let dir = TempDir::new().unwrap();
        let (mut first, _) = pipeline(config(dir.path()));
        first.run().unwrap();

        let mut cfg = config(dir.path());
        cfg.clean = true;
        let (mut second, harness) = pipeline(cfg);
        let outcome = second.run().unwrap();

        assert!(!outcome.hits_from_checkpoint);
        assert!(!outcome.misses_from_checkpoint);
        assert_eq!(harness.catalog_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_empty_tile_dir_forces_rebuild() {
        let dir = TempDir::new().unwrap();
        let (mut first, _) = pipeline(config(dir.path()));
        first.run().unwrap();
        fs::remove_dir_all(dir.path().join("tiles")).unwrap();

        let (mut second, harness) = pipeline(config(dir.path()));
        let outcome = second.run().unwrap();

        assert!(!outcome.hits_from_checkpoint);
        assert_eq!(harness.catalog_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_resume_downloads_tiles_missing_from_disk() {
        let dir = TempDir::new().unwrap();
        let (mut first, _) = pipeline(config(dir.path()));
        first.run().unwrap();
        let tiles = dir.path().join("tiles");
        fs::remove_dir_all(tiles.join(TILE)).unwrap();
        fs::create_dir(tiles.join("unrelated")).unwrap();

        let (mut second, harness) = pipeline(config(dir.path()));
        let outcome = second.run().unwrap();

        assert!(outcome.hits_from_checkpoint);
        assert_eq!(harness.catalog_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.fetches.load(Ordering::SeqCst), 1);
        assert!(tiles.join(TILE).join("B04.jp2").is_file());
    }

    #[test]
    fn test_corrupt_checkpoint_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (mut first, _) = pipeline(config(dir.path()));
        first.run().unwrap();
        fs::write(dir.path().join("dicts").join("mines.dictionary"), b"{ not json").unwrap();

        let (mut second, harness) = pipeline(config(dir.path()));
        let result = second.run();

        assert!(matches!(result, Err(SamplerError::CheckpointFormat { .. })));
        assert_eq!(second.stage(), Stage::Failed);
        assert_eq!(harness.catalog_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_skip_misses() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path());
        cfg.sampling.skip_misses = true;
        let (mut pipeline, harness) = pipeline(cfg);

        let outcome = pipeline.run().unwrap();

        assert_eq!(outcome.miss_count, 0);
        assert!(outcome.merged.records(TILE).iter().all(|r| !r.is_miss()));
        assert!(!dir.path().join("dicts").join("mines_misses.dictionary").exists());
        assert_eq!(*harness.subset_seen.lock().unwrap(), vec![(3, 256)]);
    }

    #[test]
    fn test_dense_mode_with_manifest_export() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path());
        cfg.sampling.dense = true;
        let bounds: HashMap<String, Polygon<f64>> =
            HashMap::from([(TILE.to_string(), unit_square())]);
        let collaborators = Collaborators {
            catalog: Box::new(OneTileCatalog {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            store: Box::new(DirStore::default()),
            bounds: Box::new(bounds),
            subset: Box::new(ManifestExport),
        };
        let mut pipeline = Pipeline::new(cfg, collaborators).unwrap();

        let outcome = pipeline.run().unwrap();

        assert_eq!(outcome.miss_count, 3);
        let manifest = dir.path().join("jpgs").join("mines_manifest.csv");
        let rows = fs::read_to_string(manifest).unwrap().lines().count();
        assert_eq!(rows, 7);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path());
        cfg.dataset.name.clear();
        let collaborators = Collaborators {
            catalog: Box::new(OneTileCatalog {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            store: Box::new(DirStore::default()),
            bounds: Box::new(HashMap::<String, Polygon<f64>>::new()),
            subset: Box::new(ManifestExport),
        };
        assert!(Pipeline::new(cfg, collaborators).is_err());
    }
}
