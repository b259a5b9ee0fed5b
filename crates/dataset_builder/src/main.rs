mod config;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info};
use std::{io::Write, path::PathBuf};
use tile_sampler::{
    BucketStore, Collaborators, HttpCatalog, InspireBounds, ManifestExport, Pipeline,
    PipelineConfig, Sensor,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Build a hit/miss satellite image dataset from a GeoJSON of detections", long_about = None)]
struct Args {
    /// GeoJSON feature collection of detections
    input: Option<PathBuf>,

    /// Dataset name, used for checkpoint and output file names
    name: Option<String>,

    /// TOML configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Directory for downloaded tiles [default: <name>_tiles]
    #[arg(long = "tile-dir")]
    tile_dir: Option<PathBuf>,

    /// Directory for cropped rasters [default: <name>_tifs]
    #[arg(long = "tif-dir")]
    tif_dir: Option<PathBuf>,

    /// Directory for final images and the manifest [default: <name>_jpgs]
    #[arg(long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// Tile catalog search endpoint
    #[arg(long = "catalog-url")]
    catalog_url: Option<String>,

    /// Worker threads
    #[arg(short = 'w', long = "workers")]
    workers: Option<usize>,

    /// Footprint side in pixels
    #[arg(short = 's', long = "size")]
    size: Option<u32>,

    /// Keep features with a confidence value at or below this level
    #[arg(long = "confidence")]
    confidence: Option<u8>,

    /// Share one miss quota across tiles for tightly packed detections
    #[arg(long = "dense")]
    dense: bool,

    /// Ignore existing checkpoints
    #[arg(long = "clean")]
    clean: bool,

    /// Skip miss sampling
    #[arg(long = "nomiss")]
    nomiss: bool,

    /// Imagery source
    #[arg(long = "sensor", value_parser = ["optical", "sar"])]
    sensor: Option<String>,

    /// Seed for reproducible miss sampling
    #[arg(long = "seed")]
    seed: Option<u64>,

    /// Debug logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .try_init();

    if let Err(e) = run(args) {
        error!("Error: {e:#}");

        // Provide helpful hints for common errors
        use std::io::ErrorKind;
        for cause in e.chain().skip(1) {
            if let Some(ioe) = cause.downcast_ref::<std::io::Error>() {
                match ioe.kind() {
                    ErrorKind::PermissionDenied => {
                        error!("Hint: Run in a writable directory or set DATASET_CHECKPOINT_DIR.");
                        break;
                    }
                    ErrorKind::NotFound => {
                        error!("Hint: Check the input file and directory paths.");
                        break;
                    }
                    ErrorKind::Other if format!("{ioe}").contains("No space left") => {
                        error!("Hint: Check available disk space for tile downloads.");
                        break;
                    }
                    _ => {}
                }
            }
        }
        let _ = std::io::stderr().flush();
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let env = config::EnvConfig::from_env()?;

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    apply_overrides(&mut config, &args, &env);
    config.validate()?;

    if config.catalog.base_url.trim().is_empty() {
        bail!("No tile catalog configured: set [catalog] base_url or pass --catalog-url");
    }

    info!("Building dataset '{}' from {}", config.dataset.name, config.dataset.input.display());
    info!("Tiles: {}", config.tile_dir().display());
    info!("Checkpoints: {}", config.dataset.checkpoint_dir.display());

    let collaborators = Collaborators {
        catalog: Box::new(HttpCatalog::new(&config.catalog.base_url, env.catalog_token.clone())?),
        store: Box::new(BucketStore::new(&config.store.base_url, &config.store.bucket)?),
        bounds: Box::new(InspireBounds::new(config.tile_dir())),
        subset: Box::new(ManifestExport),
    };

    let mut pipeline = Pipeline::new(config, collaborators)?;
    let outcome = pipeline.run().context("Dataset build failed")?;

    info!(
        "Done: {} hits and {} misses on {} tiles",
        outcome.hit_count,
        outcome.miss_count,
        outcome.merged.tile_count()
    );
    if outcome.hits_from_checkpoint || outcome.misses_from_checkpoint {
        info!("Some stages were restored from checkpoints; pass --clean to rebuild them");
    }
    Ok(())
}

/// Command-line values win over the environment, which wins over the config file.
fn apply_overrides(config: &mut PipelineConfig, args: &Args, env: &config::EnvConfig) {
    if let Some(input) = &args.input {
        config.dataset.input = input.clone();
    }
    if let Some(name) = &args.name {
        config.dataset.name = name.clone();
    }
    if let Some(dir) = &env.checkpoint_dir {
        config.dataset.checkpoint_dir = dir.clone();
    }
    if args.tile_dir.is_some() {
        config.dataset.tile_dir = args.tile_dir.clone();
    }
    if args.tif_dir.is_some() {
        config.dataset.subset_dir = args.tif_dir.clone();
    }
    if args.out_dir.is_some() {
        config.dataset.output_dir = args.out_dir.clone();
    }
    if let Some(url) = &args.catalog_url {
        config.catalog.base_url = url.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(size) = args.size {
        config.sampling.size_px = size;
    }
    if let Some(confidence) = args.confidence {
        config.sampling.confidence = confidence;
    }
    if let Some(seed) = args.seed {
        config.sampling.seed = Some(seed);
    }
    match args.sensor.as_deref() {
        Some("sar") => config.catalog.sensor = Sensor::Sar,
        Some("optical") => config.catalog.sensor = Sensor::Optical,
        _ => {}
    }
    config.sampling.dense |= args.dense;
    config.sampling.skip_misses |= args.nomiss;
    config.clean |= args.clean;
}
