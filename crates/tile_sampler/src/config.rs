use crate::{
    constants::{
        DEFAULT_BUCKET, DEFAULT_CHECKPOINT_DIR, DEFAULT_CONFIDENCE_THRESHOLD,
        DEFAULT_LOOKBACK_DAYS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CLOUD_PERCENT,
        DEFAULT_SAR_PRODUCT_TYPE, DEFAULT_SIZE_PX, DEFAULT_STORE_URL,
    },
    error::{Result, SamplerError},
    misses::{FootprintShape, MissOptions, MissStrategy},
    tiles::{DateWindow, ResolveOptions, SensorFilter},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Full pipeline configuration, usually read from TOML and then overridden by CLI flags.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Worker threads for resolution and miss sampling (0 = available parallelism)
    #[serde(default)]
    pub workers: usize,
    /// Ignore checkpoints and rebuild every stage
    #[serde(default)]
    pub clean: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub input: PathBuf,
    pub tile_dir: Option<PathBuf>,
    pub subset_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SamplingConfig {
    #[serde(default = "default_size_px")]
    pub size_px: u32,
    #[serde(default = "default_confidence")]
    pub confidence: u8,
    #[serde(default)]
    pub dense: bool,
    #[serde(default)]
    pub skip_misses: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensor {
    #[default]
    Optical,
    Sar,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub sensor: Sensor,
    #[serde(default = "default_max_cloud_percent")]
    pub max_cloud_percent: u8,
    #[serde(default = "default_sar_product_type")]
    pub sar_product_type: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub base_url: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CHECKPOINT_DIR)
}
fn default_size_px() -> u32 {
    DEFAULT_SIZE_PX
}
fn default_confidence() -> u8 {
    DEFAULT_CONFIDENCE_THRESHOLD
}
fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}
fn default_max_cloud_percent() -> u8 {
    DEFAULT_MAX_CLOUD_PERCENT
}
fn default_sar_product_type() -> String {
    DEFAULT_SAR_PRODUCT_TYPE.to_string()
}
fn default_lookback_days() -> i64 {
    DEFAULT_LOOKBACK_DAYS
}
fn default_store_url() -> String {
    DEFAULT_STORE_URL.to_string()
}
fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            input: PathBuf::new(),
            tile_dir: None,
            subset_dir: None,
            output_dir: None,
            checkpoint_dir: default_checkpoint_dir(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            size_px: DEFAULT_SIZE_PX,
            confidence: DEFAULT_CONFIDENCE_THRESHOLD,
            dense: false,
            skip_misses: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            seed: None,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            sensor: Sensor::Optical,
            max_cloud_percent: DEFAULT_MAX_CLOUD_PERCENT,
            sar_product_type: default_sar_product_type(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_store_url(),
            bucket: default_bucket(),
        }
    }
}

impl PipelineConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SamplerError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: PipelineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset.name.trim().is_empty() {
            return Err(SamplerError::Config("dataset name must not be empty".into()));
        }
        if self.dataset.input.as_os_str().is_empty() {
            return Err(SamplerError::Config("input GeoJSON path is required".into()));
        }
        if self.sampling.size_px == 0 {
            return Err(SamplerError::Config("size_px must be at least 1".into()));
        }
        if self.sampling.max_attempts == 0 {
            return Err(SamplerError::Config("max_attempts must be at least 1".into()));
        }
        if self.catalog.max_cloud_percent > 100 {
            return Err(SamplerError::Config(format!(
                "max_cloud_percent must be within 0..=100, got {}",
                self.catalog.max_cloud_percent
            )));
        }
        if self.catalog.lookback_days <= 0 {
            return Err(SamplerError::Config(format!(
                "lookback_days must be positive, got {}",
                self.catalog.lookback_days
            )));
        }
        Ok(())
    }

    fn dataset_dir(&self, configured: &Option<PathBuf>, suffix: &str) -> PathBuf {
        configured
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_{suffix}", self.dataset.name)))
    }

    pub fn tile_dir(&self) -> PathBuf {
        self.dataset_dir(&self.dataset.tile_dir, "tiles")
    }

    pub fn subset_dir(&self) -> PathBuf {
        self.dataset_dir(&self.dataset.subset_dir, "tifs")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dataset_dir(&self.dataset.output_dir, "jpgs")
    }

    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn sensor_filter(&self) -> SensorFilter {
        match self.catalog.sensor {
            Sensor::Optical => SensorFilter::Optical {
                max_cloud_percent: self.catalog.max_cloud_percent,
            },
            Sensor::Sar => SensorFilter::Sar {
                product_type: self.catalog.sar_product_type.clone(),
            },
        }
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            workers: self.worker_count(),
            window: DateWindow::lookback(self.catalog.lookback_days),
            filter: self.sensor_filter(),
        }
    }

    pub fn miss_strategy(&self) -> MissStrategy {
        if self.sampling.dense {
            MissStrategy::Dense
        } else {
            MissStrategy::QuotaPerTile
        }
    }

    pub fn miss_options(&self) -> MissOptions {
        MissOptions {
            shape: FootprintShape::Geodesic {
                size_px: self.sampling.size_px,
            },
            workers: self.worker_count(),
            max_attempts: self.sampling.max_attempts,
            seed: self.sampling.seed,
        }
    }
}
