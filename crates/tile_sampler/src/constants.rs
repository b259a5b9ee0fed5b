/// Ground sampling distance assumed for every footprint
pub const METRES_PER_PIXEL: f64 = 10.0;

/// Segments used to approximate the geodesic buffer circle
pub const BUFFER_SEGMENTS: usize = 64;

/// Confidence levels: 1 = high, 2 = medium, 3 = low
pub const MOST_TRUSTED_CONFIDENCE: u8 = 1;
pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 3;
pub const CONFIDENCE_PROPERTY: &str = "Confidence";

/// Classification stored on every miss record
pub const MISS_CLASSIFICATION: u8 = 0;

pub const DEFAULT_SIZE_PX: u32 = 256;
pub const DEFAULT_MAX_ATTEMPTS: usize = 10_000;

/// Catalog query defaults
pub const DEFAULT_LOOKBACK_DAYS: i64 = 60;
pub const DEFAULT_MAX_CLOUD_PERCENT: u8 = 5;
pub const DEFAULT_SAR_PRODUCT_TYPE: &str = "GRD";
pub const CATALOG_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Public Sentinel-2 bucket
pub const DEFAULT_BUCKET: &str = "gcp-public-data-sentinel-2";
pub const DEFAULT_STORE_URL: &str = "https://storage.googleapis.com";

/// Checkpoint layout
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;
pub const DEFAULT_CHECKPOINT_DIR: &str = "dicts";
pub const HIT_CHECKPOINT_SUFFIX: &str = ".dictionary";
pub const MISS_CHECKPOINT_SUFFIX: &str = "_misses.dictionary";

/// Tile metadata file holding the tile footprint
pub const INSPIRE_FILE: &str = "INSPIRE.xml";
