pub mod aoi;
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod dictionary;
pub mod error;
pub mod export;
pub mod geometry;
pub mod misses;
pub mod pipeline;
pub mod progress;
pub mod tiles;

pub use aoi::{Feature, FeatureCollection, HitExtractor, extract_hits, read_feature_collection};
pub use checkpoint::CheckpointKind;
pub use config::{PipelineConfig, Sensor};
pub use dictionary::{AoiRecord, HitDictionary, MissDictionary, TileDictionary, merge_dictionaries};
pub use error::{Result, SamplerError};
pub use export::{ManifestExport, SubsetJob, SubsetStage};
pub use geometry::{Footprint, square_footprint};
pub use misses::{InspireBounds, MissOptions, MissStrategy, TileBoundsSource, find_misses};
pub use pipeline::{Collaborators, Pipeline, PipelineOutcome, Stage};
pub use tiles::{BucketStore, HttpCatalog, ImageryStore, TileCatalog, resolve_and_download};
