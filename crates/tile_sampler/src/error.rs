use std::{io, path::PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SamplerError>;

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("Invalid geometry: {message}")]
    Geometry { message: String },

    #[error("Unsupported geometry type: {0}")]
    UnsupportedGeometry(String),

    #[error("Invalid confidence value: {0}")]
    InvalidConfidence(String),

    #[error("No miss footprint found on tile {tile} after {attempts} attempts")]
    SamplingExhausted { tile: String, attempts: usize },

    #[error("Cannot resolve bounds of tile {tile}: {message}")]
    TileBounds { tile: String, message: String },

    #[error("Tile catalog error: {0}")]
    Catalog(String),

    #[error("Failed to download tile {tile}: {message}")]
    Download { tile: String, message: String },

    #[error("Failed to access checkpoint {path}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid checkpoint {path}: {message}")]
    CheckpointFormat { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SamplerError {
    pub(crate) fn geometry(message: impl Into<String>) -> Self {
        SamplerError::Geometry {
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for SamplerError {
    fn from(err: toml::de::Error) -> Self {
        SamplerError::Config(format!("TOML parse error: {err}"))
    }
}
