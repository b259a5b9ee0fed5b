use crate::{
    constants::{
        CHECKPOINT_FORMAT_VERSION, HIT_CHECKPOINT_SUFFIX, MISS_CHECKPOINT_SUFFIX,
    },
    dictionary::TileDictionary,
    error::{Result, SamplerError},
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    Hits,
    Misses,
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    format_version: u32,
    kind: CheckpointKind,
    tiles: TileDictionary,
}

/// `<dir>/<name>.dictionary`
pub fn hit_checkpoint_path(dir: &Path, dataset: &str) -> PathBuf {
    dir.join(format!("{dataset}{HIT_CHECKPOINT_SUFFIX}"))
}

/// `<dir>/<name>_misses.dictionary`
pub fn miss_checkpoint_path(dir: &Path, dataset: &str) -> PathBuf {
    dir.join(format!("{dataset}{MISS_CHECKPOINT_SUFFIX}"))
}

/// Write `dict` to `path` atomically: serialize into a sibling temp file, then rename.
pub fn save(path: &Path, kind: CheckpointKind, dict: &TileDictionary) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| SamplerError::Checkpoint {
        path: parent.to_path_buf(),
        source: e,
    })?;

    let tmp = NamedTempFile::new_in(parent).map_err(|e| SamplerError::Checkpoint {
        path: path.to_path_buf(),
        source: e,
    })?;

    let body = CheckpointFile {
        format_version: CHECKPOINT_FORMAT_VERSION,
        kind,
        tiles: dict.clone(),
    };
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, &body)?;
        writer.flush().map_err(|e| SamplerError::Checkpoint {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    tmp.as_file().sync_all().map_err(|e| SamplerError::Checkpoint {
        path: path.to_path_buf(),
        source: e,
    })?;
    tmp.persist(path).map_err(|e| SamplerError::Checkpoint {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    debug!(
        "Checkpoint written: {} ({} tiles, {} records)",
        path.display(),
        dict.tile_count(),
        dict.total_records()
    );
    Ok(())
}

/// Load a checkpoint written by [`save`].
///
/// Unreadable, corrupt, wrong-version or wrong-kind files are errors; nothing falls back
/// to an empty dictionary.
pub fn load(path: &Path, kind: CheckpointKind) -> Result<TileDictionary> {
    let file = File::open(path).map_err(|e| SamplerError::Checkpoint {
        path: path.to_path_buf(),
        source: e,
    })?;
    let body: CheckpointFile = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        SamplerError::CheckpointFormat {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    if body.format_version != CHECKPOINT_FORMAT_VERSION {
        return Err(SamplerError::CheckpointFormat {
            path: path.to_path_buf(),
            message: format!(
                "unsupported format version {} (expected {})",
                body.format_version, CHECKPOINT_FORMAT_VERSION
            ),
        });
    }
    if body.kind != kind {
        return Err(SamplerError::CheckpointFormat {
            path: path.to_path_buf(),
            message: format!("holds {:?}, expected {:?}", body.kind, kind),
        });
    }
    Ok(body.tiles)
}
