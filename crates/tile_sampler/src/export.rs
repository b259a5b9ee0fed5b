use crate::{
    dictionary::{AoiRecord, TileDictionary},
    error::Result,
};
use csv::WriterBuilder;
use log::info;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

/// Everything the external crop/convert stage receives.
#[derive(Debug, Clone, Copy)]
pub struct SubsetJob<'a> {
    pub merged: &'a TileDictionary,
    pub tile_dir: &'a Path,
    pub subset_dir: &'a Path,
    pub output_dir: &'a Path,
    pub dataset: &'a str,
    pub size_px: u32,
    pub workers: usize,
}

/// Downstream crop/convert collaborator.
pub trait SubsetStage {
    fn run(&self, job: &SubsetJob<'_>) -> Result<()>;
}

/// Output file stem for one record: `{id:05}_{classification}_{tile}_{dataset}`.
pub fn file_stem(record: &AoiRecord, tile: &str, dataset: &str) -> String {
    format!(
        "{:05}_{}_{}_{}",
        record.id, record.classification, tile, dataset
    )
}

pub fn manifest_path(output_dir: &Path, dataset: &str) -> PathBuf {
    output_dir.join(format!("{dataset}_manifest.csv"))
}

/// Write one CSV row per record for the external cropping tools.
pub fn export_manifest(job: &SubsetJob<'_>) -> Result<PathBuf> {
    fs::create_dir_all(job.output_dir)?;
    let path = manifest_path(job.output_dir, job.dataset);
    let file = File::create(&path)?;
    let mut wtr = WriterBuilder::new().from_writer(BufWriter::new(file));

    wtr.write_record(["file_stem", "id", "classification", "tile", "footprint_wkt"])?;
    let mut rows = 0usize;
    for (tile, records) in job.merged {
        for record in records {
            wtr.write_record([
                file_stem(record, tile, job.dataset).as_str(),
                record.id.to_string().as_str(),
                record.classification.to_string().as_str(),
                tile.as_str(),
                record.footprint.to_wkt().as_str(),
            ])?;
            rows += 1;
        }
    }
    wtr.flush()?;
    info!("Manifest with {rows} entries written to {}", path.display());
    Ok(path)
}

/// Default downstream stage: hand over a manifest, leave pixels to external tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestExport;

impl SubsetStage for ManifestExport {
    fn run(&self, job: &SubsetJob<'_>) -> Result<()> {
        export_manifest(job).map(|_| ())
    }
}
