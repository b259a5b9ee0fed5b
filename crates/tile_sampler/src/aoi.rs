//! Reading detections from GeoJSON and turning them into hit records.
//!
//! A feature whose geometry or confidence cannot be interpreted aborts the whole
//! extraction; the error names the offending feature.

use crate::{
    constants::{CONFIDENCE_PROPERTY, MOST_TRUSTED_CONFIDENCE},
    dictionary::AoiRecord,
    error::{Result, SamplerError},
    geometry::{Footprint, square_footprint},
};
use geo::{Centroid, LineString, MultiPolygon, Point, Polygon};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{fs::File, io::BufReader, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    pub geometry: RawGeometry,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

/// Positions may carry a third (altitude) value, which is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum RawGeometry {
    Point { coordinates: Vec<f64> },
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    LineString,
    MultiLineString,
    MultiPoint,
    GeometryCollection,
}

impl RawGeometry {
    fn type_name(&self) -> &'static str {
        match self {
            RawGeometry::Point { .. } => "Point",
            RawGeometry::Polygon { .. } => "Polygon",
            RawGeometry::MultiPolygon { .. } => "MultiPolygon",
            RawGeometry::LineString => "LineString",
            RawGeometry::MultiLineString => "MultiLineString",
            RawGeometry::MultiPoint => "MultiPoint",
            RawGeometry::GeometryCollection => "GeometryCollection",
        }
    }

    /// Centroid for areal geometries, the coordinate itself for points.
    pub fn representative_point(&self) -> Result<Point<f64>> {
        match self {
            RawGeometry::Point { coordinates } => position(coordinates),
            RawGeometry::Polygon { coordinates } => polygon(coordinates)?
                .centroid()
                .ok_or_else(|| SamplerError::geometry("polygon has no centroid")),
            RawGeometry::MultiPolygon { coordinates } => {
                let polygons = coordinates
                    .iter()
                    .map(|rings| polygon(rings))
                    .collect::<Result<Vec<_>>>()?;
                MultiPolygon::new(polygons)
                    .centroid()
                    .ok_or_else(|| SamplerError::geometry("multipolygon has no centroid"))
            }
            other => Err(SamplerError::UnsupportedGeometry(
                other.type_name().to_string(),
            )),
        }
    }
}

fn position(coords: &[f64]) -> Result<Point<f64>> {
    match coords {
        [x, y, ..] => Ok(Point::new(*x, *y)),
        _ => Err(SamplerError::geometry(format!(
            "position needs at least 2 values, got {}",
            coords.len()
        ))),
    }
}

fn ring(coords: &[Vec<f64>]) -> Result<LineString<f64>> {
    let points = coords
        .iter()
        .map(|c| position(c).map(|p| p.0))
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(points))
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let (exterior, interiors) = rings
        .split_first()
        .ok_or_else(|| SamplerError::geometry("polygon has no rings"))?;
    let interiors = interiors
        .iter()
        .map(|r| ring(r))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(ring(exterior)?, interiors))
}

impl Feature {
    /// Confidence property, defaulting to the most trusted level when absent or null.
    ///
    /// Integral floats such as `2.0` are accepted. Zero, fractions, negatives, values
    /// above 255 and non-numbers are errors.
    pub fn confidence(&self) -> Result<u8> {
        let value = match self.properties.as_ref().and_then(|p| p.get(CONFIDENCE_PROPERTY)) {
            None | Some(Value::Null) => return Ok(MOST_TRUSTED_CONFIDENCE),
            Some(value) => value,
        };
        let level = match value {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u8::MAX))
                    .map(|f| f as u64)
            }),
            _ => None,
        };
        match level.and_then(|c| u8::try_from(c).ok()) {
            Some(c) if c >= MOST_TRUSTED_CONFIDENCE => Ok(c),
            _ => Err(SamplerError::InvalidConfidence(value.to_string())),
        }
    }
}

pub fn read_feature_collection<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let collection: FeatureCollection = serde_json::from_reader(BufReader::new(file))?;
    info!(
        "Read {} features from {}",
        collection.features.len(),
        path.display()
    );
    Ok(collection)
}

/// Lazy hit extraction over a feature list.
///
/// Yields one record per accepted feature, ids counting from 0. Features coarser than the
/// threshold are skipped, as are features whose representative point falls inside a
/// footprint accepted earlier.
pub struct HitExtractor<'a> {
    features: std::iter::Enumerate<std::slice::Iter<'a, Feature>>,
    confidence_threshold: u8,
    size_px: u32,
    accepted: Vec<Footprint>,
    failed: bool,
}

impl<'a> HitExtractor<'a> {
    pub fn new(features: &'a [Feature], confidence_threshold: u8, size_px: u32) -> Self {
        Self {
            features: features.iter().enumerate(),
            confidence_threshold,
            size_px,
            accepted: Vec::new(),
            failed: false,
        }
    }

    fn accept(&mut self, index: usize, feature: &Feature) -> Result<Option<AoiRecord>> {
        let confidence = feature.confidence()?;
        if confidence > self.confidence_threshold {
            debug!("Feature {index}: confidence {confidence} above threshold, skipped");
            return Ok(None);
        }

        let centre = feature.geometry.representative_point()?;
        if self.accepted.iter().any(|fp| fp.contains_point(centre)) {
            debug!("Feature {index}: inside an accepted footprint, skipped");
            return Ok(None);
        }

        let footprint = square_footprint(centre.y(), centre.x(), self.size_px)?;
        let id = self.accepted.len() as u64;
        self.accepted.push(footprint);
        Ok(Some(AoiRecord::hit(id, footprint, confidence)))
    }
}

impl Iterator for HitExtractor<'_> {
    type Item = Result<AoiRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while let Some((index, feature)) = self.features.next() {
            match self.accept(index, feature) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(annotate(index, e)));
                }
            }
        }
        None
    }
}

fn annotate(index: usize, err: SamplerError) -> SamplerError {
    match err {
        SamplerError::Geometry { message } => {
            SamplerError::geometry(format!("feature {index}: {message}"))
        }
        SamplerError::UnsupportedGeometry(kind) => {
            SamplerError::UnsupportedGeometry(format!("{kind} (feature {index})"))
        }
        SamplerError::InvalidConfidence(value) => {
            SamplerError::InvalidConfidence(format!("{value} (feature {index})"))
        }
        other => other,
    }
}

/// Collect every hit record, aborting on the first geometry error.
pub fn extract_hits(
    features: &[Feature],
    confidence_threshold: u8,
    size_px: u32,
) -> Result<Vec<AoiRecord>> {
    let hits = HitExtractor::new(features, confidence_threshold, size_px)
        .collect::<Result<Vec<_>>>()?;
    info!(
        "Accepted {} of {} features as hits (confidence <= {})",
        hits.len(),
        features.len(),
        confidence_threshold
    );
    Ok(hits)
}
