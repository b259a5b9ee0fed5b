use crate::{
    dictionary::AoiRecord,
    error::{Result, SamplerError},
    geometry::{Footprint, square_footprint},
};
use geo::{BoundingRect, Point, Polygon, Rect, coord};
use rand::Rng;

/// How a candidate footprint is built around a sampled centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FootprintShape {
    /// Geodesic square of `size_px` pixels, for lon/lat tiles
    Geodesic { size_px: u32 },
    /// Plain square of side `side` in the tile's own units
    Planar { side: f64 },
}

impl FootprintShape {
    pub fn build(&self, centre: Point<f64>) -> Result<Footprint> {
        match *self {
            FootprintShape::Geodesic { size_px } => square_footprint(centre.y(), centre.x(), size_px),
            FootprintShape::Planar { side } => {
                let half = side / 2.0;
                Ok(Footprint::from_rect(Rect::new(
                    coord! { x: centre.x() - half, y: centre.y() - half },
                    coord! { x: centre.x() + half, y: centre.y() + half },
                )))
            }
        }
    }
}

/// A tile being sampled: its key, ground polygon and bounding box.
#[derive(Debug, Clone)]
pub struct TileArea {
    pub key: String,
    pub polygon: Polygon<f64>,
    pub bounds: Rect<f64>,
}

impl TileArea {
    pub fn new(key: impl Into<String>, polygon: Polygon<f64>) -> Result<Self> {
        let key = key.into();
        let bounds = polygon
            .bounding_rect()
            .ok_or_else(|| SamplerError::TileBounds {
                tile: key.clone(),
                message: "tile polygon is empty".to_string(),
            })?;
        Ok(Self {
            key,
            polygon,
            bounds,
        })
    }

    fn random_point<R: Rng>(&self, rng: &mut R) -> Point<f64> {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        Point::new(
            min.x + rng.r#gen::<f64>() * (max.x - min.x),
            min.y + rng.r#gen::<f64>() * (max.y - min.y),
        )
    }
}

fn overlaps_any(candidate: &Footprint, records: &[AoiRecord]) -> bool {
    records.iter().any(|r| r.footprint.intersects(candidate))
}

/// Rejection-sample one miss footprint on `tile`.
///
/// A candidate is accepted when its envelope lies fully inside the tile and touches no
/// hit and no earlier miss. Gives up with [`SamplerError::SamplingExhausted`] after
/// `max_attempts` candidates.
pub fn find_one_miss<R: Rng>(
    tile: &TileArea,
    shape: &FootprintShape,
    hits: &[AoiRecord],
    misses: &[AoiRecord],
    rng: &mut R,
    max_attempts: usize,
) -> Result<Footprint> {
    for _ in 0..max_attempts {
        let candidate = shape.build(tile.random_point(rng))?;
        if !candidate.is_within(&tile.polygon) {
            continue;
        }
        if overlaps_any(&candidate, hits) || overlaps_any(&candidate, misses) {
            continue;
        }
        return Ok(candidate);
    }
    Err(SamplerError::SamplingExhausted {
        tile: tile.key.clone(),
        attempts: max_attempts,
    })
}
