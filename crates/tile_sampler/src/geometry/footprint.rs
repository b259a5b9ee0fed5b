use crate::{
    constants::METRES_PER_PIXEL,
    error::{Result, SamplerError},
    geometry::projection::geodesic_circle_envelope,
};
use geo::{Contains, Coord, Intersects, Point, Polygon, Rect, coord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Square ground footprint, stored as its lon/lat envelope.
///
/// All containment and overlap decisions use the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FootprintRing", into = "FootprintRing")]
pub struct Footprint {
    rect: Rect<f64>,
}

/// On-disk form: the closed boundary ring as `[lon, lat]` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FootprintRing {
    ring: Vec<[f64; 2]>,
}

impl Footprint {
    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self { rect }
    }

    pub fn from_bounds(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::from_rect(Rect::new(
            coord! { x: min_lon, y: min_lat },
            coord! { x: max_lon, y: max_lat },
        ))
    }

    pub fn envelope(&self) -> Rect<f64> {
        self.rect
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        self.rect.to_polygon()
    }

    /// Closed boundary ring, counter-clockwise from the south-west corner.
    pub fn ring(&self) -> Vec<Coord<f64>> {
        let (min, max) = (self.rect.min(), self.rect.max());
        vec![
            min,
            coord! { x: max.x, y: min.y },
            max,
            coord! { x: min.x, y: max.y },
            min,
        ]
    }

    /// Strict interior test, so a point on the boundary is not inside.
    pub fn contains_point(&self, point: Point<f64>) -> bool {
        let (min, max) = (self.rect.min(), self.rect.max());
        point.x() > min.x && point.x() < max.x && point.y() > min.y && point.y() < max.y
    }

    /// Envelopes intersect, touching edges included.
    pub fn intersects(&self, other: &Footprint) -> bool {
        self.rect.intersects(&other.rect)
    }

    /// The whole envelope lies inside `area`.
    pub fn is_within(&self, area: &Polygon<f64>) -> bool {
        area.contains(&self.to_polygon())
    }

    pub fn to_wkt(&self) -> String {
        let coords: Vec<String> = self
            .ring()
            .iter()
            .map(|c| format!("{} {}", c.x, c.y))
            .collect();
        format!("POLYGON(({}))", coords.join(", "))
    }
}

impl fmt::Display for Footprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wkt())
    }
}

impl From<Footprint> for FootprintRing {
    fn from(fp: Footprint) -> Self {
        Self {
            ring: fp.ring().iter().map(|c| [c.x, c.y]).collect(),
        }
    }
}

impl TryFrom<FootprintRing> for Footprint {
    type Error = String;

    fn try_from(value: FootprintRing) -> std::result::Result<Self, Self::Error> {
        if value.ring.len() < 4 {
            return Err(format!(
                "footprint ring needs at least 4 vertices, got {}",
                value.ring.len()
            ));
        }
        let mut min = coord! { x: f64::INFINITY, y: f64::INFINITY };
        let mut max = coord! { x: f64::NEG_INFINITY, y: f64::NEG_INFINITY };
        for [x, y] in value.ring {
            if !x.is_finite() || !y.is_finite() {
                return Err("footprint ring contains a non-finite coordinate".to_string());
            }
            min.x = min.x.min(x);
            min.y = min.y.min(y);
            max.x = max.x.max(x);
            max.y = max.y.max(y);
        }
        Ok(Footprint::from_rect(Rect::new(min, max)))
    }
}

/// Square footprint of `size_px` pixels (10 m each) centred on `(lat, lon)`.
///
/// # Errors
/// [`SamplerError::Geometry`] for out-of-range coordinates or a zero size.
pub fn square_footprint(lat: f64, lon: f64, size_px: u32) -> Result<Footprint> {
    if size_px == 0 {
        return Err(SamplerError::geometry("footprint size must be at least 1 pixel"));
    }
    let radius_m = f64::from(size_px) / 2.0 * METRES_PER_PIXEL;
    geodesic_circle_envelope(lat, lon, radius_m).map(Footprint::from_rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    #[test]
    fn test_square_footprint_contains_its_centre() {
        let fp = square_footprint(51.5, -0.12, 256).unwrap();
        assert!(fp.contains_point(point! { x: -0.12, y: 51.5 }));
        assert!(!fp.contains_point(point! { x: -0.2, y: 51.5 }));
    }

    #[test]
    fn test_square_footprint_spans_size_in_metres() {
        // 256 px at 10 m per pixel; one degree of latitude is about 111.25 km at 51.5N
        let fp = square_footprint(51.5, -0.12, 256).unwrap();
        let height_m = fp.envelope().height() * 111_250.0;
        assert!((height_m - 2560.0).abs() < 25.0, "height {height_m} m");
    }

    #[test]
    fn test_square_footprint_grows_with_size() {
        let small = square_footprint(0.0, 0.0, 64).unwrap();
        let large = square_footprint(0.0, 0.0, 256).unwrap();
        let ratio = large.envelope().height() / small.envelope().height();
        assert!((ratio - 4.0).abs() < 1e-3, "ratio {ratio}");
    }

    #[test]
    fn test_square_footprint_rejects_bad_input() {
        assert!(matches!(
            square_footprint(95.0, 0.0, 256),
            Err(SamplerError::Geometry { .. })
        ));
        assert!(square_footprint(0.0, 0.0, 0).is_err());
    }

    #[test]
    fn test_ring_is_closed() {
        let fp = Footprint::from_bounds(0.0, 0.0, 2.0, 1.0);
        let ring = fp.ring();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn test_intersects_includes_touching_edges() {
        let a = Footprint::from_bounds(0.0, 0.0, 2.0, 2.0);
        let touching = Footprint::from_bounds(2.0, 0.0, 4.0, 2.0);
        let apart = Footprint::from_bounds(2.5, 0.0, 4.0, 2.0);
        assert!(a.intersects(&touching));
        assert!(!a.intersects(&apart));
    }

    #[test]
    fn test_is_within_tile() {
        let tile = Footprint::from_bounds(0.0, 0.0, 10.0, 10.0).to_polygon();
        assert!(Footprint::from_bounds(1.0, 1.0, 3.0, 3.0).is_within(&tile));
        assert!(!Footprint::from_bounds(9.0, 9.0, 11.0, 11.0).is_within(&tile));
    }

    #[test]
    fn test_wkt_lists_ring() {
        let fp = Footprint::from_bounds(0.0, 0.0, 1.0, 2.0);
        assert_eq!(fp.to_wkt(), "POLYGON((0 0, 1 0, 1 2, 0 2, 0 0))");
    }

    #[test]
    fn test_rejects_short_ring() {
        let json = r#"{"ring": [[0.0, 0.0], [1.0, 1.0]]}"#;
        assert!(serde_json::from_str::<Footprint>(json).is_err());
    }
}
