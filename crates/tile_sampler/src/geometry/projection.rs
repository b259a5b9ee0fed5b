use crate::{
    constants::BUFFER_SEGMENTS,
    error::{Result, SamplerError},
};
use geo::{Rect, coord};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

const WGS84_LONGLAT: &str = "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs";

/// Validate a geographic coordinate pair in degrees.
pub fn check_lat_lon(lat: f64, lon: f64) -> Result<()> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(SamplerError::geometry(format!(
            "coordinates must be finite, got lat={lat}, lon={lon}"
        )));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(SamplerError::geometry(format!(
            "latitude {lat} is outside [-90, 90]"
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(SamplerError::geometry(format!(
            "longitude {lon} is outside [-180, 180]"
        )));
    }
    Ok(())
}

/// Shift `x` by whole turns so it lies within 180 degrees of `centre`.
fn unwrap_lon(x: f64, centre: f64) -> f64 {
    let delta = x - centre;
    if delta > 180.0 {
        x - 360.0
    } else if delta < -180.0 {
        x + 360.0
    } else {
        x
    }
}

/// Buffer `(lat, lon)` by `radius_m` metres and return the lon/lat envelope of the circle.
///
/// The circle is built in an azimuthal equidistant projection centred on the point, so the
/// radius is a true ground distance, then every vertex is reprojected to WGS84.
/// Longitudes are kept continuous around `lon`, so near the antimeridian the envelope
/// may extend slightly past ±180 instead of wrapping around the globe.
///
/// # Errors
/// Returns [`SamplerError::Geometry`] for out-of-range coordinates, a non-positive radius,
/// or a failed projection.
pub fn geodesic_circle_envelope(lat: f64, lon: f64, radius_m: f64) -> Result<Rect<f64>> {
    check_lat_lon(lat, lon)?;
    if !(radius_m.is_finite() && radius_m > 0.0) {
        return Err(SamplerError::geometry(format!(
            "buffer radius must be positive, got {radius_m}"
        )));
    }

    let aeqd = Proj::from_proj_string(&format!(
        "+proj=aeqd +lat_0={lat} +lon_0={lon} +x_0=0 +y_0=0 +ellps=WGS84 +datum=WGS84 +units=m +no_defs"
    ))
    .map_err(|e| SamplerError::geometry(format!("invalid local projection: {e:?}")))?;
    let wgs84 = Proj::from_proj_string(WGS84_LONGLAT)
        .map_err(|e| SamplerError::geometry(format!("invalid WGS84 projection: {e:?}")))?;

    let mut min_lon = f64::INFINITY;
    let mut min_lat = f64::INFINITY;
    let mut max_lon = f64::NEG_INFINITY;
    let mut max_lat = f64::NEG_INFINITY;

    for i in 0..BUFFER_SEGMENTS {
        let theta = std::f64::consts::TAU * i as f64 / BUFFER_SEGMENTS as f64;
        let mut point = (radius_m * theta.cos(), radius_m * theta.sin(), 0.0);
        transform(&aeqd, &wgs84, &mut point)
            .map_err(|e| SamplerError::geometry(format!("reprojection failed: {e:?}")))?;

        // proj4rs returns geographic coordinates in radians
        let (x, y) = (unwrap_lon(point.0.to_degrees(), lon), point.1.to_degrees());
        if !x.is_finite() || !y.is_finite() {
            return Err(SamplerError::geometry(format!(
                "buffer around lat={lat}, lon={lon} is not representable"
            )));
        }
        min_lon = min_lon.min(x);
        max_lon = max_lon.max(x);
        min_lat = min_lat.min(y);
        max_lat = max_lat.max(y);
    }

    Ok(Rect::new(
        coord! { x: min_lon, y: min_lat },
        coord! { x: max_lon, y: max_lat },
    ))
}
