//! Pure-Rust WGS84 → UTM point projection (Snyder 1987, USGS formulas).
//!
//! Covers EPSG 326xx (UTM North) and 327xx (UTM South), the grids Landsat
//! and Sentinel-2 surface reflectance products are delivered on. Only vector
//! data (regions, sample points, export extents) is projected; raster grids
//! are never resampled across reference systems.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::BBox;

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const E2: f64 = 2.0 * F - F * F; // eccentricity squared
const E_PRIME2: f64 = E2 / (1.0 - E2); // second eccentricity squared
const K0: f64 = 0.9996; // UTM scale factor
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Points sampled along each bbox edge when projecting an envelope
const EDGE_SAMPLES: usize = 8;

// ── Public API ───────────────────────────────────────────────────────────

/// A point transform between two reference systems
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Source and target are the same system
    Identity,
    /// WGS84 lon/lat to a UTM zone
    ToUtm { zone: u32, north: bool },
}

impl Projection {
    /// The transform taking coordinates in `from` to `to`.
    ///
    /// Fails with [`Error::SpatialRefMismatch`] for pairs other than
    /// identical systems or WGS84 to UTM.
    pub fn between(from: &CRS, to: &CRS) -> Result<Self> {
        if from.is_equivalent(to) {
            return Ok(Projection::Identity);
        }
        let utm = from
            .epsg()
            .filter(|&code| is_wgs84(code))
            .and(to.epsg())
            .and_then(parse_utm_epsg);
        match utm {
            Some((zone, north)) => Ok(Projection::ToUtm { zone, north }),
            None => Err(Error::SpatialRefMismatch(format!(
                "no transform from {} to {}",
                from.identifier(),
                to.identifier()
            ))),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Projection::Identity)
    }

    /// Project one point
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Projection::Identity => (x, y),
            Projection::ToUtm { zone, north } => wgs84_to_utm(x, y, zone, north),
        }
    }

    /// Envelope of a projected bbox.
    ///
    /// Edges are sampled as well as corners since UTM bends lines of
    /// constant latitude.
    pub fn bbox(&self, bbox: &BBox) -> BBox {
        if self.is_identity() {
            return *bbox;
        }

        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;

        for i in 0..=EDGE_SAMPLES {
            let t = i as f64 / EDGE_SAMPLES as f64;
            let x = bbox.min_x + t * bbox.width();
            let y = bbox.min_y + t * bbox.height();
            for (px, py) in [
                (x, bbox.min_y),
                (x, bbox.max_y),
                (bbox.min_x, y),
                (bbox.max_x, y),
            ] {
                let (e, n) = self.apply(px, py);
                min_x = min_x.min(e);
                min_y = min_y.min(n);
                max_x = max_x.max(e);
                max_y = max_y.max(n);
            }
        }

        BBox::new(min_x, min_y, max_x, max_y)
    }
}

/// Check if an EPSG code represents WGS84 geographic.
pub fn is_wgs84(epsg: u32) -> bool {
    epsg == 4326
}

/// Parse an EPSG code into UTM zone info: `Some((zone, is_north))`.
///
/// - EPSG 326xx → zone xx, North hemisphere
/// - EPSG 327xx → zone xx, South hemisphere
pub fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    if (32601..=32660).contains(&epsg) {
        Some((epsg - 32600, true))
    } else if (32701..=32760).contains(&epsg) {
        Some((epsg - 32700, false))
    } else {
        None
    }
}

// ── Core projection (Snyder 1987, USGS Prof. Paper 1395, pp. 61-64) ─────

/// WGS84 (longitude, latitude) in degrees to UTM (easting, northing) in metres
pub fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();

    let lon0 = ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a_coeff = cos_lat * (lon - lon0);

    let m = meridional_arc(lat);

    let a2 = a_coeff * a_coeff;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    // Snyder eq. 8-9
    let easting = K0
        * n
        * (a_coeff
            + (1.0 - t + c) * a2 * a_coeff / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a_coeff / 120.0)
        + FALSE_EASTING;

    // Snyder eq. 8-10
    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    if north {
        (easting, northing)
    } else {
        (easting, northing + FALSE_NORTHING_SOUTH)
    }
}

/// Meridional arc from the equator to `lat` (radians), Snyder eq. 3-21
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parse_utm_codes() {
        assert_eq!(parse_utm_epsg(32636), Some((36, true)));
        assert_eq!(parse_utm_epsg(32735), Some((35, false)));
        assert_eq!(parse_utm_epsg(4326), None);
        assert_eq!(parse_utm_epsg(32600), None);
        assert_eq!(parse_utm_epsg(32761), None);
    }

    // Reference values from PROJ:
    //   Transformer.from_crs(4326, 32630, always_xy=True).transform(-3.7037, 40.4168)
    #[test]
    fn test_madrid_utm30n() {
        let (e, n) = wgs84_to_utm(-3.7037, 40.4168, 30, true);
        assert_abs_diff_eq!(e, 440_298.94, epsilon = 1.0);
        assert_abs_diff_eq!(n, 4_474_257.31, epsilon = 1.0);
    }

    #[test]
    fn test_buenos_aires_utm21s() {
        let (e, n) = wgs84_to_utm(-58.3816, -34.6037, 21, false);
        assert_abs_diff_eq!(e, 373_317.50, epsilon = 1.0);
        assert_abs_diff_eq!(n, 6_170_036.17, epsilon = 1.0);
    }

    #[test]
    fn test_central_meridian_on_equator() {
        // zone 36 is centred on 33°E
        let (e, n) = wgs84_to_utm(33.0, 0.0, 36, true);
        assert_abs_diff_eq!(e, 500_000.0, epsilon = 0.01);
        assert_abs_diff_eq!(n, 0.0, epsilon = 0.01);
    }

    #[test]
    fn test_projection_between() {
        let wgs = CRS::wgs84();
        assert!(Projection::between(&wgs, &CRS::from_epsg(4326)).unwrap().is_identity());
        assert_eq!(
            Projection::between(&wgs, &CRS::from_epsg(32736)).unwrap(),
            Projection::ToUtm { zone: 36, north: false }
        );
        // inverse and unknown systems are not supported
        assert!(matches!(
            Projection::between(&CRS::from_epsg(32636), &wgs),
            Err(Error::SpatialRefMismatch(_))
        ));
        assert!(Projection::between(&wgs, &CRS::from_epsg(3857)).is_err());
    }

    #[test]
    fn test_bbox_envelope_in_metres() {
        // Kasese district, zone 36 North
        let p = Projection::between(&CRS::wgs84(), &CRS::from_epsg(32636)).unwrap();
        let out = p.bbox(&BBox::new(29.75, 0.0, 30.25, 0.375));

        // 0.5° of longitude at the equator is ~55.6 km
        assert!(out.width() > 55_000.0 && out.width() < 56_500.0, "width {}", out.width());
        assert!(out.height() > 41_000.0 && out.height() < 42_000.0, "height {}", out.height());
        // west of the zone's central meridian
        assert!(out.max_x < FALSE_EASTING);
        // the envelope covers every projected corner
        for (x, y) in [(29.75, 0.0), (30.25, 0.375), (29.75, 0.375), (30.25, 0.0)] {
            let (e, n) = p.apply(x, y);
            assert!(out.contains_point(e, n));
        }
    }
}
