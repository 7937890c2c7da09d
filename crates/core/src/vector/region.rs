//! Region of interest geometry

use geo::{Area, BoundingRect, Coord, Intersects, LineString, MapCoords, MultiPolygon, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::crs::{Projection, CRS};
use crate::error::{Error, Result};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Whether `other` lies entirely inside this box
    pub fn contains(&self, other: &BBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Smallest box covering both
    pub fn union(&self, other: &BBox) -> BBox {
        BBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// `[west, south, east, north]`, the STAC / GeoJSON order
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min_x, self.min_y),
                (self.max_x, self.min_y),
                (self.max_x, self.max_y),
                (self.min_x, self.max_y),
                (self.min_x, self.min_y),
            ]),
            vec![],
        )
    }
}

impl From<Rect<f64>> for BBox {
    fn from(rect: Rect<f64>) -> Self {
        BBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

/// An immutable region of interest.
///
/// Built once by the region resolver and then only read: every later stage
/// filters, clips and crops against it. Coordinates are in `crs`
/// (WGS 84 lon/lat for every bundled boundary dataset).
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    geometry: MultiPolygon<f64>,
    bbox: BBox,
    crs: CRS,
}

impl Region {
    /// Create a region in WGS 84. Fails on an empty geometry.
    pub fn new(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Result<Self> {
        Self::with_crs(name, geometry, CRS::wgs84())
    }

    pub fn with_crs(name: impl Into<String>, geometry: MultiPolygon<f64>, crs: CRS) -> Result<Self> {
        let name = name.into();
        let bbox = geometry
            .bounding_rect()
            .map(BBox::from)
            .ok_or_else(|| Error::Resolution {
                query: format!("{} (empty geometry)", name),
            })?;
        Ok(Self {
            name,
            geometry,
            bbox,
            crs,
        })
    }

    /// Rectangular region, mostly for fixtures and bbox-only queries
    pub fn from_bbox(name: impl Into<String>, bbox: BBox) -> Result<Self> {
        Self::new(name, MultiPolygon::new(vec![bbox.to_polygon()]))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn crs(&self) -> &CRS {
        &self.crs
    }

    /// Number of polygon parts
    pub fn part_count(&self) -> usize {
        self.geometry.0.len()
    }

    /// Planar area in squared CRS units
    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    /// Whether a point lies inside or on the boundary
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        if !self.bbox.contains_point(x, y) {
            return false;
        }
        let point = Point::new(x, y);
        self.geometry.0.iter().any(|poly| poly.intersects(&point))
    }

    /// Whether the region touches a box
    pub fn intersects_bbox(&self, bbox: &BBox) -> bool {
        if !self.bbox.intersects(bbox) {
            return false;
        }
        let window = bbox.to_polygon();
        self.geometry.0.iter().any(|poly| poly.intersects(&window))
    }

    /// The same region with every vertex projected into `target`.
    ///
    /// Fails with [`Error::SpatialRefMismatch`] when no transform between
    /// the two systems is known.
    pub fn to_crs(&self, target: &CRS) -> Result<Region> {
        let projection = Projection::between(&self.crs, target)?;
        if projection.is_identity() {
            return Ok(self.clone());
        }
        let geometry = self.geometry.map_coords(|c| {
            let (x, y) = projection.apply(c.x, c.y);
            Coord { x, y }
        });
        Region::with_crs(self.name.clone(), geometry, target.clone())
    }

    /// [`Region::to_crs`] onto a raster's CRS; unknown references keep the region as is
    pub fn to_crs_of(&self, target: Option<&CRS>) -> Result<Region> {
        match target {
            Some(crs) => self.to_crs(crs),
            None => Ok(self.clone()),
        }
    }

    /// Region covering both inputs
    pub fn union(&self, other: &Region, name: impl Into<String>) -> Result<Region> {
        if !self.crs.is_equivalent(&other.crs) {
            return Err(Error::SpatialRefMismatch(format!(
                "cannot merge regions in {} and {}",
                self.crs.identifier(),
                other.crs.identifier()
            )));
        }
        let mut parts = self.geometry.0.clone();
        parts.extend(other.geometry.0.iter().cloned());
        Region::with_crs(name, MultiPolygon::new(parts), self.crs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        BBox::new(x0, y0, x0 + size, y0 + size).to_polygon()
    }

    #[test]
    fn test_region_bbox_and_contains() {
        let region = Region::new(
            "two",
            MultiPolygon::new(vec![square(0.0, 0.0, 1.0), square(2.0, 0.0, 1.0)]),
        )
        .unwrap();

        assert_eq!(region.bbox(), BBox::new(0.0, 0.0, 3.0, 1.0));
        assert!(region.contains_point(0.5, 0.5));
        assert!(region.contains_point(2.5, 0.5));
        // inside the bbox but between parts
        assert!(!region.contains_point(1.5, 0.5));
        assert!((region.area() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_region_fails() {
        let err = Region::new("nothing", MultiPolygon::new(vec![])).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn test_intersects_bbox() {
        let region = Region::new("sq", MultiPolygon::new(vec![square(0.0, 0.0, 1.0)])).unwrap();
        assert!(region.intersects_bbox(&BBox::new(0.5, 0.5, 2.0, 2.0)));
        assert!(!region.intersects_bbox(&BBox::new(1.5, 1.5, 2.0, 2.0)));
    }

    #[test]
    fn test_to_crs_projects_vertices() {
        let region = Region::new("kasese", MultiPolygon::new(vec![square(29.75, 0.0, 0.25)])).unwrap();
        let utm = CRS::from_epsg(32636);
        let projected = region.to_crs(&utm).unwrap();

        assert_eq!(projected.crs(), &utm);
        assert_eq!(projected.name(), "kasese");
        let (e, n) = Projection::between(&CRS::wgs84(), &utm).unwrap().apply(29.875, 0.125);
        assert!(projected.contains_point(e, n));
        assert!(projected.bbox().min_x > 100_000.0);

        assert!(region.to_crs(&CRS::wgs84()).unwrap().bbox() == region.bbox());
        assert!(region.to_crs_of(None).unwrap().bbox() == region.bbox());
        assert!(projected.to_crs(&CRS::wgs84()).is_err());
    }

    #[test]
    fn test_bbox_relations() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(2.0, 2.0, 3.0, 3.0);
        assert!(a.contains(&b));
        assert!(!b.contains(&a));
        assert_eq!(a.union(&BBox::new(-1.0, 5.0, 4.0, 12.0)), BBox::new(-1.0, 0.0, 10.0, 12.0));
        assert_eq!(b.to_array(), [2.0, 2.0, 3.0, 3.0]);
    }
}
