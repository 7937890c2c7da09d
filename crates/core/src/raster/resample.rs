//! Nearest-neighbour resampling onto an explicit grid
//!
//! Used to crop and rescale exports and to bring scenes with shifted
//! extents onto one lattice before pixel-wise compositing. Rasters are only
//! resampled within their own CRS.

use crate::crs::{same_crs, CRS};
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Image, Raster, NODATA};
use crate::vector::BBox;

/// A north-up output grid
#[derive(Debug, Clone, PartialEq)]
pub struct TargetGrid {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub crs: Option<CRS>,
}

impl TargetGrid {
    /// The grid a raster already sits on
    pub fn of(raster: &Raster<f64>) -> Self {
        Self {
            transform: *raster.transform(),
            rows: raster.rows(),
            cols: raster.cols(),
            crs: raster.crs().cloned(),
        }
    }

    /// The smallest grid on `template`'s pixel lattice covering `bbox`.
    ///
    /// `bbox` is in the template CRS. Fails when the template is rotated,
    /// the box is empty, or the grid would exceed `max_pixels`.
    pub fn snapped(template: &Raster<f64>, bbox: &BBox, max_pixels: u64) -> Result<Self> {
        let gt = template.transform();
        if !gt.is_north_up() || gt.pixel_width <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "grid",
                value: format!("{:?}", gt),
                reason: "only north-up grids can be snapped".into(),
            });
        }
        let pw = gt.pixel_width;
        let ph = gt.pixel_height.abs();

        let c0 = ((bbox.min_x - gt.origin_x) / pw).floor();
        let c1 = ((bbox.max_x - gt.origin_x) / pw).ceil();
        let r0 = ((gt.origin_y - bbox.max_y) / ph).floor();
        let r1 = ((gt.origin_y - bbox.min_y) / ph).ceil();
        let cols = c1 - c0;
        let rows = r1 - r0;

        if !(cols >= 1.0 && rows >= 1.0) {
            return Err(Error::InvalidParameter {
                name: "grid",
                value: format!("{:?}", bbox.to_array()),
                reason: "box covers no pixel".into(),
            });
        }
        let pixels = cols * rows;
        if !(pixels <= max_pixels as f64) {
            return Err(Error::InvalidParameter {
                name: "grid",
                value: format!("{:?}", bbox.to_array()),
                reason: format!("{} pixels exceed the limit of {}", pixels, max_pixels),
            });
        }

        Ok(Self {
            transform: GeoTransform::new(gt.origin_x + c0 * pw, gt.origin_y - r0 * ph, pw, gt.pixel_height),
            rows: rows as usize,
            cols: cols as usize,
            crs: template.crs().cloned(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn pixels(&self) -> u64 {
        (self.rows as u64).saturating_mul(self.cols as u64)
    }

    /// Whether `raster` already lies on this grid
    pub fn matches(&self, raster: &Raster<f64>) -> bool {
        raster.shape() == self.shape()
            && raster.transform().approx_eq(&self.transform)
            && same_crs(raster.crs(), self.crs.as_ref())
    }
}

/// Nearest-neighbour sample of `src` onto `target`.
///
/// Cells whose centre falls outside `src` become [`NODATA`]. Fails with
/// [`Error::SpatialRefMismatch`] when the CRS differ.
pub fn resample_nearest(src: &Raster<f64>, target: &TargetGrid) -> Result<Raster<f64>> {
    if !same_crs(src.crs(), target.crs.as_ref()) {
        return Err(Error::SpatialRefMismatch(format!(
            "cannot resample {} onto {}",
            src.crs().map(|c| c.identifier()).unwrap_or_default(),
            target.crs.as_ref().map(|c| c.identifier()).unwrap_or_default()
        )));
    }
    if target.matches(src) {
        return Ok(src.clone());
    }

    let mut data = Vec::with_capacity(target.rows * target.cols);
    for row in 0..target.rows {
        for col in 0..target.cols {
            let (x, y) = target.transform.pixel_to_geo(col, row);
            let v = match src.locate(x, y) {
                Some((c, r)) => src.get(r, c)?,
                None => NODATA,
            };
            data.push(v);
        }
    }
    let mut out = Raster::from_vec(data, target.rows, target.cols)?;
    out.set_transform(target.transform);
    out.set_crs(target.crs.clone());
    out.set_nodata(Some(NODATA));
    Ok(out)
}

impl Image {
    /// Every band resampled onto `target`, keeping metadata and scale factors
    pub fn resample_to(&self, target: &TargetGrid) -> Result<Image> {
        let mut out = self.select(&[])?;
        for info in self.bands() {
            let resampled = resample_nearest(self.band(&info.name)?, target)?;
            out = out.with_band_info(info.clone(), resampled)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utm_band(x0: f64, value: f64) -> Raster<f64> {
        let mut r = Raster::filled(4, 4, value);
        r.set_transform(GeoTransform::new(x0, 1000.0, 30.0, -30.0));
        r.set_crs(Some(CRS::from_epsg(32636)));
        r.set_nodata(Some(NODATA));
        r
    }

    #[test]
    fn test_snapped_keeps_lattice() {
        let template = utm_band(0.0, 1.0);
        // 45..100 covers cells 1..4; 880..950 covers rows 1..4
        let grid = TargetGrid::snapped(&template, &BBox::new(45.0, 880.0, 100.0, 950.0), 1_000).unwrap();
        assert_eq!(grid.shape(), (3, 3));
        assert_eq!(grid.transform.origin_x, 30.0);
        assert_eq!(grid.transform.origin_y, 970.0);
        assert_eq!(grid.crs, Some(CRS::from_epsg(32636)));

        // extends past the template on the west
        let wide = TargetGrid::snapped(&template, &BBox::new(-60.0, 900.0, 60.0, 1000.0), 1_000).unwrap();
        assert_eq!(wide.transform.origin_x, -60.0);
        assert_eq!(wide.cols, 4);
    }

    #[test]
    fn test_snapped_limits() {
        let template = utm_band(0.0, 1.0);
        assert!(TargetGrid::snapped(&template, &BBox::new(0.0, 0.0, 3.0e9, 3.0e9), 1_000_000).is_err());
        // inverted box
        assert!(TargetGrid::snapped(&template, &BBox::new(100.0, 900.0, 10.0, 950.0), 100).is_err());
    }

    #[test]
    fn test_resample_offset_scene() {
        // shifted one cell east of the target
        let src = utm_band(30.0, 5.0);
        let target = TargetGrid::of(&utm_band(0.0, 0.0));
        let out = resample_nearest(&src, &target).unwrap();

        assert!(target.matches(&out));
        assert_eq!(out.get(0, 0).unwrap(), NODATA);
        assert_eq!(out.get(0, 1).unwrap(), 5.0);
        assert_eq!(out.valid_count(), 12);
    }

    #[test]
    fn test_resample_rejects_other_crs() {
        let mut src = utm_band(0.0, 5.0);
        src.set_crs(Some(CRS::from_epsg(32635)));
        let target = TargetGrid::of(&utm_band(0.0, 0.0));
        assert!(matches!(
            resample_nearest(&src, &target),
            Err(Error::SpatialRefMismatch(_))
        ));
    }
}
