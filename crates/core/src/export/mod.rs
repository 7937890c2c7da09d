//! Raster export
//!
//! An [`Exporter`] persists an image as GeoTIFF at an explicit pixel scale
//! and extent. Every failure mode (pixel cap, quota, permissions) is
//! returned to the caller as [`Error::Export`]; nothing is truncated.

mod local;

pub use local::LocalExporter;

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ExportFailure, Result};
use crate::raster::{Image, Raster, TargetGrid};
use crate::vector::BBox;

/// Default pixel cap, matching the hosted platform's export default
pub const DEFAULT_MAX_PIXELS: u64 = 100_000_000;

fn default_max_pixels() -> u64 {
    DEFAULT_MAX_PIXELS
}

/// Where and how to write one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// File name without extension
    pub prefix: String,
    /// Sub-folder of the destination
    #[serde(default)]
    pub folder: Option<String>,
    /// Output pixel size in CRS units; `None` keeps the native size
    #[serde(default)]
    pub scale: Option<f64>,
    /// Extent to write, in the image CRS; `None` writes the whole image
    #[serde(default)]
    pub region: Option<BBox>,
    /// Upper bound on output rows × cols
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
    /// Past this instant an exporter must not publish the file
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

impl ExportRequest {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            folder: None,
            scale: None,
            region: None,
            max_pixels: DEFAULT_MAX_PIXELS,
            deadline: None,
        }
    }

    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn region(mut self, region: BBox) -> Self {
        self.region = Some(region);
        self
    }

    pub fn max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Whether the deadline, if any, has passed
    pub fn expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    pub fn validate(&self) -> Result<()> {
        let bad_prefix = self.prefix.is_empty()
            || self.prefix.contains(['/', '\\'])
            || self.prefix == "."
            || self.prefix == "..";
        if bad_prefix {
            return Err(Error::InvalidParameter {
                name: "prefix",
                value: self.prefix.clone(),
                reason: "must be a plain file name".into(),
            });
        }
        if let Some(folder) = &self.folder {
            if folder.split(['/', '\\']).any(|part| part == "..") {
                return Err(Error::InvalidParameter {
                    name: "folder",
                    value: folder.clone(),
                    reason: "must stay inside the destination".into(),
                });
            }
        }
        if let Some(scale) = self.scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(Error::InvalidParameter {
                    name: "scale",
                    value: scale.to_string(),
                    reason: "must be a positive pixel size".into(),
                });
            }
        }
        Ok(())
    }
}

/// What an export wrote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReceipt {
    pub path: PathBuf,
    pub rows: usize,
    pub cols: usize,
    pub bands: usize,
    pub bytes: u64,
}

impl ExportReceipt {
    pub fn pixels(&self) -> u64 {
        (self.rows as u64).saturating_mul(self.cols as u64)
    }
}

/// Raster export destination
pub trait Exporter: Send + Sync {
    fn export(&self, image: &Image, request: &ExportRequest) -> Result<ExportReceipt>;
}

/// Crop, resample and pixel-cap an image the way every exporter must.
///
/// Fails with [`ExportFailure::PixelCap`] when the output grid is larger
/// than `request.max_pixels`; the cap is checked before any pixel is copied,
/// so a tiny `scale` cannot allocate an oversized grid.
pub fn prepare_export(image: &Image, request: &ExportRequest) -> Result<Image> {
    request.validate()?;
    let grid = image
        .grid()
        .ok_or_else(|| Error::Other(format!("image '{}' has no bands to export", image.id())))?;

    let window = match &request.region {
        Some(bbox) => pixel_window(grid, bbox)?,
        None => (0, 0, grid.cols(), grid.rows()),
    };
    let target = output_grid(grid, window, request.scale, request.max_pixels)?;
    image.resample_to(&target)
}

/// Pixel window `(col0, row0, cols, rows)` covering `bbox`
fn pixel_window(grid: &Raster<f64>, bbox: &BBox) -> Result<(usize, usize, usize, usize)> {
    let gt = grid.transform();
    let (c0, r0) = gt.geo_to_pixel(bbox.min_x, bbox.max_y);
    let (c1, r1) = gt.geo_to_pixel(bbox.max_x, bbox.min_y);

    let clamp = |v: f64, max: usize| v.max(0.0).min(max as f64);
    let col0 = clamp(c0.min(c1).floor(), grid.cols()) as usize;
    let col1 = clamp(c0.max(c1).ceil(), grid.cols()) as usize;
    let row0 = clamp(r0.min(r1).floor(), grid.rows()) as usize;
    let row1 = clamp(r0.max(r1).ceil(), grid.rows()) as usize;

    if col1 <= col0 || row1 <= row0 {
        return Err(Error::InvalidParameter {
            name: "region",
            value: format!("{:?}", bbox.to_array()),
            reason: "does not overlap the image".into(),
        });
    }
    Ok((col0, row0, col1 - col0, row1 - row0))
}

/// Output grid for a window at an optional new pixel size, capped at `max_pixels`
fn output_grid(
    grid: &Raster<f64>,
    (col0, row0, cols, rows): (usize, usize, usize, usize),
    scale: Option<f64>,
    max_pixels: u64,
) -> Result<TargetGrid> {
    let gt = grid.transform();
    let window = gt.window(col0, row0);
    let (transform, out_cols, out_rows) = match scale {
        None => (window, cols as f64, rows as f64),
        Some(s) => {
            let width = cols as f64 * gt.pixel_width.abs();
            let height = rows as f64 * gt.pixel_height.abs();
            (
                window.with_cell_size(s),
                (width / s).round().max(1.0),
                (height / s).round().max(1.0),
            )
        }
    };

    // counted in f64: a tiny scale can exceed u64 before the cap applies
    let requested = out_cols * out_rows;
    if !(requested <= max_pixels as f64) {
        return Err(ExportFailure::PixelCap {
            requested: requested as u64,
            cap: max_pixels,
        }
        .into());
    }

    Ok(TargetGrid {
        transform,
        rows: out_rows as usize,
        cols: out_cols as usize,
        crs: grid.crs().cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CRS;
    use crate::raster::{GeoTransform, NODATA};

    fn image(rows: usize, cols: usize) -> Image {
        let mut r = Raster::from_vec((0..rows * cols).map(|v| v as f64).collect(), rows, cols).unwrap();
        r.set_transform(GeoTransform::new(0.0, rows as f64 * 10.0, 10.0, -10.0));
        r.set_crs(Some(CRS::from_epsg(32636)));
        r.set_nodata(Some(NODATA));
        Image::new("img").with_band("NDBI", r).unwrap()
    }

    #[test]
    fn test_pixel_cap_rejects() {
        let img = image(20, 30);
        let err = prepare_export(&img, &ExportRequest::new("x").max_pixels(599)).unwrap_err();
        match err {
            Error::Export(ExportFailure::PixelCap { requested, cap }) => {
                assert_eq!(requested, 600);
                assert_eq!(cap, 599);
            }
            other => panic!("expected pixel cap failure, got {:?}", other),
        }
        assert!(prepare_export(&img, &ExportRequest::new("x").max_pixels(600)).is_ok());
    }

    #[test]
    fn test_crop_and_scale() {
        let img = image(20, 30);
        // x 50..150, y 100..180 → cols 5..15, rows 2..10
        let req = ExportRequest::new("x").region(BBox::new(50.0, 100.0, 150.0, 180.0));
        let out = prepare_export(&img, &req).unwrap();
        assert_eq!(out.shape(), Some((8, 10)));
        let band = out.band("NDBI").unwrap();
        assert_eq!(band.get(0, 0).unwrap(), (2 * 30 + 5) as f64);

        let coarse = prepare_export(&img, &ExportRequest::new("x").scale(20.0)).unwrap();
        assert_eq!(coarse.shape(), Some((10, 15)));
        assert!((coarse.transform().unwrap().pixel_width - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_tiny_scale_hits_pixel_cap() {
        let mut r = Raster::filled(100, 100, 1.0);
        r.set_transform(GeoTransform::new(0.0, 3000.0, 30.0, -30.0));
        r.set_crs(Some(CRS::from_epsg(32636)));
        let img = Image::new("img").with_band("NDBI", r).unwrap();

        let req = ExportRequest::new("out").scale(1e-9).max_pixels(1000);
        assert!(req.validate().is_ok());
        match prepare_export(&img, &req).unwrap_err() {
            Error::Export(ExportFailure::PixelCap { requested, cap }) => {
                assert_eq!(cap, 1000);
                assert_eq!(requested, u64::MAX);
            }
            other => panic!("expected pixel cap failure, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_requests() {
        let img = image(4, 4);
        assert!(prepare_export(&img, &ExportRequest::new("../x")).is_err());
        assert!(prepare_export(&img, &ExportRequest::new("x").scale(0.0)).is_err());
        assert!(prepare_export(&img, &ExportRequest::new("x").region(BBox::new(500.0, 500.0, 600.0, 600.0))).is_err());
    }
}
