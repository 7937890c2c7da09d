//! Raster-to-RGBA rendering with visualization parameters.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tiff::encoder::{colortype, TiffEncoder};

use crate::palette::{ColorScheme, Palette, Rgb};
use landsight_core::raster::{Image, Raster, RasterElement};
use landsight_core::{Error, Result};

/// Display parameters for one layer (`{min, max, palette, bands}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    /// Value mapped to the first palette color. Values below are clamped.
    pub min: f64,
    /// Value mapped to the last palette color. Values above are clamped.
    pub max: f64,
    /// Single-band palette; grayscale when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Palette>,
    /// One band for palette rendering or three for an RGB composite.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bands: Vec<String>,
    /// Color for nodata pixels (RGBA). Default: fully transparent.
    #[serde(default)]
    pub nodata_color: [u8; 4],
}

impl VisParams {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            palette: None,
            bands: Vec::new(),
            nodata_color: [0, 0, 0, 0],
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = Some(palette);
        self
    }

    pub fn with_scheme(self, scheme: ColorScheme) -> Self {
        self.with_palette(scheme.palette())
    }

    pub fn with_bands<S: Into<String>>(mut self, bands: impl IntoIterator<Item = S>) -> Self {
        self.bands = bands.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite() && self.max > self.min) {
            return Err(Error::InvalidParameter {
                name: "vis.min/max",
                value: format!("{} / {}", self.min, self.max),
                reason: "max must be greater than min".into(),
            });
        }
        match self.bands.len() {
            0 | 1 => Ok(()),
            3 if self.palette.is_none() => Ok(()),
            3 => Err(Error::InvalidParameter {
                name: "vis.palette",
                value: format!("{:?}", self.bands),
                reason: "a palette applies to single-band rendering only".into(),
            }),
            n => Err(Error::InvalidParameter {
                name: "vis.bands",
                value: n.to_string(),
                reason: "expected 1 or 3 bands".into(),
            }),
        }
    }

    fn palette_or_gray(&self) -> Palette {
        self.palette
            .clone()
            .unwrap_or_else(|| ColorScheme::Grayscale.palette())
    }

    fn normalize(&self, v: f64) -> f64 {
        (v - self.min) / (self.max - self.min)
    }
}

/// Stretch the valid range of a raster, returning `VisParams` ready to use.
///
/// Scans all valid (non-nodata) cells to find the data range.
pub fn auto_params<T: RasterElement>(raster: &Raster<T>) -> VisParams {
    let nodata = raster.nodata();
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for val in raster.data().iter() {
        if val.is_nodata(nodata) {
            continue;
        }
        if let Some(v) = val.to_f64() {
            if v.is_finite() {
                min = min.min(v);
                max = max.max(v);
            }
        }
    }

    // Handle edge case: all nodata or constant raster
    if !min.is_finite() || !max.is_finite() {
        min = 0.0;
        max = 1.0;
    } else if (max - min).abs() < f64::EPSILON {
        max = min + 1.0;
    }

    VisParams::new(min, max)
}

/// Row-major RGBA pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RgbaImage {
    fn blank(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width * height * 4],
        }
    }

    fn put(&mut self, i: usize, rgba: [u8; 4]) {
        self.data[i * 4..i * 4 + 4].copy_from_slice(&rgba);
    }

    pub fn pixel(&self, row: usize, col: usize) -> Option<[u8; 4]> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let i = (row * self.width + col) * 4;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[i..i + 4]);
        Some(px)
    }

    /// Write as an 8-bit RGBA TIFF for viewing
    pub fn write_tiff<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = BufWriter::new(File::create(path.as_ref())?);
        let mut encoder = TiffEncoder::new(file).map_err(|e| Error::GeoTiff(e.to_string()))?;
        encoder
            .write_image::<colortype::RGBA8>(self.width as u32, self.height as u32, &self.data)
            .map_err(|e| Error::GeoTiff(e.to_string()))
    }
}

fn opaque(c: Rgb) -> [u8; 4] {
    [c.r, c.g, c.b, 255]
}

fn valid(v: f64, nodata: Option<f64>) -> Option<f64> {
    (v.is_finite() && !v.is_nodata(nodata)).then_some(v)
}

/// Render one band through the palette (grayscale when none is set).
pub fn render_band(raster: &Raster<f64>, vis: &VisParams) -> Result<RgbaImage> {
    vis.validate()?;
    let palette = vis.palette_or_gray();
    let nodata = raster.nodata();
    let mut out = RgbaImage::blank(raster.cols(), raster.rows());

    for (i, v) in raster.data().iter().enumerate() {
        let px = match valid(*v, nodata) {
            Some(v) => opaque(palette.evaluate(vis.normalize(v))),
            None => vis.nodata_color,
        };
        out.put(i, px);
    }
    Ok(out)
}

/// Render class labels with one palette stop per class.
///
/// `min`/`max` span the label range, so `{min: 0, max: 3}` with four colors
/// paints classes 0..=3 with one color each.
pub fn render_classes(classes: &Raster<u8>, vis: &VisParams) -> Result<RgbaImage> {
    vis.validate()?;
    let palette = vis.palette_or_gray();
    let nodata = classes.nodata();
    let mut out = RgbaImage::blank(classes.cols(), classes.rows());

    for (i, v) in classes.data().iter().enumerate() {
        let px = if v.is_nodata(nodata) {
            vis.nodata_color
        } else {
            opaque(palette.nearest(vis.normalize(*v as f64)))
        };
        out.put(i, px);
    }
    Ok(out)
}

/// Linear stretch of three bands to an RGB composite.
pub fn render_rgb(
    red: &Raster<f64>,
    green: &Raster<f64>,
    blue: &Raster<f64>,
    vis: &VisParams,
) -> Result<RgbaImage> {
    vis.validate()?;
    red.check_same_grid(green)?;
    red.check_same_grid(blue)?;
    let mut out = RgbaImage::blank(red.cols(), red.rows());
    let channel = |v: f64| (vis.normalize(v).clamp(0.0, 1.0) * 255.0).round() as u8;

    let bands = [red, green, blue];
    for i in 0..red.len() {
        let (row, col) = (i / red.cols(), i % red.cols());
        let mut px = [0u8, 0, 0, 255];
        let mut masked = false;
        for (slot, band) in px.iter_mut().zip(bands) {
            match band.get(row, col).ok().and_then(|v| valid(v, band.nodata())) {
                Some(v) => *slot = channel(v),
                None => masked = true,
            }
        }
        out.put(i, if masked { vis.nodata_color } else { px });
    }
    Ok(out)
}

/// Render an image band selection (`Map.addLayer(image, vis)`).
///
/// Uses `vis.bands` when set, else the image's only band. Values are
/// rendered in stored units, as the display stretch expects.
pub fn render_image(image: &Image, vis: &VisParams) -> Result<RgbaImage> {
    let names: Vec<&str> = if vis.bands.is_empty() {
        image.band_names()
    } else {
        vis.bands.iter().map(String::as_str).collect()
    };
    match names.as_slice() {
        [one] => render_band(image.band(one)?, vis),
        [r, g, b] => render_rgb(image.band(r)?, image.band(g)?, image.band(b)?, vis),
        _ => Err(Error::InvalidParameter {
            name: "vis.bands",
            value: format!("{:?}", names),
            reason: "expected 1 or 3 bands".into(),
        }),
    }
}

/// Gradient legend entries from `min` to `max`
#[derive(Debug, Clone, PartialEq)]
pub struct Legend {
    pub title: String,
    pub entries: Vec<(f64, Rgb)>,
}

impl Legend {
    /// `steps` evenly spaced values (at least 2), e.g. 3 gives min, mid, max
    pub fn gradient(title: impl Into<String>, vis: &VisParams, steps: usize) -> Legend {
        let palette = vis.palette_or_gray();
        let steps = steps.max(2);
        let entries = (0..steps)
            .map(|i| {
                let t = i as f64 / (steps - 1) as f64;
                (vis.min + t * (vis.max - vis.min), palette.evaluate(t))
            })
            .collect();
        Legend {
            title: title.into(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landsight_core::raster::NODATA;

    #[test]
    fn render_band_basic() {
        let mut r = Raster::<f64>::new(2, 2);
        r.set(0, 0, 0.0).unwrap();
        r.set(0, 1, 0.5).unwrap();
        r.set(1, 0, 1.0).unwrap();
        r.set(1, 1, NODATA).unwrap();
        r.set_nodata(Some(NODATA));

        let rgba = render_band(&r, &VisParams::new(0.0, 1.0)).unwrap();
        assert_eq!(rgba.data.len(), 16); // 4 pixels * 4 bytes

        assert_eq!(rgba.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(rgba.pixel(0, 1), Some([128, 128, 128, 255]));
        assert_eq!(rgba.pixel(1, 0), Some([255, 255, 255, 255]));
        assert_eq!(rgba.pixel(1, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn ndbi_palette_clamps() {
        let r = Raster::<f64>::from_vec(vec![-2.0, 0.0, 5.0], 1, 3).unwrap();
        let vis = VisParams::new(-1.0, 1.0).with_scheme(ColorScheme::BuiltUp);
        let rgba = render_band(&r, &vis).unwrap();
        assert_eq!(rgba.pixel(0, 0), Some([0, 128, 0, 255]));
        assert_eq!(rgba.pixel(0, 1), Some([255, 255, 255, 255]));
        assert_eq!(rgba.pixel(0, 2), Some([255, 0, 0, 255]));
    }

    #[test]
    fn classes_use_discrete_colors() {
        let mut c = Raster::<u8>::from_vec(vec![0, 1, 2, 3, 255, 1], 2, 3).unwrap();
        c.set_nodata(Some(255));
        let vis = VisParams::new(0.0, 3.0).with_scheme(ColorScheme::LandCover);
        let rgba = render_classes(&c, &vis).unwrap();
        assert_eq!(rgba.pixel(0, 0), Some([0xcc, 0x6d, 0x8f, 255]));
        assert_eq!(rgba.pixel(1, 0), Some([0x00, 0x4d, 0x40, 255]));
        assert_eq!(rgba.pixel(1, 1), Some([0, 0, 0, 0]));
        assert_eq!(rgba.pixel(0, 1), rgba.pixel(1, 2));
    }

    #[test]
    fn rgb_composite_stretch() {
        let band = |v: f64| Raster::<f64>::filled(1, 1, v);
        let vis = VisParams::new(0.0, 3000.0).with_bands(["B4", "B3", "B2"]);
        let rgba = render_rgb(&band(3000.0), &band(1500.0), &band(-10.0), &vis).unwrap();
        assert_eq!(rgba.pixel(0, 0), Some([255, 128, 0, 255]));
    }

    #[test]
    fn validate_rejects_bad_params() {
        assert!(VisParams::new(1.0, 1.0).validate().is_err());
        assert!(VisParams::new(0.0, 1.0).with_bands(["a", "b"]).validate().is_err());
        assert!(VisParams::new(0.0, 1.0)
            .with_bands(["a", "b", "c"])
            .with_scheme(ColorScheme::Water)
            .validate()
            .is_err());
    }

    #[test]
    fn auto_params_range() {
        let r = Raster::<f64>::from_vec(vec![10.0, 50.0, 100.0], 1, 3).unwrap();
        let params = auto_params(&r);
        assert!((params.min - 10.0).abs() < f64::EPSILON);
        assert!((params.max - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn auto_params_constant_raster() {
        let r = Raster::<f64>::filled(2, 2, 42.0);
        let params = auto_params(&r);
        assert!((params.min - 42.0).abs() < f64::EPSILON);
        assert!((params.max - 43.0).abs() < f64::EPSILON);
    }

    #[test]
    fn legend_min_mid_max() {
        let vis = VisParams::new(-1.0, 1.0).with_scheme(ColorScheme::BuiltUp);
        let legend = Legend::gradient("NDBI", &vis, 3);
        assert_eq!(legend.entries[1], (0.0, Rgb::WHITE));
        assert_eq!(legend.entries[2].0, 1.0);
    }

    #[test]
    fn vis_from_json() {
        let vis: VisParams =
            serde_json::from_str(r#"{"min": 0, "max": 0.7, "palette": ["white", "green"]}"#).unwrap();
        assert_eq!(vis.palette, Some(ColorScheme::Vegetation.palette()));
    }
}
