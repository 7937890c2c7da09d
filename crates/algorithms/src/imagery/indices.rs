//! Spectral indices
//!
//! Normalized differences and the vegetation, water and built-up presets
//! the district scripts use. Every function takes single-band rasters in
//! physical units (reflectance, not stored integers) on the same grid.
//! Masked inputs, zero denominators and non-finite results become
//! [`NODATA`]; no output pixel is ever NaN or infinite.

use serde::{Deserialize, Serialize};

use crate::maybe_rayon::*;
use crate::util::{build_output, finite_or_nodata, is_masked};
use landsight_core::raster::{Image, Raster, NODATA};
use landsight_core::Result;

/// Denominators smaller than this are treated as zero
const EPSILON: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Band roles and sensors
// ---------------------------------------------------------------------------

/// Spectral role of a band, independent of the sensor's naming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandRole {
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
    Swir2,
}

/// Band naming of a sensor product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sensor {
    /// Landsat 8/9 Collection 2 Level-2 (`SR_B2` .. `SR_B7`)
    Landsat89,
    /// Landsat 5/7 Collection 2 Level-2 (`SR_B1` .. `SR_B7`)
    Landsat57,
    /// Sentinel-2 MSI (`B2` .. `B12`)
    Sentinel2,
}

impl Sensor {
    pub fn band(self, role: BandRole) -> &'static str {
        use BandRole::*;
        match (self, role) {
            (Sensor::Landsat89, Blue) => "SR_B2",
            (Sensor::Landsat89, Green) => "SR_B3",
            (Sensor::Landsat89, Red) => "SR_B4",
            (Sensor::Landsat89, Nir) => "SR_B5",
            (Sensor::Landsat89, Swir1) => "SR_B6",
            (Sensor::Landsat89, Swir2) => "SR_B7",
            (Sensor::Landsat57, Blue) => "SR_B1",
            (Sensor::Landsat57, Green) => "SR_B2",
            (Sensor::Landsat57, Red) => "SR_B3",
            (Sensor::Landsat57, Nir) => "SR_B4",
            (Sensor::Landsat57, Swir1) => "SR_B5",
            (Sensor::Landsat57, Swir2) => "SR_B7",
            (Sensor::Sentinel2, Blue) => "B2",
            (Sensor::Sentinel2, Green) => "B3",
            (Sensor::Sentinel2, Red) => "B4",
            (Sensor::Sentinel2, Nir) => "B8",
            (Sensor::Sentinel2, Swir1) => "B11",
            (Sensor::Sentinel2, Swir2) => "B12",
        }
    }
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// Supported spectral index presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpectralIndex {
    /// `(NIR - Red) / (NIR + Red)`
    NDVI,
    /// `(SWIR1 - NIR) / (SWIR1 + NIR)`
    NDBI,
    /// `(Green - NIR) / (Green + NIR)`
    NDWI,
    /// `(Green - SWIR1) / (Green + SWIR1)`
    MNDWI,
    /// `(NIR - Red) / (NIR + Red + L) * (1 + L)` with L = 0.5
    SAVI,
    /// `2.5 * (NIR - Red) / (NIR + 6 Red - 7.5 Blue + 1)`
    EVI,
}

impl SpectralIndex {
    pub fn name(self) -> &'static str {
        match self {
            SpectralIndex::NDVI => "NDVI",
            SpectralIndex::NDBI => "NDBI",
            SpectralIndex::NDWI => "NDWI",
            SpectralIndex::MNDWI => "MNDWI",
            SpectralIndex::SAVI => "SAVI",
            SpectralIndex::EVI => "EVI",
        }
    }

    /// Band roles in formula order
    pub fn roles(self) -> &'static [BandRole] {
        use BandRole::*;
        match self {
            SpectralIndex::NDVI | SpectralIndex::SAVI => &[Nir, Red],
            SpectralIndex::NDBI => &[Swir1, Nir],
            SpectralIndex::NDWI => &[Green, Nir],
            SpectralIndex::MNDWI => &[Green, Swir1],
            SpectralIndex::EVI => &[Nir, Red, Blue],
        }
    }

    /// Guaranteed output range of unmasked pixels.
    ///
    /// EVI has none: its denominator can approach zero for dark or noisy
    /// pixels, so values outside [-1, 1] occur.
    pub fn value_range(self) -> Option<(f64, f64)> {
        match self {
            SpectralIndex::SAVI => {
                let l = SaviParams::default().l_factor;
                Some((-(1.0 + l), 1.0 + l))
            }
            SpectralIndex::EVI => None,
            _ => Some((-1.0, 1.0)),
        }
    }

    /// Compute the index from an image using the sensor's band names.
    ///
    /// Bands are converted to physical units with their scale factors first.
    pub fn compute(self, image: &Image, sensor: Sensor) -> Result<Raster<f64>> {
        let bands = self
            .roles()
            .iter()
            .map(|role| image.scaled_band(sensor.band(*role)))
            .collect::<Result<Vec<_>>>()?;

        match self {
            SpectralIndex::SAVI => savi(&bands[0], &bands[1], SaviParams::default()),
            SpectralIndex::EVI => evi(&bands[0], &bands[1], &bands[2], EviParams::default()),
            _ => normalized_difference(&bands[0], &bands[1]),
        }
    }
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Generic normalized difference
// ---------------------------------------------------------------------------

/// Normalized difference `(a - b) / (a + b)`, in [-1, 1].
///
/// Masked where either input is masked or `a + b` is zero. When the inputs
/// have opposite signs (negative reflectance after offset scaling) the
/// ratio leaves [-1, 1] and the pixel is masked too.
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<Raster<f64>> {
    band_a.check_same_grid(band_b)?;
    let (rows, cols) = band_a.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![NODATA; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let a = unsafe { band_a.get_unchecked(row, col) };
                let b = unsafe { band_b.get_unchecked(row, col) };
                if is_masked(a) || is_masked(b) {
                    continue;
                }

                let sum = a + b;
                if sum.abs() < EPSILON {
                    continue;
                }

                let nd = (a - b) / sum;
                if nd.is_finite() && (-1.0..=1.0).contains(&nd) {
                    *out = nd;
                }
            }
            row_data
        })
        .collect();

    build_output(band_a, data)
}

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red)`
///
/// - Dense vegetation: 0.6 to 0.9
/// - Bare soil: 0.1 to 0.2
/// - Water: below 0
pub fn ndvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, red)
}

/// Normalized Difference Built-up Index (Zha et al., 2003)
///
/// `NDBI = (SWIR1 - NIR) / (SWIR1 + NIR)`
///
/// Positive over built-up surfaces and bare soil, negative over vegetation.
pub fn ndbi(swir1: &Raster<f64>, nir: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(swir1, nir)
}

/// Normalized Difference Water Index (McFeeters, 1996)
///
/// `NDWI = (Green - NIR) / (Green + NIR)`
pub fn ndwi(green: &Raster<f64>, nir: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(green, nir)
}

/// Modified Normalized Difference Water Index (Xu, 2006)
///
/// `MNDWI = (Green - SWIR1) / (Green + SWIR1)`
///
/// Separates open water from built-up land better than NDWI.
pub fn mndwi(green: &Raster<f64>, swir1: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(green, swir1)
}

// ---------------------------------------------------------------------------
// SAVI
// ---------------------------------------------------------------------------

/// Parameters for SAVI
#[derive(Debug, Clone)]
pub struct SaviParams {
    /// Soil brightness correction factor (0 = dense vegetation, 1 = sparse).
    /// Default: 0.5
    pub l_factor: f64,
}

impl Default for SaviParams {
    fn default() -> Self {
        Self { l_factor: 0.5 }
    }
}

/// Soil Adjusted Vegetation Index (Huete, 1988)
///
/// `SAVI = ((NIR - Red) / (NIR + Red + L)) * (1 + L)`
pub fn savi(nir: &Raster<f64>, red: &Raster<f64>, params: SaviParams) -> Result<Raster<f64>> {
    nir.check_same_grid(red)?;
    let (rows, cols) = nir.shape();
    let l = params.l_factor;

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![NODATA; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let n = unsafe { nir.get_unchecked(row, col) };
                let r = unsafe { red.get_unchecked(row, col) };
                if is_masked(n) || is_masked(r) {
                    continue;
                }

                let denom = n + r + l;
                if denom.abs() < EPSILON {
                    continue;
                }
                *out = finite_or_nodata(((n - r) / denom) * (1.0 + l));
            }
            row_data
        })
        .collect();

    build_output(nir, data)
}

// ---------------------------------------------------------------------------
// EVI
// ---------------------------------------------------------------------------

/// Parameters for EVI
#[derive(Debug, Clone)]
pub struct EviParams {
    /// Gain factor (default: 2.5)
    pub g: f64,
    /// Aerosol coefficient for red band (default: 6.0)
    pub c1: f64,
    /// Aerosol coefficient for blue band (default: 7.5)
    pub c2: f64,
    /// Canopy background adjustment (default: 1.0)
    pub l: f64,
}

impl Default for EviParams {
    fn default() -> Self {
        Self {
            g: 2.5,
            c1: 6.0,
            c2: 7.5,
            l: 1.0,
        }
    }
}

/// Enhanced Vegetation Index (Huete et al., 2002)
///
/// `EVI = G * (NIR - Red) / (NIR + C1 * Red - C2 * Blue + L)`
pub fn evi(
    nir: &Raster<f64>,
    red: &Raster<f64>,
    blue: &Raster<f64>,
    params: EviParams,
) -> Result<Raster<f64>> {
    nir.check_same_grid(red)?;
    nir.check_same_grid(blue)?;
    let (rows, cols) = nir.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![NODATA; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let n = unsafe { nir.get_unchecked(row, col) };
                let r = unsafe { red.get_unchecked(row, col) };
                let b = unsafe { blue.get_unchecked(row, col) };
                if is_masked(n) || is_masked(r) || is_masked(b) {
                    continue;
                }

                let denom = n + params.c1 * r - params.c2 * b + params.l;
                if denom.abs() < EPSILON {
                    continue;
                }
                *out = finite_or_nodata(params.g * (n - r) / denom);
            }
            row_data
        })
        .collect();

    build_output(nir, data)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
