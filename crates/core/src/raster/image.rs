//! Multi-band images
//!
//! An [`Image`] is a set of named bands that share one grid, plus the
//! acquisition time and the scalar metadata a catalog reports for the scene
//! (cloud cover, platform, ...). Band values stay in native sensor units;
//! each band may carry the [`ScaleFactor`] that converts them to physical
//! units.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, NODATA};
use crate::vector::BBox;

// ---------------------------------------------------------------------------
// Scale factors
// ---------------------------------------------------------------------------

/// Linear conversion from stored integers to physical units:
/// `physical = raw * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactor {
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

impl ScaleFactor {
    /// Sentinel-2 L2A surface reflectance (DN × 0.0001)
    pub const SENTINEL2_REFLECTANCE: ScaleFactor = ScaleFactor::new(0.0001, 0.0);
    /// TerraClimate temperature (×0.1 °C)
    pub const TERRACLIMATE_TEMPERATURE: ScaleFactor = ScaleFactor::new(0.1, 0.0);
    /// Landsat Collection 2 Level-2 surface reflectance
    pub const LANDSAT_C2_REFLECTANCE: ScaleFactor = ScaleFactor::new(0.0000275, -0.2);
    /// Landsat Collection 2 Level-2 surface temperature (Kelvin)
    pub const LANDSAT_C2_TEMPERATURE: ScaleFactor = ScaleFactor::new(0.00341802, 149.0);

    pub const fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    /// Pure multiplicative factor
    pub const fn multiply(scale: f64) -> Self {
        Self::new(scale, 0.0)
    }

    /// Convert one stored value to physical units
    #[inline]
    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }

    pub fn is_identity(&self) -> bool {
        self.scale == 1.0 && self.offset == 0.0
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Scalar image metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(v) => Some(*v),
            PropertyValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::Number(_) => None,
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Number(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Number(v) => write!(f, "{}", v),
            PropertyValue::Text(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

/// Band name and optional scale factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<ScaleFactor>,
}

impl BandInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scale: None,
        }
    }

    pub fn scaled(name: impl Into<String>, scale: ScaleFactor) -> Self {
        Self {
            name: name.into(),
            scale: Some(scale),
        }
    }
}

/// Named bands on a shared grid with acquisition metadata.
///
/// Band rasters are reference counted, so `select` and `with_band` are cheap
/// and never copy or modify source pixels. Every band raster uses
/// [`NODATA`] for missing cells.
#[derive(Debug, Clone)]
pub struct Image {
    id: String,
    timestamp: Option<DateTime<Utc>>,
    properties: BTreeMap<String, PropertyValue>,
    footprint: Option<BBox>,
    bands: Vec<BandInfo>,
    rasters: Vec<Arc<Raster<f64>>>,
}

impl Image {
    /// An image with no bands yet
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: None,
            properties: BTreeMap::new(),
            footprint: None,
            bands: Vec::new(),
            rasters: Vec::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Geographic (lon/lat) footprint reported by the catalog.
    ///
    /// When unset, [`Image::footprint`] falls back to the grid bounds for
    /// images in a geographic CRS.
    pub fn with_footprint(mut self, footprint: BBox) -> Self {
        self.footprint = Some(footprint);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Return a new image with `raster` appended as band `name`.
    pub fn with_band(&self, name: impl Into<String>, raster: Raster<f64>) -> Result<Image> {
        self.with_band_info(BandInfo::new(name), raster)
    }

    /// Return a new image with a scaled band appended.
    pub fn with_scaled_band(
        &self,
        name: impl Into<String>,
        raster: Raster<f64>,
        scale: ScaleFactor,
    ) -> Result<Image> {
        self.with_band_info(BandInfo::scaled(name, scale), raster)
    }

    /// Return a new image with a band appended.
    ///
    /// The first band fixes the grid; later bands must match it exactly.
    /// Band names are unique within an image.
    pub fn with_band_info(&self, info: BandInfo, mut raster: Raster<f64>) -> Result<Image> {
        if self.band_index(&info.name).is_some() {
            return Err(Error::InvalidParameter {
                name: "band",
                value: info.name,
                reason: format!("image '{}' already has a band with this name", self.id),
            });
        }
        if let Some(grid) = self.rasters.first() {
            grid.check_same_grid(&raster)?;
        }
        if raster.nodata() != Some(NODATA) {
            raster = raster.to_f64();
        }

        let mut out = self.clone();
        out.bands.push(info);
        out.rasters.push(Arc::new(raster));
        Ok(out)
    }

    // Metadata

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Numeric property, if present and numeric
    pub fn property_f64(&self, key: &str) -> Option<f64> {
        self.property(key).and_then(PropertyValue::as_f64)
    }

    /// Lon/lat footprint used for spatial filtering
    pub fn footprint(&self) -> Option<BBox> {
        if self.footprint.is_some() {
            return self.footprint;
        }
        let geographic = self.crs().map_or(true, CRS::is_geographic);
        if !geographic {
            return None;
        }
        self.bounds()
            .map(|(min_x, min_y, max_x, max_y)| BBox::new(min_x, min_y, max_x, max_y))
    }

    // Bands

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn bands(&self) -> &[BandInfo] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    fn band_index(&self, name: &str) -> Option<usize> {
        self.bands.iter().position(|b| b.name == name)
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.band_index(name).is_some()
    }

    /// Band metadata by name
    pub fn band_info(&self, name: &str) -> Result<&BandInfo> {
        self.band_index(name)
            .map(|i| &self.bands[i])
            .ok_or_else(|| Error::missing_band(name, self.band_names()))
    }

    /// Band values in native units
    pub fn band(&self, name: &str) -> Result<&Raster<f64>> {
        self.band_index(name)
            .map(|i| self.rasters[i].as_ref())
            .ok_or_else(|| Error::missing_band(name, self.band_names()))
    }

    /// Band values converted to physical units with the band's scale factor.
    ///
    /// No-data cells stay [`NODATA`].
    pub fn scaled_band(&self, name: &str) -> Result<Raster<f64>> {
        let raster = self.band(name)?;
        let scale = match self.band_info(name)?.scale {
            Some(s) if !s.is_identity() => s,
            _ => return Ok(raster.clone()),
        };

        let mut out = raster.clone();
        out.data_mut().mapv_inplace(|v| {
            if v.is_finite() && v != NODATA {
                scale.apply(v)
            } else {
                NODATA
            }
        });
        Ok(out)
    }

    /// New image holding only the named bands, in the given order
    pub fn select(&self, names: &[&str]) -> Result<Image> {
        let mut out = self.with_no_bands();
        for name in names {
            let i = self
                .band_index(name)
                .ok_or_else(|| Error::missing_band(name, self.band_names()))?;
            out.bands.push(self.bands[i].clone());
            out.rasters.push(Arc::clone(&self.rasters[i]));
        }
        Ok(out)
    }

    /// New image holding the bands whose name starts with `prefix`
    pub fn select_prefix(&self, prefix: &str) -> Result<Image> {
        let names: Vec<&str> = self
            .band_names()
            .into_iter()
            .filter(|n| n.starts_with(prefix))
            .collect();
        if names.is_empty() {
            return Err(Error::missing_band(&format!("{}*", prefix), self.band_names()));
        }
        self.select(&names)
    }

    /// Rename one band, keeping its data and scale
    pub fn rename_band(&self, from: &str, to: &str) -> Result<Image> {
        let i = self
            .band_index(from)
            .ok_or_else(|| Error::missing_band(from, self.band_names()))?;
        if from != to && self.has_band(to) {
            return Err(Error::InvalidParameter {
                name: "band",
                value: to.to_string(),
                reason: "target name already in use".into(),
            });
        }
        let mut out = self.clone();
        out.bands[i].name = to.to_string();
        Ok(out)
    }

    fn with_no_bands(&self) -> Image {
        Image {
            id: self.id.clone(),
            timestamp: self.timestamp,
            properties: self.properties.clone(),
            footprint: self.footprint,
            bands: Vec::new(),
            rasters: Vec::new(),
        }
    }

    // Grid

    /// First band, which defines the image grid
    pub fn grid(&self) -> Option<&Raster<f64>> {
        self.rasters.first().map(Arc::as_ref)
    }

    pub fn shape(&self) -> Option<(usize, usize)> {
        self.grid().map(Raster::shape)
    }

    pub fn transform(&self) -> Option<&GeoTransform> {
        self.grid().map(Raster::transform)
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.grid().and_then(Raster::crs)
    }

    /// Grid bounds (min_x, min_y, max_x, max_y) in the image CRS
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        self.grid().map(Raster::bounds)
    }

    /// Whether `other` has bands on the same grid as this image
    pub fn same_grid(&self, other: &Image) -> bool {
        match (self.grid(), other.grid()) {
            (Some(a), Some(b)) => a.same_grid(b),
            _ => false,
        }
    }
}
