//! Zonal statistics
//!
//! Summaries of a value layer inside a region, per class of a classified
//! raster, and per image of a collection (region time series).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::imagery::clip::check_crs;
use crate::util::is_masked;
use landsight_core::raster::{ImageCollection, Raster};
use landsight_core::vector::Region;
use landsight_core::{Error, Result};

/// Summary of the valid values in a zone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZonalResult {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl ZonalResult {
    /// Population statistics of `vals`; `None` when empty
    pub fn from_values(mut vals: Vec<f64>) -> Option<Self> {
        if vals.is_empty() {
            return None;
        }
        let count = vals.len();
        let sum: f64 = vals.iter().sum();
        let mean = sum / count as f64;
        let var = vals.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;

        vals.sort_by(|a, b| a.total_cmp(b));
        let median = if count % 2 == 0 {
            (vals[count / 2 - 1] + vals[count / 2]) / 2.0
        } else {
            vals[count / 2]
        };

        Some(Self {
            count,
            sum,
            mean,
            std_dev: var.sqrt(),
            min: vals[0],
            max: vals[count - 1],
            median,
        })
    }
}

/// Statistics of the valid pixels whose centre lies in `region`.
///
/// Returns `None` when the region covers no valid pixel.
pub fn region_statistics(values: &Raster<f64>, region: &Region) -> Result<Option<ZonalResult>> {
    check_crs(values, region)?;
    let (rows, cols) = values.shape();
    let bbox = region.bbox();

    let mut vals = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let v = unsafe { values.get_unchecked(row, col) };
            if is_masked(v) {
                continue;
            }
            let (x, y) = values.pixel_to_geo(col, row);
            if bbox.contains_point(x, y) && region.contains_point(x, y) {
                vals.push(v);
            }
        }
    }
    Ok(ZonalResult::from_values(vals))
}

/// Mean of the valid pixels in `region` (`reduceRegion(mean)`)
pub fn region_mean(values: &Raster<f64>, region: &Region) -> Result<Option<f64>> {
    Ok(region_statistics(values, region)?.map(|s| s.mean))
}

/// Statistics of `values` per class of a label raster.
///
/// Cells labeled with the label raster's nodata are skipped, as are masked
/// values.
pub fn class_statistics(values: &Raster<f64>, classes: &Raster<u8>) -> Result<BTreeMap<u8, ZonalResult>> {
    values.check_same_grid(classes)?;
    let (rows, cols) = values.shape();

    let mut per_class: BTreeMap<u8, Vec<f64>> = BTreeMap::new();
    for row in 0..rows {
        for col in 0..cols {
            let class = unsafe { classes.get_unchecked(row, col) };
            let val = unsafe { values.get_unchecked(row, col) };
            if classes.is_nodata(class) || is_masked(val) {
                continue;
            }
            per_class.entry(class).or_default().push(val);
        }
    }

    Ok(per_class
        .into_iter()
        .filter_map(|(class, vals)| ZonalResult::from_values(vals).map(|s| (class, s)))
        .collect())
}

/// One image's regional mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub image_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    /// `None` when the region covers no valid pixel of this image
    pub value: Option<f64>,
}

/// Regional mean of one band across a collection, in collection order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub band: String,
    pub region: String,
    pub points: Vec<SeriesPoint>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Other(e.to_string()))
    }
}

/// Mean of `band` (in physical units) over `region` for every image.
///
/// The region is projected into each image's CRS before averaging.
/// Fails with [`Error::EmptyCollection`] on an empty collection and with
/// [`Error::MissingBand`] if an image lacks the band.
pub fn time_series(collection: &ImageCollection, band: &str, region: &Region) -> Result<TimeSeries> {
    if collection.is_empty() {
        return Err(Error::EmptyCollection {
            context: format!("time series of {} over {}", band, region.name()),
        });
    }

    let mut points = Vec::with_capacity(collection.len());
    for image in collection.iter() {
        let layer = image.scaled_band(band)?;
        // scenes may come in different UTM zones
        let local = region.to_crs_of(layer.crs())?;
        let value = region_mean(&layer, &local)?;
        debug!("{} {}: {:?}", image.id(), band, value);
        points.push(SeriesPoint {
            image_id: image.id().to_string(),
            timestamp: image.timestamp(),
            value,
        });
    }

    info!("time series of {} over {}: {} points", band, region.name(), points.len());
    Ok(TimeSeries {
        band: band.to_string(),
        region: region.name().to_string(),
        points,
    })
}
