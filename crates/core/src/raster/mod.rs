//! Raster data structures and operations

mod collection;
mod element;
mod geotransform;
mod grid;
mod image;
mod resample;

pub use collection::{CompareOp, DateRange, ImageCollection};
pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use image::{BandInfo, Image, PropertyValue, ScaleFactor};
pub use resample::{resample_nearest, TargetGrid};

/// No-data sentinel for every derived `f64` layer.
///
/// Masked pixels (division by zero, outside the region, missing input) are
/// always written as this value, never as NaN or infinity.
pub const NODATA: f64 = -9999.0;
