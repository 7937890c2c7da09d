//! Imagery analysis algorithms
//!
//! - Spectral indices: NDVI, NDBI, NDWI, MNDWI, SAVI, EVI with sensor band maps
//! - Index calculator: named index layers from presets, normalized
//!   differences or band arithmetic
//! - Clipping to a region
//! - Change detection between two composites

mod calculator;
mod change_detection;
pub(crate) mod clip;
mod expression;
mod indices;

pub use calculator::{add_index, compute_index, evaluate_expression, IndexFormula, IndexSpec};
pub use change_detection::{
    raster_difference, ChangeDetection, ChangeParams, ChangeResult, ChangeSummary,
    CHANGE_DECREASE, CHANGE_INCREASE, CHANGE_NODATA, CHANGE_NO_CHANGE,
};
pub use clip::{clip_image, clip_to_region};
pub use expression::Expression;
pub use indices::{
    evi, mndwi, ndbi, ndvi, ndwi, normalized_difference, savi, BandRole, EviParams, SaviParams,
    Sensor, SpectralIndex,
};
