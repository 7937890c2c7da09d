//! # Landsight Algorithms
//!
//! Imagery analysis for the landsight pipeline.
//!
//! ## Available Algorithm Categories
//!
//! - **composite**: temporal reducers (median, mean, first match)
//! - **imagery**: spectral indices, index calculator, band expressions,
//!   clipping, change detection
//! - **classification**: training samples, random forest, minimum distance
//! - **statistics**: region statistics and time series

pub mod classification;
pub mod composite;
pub mod imagery;
pub mod statistics;

mod maybe_rayon;
mod util;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        classify, sample_regions, train, ClassifiedRaster, Classifier, ClassifierKind,
        MinimumDistance, Model, RandomForest, SampleSet, TrainParams, TrainingData,
        TrainingSample,
    };
    pub use crate::composite::{reduce, Composite, Reducer};
    pub use crate::imagery::{
        add_index, clip_image, clip_to_region, compute_index, normalized_difference,
        raster_difference, ChangeDetection, ChangeParams, IndexFormula, IndexSpec, Sensor,
        SpectralIndex,
    };
    pub use crate::statistics::{region_mean, time_series, TimeSeries};
    pub use landsight_core::prelude::*;
}
