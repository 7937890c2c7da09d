//! Statistical summaries of raster layers
//!
//! - **zonal**: statistics inside a region, per land-cover class, and
//!   regional time series across a collection

pub mod zonal;

pub use zonal::{
    class_statistics, region_mean, region_statistics, time_series, SeriesPoint, TimeSeries,
    ZonalResult,
};
