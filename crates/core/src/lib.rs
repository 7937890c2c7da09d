//! # Landsight Core
//!
//! Core types, traits and I/O for the landsight imagery pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced raster grid
//! - `Image` / `ImageCollection`: named bands with acquisition metadata, and
//!   order-preserving collection filters
//! - `Region` plus boundary datasets to resolve named administrative units
//! - Catalog and exporter capability traits with local implementations
//! - GeoTIFF I/O and the shared error taxonomy

pub mod catalog;
pub mod crs;
pub mod error;
pub mod export;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, ExportFailure, Result};
pub use raster::{
    BandInfo, CompareOp, DateRange, GeoTransform, Image, ImageCollection, Raster, RasterElement,
    ScaleFactor, NODATA,
};
pub use vector::{BBox, Region};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::catalog::{CatalogQuery, ImageCatalog};
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::export::{ExportRequest, Exporter};
    pub use crate::raster::{
        BandInfo, CompareOp, DateRange, GeoTransform, Image, ImageCollection, Raster,
        RasterElement, ScaleFactor, NODATA,
    };
    pub use crate::vector::{BBox, BoundaryQuery, BoundarySource, Region};
    pub use crate::Algorithm;
}

/// Core trait for pipeline algorithms.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
