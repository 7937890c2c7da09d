//! Shared helpers for `f64` layers using the [`NODATA`] sentinel

use landsight_core::raster::{Raster, NODATA};
use landsight_core::Result;

/// Whether a value is masked: the sentinel or non-finite
#[inline]
pub(crate) fn is_masked(v: f64) -> bool {
    !v.is_finite() || v == NODATA
}

/// Replace non-finite results with the sentinel
#[inline]
pub(crate) fn finite_or_nodata(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        NODATA
    }
}

/// Wrap row-major results in a raster on the template's grid
pub(crate) fn build_output(template: &Raster<f64>, data: Vec<f64>) -> Result<Raster<f64>> {
    template.derive(data, Some(NODATA))
}
