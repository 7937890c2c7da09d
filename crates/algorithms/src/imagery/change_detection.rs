//! Change detection between two time windows
//!
//! Differences one layer (e.g. nighttime radiance) between an earlier and a
//! later composite and buckets the difference into decrease / stable /
//! increase classes.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::maybe_rayon::*;
use crate::util::{build_output, is_masked};
use landsight_core::raster::{Raster, NODATA};
use landsight_core::{Algorithm, Error, Result};

/// Change class labels
pub const CHANGE_DECREASE: u8 = 1;
pub const CHANGE_NO_CHANGE: u8 = 2;
pub const CHANGE_INCREASE: u8 = 3;
/// Label for pixels masked in either window
pub const CHANGE_NODATA: u8 = u8::MAX;

/// Thresholds on `after - before`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeParams {
    /// Differences below this are a decrease
    pub decrease_threshold: f64,
    /// Differences above this are an increase
    pub increase_threshold: f64,
}

impl Default for ChangeParams {
    fn default() -> Self {
        Self {
            decrease_threshold: -1.0,
            increase_threshold: 1.0,
        }
    }
}

impl ChangeParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.decrease_threshold <= self.increase_threshold) {
            return Err(Error::InvalidParameter {
                name: "change thresholds",
                value: format!("{} / {}", self.decrease_threshold, self.increase_threshold),
                reason: "decrease threshold must not exceed increase threshold".into(),
            });
        }
        Ok(())
    }

    fn classify(&self, diff: f64) -> u8 {
        if diff < self.decrease_threshold {
            CHANGE_DECREASE
        } else if diff > self.increase_threshold {
            CHANGE_INCREASE
        } else {
            CHANGE_NO_CHANGE
        }
    }
}

/// Difference layer plus its classes
#[derive(Debug, Clone)]
pub struct ChangeResult {
    pub difference: Raster<f64>,
    pub classes: Raster<u8>,
}

/// Pixel counts per change class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub decrease: usize,
    pub no_change: usize,
    pub increase: usize,
    pub masked: usize,
}

impl ChangeResult {
    pub fn summary(&self) -> ChangeSummary {
        let mut s = ChangeSummary::default();
        for v in self.classes.data().iter() {
            match *v {
                CHANGE_DECREASE => s.decrease += 1,
                CHANGE_NO_CHANGE => s.no_change += 1,
                CHANGE_INCREASE => s.increase += 1,
                _ => s.masked += 1,
            }
        }
        s
    }
}

/// Compute `after - before` and its change classes.
///
/// Both layers must share a grid. Pixels masked in either layer are
/// [`NODATA`] in the difference and [`CHANGE_NODATA`] in the classes.
pub fn raster_difference(
    before: &Raster<f64>,
    after: &Raster<f64>,
    params: &ChangeParams,
) -> Result<ChangeResult> {
    params.validate()?;
    before.check_same_grid(after)?;
    let (rows, cols) = before.shape();

    let (diff_data, class_data): (Vec<f64>, Vec<u8>) = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut cells = Vec::with_capacity(cols);
            for col in 0..cols {
                let b = unsafe { before.get_unchecked(row, col) };
                let a = unsafe { after.get_unchecked(row, col) };
                if is_masked(a) || is_masked(b) {
                    cells.push((NODATA, CHANGE_NODATA));
                } else {
                    let d = a - b;
                    cells.push((d, params.classify(d)));
                }
            }
            cells
        })
        .unzip();

    let difference = build_output(before, diff_data)?;
    let classes = before.derive(class_data, Some(CHANGE_NODATA))?;
    let result = ChangeResult { difference, classes };

    let s = result.summary();
    info!(
        "change: {} decrease, {} stable, {} increase, {} masked",
        s.decrease, s.no_change, s.increase, s.masked
    );
    Ok(result)
}

/// [`raster_difference`] as an [`Algorithm`] over `(before, after)`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetection;

impl Algorithm for ChangeDetection {
    type Input = (Raster<f64>, Raster<f64>);
    type Output = ChangeResult;
    type Params = ChangeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "change_detection"
    }

    fn description(&self) -> &'static str {
        "Difference between two composites with decrease/stable/increase classes"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        raster_difference(&input.0, &input.1, &params)
    }
}
