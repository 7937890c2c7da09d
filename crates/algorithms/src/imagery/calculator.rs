//! Index calculator
//!
//! Turns a composite image and an [`IndexSpec`] into a single-band index
//! layer named by the caller. Source bands are always converted to physical
//! units with their scale factors before any arithmetic.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::imagery::expression::Expression;
use crate::imagery::indices::{normalized_difference, Sensor, SpectralIndex};
use crate::maybe_rayon::*;
use crate::util::{build_output, is_masked};
use landsight_core::raster::{Image, Raster, NODATA};
use landsight_core::{Error, Result};

/// How an index is computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexFormula {
    /// `(a - b) / (a + b)` over two named bands
    NormalizedDifference { a: String, b: String },
    /// Named preset resolved through a sensor's band names
    Preset { index: SpectralIndex, sensor: Sensor },
    /// Free band arithmetic
    Expression { formula: String },
}

impl IndexFormula {
    pub fn normalized_difference(a: impl Into<String>, b: impl Into<String>) -> Self {
        IndexFormula::NormalizedDifference {
            a: a.into(),
            b: b.into(),
        }
    }

    pub fn expression(formula: impl Into<String>) -> Self {
        IndexFormula::Expression {
            formula: formula.into(),
        }
    }

    /// Band names the formula reads
    pub fn required_bands(&self) -> Result<Vec<String>> {
        Ok(match self {
            IndexFormula::NormalizedDifference { a, b } => vec![a.clone(), b.clone()],
            IndexFormula::Preset { index, sensor } => index
                .roles()
                .iter()
                .map(|r| sensor.band(*r).to_string())
                .collect(),
            IndexFormula::Expression { formula } => Expression::parse(formula)?.bands().to_vec(),
        })
    }

    /// Documented output range, when the formula guarantees one
    pub fn value_range(&self) -> Option<(f64, f64)> {
        match self {
            IndexFormula::NormalizedDifference { .. } => Some((-1.0, 1.0)),
            IndexFormula::Preset { index, .. } => index.value_range(),
            IndexFormula::Expression { .. } => None,
        }
    }
}

/// An index layer to compute and the name it gets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Output band name, e.g. `NDBI`
    pub name: String,
    #[serde(flatten)]
    pub formula: IndexFormula,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, formula: IndexFormula) -> Self {
        Self {
            name: name.into(),
            formula,
        }
    }

    /// Preset named after the index itself
    pub fn preset(index: SpectralIndex, sensor: Sensor) -> Self {
        Self::new(index.name(), IndexFormula::Preset { index, sensor })
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidParameter {
                name: "index.name",
                value: self.name.clone(),
                reason: "must not be empty".into(),
            });
        }
        self.formula.required_bands().map(|_| ())
    }
}

/// Compute an index layer from an image.
///
/// Missing bands fail with [`Error::MissingBand`]. Division by zero and
/// non-finite results are masked to [`NODATA`].
pub fn compute_index(image: &Image, spec: &IndexSpec) -> Result<Raster<f64>> {
    let layer = match &spec.formula {
        IndexFormula::NormalizedDifference { a, b } => {
            let a = image.scaled_band(a)?;
            let b = image.scaled_band(b)?;
            normalized_difference(&a, &b)?
        }
        IndexFormula::Preset { index, sensor } => index.compute(image, *sensor)?,
        IndexFormula::Expression { formula } => {
            let expr = Expression::parse(formula)?;
            evaluate_expression(image, &expr)?
        }
    };

    info!(
        "computed {} on {}: {} valid of {} pixels",
        spec.name,
        image.id(),
        layer.valid_count(),
        layer.len()
    );
    Ok(layer)
}

/// Compute an index and return a new image with it appended under `spec.name`
pub fn add_index(image: &Image, spec: &IndexSpec) -> Result<Image> {
    let layer = compute_index(image, spec)?;
    image.with_band(spec.name.clone(), layer)
}

/// Evaluate a parsed expression over scaled image bands
pub fn evaluate_expression(image: &Image, expr: &Expression) -> Result<Raster<f64>> {
    let bands = expr
        .bands()
        .iter()
        .map(|name| image.scaled_band(name))
        .collect::<Result<Vec<_>>>()?;

    let template = match bands.first() {
        Some(b) => b,
        None => {
            // constant formula: still needs a grid to live on
            image.grid().ok_or_else(|| {
                Error::Formula(format!("'{}' references no band and image is empty", expr))
            })?
        }
    };
    let (rows, cols) = template.shape();
    debug!("evaluating '{}' over {}x{} pixels", expr, cols, rows);

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![NODATA; cols];
            let mut values = vec![0.0; bands.len()];
            for (col, out) in row_data.iter_mut().enumerate() {
                let mut masked = false;
                for (slot, band) in values.iter_mut().zip(&bands) {
                    let v = unsafe { band.get_unchecked(row, col) };
                    if is_masked(v) {
                        masked = true;
                        break;
                    }
                    *slot = v;
                }
                if masked {
                    continue;
                }
                if let Some(v) = expr.evaluate(&values) {
                    *out = v;
                }
            }
            row_data
        })
        .collect();

    build_output(template, data)
}
