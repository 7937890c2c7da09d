//! Training samples and band-value extraction

use std::collections::BTreeMap;

use geo::{Geometry, Point};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::util::is_masked;
use landsight_core::crs::{Projection, CRS};
use landsight_core::raster::Image;
use landsight_core::vector::FeatureCollection;
use landsight_core::{Error, Result};

/// A labeled point in the image CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub x: f64,
    pub y: f64,
    pub label: u8,
}

impl TrainingSample {
    pub fn new(x: f64, y: f64, label: u8) -> Self {
        Self { x, y, label }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.x, self.y)
    }
}

/// Labeled points, usually merged from one set per class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleSet {
    samples: Vec<TrainingSample>,
}

impl SampleSet {
    pub fn new(samples: Vec<TrainingSample>) -> Self {
        Self { samples }
    }

    /// Every point of a class, all with the same label
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>, label: u8) -> Self {
        points
            .into_iter()
            .map(|(x, y)| TrainingSample::new(x, y, label))
            .collect()
    }

    /// Point and MultiPoint features carrying an integer `label_property`.
    ///
    /// Features with other geometries or without a usable label are skipped
    /// with a warning.
    pub fn from_features(features: &FeatureCollection, label_property: &str) -> Self {
        let mut out = Vec::new();
        for (i, feature) in features.iter().enumerate() {
            let label = match feature
                .get_property(label_property)
                .and_then(|v| v.as_u64())
                .and_then(|v| u8::try_from(v).ok())
            {
                Some(l) => l,
                None => {
                    warn!("feature {} has no '{}' label, skipped", i, label_property);
                    continue;
                }
            };
            match &feature.geometry {
                Some(Geometry::Point(p)) => out.push(TrainingSample::new(p.x(), p.y(), label)),
                Some(Geometry::MultiPoint(mp)) => {
                    out.extend(mp.iter().map(|p| TrainingSample::new(p.x(), p.y(), label)))
                }
                _ => warn!("feature {} is not a point, skipped", i),
            }
        }
        Self::new(out)
    }

    /// Every point projected from `from` into `to`
    pub fn to_crs(&self, from: &CRS, to: &CRS) -> Result<SampleSet> {
        let projection = Projection::between(from, to)?;
        if projection.is_identity() {
            return Ok(self.clone());
        }
        Ok(self
            .samples
            .iter()
            .map(|s| {
                let (x, y) = projection.apply(s.x, s.y);
                TrainingSample::new(x, y, s.label)
            })
            .collect())
    }

    /// Concatenate two sets (`FeatureCollection.merge`)
    pub fn merge(mut self, other: SampleSet) -> Self {
        self.samples.extend(other.samples);
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[TrainingSample] {
        &self.samples
    }

    /// Sample count per label
    pub fn class_counts(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.samples {
            *counts.entry(s.label).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<TrainingSample> for SampleSet {
    fn from_iter<I: IntoIterator<Item = TrainingSample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Feature vectors with labels, ready to fit a classifier
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingData {
    band_names: Vec<String>,
    features: Vec<Vec<f64>>,
    labels: Vec<u8>,
}

impl TrainingData {
    /// Build from parallel feature rows and labels
    pub fn new(band_names: Vec<String>, features: Vec<Vec<f64>>, labels: Vec<u8>) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(Error::Training(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if let Some(row) = features.iter().find(|r| r.len() != band_names.len()) {
            return Err(Error::Training(format!(
                "feature row has {} values, expected {} ({:?})",
                row.len(),
                band_names.len(),
                band_names
            )));
        }
        Ok(Self {
            band_names,
            features,
            labels,
        })
    }

    pub fn band_names(&self) -> &[String] {
        &self.band_names
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.band_names.len()
    }

    /// Sample count per label
    pub fn class_counts(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for l in &self.labels {
            *counts.entry(*l).or_insert(0) += 1;
        }
        counts
    }
}

/// Read scaled band values under each sample (`sampleRegions`).
///
/// A sample outside the image grid fails with [`Error::Training`]. Samples
/// landing on a masked pixel in any band are dropped with a warning.
pub fn sample_regions(image: &Image, samples: &SampleSet, bands: &[String]) -> Result<TrainingData> {
    if bands.is_empty() {
        return Err(Error::Training("no input bands selected".into()));
    }
    let layers = bands
        .iter()
        .map(|b| image.scaled_band(b))
        .collect::<Result<Vec<_>>>()?;
    let grid = &layers[0];

    let mut features = Vec::with_capacity(samples.len());
    let mut labels = Vec::with_capacity(samples.len());
    let mut dropped = 0usize;

    for s in samples.samples() {
        let (col, row) = grid.locate(s.x, s.y).ok_or_else(|| {
            Error::Training(format!(
                "sample ({}, {}) with label {} lies outside image '{}'",
                s.x,
                s.y,
                s.label,
                image.id()
            ))
        })?;
        let values = layers
            .iter()
            .map(|l| l.get(row, col))
            .collect::<Result<Vec<_>>>()?;
        if values.iter().any(|v| is_masked(*v)) {
            dropped += 1;
            continue;
        }
        features.push(values);
        labels.push(s.label);
    }

    if dropped > 0 {
        warn!("{} of {} samples fall on masked pixels, dropped", dropped, samples.len());
    }
    info!("sampled {} points over {} bands", labels.len(), bands.len());
    TrainingData::new(bands.to_vec(), features, labels)
}
