//! Supervised land-cover classification
//!
//! The lifecycle is carried by types: a [`Classifier`] holds untrained
//! hyperparameters, [`Classifier::fit`] yields a trained [`Model`], and
//! [`classify`] applies the model over every pixel to produce a
//! [`ClassifiedRaster`].
//!
//! - **Random forest**: bagged CART trees, seedable
//! - **Minimum distance**: nearest class centroid

mod minimum_distance;
mod random_forest;
mod samples;

pub use minimum_distance::{
    signatures_from_training, ClassSignature, MinimumDistance, MinimumDistanceModel,
};
pub use random_forest::{RandomForest, RandomForestModel};
pub use samples::{sample_regions, SampleSet, TrainingData, TrainingSample};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::maybe_rayon::*;
use crate::util::is_masked;
use landsight_core::raster::{Image, Raster, NODATA};
use landsight_core::{Error, Result};

/// Label written where any input band is masked
pub const CLASS_NODATA: u8 = u8::MAX;

/// A trained model mapping one feature vector to a class label
pub trait Model: Send + Sync {
    fn predict(&self, features: &[f64]) -> u8;
}

/// A classifier family that can be fit to training data
pub trait Classifier {
    type Model: Model + 'static;

    fn name(&self) -> &'static str;

    fn fit(&self, data: &TrainingData) -> Result<Self::Model>;
}

/// Classifier choice for recipes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierKind {
    RandomForest(RandomForest),
    MinimumDistance,
}

impl Default for ClassifierKind {
    fn default() -> Self {
        ClassifierKind::RandomForest(RandomForest::default())
    }
}

impl ClassifierKind {
    pub fn name(&self) -> &'static str {
        match self {
            ClassifierKind::RandomForest(c) => c.name(),
            ClassifierKind::MinimumDistance => MinimumDistance.name(),
        }
    }

    fn fit_boxed(&self, data: &TrainingData) -> Result<Box<dyn Model>> {
        Ok(match self {
            ClassifierKind::RandomForest(c) => Box::new(c.fit(data)?),
            ClassifierKind::MinimumDistance => Box::new(MinimumDistance.fit(data)?),
        })
    }
}

/// Everything needed to train a classifier from an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainParams {
    /// Classes are labeled `0..class_count`
    pub class_count: u8,
    /// Input bands, read in physical units
    pub bands: Vec<String>,
    #[serde(default)]
    pub classifier: ClassifierKind,
}

impl TrainParams {
    pub fn new(class_count: u8, bands: Vec<String>) -> Self {
        Self {
            class_count,
            bands,
            classifier: ClassifierKind::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: ClassifierKind) -> Self {
        self.classifier = classifier;
        self
    }
}

/// Check that every class `0..class_count` has samples and nothing else does
pub fn check_class_coverage(data: &TrainingData, class_count: u8) -> Result<()> {
    let counts = data.class_counts();
    if let Some((label, _)) = counts.iter().find(|(l, _)| **l >= class_count) {
        return Err(Error::Training(format!(
            "label {} outside 0..{}",
            label, class_count
        )));
    }
    let empty: Vec<u8> = (0..class_count).filter(|c| !counts.contains_key(c)).collect();
    if !empty.is_empty() {
        return Err(Error::Training(format!("classes {:?} have no training samples", empty)));
    }
    Ok(())
}

/// A model trained on specific bands
pub struct TrainedClassifier {
    model: Box<dyn Model>,
    bands: Vec<String>,
    class_count: u8,
    kind: &'static str,
}

impl std::fmt::Debug for TrainedClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedClassifier")
            .field("kind", &self.kind)
            .field("bands", &self.bands)
            .field("class_count", &self.class_count)
            .finish()
    }
}

impl TrainedClassifier {
    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn class_count(&self) -> u8 {
        self.class_count
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// Apply to every pixel of `image`
    pub fn classify(&self, image: &Image) -> Result<ClassifiedRaster> {
        classify(image, self.model(), &self.bands, self.class_count)
    }
}

/// Sample `image` under `samples` and fit the configured classifier.
///
/// Fails with [`Error::Training`] if a sample lies outside the image or a
/// class in `0..class_count` ends up without samples.
pub fn train(image: &Image, samples: &SampleSet, params: &TrainParams) -> Result<TrainedClassifier> {
    if params.class_count < 2 {
        return Err(Error::InvalidParameter {
            name: "class_count",
            value: params.class_count.to_string(),
            reason: "need at least 2 classes".into(),
        });
    }
    let data = sample_regions(image, samples, &params.bands)?;
    check_class_coverage(&data, params.class_count)?;

    let model = params.classifier.fit_boxed(&data)?;
    info!(
        "trained {} on {} samples, per class {:?}",
        params.classifier.name(),
        data.len(),
        data.class_counts()
    );
    Ok(TrainedClassifier {
        model,
        bands: params.bands.clone(),
        class_count: params.class_count,
        kind: params.classifier.name(),
    })
}

/// Discrete class labels on the source image grid
#[derive(Debug, Clone)]
pub struct ClassifiedRaster {
    raster: Raster<u8>,
    class_count: u8,
}

impl ClassifiedRaster {
    pub fn raster(&self) -> &Raster<u8> {
        &self.raster
    }

    pub fn class_count(&self) -> u8 {
        self.class_count
    }

    /// Pixel count per class, masked pixels excluded
    pub fn histogram(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.class_count as usize];
        for v in self.raster.data().iter() {
            if let Some(c) = counts.get_mut(*v as usize) {
                *c += 1;
            }
        }
        counts
    }

    /// Labels as an `f64` band with [`NODATA`] for masked pixels
    pub fn to_band(&self) -> Raster<f64> {
        let mut out = self.raster.to_f64();
        out.set_nodata(Some(NODATA));
        out
    }
}

/// Predict a label for every pixel (`image.classify`).
///
/// Pixels masked in any input band become [`CLASS_NODATA`]. The output
/// keeps the image grid.
pub fn classify(
    image: &Image,
    model: &dyn Model,
    bands: &[String],
    class_count: u8,
) -> Result<ClassifiedRaster> {
    if bands.is_empty() {
        return Err(Error::Training("no input bands selected".into()));
    }
    let layers = bands
        .iter()
        .map(|b| image.scaled_band(b))
        .collect::<Result<Vec<_>>>()?;
    let template = &layers[0];
    let (rows, cols) = template.shape();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![CLASS_NODATA; cols];
            let mut features = vec![0.0; layers.len()];
            for (col, out) in row_data.iter_mut().enumerate() {
                let mut masked = false;
                for (slot, layer) in features.iter_mut().zip(&layers) {
                    let v = unsafe { layer.get_unchecked(row, col) };
                    if is_masked(v) {
                        masked = true;
                        break;
                    }
                    *slot = v;
                }
                if !masked {
                    *out = model.predict(&features);
                }
            }
            row_data
        })
        .collect();

    let raster = template.derive(data, Some(CLASS_NODATA))?;
    let result = ClassifiedRaster { raster, class_count };
    info!("classified {}: {:?} pixels per class", image.id(), result.histogram());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use landsight_core::GeoTransform;

    /// Three bands, class k occupies rows 2k..2k+2 of a 6x4 grid
    fn striped_image() -> Image {
        let mut img = Image::new("stripes");
        for (b, name) in ["B2", "B3", "B4"].iter().enumerate() {
            let mut r = Raster::filled(6, 4, 0.0);
            r.set_transform(GeoTransform::new(0.0, 6.0, 1.0, -1.0));
            r.set_nodata(Some(NODATA));
            for row in 0..6 {
                for col in 0..4 {
                    let class = (row / 2) as f64;
                    r.set(row, col, class * 0.3 + b as f64 * 0.05 + col as f64 * 0.01).unwrap();
                }
            }
            img = img.with_band(*name, r).unwrap();
        }
        img
    }

    fn samples() -> SampleSet {
        // pixel centres at x = col + 0.5, y = 6 - row - 0.5
        SampleSet::from_points([(0.5, 5.5), (2.5, 4.5)], 0)
            .merge(SampleSet::from_points([(1.5, 3.5), (3.5, 2.5)], 1))
            .merge(SampleSet::from_points([(0.5, 1.5), (2.5, 0.5)], 2))
    }

    fn bands() -> Vec<String> {
        vec!["B2".into(), "B3".into(), "B4".into()]
    }

    #[test]
    fn test_class_coverage_missing() {
        let data = TrainingData::new(vec!["a".into()], vec![vec![1.0], vec![2.0]], vec![0, 2]).unwrap();
        assert!(matches!(check_class_coverage(&data, 3), Err(Error::Training(_))));
        assert!(check_class_coverage(&data, 2).is_err());
    }

    #[test]
    fn test_train_rejects_empty_class() {
        let samples = SampleSet::from_points([(0.5, 5.5)], 0).merge(SampleSet::from_points([(0.5, 1.5)], 2));
        let params = TrainParams::new(3, bands());
        assert!(matches!(train(&striped_image(), &samples, &params), Err(Error::Training(_))));
    }

    #[test]
    fn test_minimum_distance_round_trip() {
        let params = TrainParams::new(3, bands()).with_classifier(ClassifierKind::MinimumDistance);
        let trained = train(&striped_image(), &samples(), &params).unwrap();
        let out = trained.classify(&striped_image()).unwrap();
        assert_eq!(out.raster().get(0, 3).unwrap(), 0);
        assert_eq!(out.raster().get(3, 0).unwrap(), 1);
        assert_eq!(out.raster().get(5, 2).unwrap(), 2);
        assert_eq!(out.histogram(), vec![8, 8, 8]);
    }

    #[test]
    fn test_masked_pixels_stay_masked() {
        let img = striped_image();
        let mut b2 = img.band("B2").unwrap().clone();
        b2.set(0, 0, NODATA).unwrap();
        let img = img.select(&["B3", "B4"]).unwrap().with_band("B2", b2).unwrap();

        let params = TrainParams::new(3, bands()).with_classifier(ClassifierKind::MinimumDistance);
        let trained = train(&img, &samples(), &params).unwrap();
        let out = trained.classify(&img).unwrap();
        assert_eq!(out.raster().get(0, 0).unwrap(), CLASS_NODATA);
        assert_eq!(out.to_band().get(0, 0).unwrap(), NODATA);
    }

    #[test]
    fn test_kind_from_json() {
        let kind: ClassifierKind =
            serde_json::from_str(r#"{"kind": "random_forest", "trees": 10, "seed": 3}"#).unwrap();
        assert_eq!(
            kind,
            ClassifierKind::RandomForest(RandomForest::default().with_trees(10).with_seed(3))
        );
    }
}
