//! Imagery catalogs
//!
//! A catalog answers a [`CatalogQuery`] with candidate images. Catalogs may
//! narrow the result server-side, but callers must not rely on it: the
//! image selector applies the bounds, date and quality filters itself.

mod local;

pub use local::{InMemoryCatalog, LocalCatalog, MANIFEST_FILE};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::raster::{DateRange, ImageCollection};
use crate::vector::BBox;

/// What to fetch from a catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogQuery {
    /// Collection identifier, e.g. `LANDSAT/LC08/C02/T1_L2` or `sentinel-2-l2a`
    pub collection: String,
    #[serde(default)]
    pub bbox: Option<BBox>,
    #[serde(default)]
    pub dates: Option<DateRange>,
    /// Upper cloud-cover bound (inclusive) and the property holding it
    #[serde(default)]
    pub max_cloud: Option<(String, f64)>,
    /// Bands to load; empty loads all
    #[serde(default)]
    pub bands: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl CatalogQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    pub fn bbox(mut self, bbox: BBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn dates(mut self, dates: DateRange) -> Self {
        self.dates = Some(dates);
        self
    }

    pub fn max_cloud(mut self, property: impl Into<String>, value: f64) -> Self {
        self.max_cloud = Some((property.into(), value));
        self
    }

    pub fn bands<S: Into<String>>(mut self, bands: impl IntoIterator<Item = S>) -> Self {
        self.bands = bands.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Read-only source of imagery
pub trait ImageCatalog: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Candidate images for a query, in catalog order
    fn search(&self, query: &CatalogQuery) -> Result<ImageCollection>;
}
