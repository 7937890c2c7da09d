//! Recipe configuration
//!
//! A recipe is one TOML file describing a whole run: which region, which
//! catalog and collection, one or more named time windows, the indices to
//! compute and what to do with the result. Relative paths resolve against
//! the recipe's directory.
//!
//! ```toml
//! name = "kasese_ndbi"
//!
//! [region]
//! schema = "gaul"
//! boundaries = "data/uganda_districts.geojson"
//! country = "Uganda"
//! names = ["Kasese"]
//!
//! [catalog]
//! kind = "local"
//! path = "data/catalog"
//!
//! [selection]
//! collection = "LANDSAT/LC08/C02/T1_L2"
//! cloud_property = "CLOUD_COVER"
//! max_cloud = 30.0
//! reducer = "median"
//!
//! [[windows]]
//! name = "2023"
//! start = "2023-01-01"
//! end = "2024-01-01"
//!
//! [[indices]]
//! name = "NDBI"
//! kind = "normalized_difference"
//! a = "SR_B6"
//! b = "SR_B5"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use landsight_algorithms::classification::TrainParams;
use landsight_algorithms::composite::Reducer;
use landsight_algorithms::imagery::{ChangeParams, IndexSpec};
use landsight_cloud::{StacCatalogOptions, StacEndpoint, StacImageCatalog};
use landsight_colormap::{ColorScheme, Palette, VisParams};
use landsight_core::catalog::{ImageCatalog, LocalCatalog};
use landsight_core::export::{ExportRequest, DEFAULT_MAX_PIXELS};
use landsight_core::raster::DateRange;
use landsight_core::vector::{AdminLevel, BoundaryDataset, BoundaryQuery, BoundarySchema, Region};
use landsight_core::{Error, Result};

use crate::deadline::StageTimeouts;
use crate::selection::SelectionParams;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Which boundary dataset and which units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    /// `gaul`, `ghs` or `geoboundaries`
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub level: AdminLevel,
    /// GeoJSON FeatureCollection of boundaries
    pub boundaries: PathBuf,
    pub country: String,
    pub names: Vec<String>,
}

fn default_schema() -> String {
    "gaul".into()
}

impl RegionConfig {
    pub fn schema(&self) -> Result<BoundarySchema> {
        BoundarySchema::from_label(&self.schema, self.level)
    }

    pub fn query(&self) -> BoundaryQuery {
        BoundaryQuery::new(self.country.clone(), self.names.iter().cloned())
    }
}

/// Where imagery comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogConfig {
    /// Directory with a `catalog.json` manifest
    Local { path: PathBuf },
    /// STAC API; `endpoint` is `pc`, `es` or a URL
    Stac {
        endpoint: String,
        #[serde(default)]
        max_items: Option<usize>,
    },
}

/// Catalog query and reduction shared by every window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionConfig {
    pub collection: String,
    /// Metadata property holding cloud cover, e.g. `CLOUD_COVER`
    #[serde(default)]
    pub cloud_property: Option<String>,
    /// Inclusive upper bound on `cloud_property`
    #[serde(default)]
    pub max_cloud: Option<f64>,
    #[serde(default)]
    pub reducer: Reducer,
    /// Bands to load; empty loads all
    #[serde(default)]
    pub bands: Vec<String>,
}

/// A named, independent time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    pub name: String,
    /// First day, inclusive (`YYYY-MM-DD`)
    pub start: String,
    /// Last bound, exclusive (`YYYY-MM-DD`)
    pub end: String,
}

impl WindowConfig {
    pub fn dates(&self) -> Result<DateRange> {
        DateRange::parse(&self.start, &self.end)
    }
}

/// Supervised classification of each window's composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyConfig {
    #[serde(flatten)]
    pub params: TrainParams,
    /// GeoJSON points carrying an integer label
    pub samples: PathBuf,
    #[serde(default = "default_label_property")]
    pub label_property: String,
    /// Band name the labels are appended under
    #[serde(default = "default_class_band")]
    pub output_band: String,
}

fn default_label_property() -> String {
    "landcover".into()
}

fn default_class_band() -> String {
    "classification".into()
}

/// GeoTIFF export of each window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    /// File prefix; the window name is appended
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    /// Output pixel size in CRS units
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
    /// Bands to write; empty writes the computed layers only
    #[serde(default)]
    pub bands: Vec<String>,
}

fn default_max_pixels() -> u64 {
    DEFAULT_MAX_PIXELS
}

/// RGBA preview of one or three bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreviewConfig {
    pub bands: Vec<String>,
    pub min: f64,
    pub max: f64,
    /// CSS names or hex colors
    #[serde(default)]
    pub palette: Option<Palette>,
    /// Named scheme, used when `palette` is absent
    #[serde(default)]
    pub scheme: Option<ColorScheme>,
}

impl PreviewConfig {
    pub fn vis_params(&self) -> VisParams {
        let vis = VisParams::new(self.min, self.max).with_bands(self.bands.iter().cloned());
        match (&self.palette, self.scheme) {
            (Some(p), _) => vis.with_palette(p.clone()),
            (None, Some(s)) => vis.with_scheme(s),
            (None, None) => vis,
        }
    }
}

/// Regional mean of one band for every image of a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeriesConfig {
    pub band: String,
}

/// Difference of one band between two windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeConfig {
    pub band: String,
    pub before: String,
    pub after: String,
    #[serde(default)]
    pub thresholds: ChangeParams,
}

// ---------------------------------------------------------------------------
// Recipe
// ---------------------------------------------------------------------------

/// One pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    pub name: String,
    pub region: RegionConfig,
    pub catalog: CatalogConfig,
    pub selection: SelectionConfig,
    pub windows: Vec<WindowConfig>,
    #[serde(default)]
    pub indices: Vec<IndexSpec>,
    /// Mask pixels outside the region
    #[serde(default = "default_clip")]
    pub clip: bool,
    #[serde(default)]
    pub classify: Option<ClassifyConfig>,
    #[serde(default)]
    pub export: Option<ExportConfig>,
    #[serde(default)]
    pub preview: Option<PreviewConfig>,
    #[serde(default)]
    pub series: Option<SeriesConfig>,
    #[serde(default)]
    pub change: Option<ChangeConfig>,
    #[serde(default)]
    pub timeouts: StageTimeouts,
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_clip() -> bool {
    true
}

impl Recipe {
    /// Parse a recipe; relative paths resolve against `base_dir`
    pub fn from_toml(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut recipe: Recipe =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid recipe: {}", e)))?;
        recipe.base_dir = base_dir.into();
        Ok(recipe)
    }

    /// Read and parse a recipe file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_toml(&text, base).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn window(&self, name: &str) -> Option<&WindowConfig> {
        self.windows.iter().find(|w| w.name == name)
    }

    /// Check names, dates, thresholds and cross references before any work
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(config("name must not be empty"));
        }
        if self.region.names.is_empty() {
            return Err(config("region.names must list at least one unit"));
        }
        self.region.schema()?;

        let sel = &self.selection;
        if sel.collection.trim().is_empty() {
            return Err(config("selection.collection must not be empty"));
        }
        match (&sel.cloud_property, sel.max_cloud) {
            (Some(_), Some(t)) if !(0.0..=100.0).contains(&t) => {
                return Err(config(format!("selection.max_cloud {} is outside 0..=100", t)));
            }
            (None, Some(_)) => {
                return Err(config("selection.max_cloud needs selection.cloud_property"));
            }
            _ => {}
        }

        if self.windows.is_empty() {
            return Err(config("at least one [[windows]] entry is required"));
        }
        let mut names = BTreeSet::new();
        for w in &self.windows {
            if !names.insert(w.name.as_str()) {
                return Err(config(format!("window '{}' is defined twice", w.name)));
            }
            w.dates()?;
        }

        let mut index_names = BTreeSet::new();
        for spec in &self.indices {
            spec.validate()?;
            if !index_names.insert(spec.name.as_str()) {
                return Err(config(format!("index '{}' is defined twice", spec.name)));
            }
        }

        if let Some(c) = &self.classify {
            if c.params.class_count < 2 {
                return Err(config("classify.class_count must be at least 2"));
            }
            if c.params.bands.is_empty() {
                return Err(config("classify.bands must not be empty"));
            }
        }
        if let Some(e) = &self.export {
            // prefix/folder/scale checks shared with the exporter
            self.export_request(e, &self.windows[0].name, None).validate()?;
        }
        if let Some(p) = &self.preview {
            p.vis_params().validate()?;
        }
        if let Some(c) = &self.change {
            for w in [&c.before, &c.after] {
                if self.window(w).is_none() {
                    return Err(config(format!("change refers to unknown window '{}'", w)));
                }
            }
            if c.before == c.after {
                return Err(config("change.before and change.after must differ"));
            }
            c.thresholds.validate()?;
        }
        Ok(())
    }

    // ── Stage parameters ────────────────────────────────────────────

    pub fn selection_params(&self, window: &WindowConfig) -> Result<SelectionParams> {
        let cloud = match (&self.selection.cloud_property, self.selection.max_cloud) {
            (Some(p), Some(t)) => Some((p.clone(), t)),
            _ => None,
        };
        Ok(SelectionParams {
            collection: self.selection.collection.clone(),
            dates: window.dates()?,
            cloud,
            reducer: self.selection.reducer,
            bands: self.selection.bands.clone(),
        })
    }

    /// Export request for one window; the extent defaults to the region bbox
    pub fn export_request(&self, export: &ExportConfig, window: &str, region: Option<&Region>) -> ExportRequest {
        let prefix = export.prefix.as_deref().unwrap_or(&self.name);
        let mut req = ExportRequest::new(format!("{}_{}", prefix, window)).max_pixels(export.max_pixels);
        if let Some(folder) = &export.folder {
            req = req.folder(folder.clone());
        }
        if let Some(scale) = export.scale {
            req = req.scale(scale);
        }
        if let Some(region) = region {
            req = req.region(region.bbox());
        }
        req
    }

    // ── Collaborators ───────────────────────────────────────────────

    pub fn open_boundaries(&self) -> Result<BoundaryDataset> {
        BoundaryDataset::from_geojson(self.resolve_path(&self.region.boundaries), self.region.schema()?)
    }

    pub fn open_catalog(&self) -> Result<Arc<dyn ImageCatalog>> {
        Ok(match &self.catalog {
            CatalogConfig::Local { path } => Arc::new(LocalCatalog::open(self.resolve_path(path))?),
            CatalogConfig::Stac { endpoint, max_items } => {
                let mut options = StacCatalogOptions {
                    timeout: self.timeouts.selection,
                    ..Default::default()
                };
                if let Some(n) = max_items {
                    options.client.max_items = *n;
                }
                Arc::new(StacImageCatalog::new(StacEndpoint::from_str_or_url(endpoint), options)?)
            }
        })
    }
}

fn config(msg: impl Into<String>) -> Error {
    Error::Config(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use landsight_algorithms::classification::ClassifierKind;
    use landsight_algorithms::imagery::IndexFormula;
    use std::time::Duration;

    const RECIPE: &str = r##"
name = "kampala_landcover"

[region]
boundaries = "boundaries.geojson"
country = "Uganda"
names = ["Kampala", "Wakiso"]

[catalog]
kind = "local"
path = "catalog"

[selection]
collection = "COPERNICUS/S2_SR_HARMONIZED"
cloud_property = "CLOUDY_PIXEL_PERCENTAGE"
max_cloud = 20.0
reducer = "median"

[[windows]]
name = "2015"
start = "2015-01-01"
end = "2016-01-01"

[[windows]]
name = "2025"
start = "2025-01-01"
end = "2026-01-01"

[[indices]]
name = "NDVI"
kind = "normalized_difference"
a = "B8"
b = "B4"

[[indices]]
name = "EVI2"
kind = "expression"
formula = "2.5 * (B8 - B4) / (B8 + 2.4 * B4 + 1)"

[classify]
class_count = 4
bands = ["B2", "B3", "B4", "B8", "NDVI"]
samples = "samples.geojson"
classifier = { kind = "random_forest", trees = 50, seed = 7 }

[export]
folder = "landsight"
scale = 10.0

[preview]
bands = ["classification"]
min = 0
max = 3
palette = ["#cc6d8f", "#ffc107", "#1e88e5", "#004d40"]

[change]
band = "NDVI"
before = "2015"
after = "2025"

[timeouts]
selection_secs = 60
"##;

    fn recipe() -> Recipe {
        Recipe::from_toml(RECIPE, "/data/recipes").unwrap()
    }

    #[test]
    fn parses_full_recipe() {
        let r = recipe();
        assert_eq!(r.region.query().names, vec!["Kampala", "Wakiso"]);
        assert_eq!(r.windows.len(), 2);
        assert_eq!(r.indices[0].formula, IndexFormula::normalized_difference("B8", "B4"));
        let classify = r.classify.as_ref().unwrap();
        assert_eq!(classify.label_property, "landcover");
        assert!(matches!(
            &classify.params.classifier,
            ClassifierKind::RandomForest(rf) if rf.seed == Some(7)
        ));
        assert_eq!(r.timeouts.selection, Duration::from_secs(60));
        assert_eq!(r.timeouts.export, StageTimeouts::default().export);
        assert!(r.clip);
        r.validate().unwrap();
    }

    #[test]
    fn relative_paths_resolve_against_recipe_dir() {
        let r = recipe();
        assert_eq!(
            r.resolve_path(&r.region.boundaries),
            PathBuf::from("/data/recipes/boundaries.geojson")
        );
        assert_eq!(r.resolve_path(Path::new("/abs/x.tif")), PathBuf::from("/abs/x.tif"));
    }

    #[test]
    fn windows_get_independent_params() {
        let r = recipe();
        let a = r.selection_params(&r.windows[0]).unwrap();
        let b = r.selection_params(&r.windows[1]).unwrap();
        assert_ne!(a.dates, b.dates);
        assert_eq!(a.cloud, Some(("CLOUDY_PIXEL_PERCENTAGE".to_string(), 20.0)));

        let export = r.export.as_ref().unwrap();
        assert_eq!(r.export_request(export, "2015", None).prefix, "kampala_landcover_2015");
        assert_eq!(r.export_request(export, "2025", None).prefix, "kampala_landcover_2025");
    }

    #[test]
    fn rejects_bad_cloud_threshold() {
        let mut r = recipe();
        r.selection.max_cloud = Some(130.0);
        assert!(matches!(r.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_duplicate_windows_and_unknown_change_window() {
        let mut r = recipe();
        r.windows[1].name = "2015".into();
        assert!(r.validate().is_err());

        let mut r = recipe();
        if let Some(c) = r.change.as_mut() {
            c.after = "2030".into();
        }
        assert!(r.validate().is_err());
    }

    #[test]
    fn rejects_inverted_dates() {
        let mut r = recipe();
        r.windows[0].end = "2014-01-01".into();
        assert!(r.validate().is_err());
    }

    #[test]
    fn unknown_keys_are_errors() {
        let text = RECIPE.replace("reducer = \"median\"", "reducer = \"median\"\nmax_clouds = 3");
        assert!(matches!(Recipe::from_toml(&text, "."), Err(Error::Config(_))));
    }
}
