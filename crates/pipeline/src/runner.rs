//! The linear pipeline
//!
//! Region → selection → clip → indices → classification → export/preview,
//! once per named window, then an optional change layer between two
//! windows. A failing stage aborts the recipe; nothing partial is reported
//! as a success.
//!
//! The region and training points are resolved in lon/lat and projected into
//! each composite's CRS before clipping, sampling and export. Rasters are
//! never reprojected.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use landsight_algorithms::classification::{train, SampleSet};
use landsight_algorithms::imagery::{add_index, clip_image, raster_difference, ChangeSummary};
use landsight_algorithms::statistics::{region_statistics, time_series, TimeSeries, ZonalResult};
use landsight_colormap::render_image;
use landsight_core::catalog::ImageCatalog;
use landsight_core::export::{ExportReceipt, ExportRequest, Exporter};
use landsight_core::raster::{DateRange, Image};
use landsight_core::vector::{geojson, BoundarySource, Region};
use landsight_core::{BBox, Error, Result, CRS};

use crate::deadline::{run_with_deadline, StageTimeouts};
use crate::recipe::{ClassifyConfig, Recipe, WindowConfig};
use crate::selection::{select, Selection, SelectionParams};

/// Band names written for a change layer
pub const CHANGE_DIFFERENCE_BAND: &str = "difference";
pub const CHANGE_CLASS_BAND: &str = "change_class";

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Summary of one computed layer inside the region
#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub valid_pixels: usize,
    pub stats: Option<ZonalResult>,
}

/// What happened in one window
#[derive(Debug, Clone, Serialize)]
pub struct WindowReport {
    pub window: String,
    pub dates: DateRange,
    pub images_found: usize,
    pub images_used: usize,
    pub composite: String,
    pub bands: Vec<String>,
    pub layers: Vec<LayerSummary>,
    /// Pixel count per class when classification ran
    pub class_histogram: Option<Vec<usize>>,
    pub exports: Vec<ExportReceipt>,
    pub preview: Option<PathBuf>,
    pub series: Option<TimeSeries>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeReport {
    pub band: String,
    pub before: String,
    pub after: String,
    pub summary: ChangeSummary,
    pub export: Option<ExportReceipt>,
}

/// Result of a whole recipe
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub recipe: String,
    pub region: String,
    pub region_bbox: BBox,
    pub windows: Vec<WindowReport>,
    pub change: Option<ChangeReport>,
}

impl RunReport {
    pub fn window(&self, name: &str) -> Option<&WindowReport> {
        self.windows.iter().find(|w| w.window == name)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Other(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The collaborators one recipe runs against
pub struct Pipeline {
    boundaries: Arc<dyn BoundarySource>,
    catalog: Arc<dyn ImageCatalog>,
    exporter: Option<Arc<dyn Exporter>>,
    output_dir: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(boundaries: Arc<dyn BoundarySource>, catalog: Arc<dyn ImageCatalog>) -> Self {
        Self {
            boundaries,
            catalog,
            exporter: None,
            output_dir: None,
        }
    }

    /// Open the boundary dataset and catalog a recipe names
    pub fn for_recipe(recipe: &Recipe) -> Result<Self> {
        let boundaries = Arc::new(recipe.open_boundaries()?);
        Ok(Self::new(boundaries, recipe.open_catalog()?))
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn Exporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Directory for previews and time-series JSON
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Run every stage of `recipe`
    pub fn run(&self, recipe: &Recipe) -> Result<RunReport> {
        recipe.validate()?;
        let region = self.boundaries.resolve(&recipe.region.query())?;

        let samples = match &recipe.classify {
            Some(c) => Some(load_samples(recipe, c)?),
            None => None,
        };

        // only windows a change layer needs are kept past their own stage
        let keep: Vec<&str> = recipe
            .change
            .as_ref()
            .map(|c| vec![c.before.as_str(), c.after.as_str()])
            .unwrap_or_default();

        let mut windows = Vec::with_capacity(recipe.windows.len());
        let mut kept: BTreeMap<String, Image> = BTreeMap::new();
        for window in &recipe.windows {
            let (report, image) = self.run_window(recipe, window, &region, samples.as_ref())?;
            windows.push(report);
            if keep.contains(&window.name.as_str()) {
                kept.insert(window.name.clone(), image);
            }
        }

        let change = match &recipe.change {
            Some(_) => Some(self.run_change(recipe, &region, &kept)?),
            None => None,
        };

        info!("recipe {} finished: {} window(s)", recipe.name, windows.len());
        Ok(RunReport {
            recipe: recipe.name.clone(),
            region: region.name().to_string(),
            region_bbox: region.bbox(),
            windows,
            change,
        })
    }

    fn run_window(
        &self,
        recipe: &Recipe,
        window: &WindowConfig,
        region: &Region,
        samples: Option<&SampleSet>,
    ) -> Result<(WindowReport, Image)> {
        let params = recipe.selection_params(window)?;
        let selection = self.select(&params, region, recipe.timeouts)?;

        let mut image = selection.composite.with_id(format!("{}_{}", recipe.name, window.name));
        let local = local_region(region, &image)?;
        if recipe.clip {
            image = clip_image(&image, &local)?;
        }

        let mut layers = Vec::new();
        for spec in &recipe.indices {
            image = add_index(&image, spec)?;
            layers.push(summarize(&image, &spec.name, &local)?);
        }

        let mut class_histogram = None;
        if let (Some(config), Some(samples)) = (&recipe.classify, samples) {
            let samples = match image.crs() {
                Some(crs) => samples.to_crs(&CRS::wgs84(), crs)?,
                None => samples.clone(),
            };
            let trained = train(&image, &samples, &config.params)?;
            let classified = trained.classify(&image)?;
            class_histogram = Some(classified.histogram());
            image = image.with_band(config.output_band.clone(), classified.to_band())?;
        }

        let mut exports = Vec::new();
        if let Some(export) = &recipe.export {
            let mut computed: Vec<&str> = recipe.indices.iter().map(|s| s.name.as_str()).collect();
            if let Some(c) = &recipe.classify {
                computed.push(c.output_band.as_str());
            }
            let bands: Vec<&str> = if !export.bands.is_empty() {
                export.bands.iter().map(String::as_str).collect()
            } else if !computed.is_empty() {
                computed
            } else {
                image.band_names()
            };
            let request = recipe.export_request(export, &window.name, Some(&local));
            exports.push(self.export(image.select(&bands)?, request, recipe.timeouts)?);
        }

        let preview = match (&recipe.preview, &self.output_dir) {
            (Some(p), Some(dir)) => {
                let rgba = render_image(&image, &p.vis_params())?;
                let path = dir.join(format!("{}_{}_preview.tif", recipe.name, window.name));
                ensure_dir(dir)?;
                rgba.write_tiff(&path)?;
                Some(path)
            }
            (Some(_), None) => {
                warn!("preview requested but no output directory set, skipped");
                None
            }
            _ => None,
        };

        let series = match &recipe.series {
            Some(s) => {
                let series = time_series(&selection.collection, &s.band, region)?;
                if let Some(dir) = &self.output_dir {
                    ensure_dir(dir)?;
                    let path = dir.join(format!("{}_{}_series.json", recipe.name, window.name));
                    std::fs::write(&path, series.to_json()?)?;
                }
                Some(series)
            }
            None => None,
        };

        let report = WindowReport {
            window: window.name.clone(),
            dates: params.dates,
            images_found: selection.found,
            images_used: selection.collection.len(),
            composite: image.id().to_string(),
            bands: image.band_names().iter().map(|s| s.to_string()).collect(),
            layers,
            class_histogram,
            exports,
            preview,
            series,
        };
        Ok((report, image))
    }

    fn select(&self, params: &SelectionParams, region: &Region, timeouts: StageTimeouts) -> Result<Selection> {
        let catalog = Arc::clone(&self.catalog);
        let region = region.clone();
        let params = params.clone();
        run_with_deadline("selection", timeouts.selection, move || {
            select(catalog.as_ref(), &region, &params)
        })
    }

    fn export(&self, image: Image, request: ExportRequest, timeouts: StageTimeouts) -> Result<ExportReceipt> {
        let Some(exporter) = self.exporter.as_ref().map(Arc::clone) else {
            return Err(Error::Config(format!(
                "recipe exports '{}' but the pipeline has no exporter",
                request.prefix
            )));
        };
        // a worker still running past the deadline must not publish its file
        let request = match Instant::now().checked_add(timeouts.export) {
            Some(deadline) => request.deadline(deadline),
            None => request,
        };
        run_with_deadline("export", timeouts.export, move || exporter.export(&image, &request))
    }

    fn run_change(&self, recipe: &Recipe, region: &Region, kept: &BTreeMap<String, Image>) -> Result<ChangeReport> {
        let Some(change) = &recipe.change else {
            return Err(Error::Config("no change section".into()));
        };
        let window_image = |name: &str| {
            kept.get(name)
                .ok_or_else(|| Error::Config(format!("window '{}' produced no image", name)))
        };
        let before = window_image(&change.before)?.scaled_band(&change.band)?;
        let after = window_image(&change.after)?.scaled_band(&change.band)?;

        let result = raster_difference(&before, &after, &change.thresholds)?;
        let summary = result.summary();
        info!(
            "{} change {} -> {}: {:?}",
            change.band, change.before, change.after, summary
        );

        let export = match &recipe.export {
            Some(e) => {
                let image = Image::new(format!("{}_change", recipe.name))
                    .with_band(CHANGE_DIFFERENCE_BAND, result.difference.clone())?
                    .with_band(CHANGE_CLASS_BAND, result.classes.to_f64())?;
                let name = format!("change_{}_{}", change.before, change.after);
                let local = region.to_crs_of(before.crs())?;
                let request = recipe.export_request(e, &name, Some(&local));
                Some(self.export(image, request, recipe.timeouts)?)
            }
            None => None,
        };

        Ok(ChangeReport {
            band: change.band.clone(),
            before: change.before.clone(),
            after: change.after.clone(),
            summary,
            export,
        })
    }
}

/// The region in the composite's CRS
fn local_region(region: &Region, image: &Image) -> Result<Region> {
    let local = region.to_crs_of(image.crs())?;
    if !region.crs().is_equivalent(local.crs()) {
        debug!(
            "region {} projected to {}: {:?}",
            region.name(),
            local.crs(),
            local.bbox().to_array()
        );
    }
    Ok(local)
}

fn summarize(image: &Image, band: &str, region: &Region) -> Result<LayerSummary> {
    let layer = image.band(band)?;
    Ok(LayerSummary {
        name: band.to_string(),
        valid_pixels: layer.valid_count(),
        stats: region_statistics(layer, region)?,
    })
}

fn load_samples(recipe: &Recipe, config: &ClassifyConfig) -> Result<SampleSet> {
    let path = recipe.resolve_path(&config.samples);
    let features = geojson::read_feature_collection(&path)?;
    let samples = SampleSet::from_features(&features, &config.label_property);
    if samples.is_empty() {
        return Err(Error::Training(format!(
            "{} holds no point with a '{}' label",
            path.display(),
            config.label_property
        )));
    }
    info!("loaded {} training samples, per class {:?}", samples.len(), samples.class_counts());
    Ok(samples)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}
