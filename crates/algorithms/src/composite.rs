//! Temporal compositing
//!
//! Reduces a filtered [`ImageCollection`] to one representative [`Image`].
//! Pixel-wise reducers skip masked values, so a cloud hole in one scene is
//! filled from the others.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::maybe_rayon::*;
use crate::util::{build_output, is_masked};
use landsight_core::crs::same_crs;
use landsight_core::raster::{Image, ImageCollection, Raster, TargetGrid, NODATA};
use landsight_core::vector::Region;
use landsight_core::{Algorithm, BBox, Error, Result};

/// How a collection is reduced to one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// Per-pixel median over unmasked values
    #[default]
    Median,
    /// Per-pixel mean over unmasked values
    Mean,
    /// The first image in collection order
    FirstMatch,
}

impl Reducer {
    pub fn name(self) -> &'static str {
        match self {
            Reducer::Median => "median",
            Reducer::Mean => "mean",
            Reducer::FirstMatch => "first_match",
        }
    }
}

impl std::fmt::Display for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Property recording how many images went into a composite
pub const IMAGE_COUNT_PROPERTY: &str = "image_count";
/// Property recording the reducer used
pub const REDUCER_PROPERTY: &str = "reducer";

/// Reduce a collection to a single composite image.
///
/// Fails with [`Error::EmptyCollection`] when the collection is empty. For
/// pixel-wise reducers every image must carry the first image's bands on
/// the same grid; band scale factors are taken from the first image.
pub fn reduce(collection: &ImageCollection, reducer: Reducer) -> Result<Image> {
    let first = collection.first().ok_or_else(|| Error::EmptyCollection {
        context: format!("{} reducer needs at least one image", reducer),
    })?;

    let out = match reducer {
        Reducer::FirstMatch => first.clone(),
        Reducer::Median | Reducer::Mean => pixel_composite(collection, first, reducer)?,
    };

    info!(
        "composite: {} of {} images -> {} bands",
        reducer,
        collection.len(),
        out.band_count()
    );
    Ok(out
        .with_property(IMAGE_COUNT_PROPERTY, collection.len() as f64)
        .with_property(REDUCER_PROPERTY, reducer.name()))
}

/// Largest grid a mosaic over a region may use
pub const MAX_MOSAIC_PIXELS: u64 = 1_000_000_000;

/// [`reduce`] over scenes whose grids may differ (`mosaic().median()`).
///
/// When every image already shares the first image's grid this is plain
/// [`reduce`]. Otherwise pixel-wise reducers run on the first image's pixel
/// lattice, cropped to the region's bbox in that CRS, and each scene is
/// resampled onto it by nearest neighbour. [`Reducer::FirstMatch`] never
/// resamples.
pub fn reduce_over(collection: &ImageCollection, reducer: Reducer, region: &Region) -> Result<Image> {
    if reducer == Reducer::FirstMatch {
        return reduce(collection, reducer);
    }
    match mosaic_grid(collection, region)? {
        Some(target) => reduce(&align_to_grid(collection, &target)?, reducer),
        None => reduce(collection, reducer),
    }
}

/// The grid to mosaic on, or `None` when the scenes already share one
pub fn mosaic_grid(collection: &ImageCollection, region: &Region) -> Result<Option<TargetGrid>> {
    let Some(template) = collection.first().and_then(Image::grid) else {
        return Ok(None);
    };
    let shared = collection
        .iter()
        .all(|img| img.grid().map_or(true, |g| g.same_grid(template)));
    if shared {
        return Ok(None);
    }
    let local = region.to_crs_of(template.crs())?;
    let target = TargetGrid::snapped(template, &local.bbox(), MAX_MOSAIC_PIXELS)?;
    debug!(
        "mosaic grid {}x{} at {} over {}",
        target.cols,
        target.rows,
        template.cell_size(),
        region.name()
    );
    Ok(Some(target))
}

/// Resample every image onto `target`.
///
/// Rasters are never reprojected: images in a CRS other than the target's
/// are left out with a warning.
pub fn align_to_grid(collection: &ImageCollection, target: &TargetGrid) -> Result<ImageCollection> {
    let mut out = ImageCollection::default();
    for image in collection.iter() {
        if !same_crs(image.crs(), target.crs.as_ref()) {
            warn!(
                "{} is in {}, not the mosaic CRS, left out",
                image.id(),
                image.crs().map(|c| c.identifier()).unwrap_or_default()
            );
            continue;
        }
        out.push(image.resample_to(target)?);
    }
    info!("aligned {} of {} images onto the mosaic grid", out.len(), collection.len());
    Ok(out)
}

fn pixel_composite(collection: &ImageCollection, first: &Image, reducer: Reducer) -> Result<Image> {
    let earliest = collection.iter().filter_map(Image::timestamp).min();
    let footprint = collection
        .iter()
        .filter_map(Image::footprint)
        .reduce(|a: BBox, b| a.union(&b));

    let mut out = Image::new(format!("{}_{}", first.id(), reducer.name()));
    if let Some(t) = earliest {
        out = out.with_timestamp(t);
    }
    if let Some(fp) = footprint {
        out = out.with_footprint(fp);
    }

    for info in first.bands() {
        let layers = collection
            .iter()
            .map(|img| img.band(&info.name))
            .collect::<Result<Vec<_>>>()?;
        debug!("reducing band {} over {} layers", info.name, layers.len());
        let reduced = reduce_layers(&layers, reducer)?;
        out = out.with_band_info(info.clone(), reduced)?;
    }
    Ok(out)
}

/// Reduce co-registered layers pixel by pixel
fn reduce_layers(layers: &[&Raster<f64>], reducer: Reducer) -> Result<Raster<f64>> {
    let template = layers[0];
    for layer in &layers[1..] {
        template.check_same_grid(*layer)?;
    }
    let (rows, cols) = template.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![NODATA; cols];
            let mut values = Vec::with_capacity(layers.len());
            for (col, out) in row_data.iter_mut().enumerate() {
                values.clear();
                for layer in layers {
                    let v = unsafe { layer.get_unchecked(row, col) };
                    if !is_masked(v) {
                        values.push(v);
                    }
                }
                if values.is_empty() {
                    continue;
                }
                *out = match reducer {
                    Reducer::Median => median(&mut values),
                    _ => values.iter().sum::<f64>() / values.len() as f64,
                };
            }
            row_data
        })
        .collect();

    build_output(template, data)
}

/// Median of a non-empty slice; even counts average the middle pair
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// [`reduce`] as an [`Algorithm`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Composite;

impl Algorithm for Composite {
    type Input = ImageCollection;
    type Output = Image;
    type Params = Reducer;
    type Error = Error;

    fn name(&self) -> &'static str {
        "composite"
    }

    fn description(&self) -> &'static str {
        "Reduce an image collection to one composite image"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        reduce(&input, params)
    }
}
