//! Image selection: catalog query, filters, reduction

use serde::{Deserialize, Serialize};
use tracing::info;

use landsight_algorithms::composite::{reduce_over, Reducer};
use landsight_core::catalog::{CatalogQuery, ImageCatalog};
use landsight_core::raster::{CompareOp, DateRange, Image, ImageCollection};
use landsight_core::vector::Region;
use landsight_core::Result;

/// Everything the selector needs besides the region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionParams {
    pub collection: String,
    pub dates: DateRange,
    /// Cloud property and its inclusive maximum
    pub cloud: Option<(String, f64)>,
    pub reducer: Reducer,
    pub bands: Vec<String>,
}

/// The filtered collection and its composite
#[derive(Debug, Clone)]
pub struct Selection {
    /// Images returned by the catalog before local filtering
    pub found: usize,
    pub collection: ImageCollection,
    pub composite: Image,
}

/// Query the catalog, then filter locally by bounds, dates and cloud cover.
///
/// The local filters run even when the catalog already narrowed the result;
/// they commute, so their order does not change the outcome.
pub fn select_collection(
    catalog: &dyn ImageCatalog,
    region: &Region,
    params: &SelectionParams,
) -> Result<(usize, ImageCollection)> {
    let bbox = region.bbox();
    let mut query = CatalogQuery::new(params.collection.clone())
        .bbox(bbox)
        .dates(params.dates)
        .bands(params.bands.iter().cloned());
    if let Some((property, max)) = &params.cloud {
        query = query.max_cloud(property.clone(), *max);
    }

    let found = catalog.search(&query)?;
    let mut filtered = found.filter_region(region).filter_date(&params.dates);
    if let Some((property, max)) = &params.cloud {
        filtered = filtered.filter_metadata(property, CompareOp::Le, *max);
    }

    info!(
        "{} via {}: {} image(s) found, {} after filters {}",
        params.collection,
        catalog.name(),
        found.len(),
        filtered.len(),
        params.dates
    );
    Ok((found.len(), filtered))
}

/// Select and reduce to one representative image.
///
/// Scenes on different grids are mosaicked over the region before a
/// pixel-wise reduction.
pub fn select(catalog: &dyn ImageCatalog, region: &Region, params: &SelectionParams) -> Result<Selection> {
    let (found, collection) = select_collection(catalog, region, params)?;
    let composite = reduce_over(&collection, params.reducer, region)?;
    Ok(Selection {
        found,
        collection,
        composite,
    })
}
