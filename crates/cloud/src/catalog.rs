//! Blocking [`ImageCatalog`] over a STAC API
//!
//! Searches run on an owned current-thread Tokio runtime, so the rest of the
//! pipeline stays synchronous. Each band is a whole-asset download decoded
//! in memory; bands of one image must share a grid, so pick bands of equal
//! resolution.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

use landsight_core::catalog::{CatalogQuery, ImageCatalog};
use landsight_core::io::read_geotiff_from_buffer;
use landsight_core::raster::{BandInfo, Image, ImageCollection, Raster};

use crate::cache::AssetCache;
use crate::error::{CloudError, Result};
use crate::profile::CollectionProfile;
use crate::stac_client::{StacClient, StacClientOptions, StacEndpoint};
use crate::stac_models::{StacItem, StacSearchParams};

/// STAC property holding the scene cloud cover
pub const EO_CLOUD_COVER: &str = "eo:cloud_cover";

/// Options for [`StacImageCatalog`]
#[derive(Debug, Clone)]
pub struct StacCatalogOptions {
    pub client: StacClientOptions,
    /// Deadline for one search including downloads
    pub timeout: Duration,
    /// Assets kept in memory between searches
    pub cache_capacity: usize,
}

impl Default for StacCatalogOptions {
    fn default() -> Self {
        Self {
            client: StacClientOptions::default(),
            timeout: Duration::from_secs(300),
            cache_capacity: 32,
        }
    }
}

/// An [`ImageCatalog`] backed by a STAC API
pub struct StacImageCatalog {
    client: StacClient,
    runtime: tokio::runtime::Runtime,
    profiles: Vec<CollectionProfile>,
    cache: Mutex<AssetCache>,
    timeout: Duration,
}

impl StacImageCatalog {
    pub fn new(endpoint: StacEndpoint, options: StacCatalogOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CloudError::Network(e.to_string()))?;
        let client = StacClient::new(endpoint, options.client)?;
        Ok(Self {
            client,
            runtime,
            profiles: CollectionProfile::defaults(),
            cache: Mutex::new(AssetCache::new(options.cache_capacity)),
            timeout: options.timeout,
        })
    }

    /// Register an extra collection profile; it takes precedence over the built-ins
    pub fn with_profile(mut self, profile: CollectionProfile) -> Self {
        self.profiles.insert(0, profile);
        self
    }

    pub fn endpoint(&self) -> &StacEndpoint {
        self.client.endpoint()
    }

    pub fn profile(&self, collection: &str) -> Result<&CollectionProfile> {
        self.profiles
            .iter()
            .find(|p| p.matches(collection))
            .ok_or_else(|| CloudError::UnknownCollection(collection.to_string()))
    }

    /// Search and download, blocking on the internal runtime
    pub fn fetch(&self, query: &CatalogQuery) -> Result<ImageCollection> {
        let profile = self.profile(&query.collection)?;
        let timeout = self.timeout;
        self.runtime.block_on(async {
            tokio::time::timeout(timeout, self.fetch_async(query, profile))
                .await
                .map_err(|_| CloudError::Timeout(timeout))?
        })
    }

    async fn fetch_async(&self, query: &CatalogQuery, profile: &CollectionProfile) -> Result<ImageCollection> {
        let params = search_params(query, profile);
        let items = self.client.search_all(&params).await?;
        let limit = query.limit.unwrap_or(usize::MAX);

        let wanted: Vec<String> = if query.bands.is_empty() {
            profile.bands.iter().map(|b| b.band.clone()).collect()
        } else {
            query.bands.clone()
        };

        let mut images = Vec::new();
        for item in &items {
            if images.len() >= limit {
                break;
            }
            let Some(image) = image_metadata(item, profile) else {
                warn!("STAC item {} has no datetime, skipped", item.id);
                continue;
            };
            images.push(self.load_bands(image, item, profile, &wanted).await?);
        }

        info!(
            "STAC {}: {} item(s), {} image(s) loaded",
            profile.stac_collection,
            items.len(),
            images.len()
        );
        Ok(ImageCollection::new(images))
    }

    async fn load_bands(
        &self,
        mut image: Image,
        item: &StacItem,
        profile: &CollectionProfile,
        wanted: &[String],
    ) -> Result<Image> {
        for band in wanted {
            let spec = profile.band(band).ok_or_else(|| {
                CloudError::Core(landsight_core::Error::missing_band(band, profile.band_names()))
            })?;
            let asset = item.asset(&spec.asset).ok_or_else(|| CloudError::MissingAsset {
                item: item.id.clone(),
                asset: spec.asset.clone(),
                band: band.clone(),
            })?;

            let bytes = self.asset_bytes(&asset.href).await?;
            let raster: Raster<f64> = read_geotiff_from_buffer(&bytes, None)?;
            let info = BandInfo {
                name: band.clone(),
                scale: spec.scale,
            };
            image = image.with_band_info(info, raster)?;
        }
        Ok(image)
    }

    async fn asset_bytes(&self, href: &str) -> Result<std::sync::Arc<Vec<u8>>> {
        if let Some(hit) = self.lock_cache()?.get(href) {
            debug!("asset cache hit: {}", href);
            return Ok(hit);
        }
        let data = self.client.download(href).await?;
        Ok(self.lock_cache()?.insert(href, data))
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, AssetCache>> {
        self.cache
            .lock()
            .map_err(|_| CloudError::Network("asset cache lock poisoned".into()))
    }
}

impl ImageCatalog for StacImageCatalog {
    fn name(&self) -> &str {
        "stac"
    }

    fn search(&self, query: &CatalogQuery) -> landsight_core::Result<ImageCollection> {
        Ok(self.fetch(query)?)
    }
}

/// Translate a catalog query into a STAC search body.
///
/// Any cloud threshold is sent as `eo:cloud_cover <= max`, whatever property
/// name the query uses.
pub fn search_params(query: &CatalogQuery, profile: &CollectionProfile) -> StacSearchParams {
    let mut params = StacSearchParams::new()
        .collections(&[profile.stac_collection.as_str()])
        .sort_ascending("properties.datetime");
    if let Some(b) = &query.bbox {
        params = params.bbox(b.min_x, b.min_y, b.max_x, b.max_y);
    }
    if let Some(dates) = &query.dates {
        params = params.datetime(&dates.to_interval());
    }
    if let Some((_, max)) = &query.max_cloud {
        params = params.max_property(EO_CLOUD_COVER, *max);
    }
    if let Some(limit) = query.limit {
        params = params.limit(limit.min(u32::MAX as usize) as u32);
    }
    params
}

/// An image with the item's id, time, footprint and properties but no bands.
///
/// Returns `None` when the item carries no parsable datetime.
pub fn image_metadata(item: &StacItem, profile: &CollectionProfile) -> Option<Image> {
    let mut image = Image::new(item.id.clone()).with_timestamp(item.datetime()?);
    if let Some(bbox) = item.footprint() {
        image = image.with_footprint(bbox);
    }
    if let Some(cloud) = item.properties.eo_cloud_cover {
        image = image.with_property(EO_CLOUD_COVER, cloud);
        for alias in &profile.cloud_properties {
            image = image.with_property(alias.clone(), cloud);
        }
    }
    if let Some(platform) = &item.properties.platform {
        image = image.with_property("platform", platform.as_str());
    }
    if let Some(epsg) = item.epsg() {
        image = image.with_property("proj:epsg", epsg as f64);
    }
    Some(image)
}
