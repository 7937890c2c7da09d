//! Directory and in-memory catalogs

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{CatalogQuery, ImageCatalog};
use crate::error::{Error, Result};
use crate::io;
use crate::raster::{BandInfo, Image, ImageCollection, PropertyValue, Raster, ScaleFactor};
use crate::vector::BBox;

/// Manifest file name inside a catalog directory
pub const MANIFEST_FILE: &str = "catalog.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    images: Vec<ManifestImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestImage {
    id: String,
    collection: String,
    datetime: DateTime<Utc>,
    #[serde(default)]
    properties: BTreeMap<String, PropertyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bbox: Option<BBox>,
    bands: Vec<ManifestBand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestBand {
    name: String,
    /// GeoTIFF path relative to the catalog directory
    path: PathBuf,
    #[serde(default)]
    page: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scale: Option<ScaleFactor>,
}

impl ManifestImage {
    /// Cheap prefilter on manifest metadata; the selector filters again
    fn may_match(&self, query: &CatalogQuery) -> bool {
        if self.collection != query.collection {
            return false;
        }
        if let Some(dates) = &query.dates {
            if !dates.contains(self.datetime) {
                return false;
            }
        }
        if let (Some(bbox), Some(q)) = (&self.bbox, &query.bbox) {
            if !bbox.intersects(q) {
                return false;
            }
        }
        if let Some((key, max)) = &query.max_cloud {
            if let Some(v) = self.properties.get(key).and_then(PropertyValue::as_f64) {
                if v > *max {
                    return false;
                }
            }
        }
        true
    }
}

/// Catalog backed by a directory of GeoTIFFs and a `catalog.json` manifest.
///
/// ```text
/// catalog/
///   catalog.json
///   LC08_170060_20230114.tif
///   ...
/// ```
#[derive(Debug)]
pub struct LocalCatalog {
    root: PathBuf,
    manifest: RwLock<Manifest>,
}

impl LocalCatalog {
    /// Open an existing catalog directory
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let text = std::fs::read_to_string(root.join(MANIFEST_FILE))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .map_err(|e| Error::Catalog(format!("invalid {}: {}", MANIFEST_FILE, e)))?;
        info!(
            "opened local catalog {} ({} images)",
            root.display(),
            manifest.images.len()
        );
        Ok(Self {
            root,
            manifest: RwLock::new(manifest),
        })
    }

    /// Create an empty catalog, creating the directory if needed
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let catalog = Self {
            root,
            manifest: RwLock::new(Manifest::default()),
        };
        catalog.save()?;
        Ok(catalog)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.manifest.read().map(|m| m.images.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct collection ids
    pub fn collections(&self) -> Vec<String> {
        let Ok(m) = self.manifest.read() else {
            return Vec::new();
        };
        let mut ids: Vec<String> = m.images.iter().map(|i| i.collection.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn save(&self) -> Result<()> {
        let m = self
            .manifest
            .read()
            .map_err(|_| Error::Catalog("manifest lock poisoned".into()))?;
        let text = serde_json::to_string_pretty(&*m)
            .map_err(|e| Error::Catalog(format!("cannot serialize manifest: {}", e)))?;
        std::fs::write(self.root.join(MANIFEST_FILE), text)?;
        Ok(())
    }

    /// Store an image as `<id>.tif` and register it in the manifest.
    ///
    /// The image needs a timestamp; its footprint is recorded for prefiltering.
    pub fn insert(&self, collection: &str, image: &Image) -> Result<()> {
        let datetime = image.timestamp().ok_or_else(|| {
            Error::Catalog(format!("image '{}' has no acquisition time", image.id()))
        })?;
        let file = PathBuf::from(format!("{}.tif", sanitize(image.id())));
        io::write_image(image, self.root.join(&file))?;

        let bands = image
            .bands()
            .iter()
            .enumerate()
            .map(|(page, b)| ManifestBand {
                name: b.name.clone(),
                path: file.clone(),
                page,
                scale: b.scale,
            })
            .collect();
        let entry = ManifestImage {
            id: image.id().to_string(),
            collection: collection.to_string(),
            datetime,
            properties: image.properties().clone(),
            bbox: image.footprint(),
            bands,
        };

        {
            let mut m = self
                .manifest
                .write()
                .map_err(|_| Error::Catalog("manifest lock poisoned".into()))?;
            m.images.retain(|i| !(i.id == entry.id && i.collection == entry.collection));
            m.images.push(entry);
        }
        debug!("stored {} in {}", image.id(), collection);
        self.save()
    }

    fn load(&self, entry: &ManifestImage, wanted: &[String]) -> Result<Image> {
        let mut image = Image::new(entry.id.clone()).with_timestamp(entry.datetime);
        for (key, value) in &entry.properties {
            image = image.with_property(key.clone(), value.clone());
        }
        if let Some(bbox) = entry.bbox {
            image = image.with_footprint(bbox);
        }

        let bands: Vec<&ManifestBand> = if wanted.is_empty() {
            entry.bands.iter().collect()
        } else {
            wanted
                .iter()
                .map(|w| {
                    entry.bands.iter().find(|b| &b.name == w).ok_or_else(|| {
                        Error::missing_band(w, entry.bands.iter().map(|b| b.name.as_str()))
                    })
                })
                .collect::<Result<_>>()?
        };

        for band in bands {
            let raster: Raster<f64> = io::read_geotiff(self.root.join(&band.path), Some(band.page))?;
            let info = BandInfo {
                name: band.name.clone(),
                scale: band.scale,
            };
            image = image.with_band_info(info, raster)?;
        }
        Ok(image)
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

impl ImageCatalog for LocalCatalog {
    fn name(&self) -> &str {
        "local"
    }

    fn search(&self, query: &CatalogQuery) -> Result<ImageCollection> {
        let entries: Vec<ManifestImage> = {
            let m = self
                .manifest
                .read()
                .map_err(|_| Error::Catalog("manifest lock poisoned".into()))?;
            m.images.iter().filter(|i| i.may_match(query)).cloned().collect()
        };

        let limit = query.limit.unwrap_or(usize::MAX);
        let images = entries
            .iter()
            .take(limit)
            .map(|e| self.load(e, &query.bands))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "local catalog: {} candidate(s) for {}",
            images.len(),
            query.collection
        );
        Ok(ImageCollection::new(images))
    }
}

/// Catalog over images already in memory
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    collections: RwLock<HashMap<String, Vec<Image>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, image: Image) -> Result<()> {
        let mut c = self
            .collections
            .write()
            .map_err(|_| Error::Catalog("catalog lock poisoned".into()))?;
        c.entry(collection.to_string()).or_default().push(image);
        Ok(())
    }

    /// Builder form of [`InMemoryCatalog::insert`]
    pub fn with_images(self, collection: &str, images: impl IntoIterator<Item = Image>) -> Result<Self> {
        for image in images {
            self.insert(collection, image)?;
        }
        Ok(self)
    }
}

impl ImageCatalog for InMemoryCatalog {
    fn name(&self) -> &str {
        "memory"
    }

    fn search(&self, query: &CatalogQuery) -> Result<ImageCollection> {
        let c = self
            .collections
            .read()
            .map_err(|_| Error::Catalog("catalog lock poisoned".into()))?;
        let Some(images) = c.get(&query.collection) else {
            return Err(Error::Catalog(format!("unknown collection '{}'", query.collection)));
        };

        let bands: Vec<&str> = query.bands.iter().map(String::as_str).collect();
        images
            .iter()
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|img| if bands.is_empty() { Ok(img.clone()) } else { img.select(&bands) })
            .collect::<Result<Vec<_>>>()
            .map(ImageCollection::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CRS;
    use crate::raster::{DateRange, GeoTransform, NODATA};
    use chrono::TimeZone;

    fn scene(id: &str, month: u32, cloud: f64) -> Image {
        let band = |v: f64| {
            let mut r = Raster::filled(4, 4, v);
            r.set_transform(GeoTransform::new(30.0, 0.4, 0.1, -0.1));
            r.set_crs(Some(CRS::wgs84()));
            r.set_nodata(Some(NODATA));
            r
        };
        Image::new(id)
            .with_timestamp(Utc.with_ymd_and_hms(2023, month, 10, 0, 0, 0).unwrap())
            .with_property("CLOUD_COVER", cloud)
            .with_scaled_band("SR_B5", band(20000.0), ScaleFactor::LANDSAT_C2_REFLECTANCE)
            .and_then(|i| i.with_scaled_band("SR_B6", band(15000.0), ScaleFactor::LANDSAT_C2_REFLECTANCE))
            .unwrap()
    }

    #[test]
    fn test_local_catalog_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = LocalCatalog::create(dir.path()).unwrap();
        catalog.insert("landsat", &scene("LC08_a", 2, 12.0)).unwrap();
        catalog.insert("landsat", &scene("LC08_b", 7, 80.0)).unwrap();
        catalog.insert("sentinel", &scene("S2_a", 3, 1.0)).unwrap();

        let reopened = LocalCatalog::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.collections(), vec!["landsat", "sentinel"]);

        let query = CatalogQuery::new("landsat")
            .dates(DateRange::parse("2023-01-01", "2024-01-01").unwrap())
            .max_cloud("CLOUD_COVER", 30.0)
            .bands(["SR_B6"]);
        let found = reopened.search(&query).unwrap();
        assert_eq!(found.len(), 1);

        let img = found.first().unwrap();
        assert_eq!(img.id(), "LC08_a");
        assert_eq!(img.band_names(), vec!["SR_B6"]);
        assert_eq!(
            img.band_info("SR_B6").unwrap().scale,
            Some(ScaleFactor::LANDSAT_C2_REFLECTANCE)
        );
        assert_eq!(img.band("SR_B6").unwrap().get(0, 0).unwrap(), 15000.0);
    }

    #[test]
    fn test_in_memory_catalog() {
        let catalog = InMemoryCatalog::new()
            .with_images("landsat", vec![scene("a", 1, 5.0), scene("b", 2, 5.0)])
            .unwrap();
        let all = catalog.search(&CatalogQuery::new("landsat").limit(1)).unwrap();
        assert_eq!(all.len(), 1);
        assert!(catalog.search(&CatalogQuery::new("modis")).is_err());
        assert!(catalog
            .search(&CatalogQuery::new("landsat").bands(["B10"]))
            .is_err());
    }
}
