//! Collection profiles
//!
//! A profile maps the band names used in recipes (`SR_B5`, `B8`) onto STAC
//! asset keys, attaches the scale factor that turns stored integers into
//! physical units, and lists the metadata names under which the scene cloud
//! cover is exposed.

use landsight_core::ScaleFactor;
use serde::{Deserialize, Serialize};

/// One band of a collection and where to find it in a STAC item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandAsset {
    pub band: String,
    pub asset: String,
    #[serde(default)]
    pub scale: Option<ScaleFactor>,
}

impl BandAsset {
    pub fn new(band: &str, asset: &str, scale: Option<ScaleFactor>) -> Self {
        Self {
            band: band.to_string(),
            asset: asset.to_string(),
            scale,
        }
    }
}

/// How one imagery collection is exposed by a STAC API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionProfile {
    /// STAC collection id
    pub stac_collection: String,
    /// Other identifiers accepted for this collection
    #[serde(default)]
    pub aliases: Vec<String>,
    pub bands: Vec<BandAsset>,
    /// Properties that receive the `eo:cloud_cover` value
    #[serde(default)]
    pub cloud_properties: Vec<String>,
}

impl CollectionProfile {
    /// Landsat 8/9 Collection 2 Level-2 (`landsat-c2-l2`)
    pub fn landsat_c2_l2() -> Self {
        let sr = Some(ScaleFactor::LANDSAT_C2_REFLECTANCE);
        Self {
            stac_collection: "landsat-c2-l2".into(),
            aliases: vec![
                "LANDSAT/LC08/C02/T1_L2".into(),
                "LANDSAT/LC09/C02/T1_L2".into(),
            ],
            bands: vec![
                BandAsset::new("SR_B1", "coastal", sr),
                BandAsset::new("SR_B2", "blue", sr),
                BandAsset::new("SR_B3", "green", sr),
                BandAsset::new("SR_B4", "red", sr),
                BandAsset::new("SR_B5", "nir08", sr),
                BandAsset::new("SR_B6", "swir16", sr),
                BandAsset::new("SR_B7", "swir22", sr),
                BandAsset::new("ST_B10", "lwir11", Some(ScaleFactor::LANDSAT_C2_TEMPERATURE)),
            ],
            cloud_properties: vec!["CLOUD_COVER".into()],
        }
    }

    /// Sentinel-2 Level-2A surface reflectance (`sentinel-2-l2a`)
    pub fn sentinel2_l2a() -> Self {
        let sr = Some(ScaleFactor::SENTINEL2_REFLECTANCE);
        Self {
            stac_collection: "sentinel-2-l2a".into(),
            aliases: vec!["COPERNICUS/S2_SR_HARMONIZED".into(), "COPERNICUS/S2_SR".into()],
            bands: vec![
                BandAsset::new("B2", "blue", sr),
                BandAsset::new("B3", "green", sr),
                BandAsset::new("B4", "red", sr),
                BandAsset::new("B5", "rededge1", sr),
                BandAsset::new("B6", "rededge2", sr),
                BandAsset::new("B7", "rededge3", sr),
                BandAsset::new("B8", "nir", sr),
                BandAsset::new("B8A", "nir08", sr),
                BandAsset::new("B11", "swir16", sr),
                BandAsset::new("B12", "swir22", sr),
            ],
            cloud_properties: vec!["CLOUDY_PIXEL_PERCENTAGE".into()],
        }
    }

    /// Built-in profiles
    pub fn defaults() -> Vec<Self> {
        vec![Self::landsat_c2_l2(), Self::sentinel2_l2a()]
    }

    /// Whether `id` names this collection
    pub fn matches(&self, id: &str) -> bool {
        self.stac_collection == id || self.aliases.iter().any(|a| a == id)
    }

    pub fn band(&self, name: &str) -> Option<&BandAsset> {
        self.bands.iter().find(|b| b.band == name)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.band.as_str()).collect()
    }
}
