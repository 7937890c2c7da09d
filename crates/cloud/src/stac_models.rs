//! STAC (SpatioTemporal Asset Catalog) data types.
//!
//! Serde models for STAC Item Search (`POST /search`) requests and
//! responses: bbox, datetime, collection and `eo:cloud_cover` filtering,
//! pagination via `links`, and asset access.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use landsight_core::BBox;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Body for `POST /search` (STAC API Item Search).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Query extension predicates, e.g. `{"eo:cloud_cover": {"lte": 30}}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Map<String, serde_json::Value>>,

    /// Sort extension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sortby: Option<Vec<SortBy>>,

    /// Pagination token (next page).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// One sort key of the sort extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    pub direction: String,
}

impl StacSearchParams {
    /// Create empty search params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bounding box `[west, south, east, north]`.
    pub fn bbox(mut self, west: f64, south: f64, east: f64, north: f64) -> Self {
        self.bbox = Some(vec![west, south, east, north]);
        self
    }

    /// Set datetime or datetime range (e.g. `"2023-01-01T00:00:00Z/2024-01-01T00:00:00Z"`).
    pub fn datetime(mut self, dt: &str) -> Self {
        self.datetime = Some(dt.to_string());
        self
    }

    /// Set collection filter.
    pub fn collections(mut self, cols: &[&str]) -> Self {
        self.collections = Some(cols.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Set maximum items per page.
    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Add an upper bound (inclusive) on a numeric property.
    pub fn max_property(mut self, property: &str, max: f64) -> Self {
        self.query
            .get_or_insert_with(Default::default)
            .insert(property.to_string(), serde_json::json!({ "lte": max }));
        self
    }

    /// Sort ascending by a property, e.g. `properties.datetime`.
    pub fn sort_ascending(mut self, field: &str) -> Self {
        self.sortby.get_or_insert_with(Vec::new).push(SortBy {
            field: field.to_string(),
            direction: "asc".to_string(),
        });
        self
    }

    /// Set pagination token.
    pub fn token(mut self, tok: &str) -> Self {
        self.token = Some(tok.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A STAC Item Collection (GeoJSON FeatureCollection).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(rename = "type")]
    pub type_: String,

    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<StacLink>,

    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,

    #[serde(rename = "numberReturned", skip_serializing_if = "Option::is_none")]
    pub number_returned: Option<u64>,

    /// Earth Search reports counts here instead of `numberMatched`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl StacItemCollection {
    /// Find the `"next"` pagination link, if any.
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    pub fn has_next(&self) -> bool {
        self.next_link().is_some()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A single STAC Item (GeoJSON Feature).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    #[serde(rename = "type")]
    pub type_: String,

    pub id: String,

    /// Geometry as raw JSON; the footprint is taken from `bbox`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<serde_json::Value>,

    /// Bounding box `[west, south, east, north]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    pub properties: StacItemProperties,

    pub assets: HashMap<String, StacAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    #[serde(default)]
    pub links: Vec<StacLink>,
}

impl StacItem {
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// Acquisition time from `datetime`, falling back to `start_datetime`
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        let raw = self.properties.datetime.as_deref().or_else(|| {
            self.properties
                .extra
                .get("start_datetime")
                .and_then(|v| v.as_str())
        })?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// WGS84 footprint from the item `bbox` (2D or 3D form)
    pub fn footprint(&self) -> Option<BBox> {
        match self.bbox.as_deref()? {
            [w, s, e, n] => Some(BBox::new(*w, *s, *e, *n)),
            [w, s, _, e, n, _] => Some(BBox::new(*w, *s, *e, *n)),
            _ => None,
        }
    }

    /// EPSG code from the projection extension (`proj:epsg`).
    pub fn epsg(&self) -> Option<u32> {
        self.properties
            .extra
            .get("proj:epsg")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
    }

    /// Numeric property, looking at modeled fields first
    pub fn property_f64(&self, key: &str) -> Option<f64> {
        match key {
            "eo:cloud_cover" => self.properties.eo_cloud_cover,
            "gsd" => self.properties.gsd,
            _ => self.properties.extra.get(key).and_then(|v| v.as_f64()),
        }
    }
}

/// STAC Item properties.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemProperties {
    /// ISO 8601 datetime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// Cloud cover percentage (EO extension).
    #[serde(rename = "eo:cloud_cover", skip_serializing_if = "Option::is_none")]
    pub eo_cloud_cover: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub constellation: Option<String>,

    /// Ground sample distance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsd: Option<f64>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A single STAC Asset (file reference).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Roles: `["data"]`, `["thumbnail"]`, `["overview"]`, etc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl StacAsset {
    /// GeoTIFF media type or a `.tif`/`.tiff` href
    pub fn is_geotiff(&self) -> bool {
        let typed = self
            .type_
            .as_ref()
            .map(|t| t.contains("geotiff") || t.contains("geo+tiff") || t.contains("image/tiff"))
            .unwrap_or(false);
        typed || self.href.ends_with(".tif") || self.href.ends_with(".tiff")
    }
}

/// A STAC Link (used for pagination and related resources).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    /// Relationship: `"self"`, `"root"`, `"next"`, `"prev"`, etc.
    pub rel: String,

    pub href: String,

    /// HTTP method for the link (default GET, but `"next"` often uses POST).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request body for POST-based pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// If true, merge body with the previous request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) const FIXTURE: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": "LC08_L2SP_173060_20230114_02_T1",
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[29.6, -0.9], [31.3, -0.9], [31.3, 0.8], [29.6, 0.8], [29.6, -0.9]]]
      },
      "bbox": [29.6, -0.9, 31.3, 0.8],
      "properties": {
        "datetime": "2023-01-14T08:05:31.123Z",
        "eo:cloud_cover": 12.5,
        "platform": "landsat-8",
        "gsd": 30.0,
        "proj:epsg": 32636
      },
      "assets": {
        "nir08": {
          "href": "https://example.com/LC08_SR_B5.TIF",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "title": "Near Infrared Band 0.8",
          "roles": ["data", "reflectance"]
        },
        "swir16": {
          "href": "https://example.com/LC08_SR_B6.TIF",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "roles": ["data", "reflectance"]
        },
        "thumbnail": {
          "href": "https://example.com/thumb.jpeg",
          "type": "image/jpeg",
          "roles": ["thumbnail"]
        }
      },
      "collection": "landsat-c2-l2",
      "links": []
    }
  ],
  "links": [
    {
      "rel": "next",
      "href": "https://planetarycomputer.microsoft.com/api/stac/v1/search",
      "method": "POST",
      "body": {"token": "next:abc123"},
      "merge": true
    }
  ],
  "numberMatched": 9,
  "numberReturned": 1
}"#;

    fn item() -> StacItem {
        let col: StacItemCollection = serde_json::from_str(FIXTURE).unwrap();
        col.features.into_iter().next().unwrap()
    }

    #[test]
    fn parse_item_collection() {
        let col: StacItemCollection = serde_json::from_str(FIXTURE).unwrap();
        assert_eq!(col.len(), 1);
        assert_eq!(col.number_matched, Some(9));
        let next = col.next_link().unwrap();
        assert_eq!(next.method.as_deref(), Some("POST"));
        assert_eq!(next.merge, Some(true));
    }

    #[test]
    fn item_metadata() {
        let item = item();
        assert_eq!(item.collection.as_deref(), Some("landsat-c2-l2"));
        assert_eq!(item.epsg(), Some(32636));
        assert_eq!(item.property_f64("eo:cloud_cover"), Some(12.5));
        assert_eq!(item.footprint(), Some(BBox::new(29.6, -0.9, 31.3, 0.8)));
        let t = item.datetime().unwrap();
        assert_eq!(t.date_naive(), Utc.with_ymd_and_hms(2023, 1, 14, 0, 0, 0).unwrap().date_naive());
    }

    #[test]
    fn geotiff_assets() {
        let item = item();
        assert!(item.asset("nir08").unwrap().is_geotiff());
        assert!(!item.asset("thumbnail").unwrap().is_geotiff());
    }

    #[test]
    fn builder_serializes_cloud_query() {
        let params = StacSearchParams::new()
            .bbox(29.7, -0.4, 30.4, 0.4)
            .datetime("2023-01-01T00:00:00Z/2024-01-01T00:00:00Z")
            .collections(&["landsat-c2-l2"])
            .max_property("eo:cloud_cover", 30.0)
            .sort_ascending("properties.datetime")
            .limit(50);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["collections"], serde_json::json!(["landsat-c2-l2"]));
        assert_eq!(json["query"]["eo:cloud_cover"]["lte"], 30.0);
        assert_eq!(json["sortby"][0]["direction"], "asc");
        assert!(json.get("token").is_none());
    }

    #[test]
    fn empty_params_has_no_fields() {
        let json = serde_json::to_value(StacSearchParams::new()).unwrap();
        assert!(json.as_object().unwrap().is_empty());
    }
}
