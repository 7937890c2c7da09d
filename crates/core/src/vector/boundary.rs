//! Region resolution against administrative and urban-centre boundaries

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use geo::{Geometry, MultiPolygon};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::vector::{geojson, BBox, Feature, FeatureCollection, Region};

/// Administrative level of a GAUL lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminLevel {
    Country,
    /// First-level units (regions, provinces)
    Region,
    /// Second-level units (districts)
    #[default]
    District,
}

/// Attribute names a boundary dataset uses for country and unit name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundarySchema {
    pub label: String,
    pub country_field: String,
    pub name_field: String,
}

impl BoundarySchema {
    pub fn new(
        label: impl Into<String>,
        country_field: impl Into<String>,
        name_field: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            country_field: country_field.into(),
            name_field: name_field.into(),
        }
    }

    /// FAO GAUL (2015) administrative units
    pub fn gaul(level: AdminLevel) -> Self {
        let name_field = match level {
            AdminLevel::Country => "ADM0_NAME",
            AdminLevel::Region => "ADM1_NAME",
            AdminLevel::District => "ADM2_NAME",
        };
        Self::new("gaul", "ADM0_NAME", name_field)
    }

    /// GHS urban centre database
    pub fn ghs_urban() -> Self {
        Self::new("ghs", "CTR_MN_NM", "UC_NM_MN")
    }

    /// geoBoundaries; the country field holds ISO3 codes such as `UGA`
    pub fn geoboundaries() -> Self {
        Self::new("geoboundaries", "shapeGroup", "shapeName")
    }

    /// Look a preset up by label (`gaul`, `ghs`, `geoboundaries`)
    pub fn from_label(label: &str, level: AdminLevel) -> Result<Self> {
        match label.to_ascii_lowercase().as_str() {
            "gaul" => Ok(Self::gaul(level)),
            "ghs" | "ghs-urban" | "urban" => Ok(Self::ghs_urban()),
            "geoboundaries" => Ok(Self::geoboundaries()),
            other => Err(Error::InvalidParameter {
                name: "schema",
                value: other.to_string(),
                reason: "expected one of gaul, ghs, geoboundaries".into(),
            }),
        }
    }
}

/// Country plus one or more unit names; all matches are merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryQuery {
    pub country: String,
    pub names: Vec<String>,
}

impl BoundaryQuery {
    pub fn new<S: Into<String>>(country: impl Into<String>, names: impl IntoIterator<Item = S>) -> Self {
        Self {
            country: country.into(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn single(country: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(country, [name.into()])
    }

    /// Name given to the resolved region
    pub fn region_name(&self) -> String {
        self.names.join("+")
    }
}

impl fmt::Display for BoundaryQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} in {}", self.names, self.country)
    }
}

/// Anything that turns a boundary query into a region
pub trait BoundarySource: Send + Sync {
    fn resolve(&self, query: &BoundaryQuery) -> Result<Region>;
}

/// An in-memory boundary dataset with a known attribute schema
#[derive(Debug, Clone)]
pub struct BoundaryDataset {
    schema: BoundarySchema,
    features: FeatureCollection,
}

impl BoundaryDataset {
    pub fn new(schema: BoundarySchema, features: FeatureCollection) -> Self {
        Self { schema, features }
    }

    /// Load a GeoJSON FeatureCollection
    pub fn from_geojson<P: AsRef<Path>>(path: P, schema: BoundarySchema) -> Result<Self> {
        let features = geojson::read_feature_collection(path.as_ref())?;
        debug!(
            "loaded {} boundary features from {}",
            features.len(),
            path.as_ref().display()
        );
        Ok(Self::new(schema, features))
    }

    pub fn schema(&self) -> &BoundarySchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn in_country<'a>(&'a self, country: &'a str) -> impl Iterator<Item = &'a Feature> + 'a {
        self.features
            .iter()
            .filter(move |f| f.get_str(&self.schema.country_field) == Some(country))
    }

    /// Sorted unit names, optionally restricted to one country
    pub fn names(&self, country: Option<&str>) -> Vec<String> {
        let set: BTreeSet<&str> = self
            .features
            .iter()
            .filter(|f| country.map_or(true, |c| f.get_str(&self.schema.country_field) == Some(c)))
            .filter_map(|f| f.get_str(&self.schema.name_field))
            .collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Bounding box of every feature of a country
    pub fn country_extent(&self, country: &str) -> Option<BBox> {
        self.in_country(country)
            .filter_map(|f| polygons(f))
            .filter_map(|mp| Region::new("extent", mp).ok())
            .map(|r| r.bbox())
            .reduce(|a, b| a.union(&b))
    }
}

fn polygons(feature: &Feature) -> Option<MultiPolygon<f64>> {
    match feature.geometry.as_ref()? {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        _ => None,
    }
}

impl BoundarySource for BoundaryDataset {
    /// Union of every feature whose country and name match the query.
    ///
    /// Names that match nothing are logged; the lookup only fails when no
    /// name matches at all.
    fn resolve(&self, query: &BoundaryQuery) -> Result<Region> {
        if query.names.is_empty() {
            return Err(Error::Resolution {
                query: format!("{} (no names given)", query),
            });
        }

        let mut parts = Vec::new();
        let mut matched = BTreeSet::new();
        for feature in self.in_country(&query.country) {
            let Some(name) = feature.get_str(&self.schema.name_field) else {
                continue;
            };
            if !query.names.iter().any(|n| n == name) {
                continue;
            }
            match polygons(feature) {
                Some(mp) => {
                    parts.extend(mp.0);
                    matched.insert(name.to_string());
                }
                None => warn!("boundary feature '{}' has no polygon geometry", name),
            }
        }

        for name in query.names.iter().filter(|n| !matched.contains(*n)) {
            warn!(
                "no {} boundary named '{}' in {}",
                self.schema.label, name, query.country
            );
        }
        if parts.is_empty() {
            return Err(Error::Resolution {
                query: query.to_string(),
            });
        }

        let region = Region::new(query.region_name(), MultiPolygon::new(parts))?;
        let bb = region.bbox();
        info!(
            "resolved {} to {} polygon(s), bbox [{:.4}, {:.4}, {:.4}, {:.4}]",
            query,
            region.part_count(),
            bb.min_x,
            bb.min_y,
            bb.max_x,
            bb.max_y
        );
        Ok(region)
    }
}
