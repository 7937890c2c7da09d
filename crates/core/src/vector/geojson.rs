//! GeoJSON FeatureCollection reading
//!
//! Supports the geometry types boundary and sample files use: Point,
//! MultiPoint, Polygon and MultiPolygon. Extra coordinate dimensions are
//! ignored. Features with other geometry types are kept without geometry.

use std::collections::HashMap;
use std::path::Path;

use geo::{Coord, Geometry, LineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};

#[derive(Deserialize)]
struct RawCollection {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    features: Vec<RawFeature>,
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum RawGeometry {
    Point { coordinates: Vec<f64> },
    MultiPoint { coordinates: Vec<Vec<f64>> },
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

fn coord(position: &[f64]) -> Result<Coord<f64>> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(Error::Other(format!(
            "GeoJSON position needs at least 2 values, got {}",
            position.len()
        ))),
    }
}

fn ring(positions: &[Vec<f64>]) -> Result<LineString<f64>> {
    positions
        .iter()
        .map(|p| coord(p))
        .collect::<Result<Vec<_>>>()
        .map(LineString::new)
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let mut iter = rings.iter();
    let exterior = match iter.next() {
        Some(r) => ring(r)?,
        None => return Err(Error::Other("GeoJSON polygon without rings".into())),
    };
    let interiors = iter.map(|r| ring(r)).collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn convert_geometry(raw: RawGeometry) -> Result<Option<Geometry<f64>>> {
    let geom = match raw {
        RawGeometry::Point { coordinates } => Geometry::Point(Point::from(coord(&coordinates)?)),
        RawGeometry::MultiPoint { coordinates } => {
            let points = coordinates
                .iter()
                .map(|p| coord(p).map(Point::from))
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiPoint(MultiPoint::new(points))
        }
        RawGeometry::Polygon { coordinates } => Geometry::Polygon(polygon(&coordinates)?),
        RawGeometry::MultiPolygon { coordinates } => {
            let polys = coordinates
                .iter()
                .map(|p| polygon(p))
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiPolygon(MultiPolygon::new(polys))
        }
        RawGeometry::Unsupported => return Ok(None),
    };
    Ok(Some(geom))
}

fn convert_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => AttributeValue::String(s.clone()),
        other => AttributeValue::String(other.to_string()),
    }
}

/// Parse a GeoJSON FeatureCollection
pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection> {
    let raw: RawCollection = serde_json::from_str(text)
        .map_err(|e| Error::Other(format!("invalid GeoJSON: {}", e)))?;
    if raw.type_ != "FeatureCollection" {
        return Err(Error::Other(format!(
            "expected a GeoJSON FeatureCollection, got '{}'",
            raw.type_
        )));
    }

    let mut out = FeatureCollection::new();
    for f in raw.features {
        let geometry = match f.geometry {
            Some(g) => convert_geometry(g)?,
            None => None,
        };
        let properties: HashMap<String, AttributeValue> = f
            .properties
            .unwrap_or_default()
            .iter()
            .map(|(k, v)| (k.clone(), convert_value(v)))
            .collect();
        let id = f.id.map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        });
        out.push(Feature {
            geometry,
            properties,
            id,
        });
    }

    debug!("parsed GeoJSON with {} features", out.len());
    Ok(out)
}

/// Read a GeoJSON FeatureCollection file
pub fn read_feature_collection<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_feature_collection(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": 7,
                "properties": {"ADM2_NAME": "Kasese", "ADM0_NAME": "Uganda", "area": 3205.5},
                "geometry": {"type": "Polygon", "coordinates": [[[29.7,0.0],[30.3,0.0],[30.3,0.4],[29.7,0.4],[29.7,0.0]]]}
            },
            {
                "type": "Feature",
                "properties": {"landcover": 2},
                "geometry": {"type": "Point", "coordinates": [30.0, 0.2, 1200.0]}
            },
            {
                "type": "Feature",
                "properties": {},
                "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]}
            }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let fc = parse_feature_collection(SAMPLE).unwrap();
        assert_eq!(fc.len(), 3);

        let district = &fc.features[0];
        assert_eq!(district.id.as_deref(), Some("7"));
        assert_eq!(district.get_str("ADM2_NAME"), Some("Kasese"));
        assert_eq!(district.get_property("area").and_then(|v| v.as_f64()), Some(3205.5));
        assert!(matches!(district.geometry, Some(Geometry::Polygon(_))));

        let sample = &fc.features[1];
        assert_eq!(sample.get_property("landcover").and_then(|v| v.as_u64()), Some(2));
        match &sample.geometry {
            Some(Geometry::Point(p)) => assert!((p.x() - 30.0).abs() < 1e-12),
            other => panic!("expected point, got {:?}", other),
        }

        assert!(fc.features[2].geometry.is_none());
    }

    #[test]
    fn test_rejects_non_collection() {
        let err = parse_feature_collection(r#"{"type": "Feature", "features": []}"#);
        assert!(err.is_err());
    }
}
