//! Ordered image collections and their filters

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::raster::Image;
use crate::vector::{BBox, Region};

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(Error::InvalidParameter {
                name: "date_range",
                value: format!("{} .. {}", start, end),
                reason: "end must be after start".into(),
            });
        }
        Ok(Self { start, end })
    }

    /// From calendar dates; `end` is exclusive like `filterDate`
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        Self::new(
            start.and_time(chrono::NaiveTime::MIN).and_utc(),
            end.and_time(chrono::NaiveTime::MIN).and_utc(),
        )
    }

    /// Parse `YYYY-MM-DD` bounds
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| Error::InvalidParameter {
                name: "date",
                value: s.to_string(),
                reason: e.to_string(),
            })
        };
        Self::from_dates(parse(start)?, parse(end)?)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }

    /// RFC 3339 interval as used by STAC `datetime`
    pub fn to_interval(&self) -> String {
        format!(
            "{}/{}",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

/// Comparison used by metadata filters.
///
/// `Le` is inclusive: a cloud threshold of 30 keeps a scene at exactly 30%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl CompareOp {
    pub fn test(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Gt => lhs > rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
        }
    }
}

/// Ordered set of images.
///
/// Every filter keeps the relative order of the images it retains, and
/// filters commute: applying them in any order yields the same collection.
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    images: Vec<Image>,
}

impl ImageCollection {
    pub fn new(images: Vec<Image>) -> Self {
        Self { images }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn iter(&self) -> impl Iterator<Item = &Image> {
        self.images.iter()
    }

    pub fn first(&self) -> Option<&Image> {
        self.images.first()
    }

    pub fn push(&mut self, image: Image) {
        self.images.push(image);
    }

    fn retain(&self, keep: impl Fn(&Image) -> bool) -> Self {
        Self {
            images: self.images.iter().filter(|i| keep(i)).cloned().collect(),
        }
    }

    /// Images whose footprint touches `bbox`. Images without a known
    /// footprint are dropped.
    pub fn filter_bounds(&self, bbox: &BBox) -> Self {
        self.retain(|img| img.footprint().map_or(false, |fp| fp.intersects(bbox)))
    }

    /// Images whose footprint touches the region's polygons (`filterBounds`).
    ///
    /// Footprints and the region share one CRS (lon/lat for catalog
    /// footprints). Scenes inside the region's bbox but between its parts
    /// are dropped; images without a known footprint are dropped.
    pub fn filter_region(&self, region: &Region) -> Self {
        self.retain(|img| img.footprint().map_or(false, |fp| region.intersects_bbox(&fp)))
    }

    /// Images acquired inside the window. Images without a timestamp are dropped.
    pub fn filter_date(&self, range: &DateRange) -> Self {
        self.retain(|img| img.timestamp().map_or(false, |t| range.contains(t)))
    }

    /// Images whose numeric property `key` satisfies `op value`.
    /// Images missing the property are dropped.
    pub fn filter_metadata(&self, key: &str, op: CompareOp, value: f64) -> Self {
        self.retain(|img| img.property_f64(key).map_or(false, |v| op.test(v, value)))
    }

    /// Apply a transformation to every image, keeping order
    pub fn map<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(&Image) -> Result<Image>,
    {
        let images = self.images.iter().map(f).collect::<Result<Vec<_>>>()?;
        Ok(Self { images })
    }

    /// Images sorted by acquisition time; untimed images go last
    pub fn sorted_by_time(&self) -> Self {
        let mut images = self.images.clone();
        images.sort_by_key(|i| (i.timestamp().is_none(), i.timestamp()));
        Self { images }
    }

    /// Append another collection (`ImageCollection.merge`)
    pub fn merge(mut self, other: ImageCollection) -> Self {
        self.images.extend(other.images);
        self
    }
}

impl FromIterator<Image> for ImageCollection {
    fn from_iter<I: IntoIterator<Item = Image>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for ImageCollection {
    type Item = Image;
    type IntoIter = std::vec::IntoIter<Image>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{GeoTransform, Raster};
    use chrono::TimeZone;

    fn scene(id: &str, month: u32, cloud: f64, x0: f64) -> Image {
        let mut r: Raster<f64> = Raster::filled(2, 2, 1.0);
        r.set_transform(GeoTransform::new(x0, 1.0, 0.5, -0.5));
        Image::new(id)
            .with_timestamp(Utc.with_ymd_and_hms(2023, month, 15, 8, 0, 0).unwrap())
            .with_property("CLOUD_COVER", cloud)
            .with_band("B1", r)
            .unwrap()
    }

    fn collection() -> ImageCollection {
        ImageCollection::new(vec![
            scene("a", 1, 10.0, 0.0),
            scene("b", 3, 30.0, 0.0),
            scene("c", 6, 31.0, 0.0),
            scene("d", 9, 5.0, 50.0),
            scene("e", 12, 0.0, 0.0),
        ])
    }

    fn ids(c: &ImageCollection) -> Vec<&str> {
        c.iter().map(|i| i.id()).collect()
    }

    #[test]
    fn test_cloud_threshold_inclusive() {
        let kept = collection().filter_metadata("CLOUD_COVER", CompareOp::Le, 30.0);
        assert_eq!(ids(&kept), vec!["a", "b", "d", "e"]);
        assert!(kept.iter().all(|i| i.property_f64("CLOUD_COVER").unwrap() <= 30.0));
    }

    #[test]
    fn test_date_half_open() {
        let range = DateRange::parse("2023-03-15", "2023-12-15").unwrap();
        let c = ImageCollection::new(vec![
            scene("start", 3, 0.0, 0.0).with_timestamp(range.start),
            scene("end", 3, 0.0, 0.0).with_timestamp(range.end),
        ]);
        assert_eq!(ids(&c.filter_date(&range)), vec!["start"]);
    }

    #[test]
    fn test_filters_commute_and_keep_order() {
        let c = collection();
        let bbox = BBox::new(0.0, 0.0, 1.0, 1.0);
        let range = DateRange::parse("2023-01-01", "2024-01-01").unwrap();

        let a = c
            .filter_bounds(&bbox)
            .filter_date(&range)
            .filter_metadata("CLOUD_COVER", CompareOp::Le, 30.0);
        let b = c
            .filter_metadata("CLOUD_COVER", CompareOp::Le, 30.0)
            .filter_date(&range)
            .filter_bounds(&bbox);
        assert_eq!(ids(&a), vec!["a", "b", "e"]);
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn test_region_filter_uses_polygons() {
        use geo::MultiPolygon;

        // two unit squares with a gap between them
        let region = Region::new(
            "split",
            MultiPolygon::new(vec![
                BBox::new(0.0, 0.0, 1.0, 1.0).to_polygon(),
                BBox::new(3.0, 0.0, 4.0, 1.0).to_polygon(),
            ]),
        )
        .unwrap();
        let c = ImageCollection::new(vec![
            scene("west", 3, 0.0, 0.25),
            scene("gap", 3, 0.0, 1.5),
            scene("east", 3, 0.0, 3.25),
        ]);

        assert_eq!(ids(&c.filter_bounds(&region.bbox())), vec!["west", "gap", "east"]);
        assert_eq!(ids(&c.filter_region(&region)), vec!["west", "east"]);
    }

    #[test]
    fn test_missing_property_is_dropped() {
        let c = ImageCollection::new(vec![Image::new("bare")]);
        assert!(c.filter_metadata("CLOUD_COVER", CompareOp::Le, 100.0).is_empty());
        assert!(c.filter_bounds(&BBox::new(-180.0, -90.0, 180.0, 90.0)).is_empty());
    }

    #[test]
    fn test_invalid_range() {
        assert!(DateRange::parse("2023-12-31", "2023-01-01").is_err());
        assert!(DateRange::parse("2023-13-01", "2024-01-01").is_err());
        let r = DateRange::parse("2023-01-01", "2024-01-01").unwrap();
        assert_eq!(r.to_interval(), "2023-01-01T00:00:00Z/2024-01-01T00:00:00Z");
    }
}
