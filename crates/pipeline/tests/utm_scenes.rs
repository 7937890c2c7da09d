//! Runs over scenes delivered on a UTM grid, the way Landsat and Sentinel-2
//! surface reflectance assets arrive from a STAC catalog.

use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use landsight_core::catalog::InMemoryCatalog;
use landsight_core::crs::Projection;
use landsight_core::export::LocalExporter;
use landsight_core::io::read_image;
use landsight_core::raster::{Image, Raster, ScaleFactor, NODATA};
use landsight_core::vector::{AdminLevel, BoundaryDataset, BoundarySchema};
use landsight_core::{BBox, GeoTransform, Region, CRS};
use landsight_pipeline::{Pipeline, Recipe};
use tempfile::TempDir;

const COLLECTION: &str = "LANDSAT/LC08/C02/T1_L2";
const KASESE: [f64; 4] = [29.75, -0.375, 30.25, 0.375];
const UTM_36N: u32 = 32636;

// 70 x 100 cells of 1 km, wide enough for the district in zone 36
const ROWS: usize = 100;
const COLS: usize = 70;
const CELL: f64 = 1000.0;
// built-up east of this easting (about 30.0°E)
const SPLIT_EASTING: f64 = 165_000.0;

const BOUNDARIES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": { "ADM0_NAME": "Uganda", "ADM2_NAME": "Kasese" },
      "geometry": { "type": "Polygon", "coordinates": [[
        [29.75, -0.375], [30.25, -0.375], [30.25, 0.375], [29.75, 0.375], [29.75, -0.375]
      ]] }
    }
  ]
}"#;

const SAMPLES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    { "type": "Feature", "properties": { "landcover": 0 },
      "geometry": { "type": "Point", "coordinates": [29.8, 0.1] } },
    { "type": "Feature", "properties": { "landcover": 0 },
      "geometry": { "type": "Point", "coordinates": [29.85, -0.2] } },
    { "type": "Feature", "properties": { "landcover": 1 },
      "geometry": { "type": "Point", "coordinates": [30.15, 0.1] } },
    { "type": "Feature", "properties": { "landcover": 1 },
      "geometry": { "type": "Point", "coordinates": [30.2, -0.2] } }
  ]
}"#;

const RECIPE: &str = r#"
name = "kasese_utm"

[region]
schema = "gaul"
boundaries = "boundaries.geojson"
country = "Uganda"
names = ["Kasese"]

[catalog]
kind = "local"
path = "unused"

[selection]
collection = "LANDSAT/LC08/C02/T1_L2"
cloud_property = "CLOUD_COVER"
max_cloud = 30.0
reducer = "median"

[[windows]]
name = "2023"
start = "2023-01-01"
end = "2024-01-01"

[[indices]]
name = "NDBI"
kind = "normalized_difference"
a = "SR_B6"
b = "SR_B5"

[classify]
class_count = 2
bands = ["SR_B5", "SR_B6", "NDBI"]
samples = "samples.geojson"
classifier = { kind = "minimum_distance" }

[series]
band = "SR_B6"

[export]
folder = "gee"
"#;

/// A scene on a 1 km UTM grid; each acquisition starts at its own corner
fn utm_scene(id: &str, day: u32, origin: (f64, f64)) -> Image {
    let band = |west: f64, east: f64| {
        let mut r = Raster::filled(ROWS, COLS, 0.0);
        r.set_transform(GeoTransform::new(origin.0, origin.1, CELL, -CELL));
        r.set_crs(Some(CRS::from_epsg(UTM_36N)));
        r.set_nodata(Some(NODATA));
        for row in 0..ROWS {
            for col in 0..COLS {
                let (x, _) = r.pixel_to_geo(col, row);
                r.set(row, col, if x < SPLIT_EASTING { west } else { east }).unwrap();
            }
        }
        r
    };

    Image::new(id)
        .with_timestamp(Utc.with_ymd_and_hms(2023, 3, day, 8, 0, 0).unwrap())
        .with_property("CLOUD_COVER", 10.0)
        .with_footprint(BBox::new(29.6, -0.45, 30.4, 0.45))
        .with_scaled_band("SR_B5", band(22000.0, 15000.0), ScaleFactor::LANDSAT_C2_REFLECTANCE)
        .unwrap()
        .with_scaled_band("SR_B6", band(14000.0, 19000.0), ScaleFactor::LANDSAT_C2_REFLECTANCE)
        .unwrap()
}

fn write_inputs(dir: &Path) {
    std::fs::write(dir.join("boundaries.geojson"), BOUNDARIES).unwrap();
    std::fs::write(dir.join("samples.geojson"), SAMPLES).unwrap();
}

fn pipeline(dir: &Path) -> Pipeline {
    let catalog = InMemoryCatalog::new()
        .with_images(
            COLLECTION,
            vec![
                utm_scene("LC08_a", 3, (130_000.0, 50_000.0)),
                // shifted by a fraction of a cell
                utm_scene("LC08_b", 19, (130_300.0, 49_800.0)),
            ],
        )
        .unwrap();
    let boundaries = BoundaryDataset::from_geojson(
        dir.join("boundaries.geojson"),
        BoundarySchema::gaul(AdminLevel::District),
    )
    .unwrap();
    Pipeline::new(Arc::new(boundaries), Arc::new(catalog))
        .with_exporter(Arc::new(LocalExporter::new(dir.join("exports"))))
        .with_output_dir(dir.join("out"))
}

fn kasese_in_utm() -> Region {
    let [w, s, e, n] = KASESE;
    Region::from_bbox("Kasese", BBox::new(w, s, e, n))
        .unwrap()
        .to_crs(&CRS::from_epsg(UTM_36N))
        .unwrap()
}

#[test]
fn lon_lat_region_runs_over_utm_scenes() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());
    let recipe = Recipe::from_toml(RECIPE, tmp.path()).unwrap();

    let report = pipeline(tmp.path()).run(&recipe).unwrap();
    let window = report.window("2023").unwrap();
    assert_eq!(window.images_used, 2);
    assert_eq!(report.region_bbox.to_array(), KASESE);

    // both land-cover classes found inside the district
    let histogram = window.class_histogram.as_ref().unwrap();
    assert_eq!(histogram.len(), 2);
    assert!(histogram.iter().all(|&n| n > 0), "histogram {:?}", histogram);

    let series = window.series.as_ref().unwrap();
    assert_eq!(series.len(), 2);
    assert!(series.points.iter().all(|p| p.value.is_some()));

    let receipt = &window.exports[0];
    let written = read_image(&receipt.path, "ndbi").unwrap();
    let ndbi = written.band("NDBI").unwrap();
    assert_eq!(ndbi.crs().and_then(CRS::epsg), Some(UTM_36N));
    assert_eq!(ndbi.cell_size(), CELL);

    // the export covers the projected district, snapped to whole cells
    let district = kasese_in_utm().bbox();
    let (min_x, min_y, max_x, max_y) = ndbi.bounds();
    assert!(min_x <= district.min_x && district.min_x - min_x < CELL);
    assert!(min_y <= district.min_y && district.min_y - min_y < CELL);
    assert!(max_x >= district.max_x && max_x - district.max_x < CELL);
    assert!(max_y >= district.max_y && max_y - district.max_y < CELL);

    let to_utm = Projection::between(&CRS::wgs84(), &CRS::from_epsg(UTM_36N)).unwrap();
    let at = |lon: f64, lat: f64| {
        let (x, y) = to_utm.apply(lon, lat);
        let (col, row) = ndbi.locate(x, y).unwrap();
        ndbi.get(row, col).unwrap()
    };
    assert!(at(30.2, 0.0) > 0.0);
    assert!(at(29.8, 0.0) < 0.0);
}

#[test]
fn scenes_outside_the_zone_are_left_out_of_the_mosaic() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());
    let recipe = Recipe::from_toml(RECIPE, tmp.path()).unwrap();

    // the same district seen from zone 35
    let source = utm_scene("LC08_35", 25, (830_000.0, 50_000.0));
    let mut other_zone = source.select(&[]).unwrap();
    for name in ["SR_B5", "SR_B6"] {
        let mut band = source.band(name).unwrap().clone();
        band.set_crs(Some(CRS::from_epsg(32635)));
        let info = source.band_info(name).unwrap().clone();
        other_zone = other_zone.with_band_info(info, band).unwrap();
    }
    let catalog = InMemoryCatalog::new()
        .with_images(
            COLLECTION,
            vec![
                utm_scene("LC08_a", 3, (130_000.0, 50_000.0)),
                utm_scene("LC08_b", 19, (130_300.0, 49_800.0)),
                other_zone,
            ],
        )
        .unwrap();
    let boundaries = BoundaryDataset::from_geojson(
        tmp.path().join("boundaries.geojson"),
        BoundarySchema::gaul(AdminLevel::District),
    )
    .unwrap();
    let report = Pipeline::new(Arc::new(boundaries), Arc::new(catalog))
        .with_exporter(Arc::new(LocalExporter::new(tmp.path().join("exports"))))
        .run(&recipe)
        .unwrap();

    let window = report.window("2023").unwrap();
    assert_eq!(window.images_used, 3);
    assert!(window.class_histogram.as_ref().unwrap().iter().all(|&n| n > 0));
}
