//! End-to-end runs over a synthetic Kasese district and Landsat scenes.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use chrono::{TimeZone, Utc};
use landsight_core::catalog::{CatalogQuery, ImageCatalog, InMemoryCatalog};
use landsight_core::export::LocalExporter;
use landsight_core::io::read_image;
use landsight_core::raster::{Image, ImageCollection, Raster, ScaleFactor, NODATA};
use landsight_core::vector::{AdminLevel, BoundaryDataset, BoundarySchema};
use landsight_core::{Error, ExportFailure, GeoTransform, Result, CRS};
use landsight_pipeline::{run_many, Pipeline, ProcessingMode, Recipe};
use tempfile::TempDir;

const COLLECTION: &str = "LANDSAT/LC08/C02/T1_L2";
const KASESE: [f64; 4] = [29.75, -0.375, 30.25, 0.375];

// 32 x 32 pixels of 1/32 degree around the district
const SIZE: usize = 32;
const PIXEL: f64 = 0.03125;
const ORIGIN: (f64, f64) = (29.5, 0.5);

const BOUNDARIES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": { "ADM0_NAME": "Uganda", "ADM2_NAME": "Kasese" },
      "geometry": { "type": "Polygon", "coordinates": [[
        [29.75, -0.375], [30.25, -0.375], [30.25, 0.375], [29.75, 0.375], [29.75, -0.375]
      ]] }
    },
    {
      "type": "Feature",
      "properties": { "ADM0_NAME": "Uganda", "ADM2_NAME": "Bundibugyo" },
      "geometry": { "type": "Polygon", "coordinates": [[
        [29.9, 0.5], [30.3, 0.5], [30.3, 0.9], [29.9, 0.9], [29.9, 0.5]
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
      "geometry": { "type": "Point", "coordinates": [30.1, 0.1] } },
    { "type": "Feature", "properties": { "landcover": 1 },
      "geometry": { "type": "Point", "coordinates": [30.2, -0.2] } }
  ]
}"#;

fn recipe_text(extra: &str) -> String {
    format!(
        r#"
name = "kasese_ndbi"

[region]
schema = "gaul"
boundaries = "boundaries.geojson"
country = "Uganda"
names = ["Kasese"]

[catalog]
kind = "local"
path = "unused"

[selection]
collection = "{COLLECTION}"
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

{extra}
"#
    )
}

/// West of `split` is vegetation, east is built-up
fn scene(id: &str, (y, m, d): (i32, u32, u32), cloud: f64, split: f64, origin: (f64, f64)) -> Image {
    let band = |stored: &dyn Fn(f64) -> f64| {
        let mut r = Raster::filled(SIZE, SIZE, 0.0);
        r.set_transform(GeoTransform::new(origin.0, origin.1, PIXEL, -PIXEL));
        r.set_crs(Some(CRS::wgs84()));
        r.set_nodata(Some(NODATA));
        for row in 0..SIZE {
            for col in 0..SIZE {
                let x = origin.0 + (col as f64 + 0.5) * PIXEL;
                r.set(row, col, stored(x)).unwrap();
            }
        }
        r
    };
    let nir = band(&|x| if x < split { 22000.0 } else { 15000.0 });
    let swir = band(&|x| if x < split { 14000.0 } else { 19000.0 });

    Image::new(id)
        .with_timestamp(Utc.with_ymd_and_hms(y, m, d, 8, 0, 0).unwrap())
        .with_property("CLOUD_COVER", cloud)
        .with_scaled_band("SR_B5", nir, ScaleFactor::LANDSAT_C2_REFLECTANCE)
        .unwrap()
        .with_scaled_band("SR_B6", swir, ScaleFactor::LANDSAT_C2_REFLECTANCE)
        .unwrap()
}

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_images(
            COLLECTION,
            vec![
                scene("LC08_a", (2023, 2, 3), 5.0, 30.0, ORIGIN),
                scene("LC08_b", (2023, 6, 14), 30.0, 30.0, ORIGIN),
                scene("LC08_c", (2023, 9, 20), 12.0, 30.0, ORIGIN),
                // excluded: previous year, too cloudy, elsewhere
                scene("LC08_old", (2022, 12, 31), 0.0, 29.6, ORIGIN),
                scene("LC08_cloudy", (2023, 4, 1), 61.0, 29.6, ORIGIN),
                scene("LC08_far", (2023, 5, 1), 0.0, 29.6, (10.0, 50.0)),
            ],
        )
        .unwrap()
}

fn write_inputs(dir: &Path) {
    std::fs::write(dir.join("boundaries.geojson"), BOUNDARIES).unwrap();
    std::fs::write(dir.join("samples.geojson"), SAMPLES).unwrap();
}

fn pipeline(dir: &Path, catalog: Arc<dyn ImageCatalog>) -> Pipeline {
    let boundaries = BoundaryDataset::from_geojson(
        dir.join("boundaries.geojson"),
        BoundarySchema::gaul(AdminLevel::District),
    )
    .unwrap();
    Pipeline::new(Arc::new(boundaries), catalog)
        .with_exporter(Arc::new(LocalExporter::new(dir.join("exports"))))
        .with_output_dir(dir.join("previews"))
}

#[test]
fn ndbi_composite_is_exported_over_the_district() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());
    let recipe = Recipe::from_toml(&recipe_text("[export]\nfolder = \"gee\""), tmp.path()).unwrap();

    let report = pipeline(tmp.path(), Arc::new(catalog())).run(&recipe).unwrap();
    let window = report.window("2023").unwrap();
    assert_eq!(window.images_found, 6);
    assert_eq!(window.images_used, 3);
    assert_eq!(report.region_bbox.to_array(), KASESE);

    let ndbi = &window.layers[0];
    assert_eq!(ndbi.name, "NDBI");
    assert!(ndbi.stats.is_some());

    let receipt = &window.exports[0];
    assert_eq!(receipt.path, tmp.path().join("exports/gee/kasese_ndbi_2023.tif"));
    assert_eq!((receipt.rows, receipt.cols, receipt.bands), (24, 16, 1));

    let written = read_image(&receipt.path, "ndbi").unwrap();
    let band = written.band("NDBI").unwrap();
    let (min_x, min_y, max_x, max_y) = band.bounds();
    for (got, want) in [min_x, min_y, max_x, max_y].into_iter().zip(KASESE) {
        assert_abs_diff_eq!(got, want, epsilon = 1e-9);
    }
    for v in band.data().iter() {
        assert!(*v == NODATA || (-1.0..=1.0).contains(v), "NDBI out of range: {}", v);
    }
    // built-up east of 30.0 is positive, vegetation west is negative
    assert!(band.get(12, 12).unwrap() > 0.0);
    assert!(band.get(12, 2).unwrap() < 0.0);
}

#[test]
fn classification_and_preview_follow_the_composite() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());
    let extra = r#"
[classify]
class_count = 2
bands = ["SR_B5", "SR_B6", "NDBI"]
samples = "samples.geojson"
classifier = { kind = "minimum_distance" }

[preview]
bands = ["NDBI"]
min = -0.5
max = 0.5
scheme = "built_up"

[series]
band = "SR_B6"
"#;
    let recipe = Recipe::from_toml(&recipe_text(extra), tmp.path()).unwrap();
    let report = pipeline(tmp.path(), Arc::new(catalog())).run(&recipe).unwrap();
    let window = &report.windows[0];

    assert!(window.bands.contains(&"classification".to_string()));
    let histogram = window.class_histogram.as_ref().unwrap();
    // 8 vegetation and 8 built-up columns over 24 rows inside the district
    assert_eq!(histogram, &vec![192, 192]);

    let preview = window.preview.as_ref().unwrap();
    assert!(preview.exists());
    assert_eq!(window.series.as_ref().unwrap().len(), 3);
    assert!(tmp.path().join("previews/kasese_ndbi_2023_series.json").exists());
}

#[test]
fn change_between_windows_marks_new_built_up_land() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());

    // built-up spreads west between the two halves of the year
    let catalog = InMemoryCatalog::new()
        .with_images(
            COLLECTION,
            vec![
                scene("early", (2023, 3, 1), 5.0, 30.125, ORIGIN),
                scene("late", (2023, 10, 1), 5.0, 29.875, ORIGIN),
            ],
        )
        .unwrap();
    let text = recipe_text(
        r#"
[[windows]]
name = "late"
start = "2023-07-01"
end = "2024-01-01"

[change]
band = "NDBI"
before = "2023"
after = "late"
thresholds = { decrease_threshold = -0.2, increase_threshold = 0.2 }

[export]
max_pixels = 1000000
"#,
    )
    .replace("end = \"2024-01-01\"\n\n[[indices]]", "end = \"2023-07-01\"\n\n[[indices]]");
    let recipe = Recipe::from_toml(&text, tmp.path()).unwrap();
    let report = pipeline(tmp.path(), Arc::new(catalog)).run(&recipe).unwrap();

    let change = report.change.as_ref().unwrap();
    // columns between 29.875 and 30.125 over 24 rows
    assert_eq!(change.summary.increase, 8 * 24);
    assert_eq!(change.summary.decrease, 0);
    let export = change.export.as_ref().unwrap();
    assert_eq!(export.bands, 2);
    assert!(export.path.ends_with("kasese_ndbi_change_2023_late.tif"));
}

#[test]
fn pixel_cap_fails_the_recipe() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());
    let recipe = Recipe::from_toml(&recipe_text("[export]\nmax_pixels = 100"), tmp.path()).unwrap();

    let err = pipeline(tmp.path(), Arc::new(catalog())).run(&recipe).unwrap_err();
    assert!(matches!(
        err,
        Error::Export(ExportFailure::PixelCap { requested: 384, cap: 100 })
    ));
    assert!(!tmp.path().join("exports/kasese_ndbi_2023.tif").exists());
}

#[test]
fn no_matching_images_is_an_empty_collection() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());
    let text = recipe_text("").replace("max_cloud = 30.0", "max_cloud = 1.0");
    let recipe = Recipe::from_toml(&text, tmp.path()).unwrap();

    let err = pipeline(tmp.path(), Arc::new(catalog())).run(&recipe).unwrap_err();
    assert!(matches!(err, Error::EmptyCollection { .. }));
}

#[test]
fn unknown_district_fails_resolution() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());
    let text = recipe_text("").replace("[\"Kasese\"]", "[\"Atlantis\"]");
    let recipe = Recipe::from_toml(&text, tmp.path()).unwrap();

    let err = pipeline(tmp.path(), Arc::new(catalog())).run(&recipe).unwrap_err();
    assert!(matches!(err, Error::Resolution { .. }));
}

struct SlowCatalog(InMemoryCatalog);

impl ImageCatalog for SlowCatalog {
    fn name(&self) -> &str {
        "slow"
    }

    fn search(&self, query: &CatalogQuery) -> Result<ImageCollection> {
        thread::sleep(Duration::from_millis(500));
        self.0.search(query)
    }
}

#[test]
fn slow_selection_times_out() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());
    let mut recipe = Recipe::from_toml(&recipe_text(""), tmp.path()).unwrap();
    recipe.timeouts.selection = Duration::from_millis(50);

    let err = pipeline(tmp.path(), Arc::new(SlowCatalog(catalog()))).run(&recipe).unwrap_err();
    assert!(matches!(err, Error::Timeout { stage: "selection", .. }));
}

#[test]
fn batch_keeps_each_outcome() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());
    let good = Recipe::from_toml(&recipe_text(""), tmp.path()).unwrap();
    let mut bad = good.clone();
    bad.name = "atlantis".into();
    bad.region.names = vec!["Atlantis".into()];

    let catalog: Arc<dyn ImageCatalog> = Arc::new(catalog());
    let outcomes = run_many(&[good, bad], ProcessingMode::ParallelWith(2), |_| {
        Ok(pipeline(tmp.path(), Arc::clone(&catalog)))
    })
    .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].recipe, "kasese_ndbi");
    assert!(outcomes[0].is_ok());
    assert!(!outcomes[1].is_ok());
}
