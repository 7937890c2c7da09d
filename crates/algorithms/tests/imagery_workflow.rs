//! Composite → index → classification on synthetic Landsat scenes.

use chrono::{TimeZone, Utc};
use landsight_algorithms::classification::{train, ClassifierKind, RandomForest, SampleSet, TrainParams};
use landsight_algorithms::composite::{reduce, Reducer};
use landsight_algorithms::imagery::{add_index, compute_index, IndexFormula, IndexSpec};
use landsight_core::raster::{Image, ImageCollection, Raster, ScaleFactor, NODATA};
use landsight_core::{GeoTransform, CRS};

const ROWS: usize = 30;
const COLS: usize = 30;

/// Three land covers in vertical stripes: water, vegetation, built-up
fn cover(col: usize) -> usize {
    col / 10
}

fn band(values: impl Fn(usize, usize) -> f64) -> Raster<f64> {
    let mut r = Raster::filled(ROWS, COLS, 0.0);
    r.set_transform(GeoTransform::new(30.0, 0.3, 0.01, -0.01));
    r.set_crs(Some(CRS::wgs84()));
    r.set_nodata(Some(NODATA));
    for row in 0..ROWS {
        for col in 0..COLS {
            r.set(row, col, values(row, col)).unwrap();
        }
    }
    r
}

/// Stored Collection 2 integers for (green, NIR, SWIR1) per cover
fn stored(cover: usize) -> [f64; 3] {
    match cover {
        0 => [12000.0, 8500.0, 8000.0],
        1 => [10000.0, 22000.0, 14000.0],
        _ => [13000.0, 15000.0, 19000.0],
    }
}

fn scene(id: &str, day: u32, noise: f64) -> Image {
    let names = ["SR_B3", "SR_B5", "SR_B6"];
    let mut img = Image::new(id)
        .with_timestamp(Utc.with_ymd_and_hms(2023, 6, day, 10, 0, 0).unwrap())
        .with_property("CLOUD_COVER", 10.0);
    for (i, name) in names.iter().enumerate() {
        let b = band(|row, col| stored(cover(col))[i] + noise * ((row + col) % 3) as f64);
        img = img
            .with_scaled_band(*name, b, ScaleFactor::LANDSAT_C2_REFLECTANCE)
            .unwrap();
    }
    img
}

fn composite() -> Image {
    let c = ImageCollection::new(vec![scene("a", 1, 50.0), scene("b", 17, -50.0), scene("c", 25, 0.0)]);
    reduce(&c, Reducer::Median).unwrap()
}

fn pixel_centre(row: usize, col: usize) -> (f64, f64) {
    (30.0 + (col as f64 + 0.5) * 0.01, 0.3 - (row as f64 + 0.5) * 0.01)
}

#[test]
fn ndbi_in_range_and_idempotent() {
    let img = composite();
    let spec = IndexSpec::new("NDBI", IndexFormula::normalized_difference("SR_B6", "SR_B5"));

    let first = compute_index(&img, &spec).unwrap();
    let second = compute_index(&img, &spec).unwrap();
    assert_eq!(first.data(), second.data());

    for v in first.data().iter() {
        assert!(*v == NODATA || (-1.0..=1.0).contains(v), "NDBI out of range: {}", v);
    }
    // built-up stripe is positive, vegetation negative
    assert!(first.get(5, 25).unwrap() > 0.0);
    assert!(first.get(5, 15).unwrap() < 0.0);
}

#[test]
fn random_forest_round_trip_labels_in_range() {
    let img = add_index(
        &composite(),
        &IndexSpec::new("NDBI", IndexFormula::normalized_difference("SR_B6", "SR_B5")),
    )
    .unwrap();

    let mut samples = SampleSet::default();
    for class in 0..3u8 {
        let col = class as usize * 10 + 4;
        let points = (0..5).map(|k| pixel_centre(k * 6 + 1, col));
        samples = samples.merge(SampleSet::from_points(points, class));
    }

    let params = TrainParams::new(3, vec!["SR_B3".into(), "SR_B5".into(), "SR_B6".into(), "NDBI".into()])
        .with_classifier(ClassifierKind::RandomForest(
            RandomForest::default().with_trees(15).with_seed(2023),
        ));
    let trained = train(&img, &samples, &params).unwrap();
    let classified = trained.classify(&img).unwrap();

    assert_eq!(classified.raster().shape(), (ROWS, COLS));
    assert!(classified.raster().same_grid(img.band("SR_B5").unwrap()));
    assert!(classified.raster().data().iter().all(|v| *v <= 2));
    assert_eq!(classified.raster().get(20, 3).unwrap(), 0);
    assert_eq!(classified.raster().get(20, 13).unwrap(), 1);
    assert_eq!(classified.raster().get(20, 23).unwrap(), 2);
}

#[test]
fn sample_outside_extent_fails_training() {
    let samples = SampleSet::from_points([pixel_centre(1, 1)], 0)
        .merge(SampleSet::from_points([(45.0, 10.0)], 1));
    let params = TrainParams::new(2, vec!["SR_B5".into()]);
    assert!(train(&composite(), &samples, &params).is_err());
}
