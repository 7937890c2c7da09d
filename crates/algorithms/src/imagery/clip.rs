//! Clip rasters to a region
//!
//! Pixels whose centre falls outside the region become [`NODATA`]. The grid
//! itself is unchanged so clipped layers stay aligned with their source.

use crate::maybe_rayon::*;
use crate::util::build_output;
use landsight_core::crs::same_crs;
use landsight_core::raster::{Image, Raster, NODATA};
use landsight_core::vector::Region;
use landsight_core::{Error, Result};

pub(crate) fn check_crs(raster: &Raster<f64>, region: &Region) -> Result<()> {
    if raster.crs().is_some() && !same_crs(raster.crs(), Some(region.crs())) {
        return Err(Error::SpatialRefMismatch(format!(
            "region '{}' is in {} but raster is in {}",
            region.name(),
            region.crs().identifier(),
            raster.crs().map(|c| c.identifier()).unwrap_or_default()
        )));
    }
    Ok(())
}

/// Mask every pixel outside `region`
pub fn clip_to_region(raster: &Raster<f64>, region: &Region) -> Result<Raster<f64>> {
    check_crs(raster, region)?;
    let (rows, cols) = raster.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![NODATA; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let (x, y) = raster.pixel_to_geo(col, row);
                if region.contains_point(x, y) {
                    let v = unsafe { raster.get_unchecked(row, col) };
                    if v.is_finite() {
                        *out = v;
                    }
                }
            }
            row_data
        })
        .collect();

    build_output(raster, data)
}

/// Clip every band of an image
pub fn clip_image(image: &Image, region: &Region) -> Result<Image> {
    let mut out = image.select(&[])?;
    for info in image.bands() {
        let clipped = clip_to_region(image.band(&info.name)?, region)?;
        out = out.with_band_info(info.clone(), clipped)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiPolygon, Polygon};
    use landsight_core::{GeoTransform, CRS};

    fn triangle() -> Region {
        let poly = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (0.0, 4.0), (0.0, 0.0)]),
            vec![],
        );
        Region::new("tri", MultiPolygon::new(vec![poly])).unwrap()
    }

    fn grid() -> Raster<f64> {
        let mut r = Raster::filled(4, 4, 1.0);
        r.set_transform(GeoTransform::new(0.0, 4.0, 1.0, -1.0));
        r.set_crs(Some(CRS::wgs84()));
        r.set_nodata(Some(NODATA));
        r
    }

    #[test]
    fn test_clip_masks_outside() {
        let clipped = clip_to_region(&grid(), &triangle()).unwrap();
        // bottom-left centre (0.5, 0.5) is inside
        assert_eq!(clipped.get(3, 0).unwrap(), 1.0);
        // top-right centre (3.5, 3.5) is outside
        assert_eq!(clipped.get(0, 3).unwrap(), NODATA);
        assert!(clipped.same_grid(&grid()));
        // centres with x + y < 4: 6 of 16, plus the 4 on the diagonal edge
        assert_eq!(clipped.valid_count(), 10);
    }

    #[test]
    fn test_clip_rejects_other_crs() {
        let mut utm = grid();
        utm.set_crs(Some(CRS::from_epsg(32636)));
        assert!(matches!(
            clip_to_region(&utm, &triangle()),
            Err(Error::SpatialRefMismatch(_))
        ));
    }
}
