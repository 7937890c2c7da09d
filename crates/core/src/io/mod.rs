//! I/O for reading and writing georeferenced rasters

mod geotiff;

pub use geotiff::{
    read_bands, read_bands_from_buffer, read_geotiff, read_geotiff_from_buffer, read_image,
    write_bands, write_geotiff, write_geotiff_to_buffer, write_image,
};
