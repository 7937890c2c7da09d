//! # Landsight Colormap
//!
//! Visualization parameters and raster-to-RGBA rendering for landsight.
//!
//! Palettes are lists of CSS colour names or hex strings spread over a
//! `min`/`max` stretch. Single bands render through a palette, three bands
//! render as an RGB composite, and classified rasters render with one
//! color per class.
//!
//! ## Usage
//!
//! ```ignore
//! use landsight_colormap::{render_band, ColorScheme, VisParams};
//!
//! let vis = VisParams::new(-1.0, 1.0).with_scheme(ColorScheme::BuiltUp);
//! let rgba = render_band(&ndbi, &vis)?;
//! ```

mod palette;
mod render;

pub use palette::{ColorScheme, Palette, Rgb};
pub use render::{
    auto_params, render_band, render_classes, render_image, render_rgb, Legend, RgbaImage,
    VisParams,
};
