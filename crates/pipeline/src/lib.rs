//! # Landsight Pipeline
//!
//! Recipe-driven runs of the landsight stages:
//!
//! 1. resolve the administrative region from a boundary dataset
//! 2. select images by collection, bounds, dates and cloud cover, and reduce
//!    them to one composite per window
//! 3. clip, add spectral indices, optionally classify
//! 4. export, render a preview, and summarise
//!
//! Recipes are TOML files (see [`recipe::Recipe`]). Selection and export run
//! under stage deadlines; batches of recipes fan out with
//! [`fanout::run_many`].
//!
//! ## Usage
//!
//! ```ignore
//! use landsight_pipeline::{Pipeline, Recipe};
//!
//! let recipe = Recipe::from_path("recipes/kasese_ndbi.toml")?;
//! let report = Pipeline::for_recipe(&recipe)?
//!     .with_exporter(Arc::new(LocalExporter::new("out")))
//!     .run(&recipe)?;
//! ```

pub mod deadline;
pub mod fanout;
pub mod recipe;
pub mod runner;
pub mod selection;

pub use deadline::{run_with_deadline, StageTimeouts};
pub use fanout::{run_many, ProcessingMode, RecipeOutcome};
pub use recipe::Recipe;
pub use runner::{ChangeReport, LayerSummary, Pipeline, RunReport, WindowReport};
pub use selection::{select, select_collection, Selection, SelectionParams};
