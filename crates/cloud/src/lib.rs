//! # Landsight Cloud
//!
//! Imagery from STAC APIs (Planetary Computer, Earth Search, or any custom
//! endpoint) behind the [`landsight_core::catalog::ImageCatalog`] trait.
//!
//! - [`stac_client::StacClient`]: async search with retry and pagination,
//!   Planetary Computer href signing, asset download
//! - [`profile::CollectionProfile`]: recipe band names to STAC asset keys
//!   with scale factors
//! - [`catalog::StacImageCatalog`]: blocking catalog with a deadline and an
//!   LRU asset cache

pub mod cache;
pub mod catalog;
pub mod error;
pub mod profile;
pub mod stac_client;
pub mod stac_models;

pub use catalog::{StacCatalogOptions, StacImageCatalog};
pub use error::{CloudError, Result};
pub use profile::{BandAsset, CollectionProfile};
pub use stac_client::{StacClient, StacClientOptions, StacEndpoint};
pub use stac_models::{StacItem, StacItemCollection, StacSearchParams};
