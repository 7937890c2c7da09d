//! Error types for the STAC catalog.

use std::time::Duration;
use thiserror::Error;

/// Errors produced while searching or downloading from a STAC API.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("asset signing failed: {0}")]
    Auth(String),

    #[error("invalid STAC response: {0}")]
    InvalidResponse(String),

    #[error("item '{item}' has no asset '{asset}' for band {band}")]
    MissingAsset {
        item: String,
        asset: String,
        band: String,
    },

    #[error("unknown collection '{0}': no band profile registered")]
    UnknownCollection(String),

    #[error("STAC request timed out after {0:?}")]
    Timeout(Duration),

    #[error("core error: {0}")]
    Core(#[from] landsight_core::Error),
}

impl From<CloudError> for landsight_core::Error {
    fn from(e: CloudError) -> Self {
        match e {
            CloudError::Core(inner) => inner,
            CloudError::Timeout(after) => landsight_core::Error::Timeout {
                stage: "stac search",
                after,
            },
            other => landsight_core::Error::Catalog(other.to_string()),
        }
    }
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_pass_through() {
        let e: landsight_core::Error = CloudError::Core(landsight_core::Error::Formula("x".into())).into();
        assert!(matches!(e, landsight_core::Error::Formula(_)));
    }

    #[test]
    fn network_errors_become_catalog_errors() {
        let e: landsight_core::Error = CloudError::Network("reset".into()).into();
        assert!(matches!(e, landsight_core::Error::Catalog(msg) if msg.contains("reset")));
    }

    #[test]
    fn timeout_keeps_duration() {
        let e: landsight_core::Error = CloudError::Timeout(Duration::from_secs(3)).into();
        assert!(matches!(
            e,
            landsight_core::Error::Timeout { after, .. } if after == Duration::from_secs(3)
        ));
    }
}
