//! Export to the local file system

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};

use crate::error::{Error, ExportFailure, Result};
use crate::export::{prepare_export, ExportReceipt, ExportRequest, Exporter};
use crate::io;
use crate::raster::Image;

// Per-page tag overhead on top of 4 bytes per pixel.
const PAGE_OVERHEAD: u64 = 1024;

/// Writes GeoTIFFs under a root directory, optionally under a byte quota.
///
/// Files are written under a `.part` name and renamed into place once
/// complete, so a failed or late export never leaves a finished-looking file.
#[derive(Debug, Clone)]
pub struct LocalExporter {
    root: PathBuf,
    quota_bytes: Option<u64>,
}

impl LocalExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            quota_bytes: None,
        }
    }

    /// Limit the total size of files under the root
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn destination(&self, request: &ExportRequest) -> PathBuf {
        let dir = match &request.folder {
            Some(folder) => self.root.join(folder),
            None => self.root.clone(),
        };
        dir.join(format!("{}.tif", request.prefix))
    }

    fn check_quota(&self, needed: u64) -> Result<()> {
        let Some(quota) = self.quota_bytes else {
            return Ok(());
        };
        let used = dir_size(&self.root);
        let available = quota.saturating_sub(used);
        if needed > available {
            return Err(ExportFailure::Quota { needed, available }.into());
        }
        Ok(())
    }
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|e| match e.metadata() {
            Ok(m) if m.is_dir() => dir_size(&e.path()),
            Ok(m) => m.len(),
            Err(_) => 0,
        })
        .sum()
}

fn write_failure(path: &Path, err: std::io::Error) -> Error {
    let path = path.display().to_string();
    if err.kind() == ErrorKind::PermissionDenied {
        ExportFailure::Permission { path }.into()
    } else {
        ExportFailure::Io { path, source: err }.into()
    }
}

impl Exporter for LocalExporter {
    fn export(&self, image: &Image, request: &ExportRequest) -> Result<ExportReceipt> {
        let started = Instant::now();
        let prepared = prepare_export(image, request)?;
        let (rows, cols) = prepared.shape().unwrap_or((0, 0));
        let bands = prepared.band_count();

        let estimate = (rows as u64 * cols as u64 * 4 + PAGE_OVERHEAD).saturating_mul(bands as u64);
        self.check_quota(estimate)?;

        let path = self.destination(request);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_failure(parent, e))?;
        }
        let partial = path.with_extension("tif.part");
        let written = match io::write_image(&prepared, &partial) {
            Ok(()) => Ok(()),
            Err(Error::Io(e)) => Err(write_failure(&path, e)),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }

        if request.expired() {
            let _ = std::fs::remove_file(&partial);
            warn!("{} finished after its deadline, discarded", path.display());
            return Err(Error::Timeout {
                stage: "export",
                after: started.elapsed(),
            });
        }
        if let Err(e) = std::fs::rename(&partial, &path) {
            let _ = std::fs::remove_file(&partial);
            return Err(write_failure(&path, e));
        }

        let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(estimate);
        info!(
            "exported {} ({}x{} px, {} band(s), {} bytes)",
            path.display(),
            cols,
            rows,
            bands,
            bytes
        );
        Ok(ExportReceipt {
            path,
            rows,
            cols,
            bands,
            bytes,
        })
    }
}
