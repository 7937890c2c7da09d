//! Stage deadlines
//!
//! A guarded stage runs on its own thread and reports back over a
//! `crossbeam_channel`. If nothing arrives before the deadline the caller
//! gets [`Error::Timeout`]; the worker is detached and its late result is
//! dropped.

use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use landsight_core::{Error, Result};

/// Deadlines for the stages that depend on external services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TimeoutSecs", into = "TimeoutSecs")]
pub struct StageTimeouts {
    /// Catalog query, filtering and reduction
    pub selection: Duration,
    /// Writing to the export destination
    pub export: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            selection: Duration::from_secs(300),
            export: Duration::from_secs(600),
        }
    }
}

/// TOML form: whole seconds
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimeoutSecs {
    #[serde(default = "default_selection_secs")]
    selection_secs: u64,
    #[serde(default = "default_export_secs")]
    export_secs: u64,
}

fn default_selection_secs() -> u64 {
    StageTimeouts::default().selection.as_secs()
}

fn default_export_secs() -> u64 {
    StageTimeouts::default().export.as_secs()
}

impl From<TimeoutSecs> for StageTimeouts {
    fn from(t: TimeoutSecs) -> Self {
        Self {
            selection: Duration::from_secs(t.selection_secs),
            export: Duration::from_secs(t.export_secs),
        }
    }
}

impl From<StageTimeouts> for TimeoutSecs {
    fn from(t: StageTimeouts) -> Self {
        Self {
            selection_secs: t.selection.as_secs(),
            export_secs: t.export.as_secs(),
        }
    }
}

/// Run `f` on a worker thread and wait at most `limit` for its result
pub fn run_with_deadline<T, F>(stage: &'static str, limit: Duration, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);

    thread::Builder::new()
        .name(format!("landsight-{}", stage))
        .spawn(move || {
            // receiver may be gone after a timeout
            let _ = tx.send(f());
        })
        .map_err(|e| Error::Other(format!("cannot start {} worker: {}", stage, e)))?;

    match rx.recv_timeout(limit) {
        Ok(result) => {
            debug!("{} finished within {:?}", stage, limit);
            result
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!("{} exceeded {:?}, abandoning", stage, limit);
            Err(Error::Timeout { stage, after: limit })
        }
        Err(RecvTimeoutError::Disconnected) => Err(Error::Other(format!("{} worker panicked", stage))),
    }
}
