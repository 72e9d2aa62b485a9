//! Types for the trajectory scheduler.

use thiserror::Error;

use crate::pipeline::{FetchError, StageError, UploadError};
use crate::trajectory::{Sensor, StoreError};

/// Errors that halt the scheduler.
///
/// Recoverable conditions (service hiccups, dead download links, oversized
/// archives) are handled inside a cycle and never surface here.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// State store error.
    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    /// Local download failure (tool missing, disk error).
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Staging failure other than a defective archive.
    #[error("staging error: {0}")]
    Stage(#[from] StageError),

    /// Upload failure; the trajectory is partially published.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// The staged payload has no images for a pending sensor.
    #[error("no {sensor} images for trajectory {trajectory_id}")]
    MissingSensorData {
        trajectory_id: String,
        sensor: Sensor,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What one scheduler cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No uncompleted trajectories remain.
    Finished,
    /// Nothing was ready to download.
    Idle,
    /// A trajectory was downloaded and its pending sensors uploaded.
    Published {
        trajectory_id: String,
        sensors_uploaded: usize,
    },
    /// The download failed; the trajectory was reset for re-preparation.
    FetchFailed { trajectory_id: String },
    /// The archive was unreadable; the trajectory was reset for re-preparation.
    ArchiveRejected { trajectory_id: String },
}
