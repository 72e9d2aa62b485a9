//! Error types for the pipeline module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors fetching an archive.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The download tool ran and reported failure (after its own retries).
    #[error("Download of {download_id} failed with exit code {exit_code:?}")]
    Failed {
        download_id: String,
        exit_code: Option<i32>,
    },

    /// The download tool could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether the download id should be discarded and re-prepared.
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Errors geotagging images.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Tagging {path} failed with exit code {exit_code:?}")]
    Failed {
        path: PathBuf,
        exit_code: Option<i32>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors staging a downloaded archive.
#[derive(Debug, Error)]
pub enum StageError {
    /// The archive could not be read or unpacked.
    #[error("Invalid archive {path}: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    /// The archive holds no directory for the trajectory.
    #[error("Archive contains no directory for trajectory {trajectory_id}")]
    TrajectoryNotFound { trajectory_id: String },

    #[error("Tagging failed: {0}")]
    Tagging(#[from] TagError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StageError {
    /// Whether the archive itself is unusable, so a fresh download should be
    /// prepared instead of halting.
    pub fn is_archive_defect(&self) -> bool {
        matches!(self, Self::InvalidArchive { .. })
    }
}

/// Errors publishing images.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Authentication failed with exit code {exit_code:?}")]
    AuthenticationFailed { exit_code: Option<i32> },

    #[error("Upload of {sensor} failed with exit code {exit_code:?}")]
    Failed {
        sensor: String,
        exit_code: Option<i32>,
    },
}
