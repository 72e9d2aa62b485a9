//! Trait definitions for the pipeline module.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::error::{FetchError, StageError, TagError, UploadError};
use super::layout;
use crate::trajectory::Sensor;

/// Downloads prepared archives.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Fetch the archive for `download_id` into `dest_dir` and return its path.
    async fn fetch(&self, download_id: &str, dest_dir: &Path) -> Result<PathBuf, FetchError>;
}

/// Counts from one tagging run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagSummary {
    pub tagged: usize,
    /// Images without a catalog point.
    pub skipped: usize,
}

/// Writes position and capture time into images.
#[async_trait]
pub trait ImageTagger: Send + Sync {
    async fn tag(&self, trajectory_dirs: &[PathBuf]) -> Result<TagSummary, TagError>;
}

/// A downloaded trajectory ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPayload {
    pub download_id: String,
    /// Extraction root.
    pub root: PathBuf,
    /// Kept trajectory directories (one per delivery lot).
    pub trajectory_dirs: Vec<PathBuf>,
}

impl StagedPayload {
    /// Image directories of `sensor` across all kept trajectory directories.
    pub fn sensor_dirs(&self, sensor: Sensor) -> std::io::Result<Vec<PathBuf>> {
        layout::sensor_dirs(&self.trajectory_dirs, sensor)
    }
}

/// Turns a fetched archive into an upload-ready payload.
#[async_trait]
pub trait PayloadStager: Send + Sync {
    /// Extract, prune, drop unused orientations, and tag.
    async fn stage(
        &self,
        archive: &Path,
        download_id: &str,
        trajectory_id: &str,
    ) -> Result<StagedPayload, StageError>;

    /// Remove every local file belonging to `download_id`.
    async fn release(&self, download_id: &str) -> Result<(), StageError>;
}

/// Publishes one sensor direction of a trajectory.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, sensor_dirs: &[PathBuf], sensor: Sensor) -> Result<(), UploadError>;
}
