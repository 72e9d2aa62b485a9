//! Mock payload stager for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::base_trajectory_id;
use crate::pipeline::layout::{RAW_IMAGES_DIR, SENSOR_DIR_PREFIX, TRAJECTORY_DIR_PREFIX};
use crate::pipeline::{PayloadStager, StageError, StagedPayload};
use crate::trajectory::Sensor;

/// Mock implementation of the PayloadStager trait.
///
/// Instead of unpacking the archive it lays out a minimal payload under
/// `work_dir/<download_id>/` with one image per uploadable sensor, so the
/// scheduler's directory lookups behave as with a real archive.
#[derive(Debug)]
pub struct MockPayloadStager {
    work_dir: PathBuf,
    staged: Arc<RwLock<Vec<(String, String)>>>,
    released: Arc<RwLock<Vec<String>>>,
    rejected: Arc<RwLock<HashSet<String>>>,
    omitted_sensors: Arc<RwLock<HashSet<Sensor>>>,
    next_error: Arc<RwLock<Option<StageError>>>,
}

impl MockPayloadStager {
    pub fn new(work_dir: impl AsRef<Path>) -> Self {
        Self {
            work_dir: work_dir.as_ref().to_path_buf(),
            staged: Arc::new(RwLock::new(Vec::new())),
            released: Arc::new(RwLock::new(Vec::new())),
            rejected: Arc::new(RwLock::new(HashSet::new())),
            omitted_sensors: Arc::new(RwLock::new(HashSet::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Treat the archive of `download_id` as corrupt.
    pub async fn reject_archive(&self, download_id: &str) {
        self.rejected.write().await.insert(download_id.to_string());
    }

    /// Leave `sensor` out of staged payloads.
    pub async fn omit_sensor(&self, sensor: Sensor) {
        self.omitted_sensors.write().await.insert(sensor);
    }

    /// Configure the next stage call to fail with the given error.
    pub async fn set_next_error(&self, error: StageError) {
        *self.next_error.write().await = Some(error);
    }

    /// `(download_id, trajectory_id)` pairs staged so far.
    pub async fn recorded_stages(&self) -> Vec<(String, String)> {
        self.staged.read().await.clone()
    }

    /// Download ids released so far.
    pub async fn released(&self) -> Vec<String> {
        self.released.read().await.clone()
    }
}

#[async_trait]
impl PayloadStager for MockPayloadStager {
    async fn stage(
        &self,
        archive: &Path,
        download_id: &str,
        trajectory_id: &str,
    ) -> Result<StagedPayload, StageError> {
        self.staged
            .write()
            .await
            .push((download_id.to_string(), trajectory_id.to_string()));

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        if self.rejected.read().await.contains(download_id) {
            return Err(StageError::InvalidArchive {
                path: archive.to_path_buf(),
                reason: "mock corrupt archive".to_string(),
            });
        }

        let root = self.work_dir.join(download_id);
        let trajectory_dir = root.join("Lot_1").join(RAW_IMAGES_DIR).join(format!(
            "{}{}",
            TRAJECTORY_DIR_PREFIX,
            base_trajectory_id(trajectory_id)
        ));
        let omitted = self.omitted_sensors.read().await.clone();
        for sensor in Sensor::ALL.into_iter().filter(|s| !omitted.contains(s)) {
            let dir = trajectory_dir.join(format!("{}1{}", SENSOR_DIR_PREFIX, sensor.number()));
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(dir.join("image_0001.jpg"), b"jpeg").await?;
        }
        if let Err(e) = tokio::fs::remove_file(archive).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }

        Ok(StagedPayload {
            download_id: download_id.to_string(),
            root,
            trajectory_dirs: vec![trajectory_dir],
        })
    }

    async fn release(&self, download_id: &str) -> Result<(), StageError> {
        self.released.write().await.push(download_id.to_string());
        let root = self.work_dir.join(download_id);
        if root.exists() {
            tokio::fs::remove_dir_all(&root).await?;
        }
        Ok(())
    }
}
