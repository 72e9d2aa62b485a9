//! Mock uploader for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::pipeline::{UploadError, Uploader};
use crate::trajectory::Sensor;

/// A successful upload for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub sensor: Sensor,
    pub dirs: Vec<PathBuf>,
}

/// Mock implementation of the Uploader trait.
///
/// Only successful uploads are recorded; `attempt_count` includes failures.
#[derive(Debug, Default)]
pub struct MockUploader {
    uploads: Arc<RwLock<Vec<RecordedUpload>>>,
    attempts: Arc<RwLock<usize>>,
    failing: Arc<RwLock<HashSet<Sensor>>>,
}

impl MockUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every upload of `sensor` until cleared.
    pub async fn fail_on(&self, sensor: Sensor) {
        self.failing.write().await.insert(sensor);
    }

    /// Clear scripted failures.
    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
    }

    pub async fn recorded_uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.read().await.clone()
    }

    pub async fn attempt_count(&self) -> usize {
        *self.attempts.read().await
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(&self, sensor_dirs: &[PathBuf], sensor: Sensor) -> Result<(), UploadError> {
        *self.attempts.write().await += 1;

        if self.failing.read().await.contains(&sensor) {
            return Err(UploadError::Failed {
                sensor: sensor.to_string(),
                exit_code: Some(1),
            });
        }

        self.uploads.write().await.push(RecordedUpload {
            sensor,
            dirs: sensor_dirs.to_vec(),
        });
        Ok(())
    }
}
