//! Archive extraction and payload preparation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::error::StageError;
use super::layout;
use super::traits::{ImageTagger, PayloadStager, StagedPayload};
use crate::catalog::base_trajectory_id;

/// Stages archives under `work_dir/<download_id>/`.
pub struct ArchivePayloadStager {
    work_dir: PathBuf,
    tagger: Arc<dyn ImageTagger>,
}

impl ArchivePayloadStager {
    pub fn new(work_dir: impl Into<PathBuf>, tagger: Arc<dyn ImageTagger>) -> Self {
        Self {
            work_dir: work_dir.into(),
            tagger,
        }
    }

    /// Extraction root for a download.
    pub fn payload_root(&self, download_id: &str) -> PathBuf {
        self.work_dir.join(download_id)
    }
}

async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

async fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, StageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StageError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StageError::Internal(format!("Staging task failed: {}", e)))?
}

#[async_trait]
impl PayloadStager for ArchivePayloadStager {
    async fn stage(
        &self,
        archive: &Path,
        download_id: &str,
        trajectory_id: &str,
    ) -> Result<StagedPayload, StageError> {
        let root = self.payload_root(download_id);
        remove_dir_if_exists(&root).await?;

        {
            let archive = archive.to_path_buf();
            let root = root.clone();
            blocking(move || {
                layout::extract_archive(&archive, &root).map_err(|e| {
                    StageError::InvalidArchive {
                        path: archive.clone(),
                        reason: e.to_string(),
                    }
                })
            })
            .await?;
        }
        remove_file_if_exists(archive).await?;
        debug!(download_id, root = %root.display(), "Archive extracted");

        let base_id = base_trajectory_id(trajectory_id).to_string();
        let trajectory_dirs = {
            let root = root.clone();
            let trajectory_id = trajectory_id.to_string();
            blocking(move || {
                let dirs = layout::trajectory_dirs(&root, &base_id)?;
                if dirs.is_empty() {
                    return Err(StageError::TrajectoryNotFound { trajectory_id });
                }
                let pruned = layout::prune_other_trajectories(&root, &dirs)?;
                let dropped = layout::drop_vertical_orientations(&dirs)?;
                debug!(
                    trajectory_id = %trajectory_id,
                    pruned,
                    dropped,
                    "Pruned payload"
                );
                Ok(dirs)
            })
            .await?
        };

        let summary = self.tagger.tag(&trajectory_dirs).await?;
        info!(
            download_id,
            trajectory_id,
            dirs = trajectory_dirs.len(),
            tagged = summary.tagged,
            "Payload staged"
        );

        Ok(StagedPayload {
            download_id: download_id.to_string(),
            root,
            trajectory_dirs,
        })
    }

    async fn release(&self, download_id: &str) -> Result<(), StageError> {
        remove_file_if_exists(&self.work_dir.join(format!("{}.tar", download_id))).await?;
        remove_dir_if_exists(&self.payload_root(download_id)).await?;
        debug!(download_id, "Released local payload");
        Ok(())
    }
}
