//! Mock archive fetcher for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::pipeline::{ArchiveFetcher, FetchError};

/// Mock implementation of the ArchiveFetcher trait.
///
/// Successful fetches write an empty placeholder archive so the path it
/// returns exists; scripted ids fail as if the link had died.
#[derive(Debug, Default)]
pub struct MockArchiveFetcher {
    fetches: Arc<RwLock<Vec<String>>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

impl MockArchiveFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every fetch of `download_id`.
    pub async fn fail_download(&self, download_id: &str) {
        self.failing.write().await.insert(download_id.to_string());
    }

    /// Download ids fetched so far, in order.
    pub async fn recorded_fetches(&self) -> Vec<String> {
        self.fetches.read().await.clone()
    }
}

#[async_trait]
impl ArchiveFetcher for MockArchiveFetcher {
    async fn fetch(&self, download_id: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        self.fetches.write().await.push(download_id.to_string());

        if self.failing.read().await.contains(download_id) {
            return Err(FetchError::Failed {
                download_id: download_id.to_string(),
                exit_code: Some(3),
            });
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let archive = dest_dir.join(format!("{}.tar", download_id));
        tokio::fs::write(&archive, b"").await?;
        Ok(archive)
    }
}
