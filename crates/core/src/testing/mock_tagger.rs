//! Mock image tagger for testing.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::pipeline::{ImageTagger, TagError, TagSummary};

/// Mock implementation of the ImageTagger trait.
#[derive(Debug, Default)]
pub struct MockImageTagger {
    calls: Arc<RwLock<Vec<Vec<PathBuf>>>>,
    fail_next: Arc<RwLock<bool>>,
}

impl MockImageTagger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next tag call as if exiftool had exited non-zero.
    pub async fn fail_next(&self) {
        *self.fail_next.write().await = true;
    }

    /// Directory sets passed to `tag`, in call order.
    pub async fn recorded_calls(&self) -> Vec<Vec<PathBuf>> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl ImageTagger for MockImageTagger {
    async fn tag(&self, trajectory_dirs: &[PathBuf]) -> Result<TagSummary, TagError> {
        self.calls.write().await.push(trajectory_dirs.to_vec());

        let fail = std::mem::take(&mut *self.fail_next.write().await);
        if fail {
            return Err(TagError::Failed {
                path: trajectory_dirs.first().cloned().unwrap_or_default(),
                exit_code: Some(1),
            });
        }

        Ok(TagSummary {
            tagged: trajectory_dirs.len(),
            skipped: 0,
        })
    }
}
