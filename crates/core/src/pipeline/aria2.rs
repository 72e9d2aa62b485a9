//! aria2c-based archive fetcher.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::error::FetchError;
use super::traits::ArchiveFetcher;
use crate::config::FetcherConfig;

/// Downloads `{download_base_url}/{download_id}.tar` with aria2c.
///
/// aria2c handles retries and resumption itself; a non-zero exit means the
/// link is dead or the server kept failing.
pub struct Aria2Fetcher {
    config: FetcherConfig,
}

impl Aria2Fetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self { config }
    }

    /// URL of the archive for `download_id`.
    pub fn archive_url(&self, download_id: &str) -> String {
        format!(
            "{}/{}.tar",
            self.config.download_base_url.trim_end_matches('/'),
            download_id
        )
    }

    fn build_args(&self, download_id: &str, dest_dir: &Path) -> Vec<String> {
        vec![
            self.archive_url(download_id),
            format!("--dir={}", dest_dir.display()),
            format!("--out={}.tar", download_id),
            "--allow-overwrite=true".to_string(),
            format!("--max-tries={}", self.config.max_tries),
            format!("--retry-wait={}", self.config.retry_wait_secs),
            format!("--timeout={}", self.config.timeout_secs),
            format!("--max-file-not-found={}", self.config.max_file_not_found),
            "--console-log-level=warn".to_string(),
        ]
    }
}

#[async_trait]
impl ArchiveFetcher for Aria2Fetcher {
    async fn fetch(&self, download_id: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        tokio::fs::create_dir_all(dest_dir).await?;

        let args = self.build_args(download_id, dest_dir);
        debug!(program = %self.config.aria2c_path.display(), ?args, "Starting download");

        let status = Command::new(&self.config.aria2c_path)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| FetchError::Spawn {
                program: self.config.aria2c_path.clone(),
                source,
            })?;

        if !status.success() {
            warn!(download_id, exit_code = ?status.code(), "Download failed");
            return Err(FetchError::Failed {
                download_id: download_id.to_string(),
                exit_code: status.code(),
            });
        }

        let archive = dest_dir.join(format!("{}.tar", download_id));
        info!(download_id, path = %archive.display(), "Download complete");
        Ok(archive)
    }
}
