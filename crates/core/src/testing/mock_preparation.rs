//! Mock preparation service for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::Polygon;
use crate::preparation::{PreparationError, PreparationService, PreparedDownload};

/// Mock implementation of the PreparationService trait.
///
/// Every `prepare` call issues a fresh id (`dl-1`, `dl-2`, ...) with the
/// configured size, unless a failure has been scripted.
#[derive(Debug)]
pub struct MockPreparationService {
    size_bytes: Arc<RwLock<u64>>,
    prepared: Arc<RwLock<Vec<Polygon>>>,
    confirmation_requests: Arc<RwLock<Vec<String>>>,
    confirmations: Arc<RwLock<Vec<String>>>,
    fail_next_prepare: Arc<RwLock<bool>>,
    fail_confirmations: Arc<RwLock<bool>>,
}

impl Default for MockPreparationService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPreparationService {
    /// Size reported for prepared downloads unless overridden.
    pub const DEFAULT_SIZE: u64 = 1024 * 1024 * 1024; // 1 GiB

    pub fn new() -> Self {
        Self {
            size_bytes: Arc::new(RwLock::new(Self::DEFAULT_SIZE)),
            prepared: Arc::new(RwLock::new(Vec::new())),
            confirmation_requests: Arc::new(RwLock::new(Vec::new())),
            confirmations: Arc::new(RwLock::new(Vec::new())),
            fail_next_prepare: Arc::new(RwLock::new(false)),
            fail_confirmations: Arc::new(RwLock::new(false)),
        }
    }

    /// Size reported for subsequent preparations.
    pub async fn set_size(&self, size_bytes: u64) {
        *self.size_bytes.write().await = size_bytes;
    }

    /// Fail the next `prepare` call with a service error.
    pub async fn fail_next_prepare(&self) {
        *self.fail_next_prepare.write().await = true;
    }

    /// Fail every confirmation request.
    pub async fn fail_confirmations(&self) {
        *self.fail_confirmations.write().await = true;
    }

    /// Number of `prepare` calls, failed ones included.
    pub async fn prepare_count(&self) -> usize {
        self.prepared.read().await.len()
    }

    /// Footprints submitted so far.
    pub async fn recorded_footprints(&self) -> Vec<Polygon> {
        self.prepared.read().await.clone()
    }

    /// Download ids whose confirmation was requested.
    pub async fn confirmation_requests(&self) -> Vec<String> {
        self.confirmation_requests.read().await.clone()
    }

    /// Download ids whose confirmation completed.
    pub async fn confirmations(&self) -> Vec<String> {
        self.confirmations.read().await.clone()
    }
}

#[async_trait]
impl PreparationService for MockPreparationService {
    async fn prepare(&self, footprint: &Polygon) -> Result<PreparedDownload, PreparationError> {
        let count = {
            let mut prepared = self.prepared.write().await;
            prepared.push(footprint.clone());
            prepared.len()
        };

        let fail = std::mem::take(&mut *self.fail_next_prepare.write().await);
        if fail {
            return Err(PreparationError::Http {
                status: 503,
                body: "mock service unavailable".to_string(),
            });
        }

        Ok(PreparedDownload {
            download_id: format!("dl-{}", count),
            size_bytes: *self.size_bytes.read().await,
        })
    }

    async fn request_confirmation(&self, download_id: &str) -> Result<(), PreparationError> {
        self.confirmation_requests
            .write()
            .await
            .push(download_id.to_string());
        if *self.fail_confirmations.read().await {
            return Err(PreparationError::ConnectionFailed(
                "mock confirmation failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn confirm(&self, download_id: &str) -> Result<(), PreparationError> {
        self.confirmations.write().await.push(download_id.to_string());
        Ok(())
    }
}
