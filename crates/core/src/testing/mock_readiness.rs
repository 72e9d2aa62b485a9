//! Mock readiness oracle for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::readiness::ReadinessOracle;

/// Mock implementation of the ReadinessOracle trait.
///
/// Ready ids are scripted with `mark_ready`; ids marked as pending only
/// become ready on the next `refresh`, like a notification arriving between
/// two polls.
#[derive(Debug, Default)]
pub struct MockReadinessOracle {
    ready: Arc<RwLock<HashSet<String>>>,
    pending: Arc<RwLock<HashSet<String>>>,
    refreshes: Arc<RwLock<usize>>,
}

impl MockReadinessOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an id ready immediately.
    pub async fn mark_ready(&self, download_id: &str) {
        self.ready.write().await.insert(download_id.to_string());
    }

    /// Make an id ready on the next refresh.
    pub async fn announce_on_refresh(&self, download_id: &str) {
        self.pending.write().await.insert(download_id.to_string());
    }

    /// Number of refresh calls so far.
    pub async fn refresh_count(&self) -> usize {
        *self.refreshes.read().await
    }
}

#[async_trait]
impl ReadinessOracle for MockReadinessOracle {
    async fn refresh(&self) {
        *self.refreshes.write().await += 1;
        let pending: Vec<String> = self.pending.write().await.drain().collect();
        self.ready.write().await.extend(pending);
    }

    async fn ready_ids(&self) -> HashSet<String> {
        self.ready.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_announced_ids_appear_after_refresh() {
        let oracle = MockReadinessOracle::new();
        oracle.mark_ready("a").await;
        oracle.announce_on_refresh("b").await;

        assert_eq!(oracle.ready_ids().await.len(), 1);
        oracle.refresh().await;

        let ids = oracle.ready_ids().await;
        assert!(ids.contains("a") && ids.contains("b"));
        assert_eq!(oracle.refresh_count().await, 1);
    }
}
