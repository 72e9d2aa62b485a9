//! Trajectory storage trait and types.

use serde::Serialize;
use thiserror::Error;

use super::{RecordUpdate, TrajectoryRecord};

/// Error type for trajectory store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Trajectory not found.
    #[error("Trajectory not found: {0}")]
    NotFound(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Aggregate progress counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    /// All known trajectories.
    pub total: u64,
    /// Trajectories with all four sensors uploaded.
    pub completed: u64,
    /// Uncompleted trajectories holding a download id.
    pub with_download: u64,
    /// Completed uploads per sensor (index = sensor number - 1).
    pub sensors_completed: [u64; 4],
}

impl StoreSummary {
    pub fn uncompleted(&self) -> u64 {
        self.total - self.completed
    }
}

/// Trait for trajectory state backends.
///
/// Every mutation must be durable when the call returns.
pub trait TrajectoryStore: Send + Sync {
    /// Seed one record per id if the store is empty. Returns the number of
    /// records inserted; seeding a populated store inserts nothing.
    fn seed(&self, trajectory_ids: &[String]) -> Result<usize, StoreError>;

    /// Get a record by trajectory id.
    fn get(&self, trajectory_id: &str) -> Result<Option<TrajectoryRecord>, StoreError>;

    /// All records with at least one sensor not yet uploaded, ordered by id.
    fn query_uncompleted(&self) -> Result<Vec<TrajectoryRecord>, StoreError>;

    /// Apply an atomic partial update and return the updated record.
    fn update(
        &self,
        trajectory_id: &str,
        update: RecordUpdate,
    ) -> Result<TrajectoryRecord, StoreError>;

    /// Number of records.
    fn count(&self) -> Result<u64, StoreError>;

    /// Aggregate progress counters.
    fn summary(&self) -> Result<StoreSummary, StoreError>;
}
