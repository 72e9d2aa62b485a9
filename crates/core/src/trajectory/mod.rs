//! Durable per-trajectory download and publication state.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTrajectoryStore;
pub use store::{StoreError, StoreSummary, TrajectoryStore};
pub use types::{DownloadLease, RecordUpdate, Sensor, TrajectoryRecord, TrajectoryState};
