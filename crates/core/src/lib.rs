pub mod catalog;
pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod preparation;
pub mod readiness;
pub mod scheduler;
pub mod testing;
pub mod trajectory;

pub use catalog::{
    base_trajectory_id, load_point_index, load_trajectory_catalog, CatalogError, PointIndex,
    TrajectoryCatalog,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use pipeline::{Aria2Fetcher, ArchivePayloadStager, ExiftoolTagger, MapillaryUploader};
pub use preparation::{GeodataPreparationClient, PreparationService};
pub use readiness::{ImapReadinessOracle, ReadinessOracle};
pub use scheduler::{
    Collaborators, CycleOutcome, SchedulerConfig, SchedulerError, TrajectoryScheduler,
};
pub use trajectory::{
    DownloadLease, RecordUpdate, Sensor, SqliteTrajectoryStore, StoreError, StoreSummary,
    TrajectoryRecord, TrajectoryState, TrajectoryStore,
};
