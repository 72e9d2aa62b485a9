//! Trajectory scheduler - the resumable acquire-and-publish loop.
//!
//! Each cycle the scheduler:
//! - **Reconciles** leases about to expire (reset to unprepared)
//! - **Prepares** new downloads while few are ready and capacity allows
//! - **Publishes** the ready trajectory expiring first, one sensor at a time
//!
//! All progress lives in the `TrajectoryStore`; a restarted process resumes
//! exactly where the last durable write left off.

mod config;
mod runner;
mod types;

pub use config::SchedulerConfig;
pub use runner::{Collaborators, TrajectoryScheduler};
pub use types::{CycleOutcome, SchedulerError};
