//! Trajectory record and lifecycle types.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One of the four horizontal camera sensors of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    One,
    Two,
    Three,
    Four,
}

impl Sensor {
    /// All sensors in upload order.
    pub const ALL: [Sensor; 4] = [Sensor::One, Sensor::Two, Sensor::Three, Sensor::Four];

    /// 1-based sensor number as used in directory names (`Sensor_*1` .. `Sensor_*4`).
    pub fn number(&self) -> u8 {
        match self {
            Sensor::One => 1,
            Sensor::Two => 2,
            Sensor::Three => 3,
            Sensor::Four => 4,
        }
    }

    /// Camera heading offset in degrees.
    pub fn offset_degrees(&self) -> u16 {
        (self.number() as u16 - 1) * 90
    }

    /// Sensor for a 1-based number.
    pub fn from_number(number: u8) -> Option<Sensor> {
        match number {
            1 => Some(Sensor::One),
            2 => Some(Sensor::Two),
            3 => Some(Sensor::Three),
            4 => Some(Sensor::Four),
            _ => None,
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.number() as usize - 1
    }

    pub(crate) fn column(&self) -> &'static str {
        match self {
            Sensor::One => "is_sensor1_completed",
            Sensor::Two => "is_sensor2_completed",
            Sensor::Three => "is_sensor3_completed",
            Sensor::Four => "is_sensor4_completed",
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sensor{}", self.number())
    }
}

/// A prepared, time-limited download on the external service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLease {
    /// Opaque download identifier issued by the preparation service.
    pub download_id: String,
    /// Expected payload size in bytes (unknown for manually assigned ids).
    pub bytes: Option<u64>,
    /// After this instant the download id must be discarded.
    pub expires_at: DateTime<Utc>,
}

impl DownloadLease {
    /// Lease issued now and valid for `validity`.
    pub fn issued_now(download_id: impl Into<String>, bytes: Option<u64>, validity: Duration) -> Self {
        Self {
            download_id: download_id.into(),
            bytes,
            expires_at: Utc::now() + validity,
        }
    }

    /// Whether the lease expires before `now + margin`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at < now + margin
    }
}

/// Lifecycle state of a trajectory.
///
/// `Preparing`, `Downloading` and `Publishing` are transient and only exist
/// while the scheduler is working on the trajectory; the persistent states are
/// derived from the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryState {
    Unprepared,
    Preparing,
    Prepared,
    Ready,
    Downloading,
    Publishing,
    Done,
}

impl TrajectoryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrajectoryState::Unprepared => "unprepared",
            TrajectoryState::Preparing => "preparing",
            TrajectoryState::Prepared => "prepared",
            TrajectoryState::Ready => "ready",
            TrajectoryState::Downloading => "downloading",
            TrajectoryState::Publishing => "publishing",
            TrajectoryState::Done => "done",
        }
    }
}

impl fmt::Display for TrajectoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one trajectory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    /// Catalog identifier, never changes.
    pub trajectory_id: String,
    /// Current download lease, `None` when unprepared.
    pub download: Option<DownloadLease>,
    /// Upload confirmation per sensor, indexed by `Sensor::number() - 1`.
    pub sensors_completed: [bool; 4],
}

impl TrajectoryRecord {
    /// Fresh record as created by seeding.
    pub fn new(trajectory_id: impl Into<String>) -> Self {
        Self {
            trajectory_id: trajectory_id.into(),
            download: None,
            sensors_completed: [false; 4],
        }
    }

    pub fn is_sensor_completed(&self, sensor: Sensor) -> bool {
        self.sensors_completed[sensor.index()]
    }

    /// True while at least one sensor still needs an upload.
    pub fn is_uncompleted(&self) -> bool {
        self.sensors_completed.iter().any(|done| !done)
    }

    /// Sensors that still need an upload, in upload order.
    pub fn pending_sensors(&self) -> Vec<Sensor> {
        Sensor::ALL
            .into_iter()
            .filter(|s| !self.is_sensor_completed(*s))
            .collect()
    }

    pub fn download_id(&self) -> Option<&str> {
        self.download.as_ref().map(|d| d.download_id.as_str())
    }

    /// Persistent lifecycle state given the currently known ready download ids.
    pub fn state(&self, ready_ids: &HashSet<String>) -> TrajectoryState {
        if !self.is_uncompleted() {
            return TrajectoryState::Done;
        }
        match self.download_id() {
            None => TrajectoryState::Unprepared,
            Some(id) if ready_ids.contains(id) => TrajectoryState::Ready,
            Some(_) => TrajectoryState::Prepared,
        }
    }
}

/// Atomic single-row mutation of a trajectory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    /// Store a freshly prepared download lease.
    Prepared(DownloadLease),
    /// Clear download id, size and expiry together.
    Reset,
    /// Record a confirmed upload for one sensor.
    SensorCompleted(Sensor),
}
