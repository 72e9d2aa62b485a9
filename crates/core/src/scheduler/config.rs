//! Scheduler configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Thresholds and timings of the scheduling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Request new downloads from the preparation service.
    /// When disabled, download ids must be assigned manually.
    #[serde(default = "default_true")]
    pub preparation_enabled: bool,

    /// Leases expiring within this many hours are discarded.
    #[serde(default = "default_expiry_margin")]
    pub expiry_margin_hours: u32,

    /// Validity of a freshly prepared download id (days).
    #[serde(default = "default_validity")]
    pub download_validity_days: u32,

    /// Prepare more only while at most this many trajectories are ready.
    #[serde(default = "default_ready_low_watermark")]
    pub ready_low_watermark: usize,

    /// Prepare more only while fewer trajectories hold a download id.
    #[serde(default = "default_live_download_limit")]
    pub live_download_limit: usize,

    /// Trajectories prepared per batch (random sample).
    #[serde(default = "default_batch_size")]
    pub preparation_batch_size: usize,

    /// Size of the volume archives are extracted to (bytes).
    #[serde(default = "default_volume_size")]
    pub volume_size_bytes: u64,

    /// Fraction of half the volume a single archive may use.
    #[serde(default = "default_safety_factor")]
    pub size_safety_factor: f64,

    /// Sleep when nothing is ready (seconds).
    #[serde(default = "default_idle_backoff")]
    pub idle_backoff_secs: u64,

    /// Wait between requesting and completing the confirmation (seconds).
    #[serde(default = "default_confirmation_settle")]
    pub confirmation_settle_secs: u64,

    /// Directory archives are downloaded and extracted into.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_expiry_margin() -> u32 {
    5
}

fn default_validity() -> u32 {
    7
}

fn default_ready_low_watermark() -> usize {
    5
}

fn default_live_download_limit() -> usize {
    20
}

fn default_batch_size() -> usize {
    10
}

fn default_volume_size() -> u64 {
    100 * 1024 * 1024 * 1024 // 100 GiB
}

fn default_safety_factor() -> f64 {
    0.95
}

fn default_idle_backoff() -> u64 {
    300 // 5 minutes
}

fn default_confirmation_settle() -> u64 {
    60
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("downloads")
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            preparation_enabled: true,
            expiry_margin_hours: default_expiry_margin(),
            download_validity_days: default_validity(),
            ready_low_watermark: default_ready_low_watermark(),
            live_download_limit: default_live_download_limit(),
            preparation_batch_size: default_batch_size(),
            volume_size_bytes: default_volume_size(),
            size_safety_factor: default_safety_factor(),
            idle_backoff_secs: default_idle_backoff(),
            confirmation_settle_secs: default_confirmation_settle(),
            work_dir: default_work_dir(),
        }
    }
}

impl SchedulerConfig {
    /// Largest archive accepted from a preparation.
    ///
    /// Two archives must fit on the volume at once, with a safety margin.
    pub fn max_download_bytes(&self) -> u64 {
        (self.volume_size_bytes as f64 / 2.0 * self.size_safety_factor) as u64
    }

    pub fn expiry_margin(&self) -> chrono::Duration {
        chrono::Duration::hours(self.expiry_margin_hours as i64)
    }

    pub fn download_validity(&self) -> chrono::Duration {
        chrono::Duration::days(self.download_validity_days as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert!(config.preparation_enabled);
        assert_eq!(config.expiry_margin_hours, 5);
        assert_eq!(config.download_validity_days, 7);
        assert_eq!(config.ready_low_watermark, 5);
        assert_eq!(config.live_download_limit, 20);
        assert_eq!(config.preparation_batch_size, 10);
        assert_eq!(config.size_safety_factor, 0.95);
        assert_eq!(config.idle_backoff_secs, 300);
        assert_eq!(config.confirmation_settle_secs, 60);
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: SchedulerConfig = toml::from_str("").unwrap();
        assert_eq!(config.live_download_limit, 20);
        assert_eq!(config.work_dir, PathBuf::from("downloads"));
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            preparation_enabled = false
            expiry_margin_hours = 2
            download_validity_days = 3
            ready_low_watermark = 1
            live_download_limit = 4
            preparation_batch_size = 2
            volume_size_bytes = 1000
            size_safety_factor = 0.5
            idle_backoff_secs = 10
            confirmation_settle_secs = 0
            work_dir = "/data/work"
        "#;
        let config: SchedulerConfig = toml::from_str(toml).unwrap();
        assert!(!config.preparation_enabled);
        assert_eq!(config.expiry_margin(), chrono::Duration::hours(2));
        assert_eq!(config.download_validity(), chrono::Duration::days(3));
        assert_eq!(config.max_download_bytes(), 250);
        assert_eq!(config.work_dir, PathBuf::from("/data/work"));
    }

    #[test]
    fn test_max_download_bytes() {
        let config = SchedulerConfig {
            volume_size_bytes: 2_000,
            size_safety_factor: 0.75,
            ..Default::default()
        };
        assert_eq!(config.max_download_bytes(), 750);
    }
}
