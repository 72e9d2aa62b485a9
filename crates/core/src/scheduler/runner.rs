//! Trajectory scheduler implementation.
//!
//! Single worker: exactly one trajectory is prepared, downloaded or published
//! at a time. Every state change is written to the store before the next
//! decision that depends on it.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use tracing::{debug, error, info, warn};

use crate::catalog::TrajectoryCatalog;
use crate::metrics;
use crate::pipeline::{ArchiveFetcher, PayloadStager, Uploader};
use crate::preparation::PreparationService;
use crate::readiness::ReadinessOracle;
use crate::trajectory::{
    DownloadLease, RecordUpdate, TrajectoryRecord, TrajectoryState, TrajectoryStore,
};

use super::config::SchedulerConfig;
use super::types::{CycleOutcome, SchedulerError};

/// External services the scheduler drives.
pub struct Collaborators {
    pub oracle: Arc<dyn ReadinessOracle>,
    pub preparation: Arc<dyn PreparationService>,
    pub fetcher: Arc<dyn ArchiveFetcher>,
    pub stager: Arc<dyn PayloadStager>,
    pub uploader: Arc<dyn Uploader>,
}

/// The trajectory scheduler - drives trajectories from unprepared to published.
pub struct TrajectoryScheduler {
    config: SchedulerConfig,
    store: Arc<dyn TrajectoryStore>,
    catalog: Arc<TrajectoryCatalog>,
    services: Collaborators,
    metrics_textfile: Option<PathBuf>,
}

impl TrajectoryScheduler {
    /// Create a new scheduler.
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn TrajectoryStore>,
        catalog: Arc<TrajectoryCatalog>,
        services: Collaborators,
    ) -> Self {
        Self {
            config,
            store,
            catalog,
            services,
            metrics_textfile: None,
        }
    }

    /// Rewrite a Prometheus textfile after every cycle.
    pub fn with_metrics_textfile(mut self, path: Option<PathBuf>) -> Self {
        self.metrics_textfile = path;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run cycles until every trajectory is completed.
    ///
    /// Returns an error only for fatal conditions (failed upload, store
    /// failure); the state store stays consistent so a restart resumes.
    pub async fn run(&self) -> Result<(), SchedulerError> {
        info!("Starting trajectory scheduler");

        loop {
            let outcome = self.run_cycle().await;
            self.export_metrics();

            match outcome? {
                CycleOutcome::Finished => {
                    info!("All trajectories completed");
                    return Ok(());
                }
                CycleOutcome::Idle => {
                    info!(
                        backoff_secs = self.config.idle_backoff_secs,
                        "No trajectories ready for download, sleeping"
                    );
                    tokio::time::sleep(Duration::from_secs(self.config.idle_backoff_secs)).await;
                }
                outcome => debug!(?outcome, "Cycle finished"),
            }
        }
    }

    /// Run a single scheduling cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, SchedulerError> {
        let mut records = self.store.query_uncompleted()?;
        if records.is_empty() {
            metrics::UNCOMPLETED_TRAJECTORIES.set(0);
            return Ok(CycleOutcome::Finished);
        }
        info!(uncompleted = records.len(), "Loaded uncompleted trajectories");

        if self.reset_expiring(&records)? > 0 {
            records = self.store.query_uncompleted()?;
        }

        self.services.oracle.refresh().await;
        let ready_ids = self.services.oracle.ready_ids().await;
        let ready = ready_records(&records, &ready_ids);
        let live = records.iter().filter(|r| r.download.is_some()).count();

        metrics::UNCOMPLETED_TRAJECTORIES.set(records.len() as i64);
        metrics::READY_TRAJECTORIES.set(ready.len() as i64);
        metrics::LIVE_DOWNLOADS.set(live as i64);

        if self.should_prepare(ready.len(), live) {
            self.prepare_batch(&records).await?;
        }

        let Some(next) = earliest_expiring(&ready) else {
            return Ok(CycleOutcome::Idle);
        };

        self.download_and_publish(next).await
    }

    /// Discard leases about to expire. Returns the number reset.
    fn reset_expiring(&self, records: &[TrajectoryRecord]) -> Result<usize, SchedulerError> {
        let now = Utc::now();
        let margin = self.config.expiry_margin();

        let expiring: Vec<&TrajectoryRecord> = records
            .iter()
            .filter(|r| {
                r.download
                    .as_ref()
                    .is_some_and(|lease| lease.expires_within(now, margin))
            })
            .collect();

        for record in &expiring {
            self.store.update(&record.trajectory_id, RecordUpdate::Reset)?;
            metrics::RESETS.with_label_values(&["expiring"]).inc();
        }

        if !expiring.is_empty() {
            let ids: Vec<&str> = expiring.iter().map(|r| r.trajectory_id.as_str()).collect();
            info!(count = ids.len(), ids = ?ids, "Reset expiring trajectories");
        }
        Ok(expiring.len())
    }

    fn should_prepare(&self, ready: usize, live: usize) -> bool {
        if !self.config.preparation_enabled {
            return false;
        }
        let wanted = ready <= self.config.ready_low_watermark
            && live < self.config.live_download_limit;
        if wanted {
            info!(ready, live, "Few downloadable trajectories left");
        } else {
            debug!(ready, live, "Preparation not needed");
        }
        wanted
    }

    /// Prepare a random sample of unprepared trajectories.
    ///
    /// Service failures and oversized archives only skip the affected
    /// trajectory; store failures are fatal.
    async fn prepare_batch(&self, records: &[TrajectoryRecord]) -> Result<usize, SchedulerError> {
        let unprepared: Vec<&str> = records
            .iter()
            .filter(|r| r.download.is_none())
            .map(|r| r.trajectory_id.as_str())
            .collect();

        if unprepared.is_empty() {
            info!("No trajectories left to prepare");
            return Ok(0);
        }

        let sample: Vec<String> = {
            let mut rng = rand::thread_rng();
            unprepared
                .choose_multiple(&mut rng, self.config.preparation_batch_size)
                .map(|id| id.to_string())
                .collect()
        };
        info!(count = sample.len(), ids = ?sample, "Preparing trajectories");

        let mut prepared = 0;
        for trajectory_id in &sample {
            if let Some(lease) = self.prepare_one(trajectory_id).await {
                self.store
                    .update(trajectory_id, RecordUpdate::Prepared(lease.clone()))?;
                metrics::PREPARATIONS.with_label_values(&["prepared"]).inc();
                info!(
                    trajectory_id = %trajectory_id,
                    download_id = %lease.download_id,
                    expires_at = %lease.expires_at,
                    "Prepared trajectory"
                );
                prepared += 1;
            }
        }
        Ok(prepared)
    }

    /// Register and confirm one download. `None` when the trajectory was skipped.
    async fn prepare_one(&self, trajectory_id: &str) -> Option<DownloadLease> {
        let Some(footprint) = self.catalog.footprint(trajectory_id) else {
            warn!(trajectory_id, "No footprint in catalog, skipping");
            metrics::PREPARATIONS.with_label_values(&["no_footprint"]).inc();
            return None;
        };

        let preparation = &self.services.preparation;
        debug!(trajectory_id, state = %TrajectoryState::Preparing, "Requesting download");
        let download = match preparation.prepare(footprint).await {
            Ok(download) => download,
            Err(e) => {
                warn!(trajectory_id, error = %e, "Preparation failed");
                metrics::PREPARATIONS.with_label_values(&["failed"]).inc();
                return None;
            }
        };

        let limit = self.config.max_download_bytes();
        if download.size_bytes > limit {
            info!(
                trajectory_id,
                download_id = %download.download_id,
                size_bytes = download.size_bytes,
                limit_bytes = limit,
                "Skipping trajectory, archive exceeds size limit"
            );
            metrics::PREPARATIONS.with_label_values(&["oversized"]).inc();
            return None;
        }

        let handshake = async {
            preparation
                .request_confirmation(&download.download_id)
                .await?;
            tokio::time::sleep(Duration::from_secs(self.config.confirmation_settle_secs)).await;
            preparation.confirm(&download.download_id).await
        };
        if let Err(e) = handshake.await {
            warn!(
                trajectory_id,
                download_id = %download.download_id,
                error = %e,
                "Confirmation failed"
            );
            metrics::PREPARATIONS.with_label_values(&["failed"]).inc();
            return None;
        }

        Some(DownloadLease::issued_now(
            download.download_id,
            Some(download.size_bytes),
            self.config.download_validity(),
        ))
    }

    async fn download_and_publish(
        &self,
        record: &TrajectoryRecord,
    ) -> Result<CycleOutcome, SchedulerError> {
        let trajectory_id = record.trajectory_id.as_str();
        let Some(download_id) = record.download_id() else {
            return Ok(CycleOutcome::Idle);
        };
        info!(
            trajectory_id,
            download_id,
            state = %TrajectoryState::Downloading,
            "Downloading trajectory"
        );

        let result = self.fetch_and_publish(record, download_id).await;

        let released = self.services.stager.release(download_id).await;
        match (result, released) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), released) => {
                if let Err(release_error) = released {
                    warn!(download_id, error = %release_error, "Failed to release payload");
                }
                error!(trajectory_id, download_id, error = %e, "Publishing halted");
                Err(e)
            }
        }
    }

    async fn fetch_and_publish(
        &self,
        record: &TrajectoryRecord,
        download_id: &str,
    ) -> Result<CycleOutcome, SchedulerError> {
        let trajectory_id = record.trajectory_id.as_str();

        let archive = match self
            .services
            .fetcher
            .fetch(download_id, &self.config.work_dir)
            .await
        {
            Ok(archive) => archive,
            Err(e) if e.is_remote_failure() => {
                warn!(
                    trajectory_id,
                    download_id,
                    error = %e,
                    "Download failed, resetting trajectory"
                );
                self.store.update(trajectory_id, RecordUpdate::Reset)?;
                metrics::DOWNLOADS.with_label_values(&["failed"]).inc();
                metrics::RESETS.with_label_values(&["fetch_failed"]).inc();
                return Ok(CycleOutcome::FetchFailed {
                    trajectory_id: trajectory_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let payload = match self
            .services
            .stager
            .stage(&archive, download_id, trajectory_id)
            .await
        {
            Ok(payload) => payload,
            Err(e) if e.is_archive_defect() => {
                warn!(
                    trajectory_id,
                    download_id,
                    error = %e,
                    "Archive unusable, resetting trajectory"
                );
                self.store.update(trajectory_id, RecordUpdate::Reset)?;
                metrics::DOWNLOADS.with_label_values(&["rejected"]).inc();
                metrics::RESETS.with_label_values(&["invalid_archive"]).inc();
                return Ok(CycleOutcome::ArchiveRejected {
                    trajectory_id: trajectory_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        metrics::DOWNLOADS.with_label_values(&["succeeded"]).inc();
        debug!(
            trajectory_id,
            state = %TrajectoryState::Publishing,
            pending = record.pending_sensors().len(),
            "Payload staged"
        );

        let mut uploaded = 0;
        for sensor in record.pending_sensors() {
            let dirs = payload.sensor_dirs(sensor)?;
            if dirs.is_empty() {
                return Err(SchedulerError::MissingSensorData {
                    trajectory_id: trajectory_id.to_string(),
                    sensor,
                });
            }

            self.services.uploader.upload(&dirs, sensor).await?;
            self.store
                .update(trajectory_id, RecordUpdate::SensorCompleted(sensor))?;
            metrics::UPLOADS
                .with_label_values(&[&sensor.to_string()])
                .inc();
            info!(trajectory_id, %sensor, "Sensor published");
            uploaded += 1;
        }

        metrics::TRAJECTORIES_COMPLETED.inc();
        info!(trajectory_id, sensors = uploaded, "Trajectory completed");

        Ok(CycleOutcome::Published {
            trajectory_id: trajectory_id.to_string(),
            sensors_uploaded: uploaded,
        })
    }

    fn export_metrics(&self) {
        if let Some(path) = &self.metrics_textfile {
            if let Err(e) = metrics::write_textfile(path) {
                warn!(path = %path.display(), error = %e, "Failed to write metrics textfile");
            }
        }
    }
}

/// Records whose download id has been announced as ready.
fn ready_records<'a>(
    records: &'a [TrajectoryRecord],
    ready_ids: &HashSet<String>,
) -> Vec<&'a TrajectoryRecord> {
    records
        .iter()
        .filter(|r| r.download_id().is_some_and(|id| ready_ids.contains(id)))
        .collect()
}

/// The ready record whose lease expires first (first in order on ties).
fn earliest_expiring<'a>(ready: &[&'a TrajectoryRecord]) -> Option<&'a TrajectoryRecord> {
    ready
        .iter()
        .copied()
        .min_by_key(|r| r.download.as_ref().map(|lease| lease.expires_at))
}
