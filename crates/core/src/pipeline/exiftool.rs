//! exiftool-based image geotagging.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::error::TagError;
use super::layout;
use super::traits::{ImageTagger, TagSummary};
use crate::catalog::{ImagePoint, PointIndex};
use crate::config::TaggerConfig;
use crate::trajectory::Sensor;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Writes GPS position and capture time from the point catalog into each
/// image, one exiftool run per trajectory directory.
pub struct ExiftoolTagger {
    config: TaggerConfig,
    points: Arc<PointIndex>,
}

impl ExiftoolTagger {
    pub fn new(config: TaggerConfig, points: Arc<PointIndex>) -> Self {
        Self { config, points }
    }

    async fn run_exiftool(&self, argfile: &Path) -> Result<(), TagError> {
        let status = Command::new(&self.config.exiftool_path)
            .arg("-q")
            .arg("-@")
            .arg(argfile)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|source| TagError::Spawn {
                program: self.config.exiftool_path.clone(),
                source,
            })?;

        if !status.success() {
            return Err(TagError::Failed {
                path: argfile.to_path_buf(),
                exit_code: status.code(),
            });
        }
        Ok(())
    }
}

/// Tag assignments for one image.
pub(crate) fn exif_args(point: &ImagePoint) -> Vec<String> {
    let lat_ref = if point.lat < 0.0 { "S" } else { "N" };
    let lon_ref = if point.lon < 0.0 { "W" } else { "E" };
    vec![
        format!("-GPSLatitude={}", point.lat.abs()),
        format!("-GPSLatitudeRef={}", lat_ref),
        format!("-GPSLongitude={}", point.lon.abs()),
        format!("-GPSLongitudeRef={}", lon_ref),
        format!(
            "-DateTimeOriginal={}",
            point.captured_at.format(EXIF_DATETIME_FORMAT)
        ),
    ]
}

/// Build the argfile body for every uploadable image under `trajectory_dir`.
/// Images missing from the catalog are counted as skipped.
fn build_argfile(
    trajectory_dir: &Path,
    points: &PointIndex,
) -> std::io::Result<(String, TagSummary)> {
    let dirs = [trajectory_dir.to_path_buf()];
    let mut body = String::new();
    let mut summary = TagSummary::default();

    for sensor in Sensor::ALL {
        for sensor_dir in layout::sensor_dirs(&dirs, sensor)? {
            for image in layout::image_files(&sensor_dir)? {
                let name = image
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default();
                let Some(point) = points.get(name) else {
                    debug!(image = %image.display(), "No catalog point for image");
                    summary.skipped += 1;
                    continue;
                };

                body.push_str("-overwrite_original\n");
                for arg in exif_args(point) {
                    body.push_str(&arg);
                    body.push('\n');
                }
                body.push_str(&image.to_string_lossy());
                body.push_str("\n-execute\n");
                summary.tagged += 1;
            }
        }
    }

    Ok((body, summary))
}

#[async_trait]
impl ImageTagger for ExiftoolTagger {
    async fn tag(&self, trajectory_dirs: &[PathBuf]) -> Result<TagSummary, TagError> {
        let mut total = TagSummary::default();

        for dir in trajectory_dirs {
            let points = Arc::clone(&self.points);
            let scan_dir = dir.clone();
            let (body, summary) =
                tokio::task::spawn_blocking(move || build_argfile(&scan_dir, &points))
                    .await
                    .map_err(|e| TagError::Io(std::io::Error::other(e)))??;

            if summary.skipped > 0 {
                warn!(
                    dir = %dir.display(),
                    skipped = summary.skipped,
                    "Images without catalog position left untagged"
                );
            }
            total.tagged += summary.tagged;
            total.skipped += summary.skipped;

            if summary.tagged == 0 {
                continue;
            }

            let argfile = dir.with_extension("exiftool-args");
            tokio::fs::write(&argfile, body).await?;
            let result = self.run_exiftool(&argfile).await;
            if let Err(e) = tokio::fs::remove_file(&argfile).await {
                debug!(path = %argfile.display(), error = %e, "Failed to remove argfile");
            }
            result?;
        }

        info!(
            tagged = total.tagged,
            skipped = total.skipped,
            "Tagged images"
        );
        Ok(total)
    }
}
