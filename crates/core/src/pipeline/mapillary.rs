//! mapillary_tools-based uploader.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use super::error::UploadError;
use super::traits::Uploader;
use crate::config::UploaderConfig;
use crate::trajectory::Sensor;

/// Publishes images with `mapillary_tools process_and_upload`.
pub struct MapillaryUploader {
    config: UploaderConfig,
}

impl MapillaryUploader {
    pub fn new(config: UploaderConfig) -> Self {
        Self { config }
    }

    /// Store credentials for the configured user. Must succeed before uploads.
    pub async fn authenticate(&self) -> Result<(), UploadError> {
        let status = Command::new(&self.config.mapillary_tools_path)
            .args([
                "authenticate",
                "--user_name",
                self.config.user_name.as_str(),
                "--user_email",
                self.config.user_email.as_str(),
                "--user_password",
                self.config.user_password.as_str(),
            ])
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| UploadError::Spawn {
                program: self.config.mapillary_tools_path.clone(),
                source,
            })?;

        if !status.success() {
            return Err(UploadError::AuthenticationFailed {
                exit_code: status.code(),
            });
        }

        info!(user = %self.config.user_name, "Authenticated with Mapillary");
        Ok(())
    }

    fn build_upload_args(&self, sensor_dirs: &[PathBuf], sensor: Sensor) -> Vec<OsString> {
        let offset = sensor.offset_degrees().to_string();
        let mut args: Vec<OsString> = [
            "process_and_upload",
            "--overwrite_all_EXIF_tags",
            "--device_make",
            self.config.device_make.as_str(),
            "--device_model",
            self.config.device_model.as_str(),
            "--offset_angle",
            offset.as_str(),
            "--interpolate_directions",
            "--user_name",
            self.config.user_name.as_str(),
            "--noresume",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.extend(sensor_dirs.iter().map(|d| d.as_os_str().to_owned()));
        args
    }
}

#[async_trait]
impl Uploader for MapillaryUploader {
    async fn upload(&self, sensor_dirs: &[PathBuf], sensor: Sensor) -> Result<(), UploadError> {
        info!(%sensor, dirs = sensor_dirs.len(), "Uploading sensor images");

        let status = Command::new(&self.config.mapillary_tools_path)
            .args(self.build_upload_args(sensor_dirs, sensor))
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| UploadError::Spawn {
                program: self.config.mapillary_tools_path.clone(),
                source,
            })?;

        if !status.success() {
            warn!(%sensor, exit_code = ?status.code(), "Upload failed");
            return Err(UploadError::Failed {
                sensor: sensor.to_string(),
                exit_code: status.code(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn test_upload_args() {
        let uploader = MapillaryUploader::new(test_config().uploader);
        let dirs = vec![PathBuf::from("/a/Sensor_12"), PathBuf::from("/b/Sensor_12")];
        let args: Vec<String> = uploader
            .build_upload_args(&dirs, Sensor::Two)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(args[0], "process_and_upload");
        let offset = args.iter().position(|a| a == "--offset_angle").unwrap();
        assert_eq!(args[offset + 1], "90");
        let user = args.iter().position(|a| a == "--user_name").unwrap();
        assert_eq!(args[user + 1], "mapper");
        assert!(args.contains(&"Teledyne".to_string()));
        assert!(args.contains(&"Ladybug6".to_string()));
        assert!(args.contains(&"--noresume".to_string()));
        assert_eq!(&args[args.len() - 2..], &["/a/Sensor_12", "/b/Sensor_12"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let mut config = test_config().uploader;
        config.mapillary_tools_path = PathBuf::from("/nonexistent/mapillary_tools");
        let uploader = MapillaryUploader::new(config);

        let err = uploader
            .upload(&[PathBuf::from("/tmp")], Sensor::One)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Spawn { .. }));

        let err = uploader.authenticate().await.unwrap_err();
        assert!(matches!(err, UploadError::Spawn { .. }));
    }
}
