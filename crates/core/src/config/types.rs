use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::scheduler::SchedulerConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub preparation: PreparationConfig,
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    pub uploader: UploaderConfig,
    #[serde(default)]
    pub tagger: TaggerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// State database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("download-state.db")
}

/// Trajectory and image point catalogs (GeoPackage files)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_trajectories_path")]
    pub trajectories_path: PathBuf,
    /// Layer holding trajectory polygons (first geometry layer when unset).
    #[serde(default)]
    pub trajectories_layer: Option<String>,
    #[serde(default = "default_trajectory_id_column")]
    pub trajectory_id_column: String,
    #[serde(default = "default_points_path")]
    pub points_path: PathBuf,
    #[serde(default = "default_points_layer")]
    pub points_layer: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            trajectories_path: default_trajectories_path(),
            trajectories_layer: None,
            trajectory_id_column: default_trajectory_id_column(),
            points_path: default_points_path(),
            points_layer: default_points_layer(),
        }
    }
}

fn default_trajectories_path() -> PathBuf {
    PathBuf::from("trajectories.gpkg")
}

fn default_trajectory_id_column() -> String {
    "trajectoryid".to_string()
}

fn default_points_path() -> PathBuf {
    PathBuf::from("points.gpkg")
}

fn default_points_layer() -> String {
    "kappazunder_image_punkte".to_string()
}

/// Geodata download service (request registration and confirmation)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreparationConfig {
    #[serde(default = "default_preparation_url")]
    pub base_url: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_dataset_option")]
    pub option: u32,
    /// Address the download links are mailed to.
    pub notification_email: String,
    /// Confirmation token of the notification address.
    pub mail_confirmation_id: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_preparation_url() -> String {
    "https://mein.wien.gv.at".to_string()
}

fn default_dataset() -> String {
    "KAPPAZUNDER 2020".to_string()
}

fn default_dataset_option() -> u32 {
    2
}

fn default_timeout() -> u32 {
    30
}

/// IMAP mailbox receiving download-ready notifications
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailboxConfig {
    #[serde(default = "default_imap_host")]
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    #[serde(default = "default_subject")]
    pub subject: String,
}

fn default_imap_host() -> String {
    "imap.gmail.com".to_string()
}

fn default_imap_port() -> u16 {
    993
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_subject() -> String {
    "Download-Link zu Ihren Geodaten".to_string()
}

/// Archive download via aria2c
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    #[serde(default = "default_aria2c_path")]
    pub aria2c_path: PathBuf,
    /// Archives are served at `{download_base_url}/{download_id}.tar`.
    #[serde(default = "default_download_base_url")]
    pub download_base_url: String,
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
    #[serde(default = "default_retry_wait")]
    pub retry_wait_secs: u32,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u32,
    #[serde(default = "default_max_file_not_found")]
    pub max_file_not_found: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            aria2c_path: default_aria2c_path(),
            download_base_url: default_download_base_url(),
            max_tries: default_max_tries(),
            retry_wait_secs: default_retry_wait(),
            timeout_secs: default_fetch_timeout(),
            max_file_not_found: default_max_file_not_found(),
        }
    }
}

fn default_aria2c_path() -> PathBuf {
    PathBuf::from("aria2c")
}

fn default_download_base_url() -> String {
    "https://www.wien.gv.at/ogdgeodata/download".to_string()
}

fn default_max_tries() -> u32 {
    5
}

fn default_retry_wait() -> u32 {
    300
}

fn default_fetch_timeout() -> u32 {
    300
}

fn default_max_file_not_found() -> u32 {
    1
}

/// Mapillary upload via mapillary_tools
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploaderConfig {
    #[serde(default = "default_mapillary_tools_path")]
    pub mapillary_tools_path: PathBuf,
    pub user_name: String,
    pub user_email: String,
    pub user_password: String,
    #[serde(default = "default_device_make")]
    pub device_make: String,
    #[serde(default = "default_device_model")]
    pub device_model: String,
}

fn default_mapillary_tools_path() -> PathBuf {
    PathBuf::from("mapillary_tools")
}

fn default_device_make() -> String {
    "Teledyne".to_string()
}

fn default_device_model() -> String {
    "Ladybug6".to_string()
}

/// Image geotagging via exiftool
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaggerConfig {
    #[serde(default = "default_exiftool_path")]
    pub exiftool_path: PathBuf,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            exiftool_path: default_exiftool_path(),
        }
    }
}

fn default_exiftool_path() -> PathBuf {
    PathBuf::from("exiftool")
}

/// Metrics export
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Prometheus textfile rewritten after every scheduler cycle.
    #[serde(default)]
    pub textfile_path: Option<PathBuf>,
}

/// Sanitized config for display (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    pub scheduler: SchedulerConfig,
    pub preparation: SanitizedPreparationConfig,
    pub mailbox: SanitizedMailboxConfig,
    pub fetcher: FetcherConfig,
    pub uploader: SanitizedUploaderConfig,
    pub tagger: TaggerConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPreparationConfig {
    pub base_url: String,
    pub dataset: String,
    pub option: u32,
    pub notification_email: String,
    pub mail_confirmation_id_configured: bool,
    pub timeout_secs: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedMailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password_configured: bool,
    pub mailbox: String,
    pub subject: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUploaderConfig {
    pub mapillary_tools_path: PathBuf,
    pub user_name: String,
    pub user_email: String,
    pub user_password_configured: bool,
    pub device_make: String,
    pub device_model: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            database: config.database.clone(),
            catalog: config.catalog.clone(),
            scheduler: config.scheduler.clone(),
            preparation: SanitizedPreparationConfig {
                base_url: config.preparation.base_url.clone(),
                dataset: config.preparation.dataset.clone(),
                option: config.preparation.option,
                notification_email: config.preparation.notification_email.clone(),
                mail_confirmation_id_configured: !config
                    .preparation
                    .mail_confirmation_id
                    .is_empty(),
                timeout_secs: config.preparation.timeout_secs,
            },
            mailbox: SanitizedMailboxConfig {
                host: config.mailbox.host.clone(),
                port: config.mailbox.port,
                username: config.mailbox.username.clone(),
                password_configured: !config.mailbox.password.is_empty(),
                mailbox: config.mailbox.mailbox.clone(),
                subject: config.mailbox.subject.clone(),
            },
            fetcher: config.fetcher.clone(),
            uploader: SanitizedUploaderConfig {
                mapillary_tools_path: config.uploader.mapillary_tools_path.clone(),
                user_name: config.uploader.user_name.clone(),
                user_email: config.uploader.user_email.clone(),
                user_password_configured: !config.uploader.user_password.is_empty(),
                device_make: config.uploader.device_make.clone(),
                device_model: config.uploader.device_model.clone(),
            },
            tagger: config.tagger.clone(),
            metrics: config.metrics.clone(),
        }
    }
}
