use super::{types::Config, ConfigError};

/// Download ids are issued for days, not years.
pub const MAX_DOWNLOAD_VALIDITY_DAYS: u32 = 365;

/// Validate configuration
/// Currently validates:
/// - Required sections exist (enforced by serde)
/// - Scheduler thresholds are usable and lease arithmetic stays in range
/// - Service endpoints are set
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let scheduler = &config.scheduler;

    if scheduler.volume_size_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.volume_size_bytes cannot be 0".to_string(),
        ));
    }

    if !(scheduler.size_safety_factor > 0.0 && scheduler.size_safety_factor <= 1.0) {
        return Err(ConfigError::ValidationError(
            "scheduler.size_safety_factor must be in (0, 1]".to_string(),
        ));
    }

    if !(1..=MAX_DOWNLOAD_VALIDITY_DAYS).contains(&scheduler.download_validity_days) {
        return Err(ConfigError::ValidationError(format!(
            "scheduler.download_validity_days must be between 1 and {}",
            MAX_DOWNLOAD_VALIDITY_DAYS
        )));
    }

    if scheduler.expiry_margin_hours >= scheduler.download_validity_days * 24 {
        return Err(ConfigError::ValidationError(
            "scheduler.expiry_margin_hours must be shorter than the download validity".to_string(),
        ));
    }

    if scheduler.preparation_batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.preparation_batch_size cannot be 0".to_string(),
        ));
    }

    if config.fetcher.download_base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "fetcher.download_base_url cannot be empty".to_string(),
        ));
    }

    if config.preparation.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "preparation.base_url cannot be empty".to_string(),
        ));
    }

    if config.mailbox.port == 0 {
        return Err(ConfigError::ValidationError(
            "mailbox.port cannot be 0".to_string(),
        ));
    }

    Ok(())
}
