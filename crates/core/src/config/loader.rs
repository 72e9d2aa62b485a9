use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix for environment variable overrides, e.g. `KAPPASYNC_MAILBOX__PASSWORD`.
pub const ENV_PREFIX: &str = "KAPPASYNC_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[preparation]
notification_email = "me@example.com"
mail_confirmation_id = "2d4bf8b8-88cb-4c9c-b29b-bf2f5ef50c8f"

[mailbox]
username = "me@example.com"
password = "app-password"

[uploader]
user_name = "mapper"
user_email = "me@example.com"
user_password = "secret"
"#;

    #[test]
    fn test_load_config_from_str_valid() {
        let config = load_config_from_str(MINIMAL).unwrap();
        assert_eq!(config.mailbox.host, "imap.gmail.com");
        assert_eq!(config.uploader.user_name, "mapper");
    }

    #[test]
    fn test_load_config_from_str_missing_mailbox() {
        let toml = r#"
[preparation]
notification_email = "me@example.com"
mail_confirmation_id = "x"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/kappasync.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            "{}\n[database]\npath = \"/data/state.db\"\n",
            MINIMAL
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "/data/state.db");
        assert_eq!(config.preparation.notification_email, "me@example.com");
    }
}
