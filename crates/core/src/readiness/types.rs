//! Types for the readiness oracle.

use std::collections::HashSet;

use async_trait::async_trait;
use regex_lite::Regex;
use thiserror::Error;

/// Errors talking to the notification channel.
#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Mailbox error: {0}")]
    Protocol(String),

    #[error("Invalid download link pattern: {0}")]
    Pattern(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Source of download ids that are ready to be fetched.
#[async_trait]
pub trait ReadinessOracle: Send + Sync {
    /// Poll the notification channel for new ready ids.
    ///
    /// Never fails: transient errors are logged and the previously known set
    /// stays valid.
    async fn refresh(&self);

    /// All ready ids seen so far. The set only grows.
    async fn ready_ids(&self) -> HashSet<String>;
}

/// Regex matching `{base_url}/{uuid}.tar` and capturing the uuid.
pub fn download_link_pattern(base_url: &str) -> Result<Regex, ReadinessError> {
    let pattern = format!(
        r"{}/([0-9a-f]{{8}}-[0-9a-f]{{4}}-[0-9a-f]{{4}}-[0-9a-f]{{4}}-[0-9a-f]{{12}})\.tar",
        regex_lite::escape(base_url.trim_end_matches('/'))
    );
    Regex::new(&pattern).map_err(|e| ReadinessError::Pattern(e.to_string()))
}

/// Every download id linked in `text`.
pub fn extract_download_ids(pattern: &Regex, text: &str) -> HashSet<String> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.wien.gv.at/ogdgeodata/download";

    #[test]
    fn test_extracts_all_ids_in_body() {
        let pattern = download_link_pattern(BASE).unwrap();
        let body = "Ihre Daten:\n\
            https://www.wien.gv.at/ogdgeodata/download/5276d431-a054-4a84-a38c-6dfbccefdef0.tar\n\
            und https://www.wien.gv.at/ogdgeodata/download/56a27033-35ed-4c3c-ba14-704cc256efac.tar.\n";

        let ids = extract_download_ids(&pattern, body);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("5276d431-a054-4a84-a38c-6dfbccefdef0"));
        assert!(ids.contains("56a27033-35ed-4c3c-ba14-704cc256efac"));
    }

    #[test]
    fn test_ignores_other_hosts_and_malformed_ids() {
        let pattern = download_link_pattern(BASE).unwrap();
        let body = "https://example.com/ogdgeodata/download/5276d431-a054-4a84-a38c-6dfbccefdef0.tar \
            https://www.wien.gv.at/ogdgeodata/download/not-a-uuid.tar \
            https://wwwXwien.gv.at/ogdgeodata/download/e4a3d58b-2c58-4991-8e98-ae7b635d25cf.tar";
        assert!(extract_download_ids(&pattern, body).is_empty());
    }

    #[test]
    fn test_trailing_slash_in_base_url() {
        let pattern = download_link_pattern(&format!("{}/", BASE)).unwrap();
        let body = format!("{}/e4a3d58b-2c58-4991-8e98-ae7b635d25cf.tar", BASE);
        assert_eq!(extract_download_ids(&pattern, &body).len(), 1);
    }
}
