//! Types for the preparation service.

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::Polygon;

/// Errors from the preparation service.
#[derive(Debug, Error)]
pub enum PreparationError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for PreparationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PreparationError::Timeout
        } else if e.is_decode() {
            PreparationError::InvalidResponse(e.to_string())
        } else {
            PreparationError::ConnectionFailed(e.to_string())
        }
    }
}

/// A registered download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDownload {
    /// Opaque id; becomes fetchable after the confirmation handshake.
    pub download_id: String,
    /// Expected archive size in bytes.
    pub size_bytes: u64,
}

/// Registers download requests with the geodata service.
///
/// A prepared id only becomes fetchable after `request_confirmation`, a
/// settle period, and `confirm`.
#[async_trait]
pub trait PreparationService: Send + Sync {
    /// Register a download for the area covered by `footprint`.
    async fn prepare(&self, footprint: &Polygon) -> Result<PreparedDownload, PreparationError>;

    /// Ask the service to mail a confirmation for `download_id`.
    async fn request_confirmation(&self, download_id: &str) -> Result<(), PreparationError>;

    /// Confirm the notification address, releasing pending downloads.
    async fn confirm(&self, download_id: &str) -> Result<(), PreparationError>;
}
