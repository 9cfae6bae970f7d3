//! Error types for masksync.

use masksync_raster::RasterError;

use crate::config::ConfigError;

/// Errors from the segmentation/storage endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Service worker disconnected")]
    Disconnected,
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type alias for masksync operations.
pub type Result<T> = std::result::Result<T, Error>;
