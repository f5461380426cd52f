//! Error types for the palisade daemon.

use thiserror::Error;

/// Result type alias for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors that can occur while configuring and running the daemon.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Configuration file is invalid or names no usable setup.
    #[error("config error: {0}")]
    Config(String),

    /// Identity bootstrap or instance supervision failed.
    #[error(transparent)]
    Core(#[from] palisade_core::CoreError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
