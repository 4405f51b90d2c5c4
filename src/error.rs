//! Error types for artifact-forge
//!
//! This module provides the error taxonomy for the orchestration core:
//! - Run-level fatal errors (`Parse`, `Config`) that abort before any session work
//! - Provider-fatal errors (`LoginTimeout`) that end all artifacts for one provider
//! - Per-artifact retryable errors (`GenerationTimeout`, `DownloadTimeout`,
//!   `SessionFault`) that are contained by the retry controller
//! - Filesystem materialization errors (`Organize`)
//!
//! Retryability classification lives in [`crate::retry::IsRetryable`].

use crate::types::Provider;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for artifact-forge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for artifact-forge
///
/// Each variant carries enough context to render the artifact-level failure
/// line in the run summary (artifact name and attempt count are attached by
/// the orchestration loop, not here).
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed artifact definition, surfaced before any session work
    #[error("parse error: {0}")]
    Parse(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "poll_interval")
        key: Option<String>,
    },

    /// Manual login did not complete before the deadline (fatal for this
    /// provider for the rest of the run)
    #[error("login timed out for provider {provider}")]
    LoginTimeout {
        /// The provider whose session never reached a logged-in state
        provider: Provider,
    },

    /// The platform did not signal generation completion before the deadline
    #[error("generation timed out after {timeout:?}")]
    GenerationTimeout {
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// No stable download appeared in the watched directory before the deadline
    #[error("no stable download appeared within {timeout:?}")]
    DownloadTimeout {
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// Transient automation fault reported by the session driver
    #[error("session fault: {0}")]
    SessionFault(String),

    /// File-system level failure materializing an output
    #[error("organize error: {0}")]
    Organize(#[from] OrganizeError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operator-initiated cancellation
    #[error("run cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// File organization errors (backup, move, collision handling)
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// The located download disappeared before it could be moved
    #[error("source file not found: {}", path.display())]
    SourceMissing {
        /// The download path that no longer exists
        path: PathBuf,
    },

    /// Destination already occupied while the skip-existing policy is active
    #[error("destination already exists: {}", path.display())]
    Collision {
        /// The occupied destination path
        path: PathBuf,
    },

    /// Backing up the existing destination file failed
    #[error("failed to back up {}: {reason}", path.display())]
    BackupFailed {
        /// The existing file that could not be backed up
        path: PathBuf,
        /// The reason the backup failed
        reason: String,
    },

    /// Copy or rename into the destination failed
    #[error("failed to move {} to {}: {reason}", source_path.display(), dest.display())]
    MoveFailed {
        /// The source path of the file being moved
        source_path: PathBuf,
        /// The destination path where the file should land
        dest: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// A path could not be decomposed into directory/stem/extension
    #[error("invalid path {}: {reason}", path.display())]
    InvalidPath {
        /// The invalid path
        path: PathBuf,
        /// The reason the path is invalid
        reason: String,
    },
}

impl Error {
    /// Machine-readable snake_case code for this error
    ///
    /// Used by [`crate::types::RunSummary`] so failures are reported with a
    /// stable error kind rather than a free-form message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Parse(_) => "parse_error",
            Error::Config { .. } => "config_error",
            Error::LoginTimeout { .. } => "login_timeout",
            Error::GenerationTimeout { .. } => "generation_timeout",
            Error::DownloadTimeout { .. } => "download_timeout",
            Error::SessionFault(_) => "session_fault",
            Error::Organize(e) => match e {
                OrganizeError::SourceMissing { .. } => "organize_source_missing",
                OrganizeError::Collision { .. } => "organize_collision",
                OrganizeError::BackupFailed { .. } => "organize_backup_failed",
                OrganizeError::MoveFailed { .. } => "organize_move_failed",
                OrganizeError::InvalidPath { .. } => "organize_invalid_path",
            },
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Cancelled => "cancelled",
            Error::Other(_) => "internal_error",
        }
    }
}
