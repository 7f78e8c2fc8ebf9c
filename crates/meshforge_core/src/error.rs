//! Error types for Meshforge.
//!
//! Two tiers: [`ForgeError`] covers fatal conditions that abort a run or
//! service, [`JobError`] covers per-job failures that the outer loops recover
//! from and count as failed jobs.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal error type. Any of these aborts the whole run/service; the external
/// supervisor distinguishes them from clean shutdown by exit code.
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Worker not available: {0}")]
    UnavailableWorker(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ForgeError {
    /// Process exit code for this error so the supervisor can tell
    /// restart-worthy failures apart from clean shutdown.
    pub fn exit_code(&self) -> u8 {
        match self {
            ForgeError::Configuration(_) => 2,
            ForgeError::UnavailableWorker(_) => 3,
            ForgeError::Io(_) => 1,
        }
    }
}

/// Per-job failure. Reported and counted, never aborts the run.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Job input no longer exists: {0}")]
    MissingInput(PathBuf),

    #[error("Failed to launch worker: {0}")]
    Launch(#[source] io::Error),
}

/// Result type alias for fatal paths.
pub type Result<T> = std::result::Result<T, ForgeError>;
