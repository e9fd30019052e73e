//! Crate-wide error type.

pub mod classification;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::lock::LockError;
use crate::manifest::ManifestError;
use crate::parallel::dependency::GraphError;

pub use classification::ErrorCategory;

/// Exit code used when the run was interrupted (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Errors that end a `parallel-full` run.
#[derive(Error, Debug)]
pub enum RalphError {
    /// The repository has no `.ralph` directory.
    #[error(".ralph directory not found in {}. Run \"ralph init\" first.", .0.display())]
    NotInitialized(PathBuf),

    /// The spec markdown file does not exist.
    #[error("Spec file not found: {}", .0.display())]
    SpecNotFound(PathBuf),

    /// Credentials file for execution units is missing.
    #[error("{} not found. Run \"ralph init\" to configure credentials.", .0.display())]
    EnvFileMissing(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Lock(#[from] LockError),

    /// Every member of a batch failed to launch.
    #[error("All launches failed ({attempted} sub-spec(s) in the batch could not be started)")]
    AllLaunchesFailed { attempted: usize },

    /// The user interrupted the run; running units were stopped.
    #[error("Interrupted: stopped {stopped} running execution unit(s)")]
    Interrupted { stopped: usize },

    /// IO error outside of the manifest store.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for run-level operations.
pub type RalphResult<T> = Result<T, RalphError>;

impl RalphError {
    /// Classify this error into the failure taxonomy.
    pub fn classify(&self) -> ErrorCategory {
        match self {
            RalphError::AllLaunchesFailed { .. } => ErrorCategory::Launch,
            RalphError::Interrupted { .. } => ErrorCategory::Interrupted,
            RalphError::Io(_) => ErrorCategory::Persistence,
            _ => ErrorCategory::Configuration,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            RalphError::Interrupted { .. } => INTERRUPTED_EXIT_CODE,
            _ => 1,
        }
    }
}
