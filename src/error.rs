//! Error types shared by the registry, selector, resolver, and engine.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio::task::JoinError;

/// Failures that stop a whole run before or while it executes.
///
/// Per-host failures are not represented here; they become a [Status] on that host's result.
///
/// [Status]: crate::engine::Status
#[derive(Debug, Error)]
pub enum Error {
    #[error("no host registry found; searched: {}", display_paths(.searched))]
    RegistryNotFound { searched: Vec<PathBuf> },

    #[error("failed to read host registry {}: {source}", .path.display())]
    RegistryRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("host registry defines no aliases")]
    RegistryEmpty,

    #[error("no servers found")]
    NoFleetMembers,

    #[error("interrupted")]
    Interrupted,

    /// The scratch space for concurrent output capture could not be created or read.
    #[error("scratch space error: {0}")]
    Scratch(#[from] io::Error),

    #[error("failed to write transcript: {0}")]
    Transcript(#[source] io::Error),

    #[error("host task failed: {0}")]
    Join(#[from] JoinError),
}

/// Reasons an alias cannot be turned into an address.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown alias: {0}")]
    AliasNotFound(String),

    #[error("{alias} may only be used from {required}, but this host is {actual}")]
    LocalOnlyViolation {
        alias: String,
        required: String,
        actual: String,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
