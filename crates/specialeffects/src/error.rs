//! Error types for show construction and playback.

use std::path::PathBuf;

/// Convenience result type used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while building or playing a show.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid show definition (unknown easing, zero repeat count, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// A light or group name that is not registered.
    #[error("light or group '{0}' not found")]
    TargetNotFound(String),

    /// A light capability call failed.
    #[error("light '{target}' failed: {source}")]
    Device {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    /// The sound backend failed to play a file.
    #[error("failed to play sound {}: {source}", .file.display())]
    Sound {
        file: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A custom callable returned an error.
    #[error("custom effect failed: {0}")]
    Custom(#[source] anyhow::Error),

    /// A blocking worker or background task panicked.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// More than one branch of a fan-out failed. Branch order is preserved.
    #[error("{} concurrent branches failed{}", .0.len(), first_failure(.0))]
    FanOut(Vec<Error>),

    /// The scheduler could not be started.
    #[error("failed to start scheduler: {0}")]
    Runtime(#[from] std::io::Error),
}

impl Error {
    /// Build an [`Error::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Collapse the outcomes of a fan-out: every branch has already finished.
    pub(crate) fn collect(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
        let mut failures: Vec<Error> = results.into_iter().filter_map(Result::err).collect();
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(Self::FanOut(failures)),
        }
    }
}

fn first_failure(failures: &[Error]) -> String {
    failures
        .first()
        .map(|err| format!("; first: {err}"))
        .unwrap_or_default()
}
