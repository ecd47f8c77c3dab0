use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = SpecWriterError> = std::result::Result<T, E>;

/// Failures that abandon the scan currently being written.
#[derive(Debug, Error)]
pub enum SpecWriterError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to {action} {}: {source}", path.display())]
    Render {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stream for column {label} failed: {source}")]
    Stream {
        label: String,
        #[source]
        source: StreamError,
    },

    #[error("refresh of scan {key} failed: {source}")]
    Refresh {
        key: String,
        #[source]
        source: RegistryError,
    },

    #[error("column {label} holds more than {limit} unmatched points")]
    Backlog { label: String, limit: usize },
}

impl SpecWriterError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn render(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Render {
            action,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream is sealed and every point has been read.
    #[error("end of stream")]
    EndOfStream,

    #[error("stream unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no new scan within {0:?}")]
    TimedOut(Duration),

    #[error("unknown scan {0}")]
    UnknownScan(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}
