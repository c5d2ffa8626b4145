use std::io;

use thiserror::Error;

/// Errors that can occur while partitioning, transferring or describing a file.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad partition, launcher or benchmark parameters.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A local file, seek, transfer or mapping call failed.
    #[error("i/o error: {context}")]
    Io {
        /// What was being attempted, including the path involved.
        context: String,
        /// The underlying system error.
        #[source]
        source: io::Error,
    },

    /// The storage layout of a path could not be recovered.
    #[error("layout error: {0}")]
    Topology(String),

    /// A worker panicked or was cancelled before reporting a result.
    #[error("worker did not complete: {0}")]
    Join(String),
}

impl Error {
    /// Returns a closure that wraps an [`io::Error`] with the given context.
    ///
    /// Meant for `map_err`: `file.sync_all().map_err(Error::io("failed to sync"))?`.
    pub fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
