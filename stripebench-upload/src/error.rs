use std::io;

use thiserror::Error;

/// Errors that can occur while uploading a file.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Bad upload parameters.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading the local file failed.
    #[error("i/o error: {context}")]
    Io {
        /// What was being attempted.
        context: String,
        /// The underlying system error.
        #[source]
        source: io::Error,
    },

    /// The object store rejected a request or answered with something unusable.
    #[error("{operation} failed with status {status}: {code}")]
    Protocol {
        /// The store operation, e.g. `CreateMultipartUpload`.
        operation: &'static str,
        /// The HTTP status of the response.
        status: u16,
        /// The error code reported by the store, or a description of what was missing.
        code: String,
    },

    /// A part never returned an ETag within its retry budget.
    #[error("part {part} failed after {attempts} attempts: no ETag in response")]
    PartUpload {
        /// The 1-based number of the failed part.
        part: u32,
        /// How many times the part was sent.
        attempts: u32,
    },

    /// The request could not be sent or its response could not be received.
    #[error("transport error")]
    Transport(#[from] reqwest::Error),

    /// No usable credentials were found.
    #[error("credentials error: {0}")]
    Credentials(String),

    /// Reading the file with the parallel transfer engine failed.
    #[error("failed to load file")]
    Engine(#[from] stripebench_io::Error),
}

impl UploadError {
    /// Returns a closure that wraps an [`io::Error`] with the given context.
    pub fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }
}

impl From<tokio::task::JoinError> for UploadError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Engine(err.into())
    }
}

/// A convenience alias that defaults our [`UploadError`] type.
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
