//! Parallel multipart uploads to S3-compatible object stores.
//!
//! [`MultipartUpload`] splits a file into parts with the same rule the I/O benchmarks use, sends
//! every part concurrently through an [`ObjectStore`] and stitches them together with a completion
//! manifest. [`S3Client`] is the production store: path-style addressing, Signature Version 4 and
//! a `reqwest` transport.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod coordinator;
pub mod credentials;
mod error;
pub mod manifest;
pub mod response;
mod s3;
pub mod sign;
pub mod source;
pub mod store;

pub use coordinator::{MultipartUpload, RetryCounter, UploadOutcome};
pub use credentials::Credentials;
pub use error::{Result, UploadError};
pub use manifest::{CompletedPart, CompletionManifest};
pub use s3::{S3Client, USER_AGENT};
pub use source::{PartSource, SourceMode};
pub use store::{ObjectStore, StoreRequest, StoreResponse};
