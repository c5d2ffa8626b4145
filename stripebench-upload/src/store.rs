//! The object store seen by the uploader.
//!
//! The coordinator only builds requests and interprets responses. Signing and transport live
//! behind [`ObjectStore`], so tests can swap in a scripted store.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

pub use reqwest::Method;
pub use reqwest::header::HeaderMap;

use crate::error::Result;

/// A request addressed to one object of a bucket.
#[derive(Clone)]
pub struct StoreRequest {
    /// The HTTP method.
    pub method: Method,
    /// The bucket holding the object.
    pub bucket: String,
    /// The object key.
    pub key: String,
    /// Query parameters. Sub-resources without a value, like `uploads`, map to an empty string.
    pub query: BTreeMap<String, String>,
    /// The request body.
    pub body: Bytes,
}

impl StoreRequest {
    /// Creates a request with no query and an empty body.
    pub fn new(method: Method, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            method,
            bucket: bucket.into(),
            key: key.into(),
            query: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    /// Adds a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Sets the request body.
    pub fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }
}

impl fmt::Debug for StoreRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRequest")
            .field("method", &self.method)
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("query", &self.query)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// The status, headers and body of a store response.
#[derive(Clone, Debug, Default)]
pub struct StoreResponse {
    /// The HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// The full response body.
    pub body: Bytes,
}

impl StoreResponse {
    /// Returns `true` for statuses the store uses to report errors.
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// The body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends signed requests to an object store.
#[async_trait::async_trait]
pub trait ObjectStore: fmt::Debug + Send + Sync + 'static {
    /// Sends `request` and returns the complete response.
    ///
    /// Error statuses are returned as responses. Only failures to exchange the request fail.
    async fn send(&self, request: StoreRequest) -> Result<StoreResponse>;
}
