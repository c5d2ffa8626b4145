//! A scripted in-memory object store.
//!
//! ```
//! use std::sync::Arc;
//! use stripebench_test::store::MockStore;
//!
//! let store = Arc::new(MockStore::new());
//! store.drop_etag(2);
//! // hand `store.clone()` to a `MultipartUpload` and inspect `store.requests()` afterwards
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use bytes::Bytes;
use stripebench_upload::store::{HeaderMap, Method};
use stripebench_upload::{ObjectStore, Result, StoreRequest, StoreResponse};

/// The upload id handed out by [`MockStore`].
pub const UPLOAD_ID: &str = "mock-upload-id";

/// The ETag of objects completed by [`MockStore`].
pub const FINAL_ETAG: &str = "mock-final-etag";

/// A recorded request.
#[derive(Clone, Debug)]
pub struct Recorded {
    /// The request method.
    pub method: Method,
    /// The object key.
    pub key: String,
    /// The query parameters.
    pub query: BTreeMap<String, String>,
    /// The request body.
    pub body: Bytes,
}

#[derive(Debug, Default)]
struct State {
    requests: Vec<Recorded>,
    missing_etags: BTreeSet<u32>,
    failing: BTreeMap<&'static str, (u16, String)>,
}

/// An [`ObjectStore`] that answers the multipart protocol from memory.
///
/// Parts get the ETag `"etag-{n}"` unless [`drop_etag`](Self::drop_etag) was called for them.
#[derive(Debug, Default)]
pub struct MockStore {
    state: Mutex<State>,
}

impl MockStore {
    /// Creates a store that accepts every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every upload of part `number` without an ETag.
    pub fn drop_etag(&self, number: u32) {
        self.state.lock().unwrap().missing_etags.insert(number);
    }

    /// Fails the given operation with `status` and the error `code`.
    ///
    /// Operations are `initiate`, `part`, `complete`, `put` and `abort`.
    pub fn fail(&self, operation: &'static str, status: u16, code: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(operation, (status, code.to_owned()));
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Requests of one operation, in arrival order.
    pub fn requests_for(&self, operation: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| operation_of(&r.method, &r.query) == operation)
            .collect()
    }

    /// The body of the completion request, if one was received.
    pub fn manifest(&self) -> Option<String> {
        self.requests_for("complete")
            .last()
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
    }
}

fn operation_of(method: &Method, query: &BTreeMap<String, String>) -> &'static str {
    match *method {
        Method::POST if query.contains_key("uploads") => "initiate",
        Method::POST => "complete",
        Method::PUT if query.contains_key("partNumber") => "part",
        Method::PUT => "put",
        Method::DELETE => "abort",
        _ => "unknown",
    }
}

fn response(status: u16, body: impl Into<Bytes>) -> StoreResponse {
    StoreResponse {
        status,
        headers: HeaderMap::new(),
        body: body.into(),
    }
}

fn with_etag(mut response: StoreResponse, etag: String) -> StoreResponse {
    response
        .headers
        .insert("etag", etag.parse().unwrap());
    response
}

#[async_trait::async_trait]
impl ObjectStore for MockStore {
    async fn send(&self, request: StoreRequest) -> Result<StoreResponse> {
        let operation = operation_of(&request.method, &request.query);

        let mut state = self.state.lock().unwrap();
        state.requests.push(Recorded {
            method: request.method.clone(),
            key: request.key.clone(),
            query: request.query.clone(),
            body: request.body.clone(),
        });

        if let Some((status, code)) = state.failing.get(operation) {
            let body = format!("<Error><Code>{code}</Code><Message>mock failure</Message></Error>");
            return Ok(response(*status, body));
        }

        Ok(match operation {
            "initiate" => response(
                200,
                format!(
                    "<InitiateMultipartUploadResult><UploadId>{UPLOAD_ID}</UploadId>\
                     </InitiateMultipartUploadResult>"
                ),
            ),
            "part" => {
                let number: u32 = request.query["partNumber"].parse().unwrap();
                let ok = response(200, Bytes::new());
                if state.missing_etags.contains(&number) {
                    ok
                } else {
                    with_etag(ok, format!("\"etag-{number}\""))
                }
            }
            "complete" => response(
                200,
                format!(
                    "<CompleteMultipartUploadResult><ETag>&quot;{FINAL_ETAG}&quot;</ETag>\
                     </CompleteMultipartUploadResult>"
                ),
            ),
            "put" => with_etag(response(200, Bytes::new()), format!("\"{FINAL_ETAG}\"")),
            "abort" => response(204, Bytes::new()),
            _ => response(405, "<Error><Code>MethodNotAllowed</Code></Error>"),
        })
    }
}
