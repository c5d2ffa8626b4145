use std::fmt;

use chrono::Utc;
use reqwest::Url;

use crate::credentials::Credentials;
use crate::error::{Result, UploadError};
use crate::sign::{self, SigningRequest, UNSIGNED_PAYLOAD};
use crate::store::{Method, ObjectStore, StoreRequest, StoreResponse};

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("stripebench/", env!("CARGO_PKG_VERSION"));

/// An S3-compatible store addressed path-style, as `{endpoint}/{bucket}/{key}`.
///
/// Requests are signed with Signature Version 4. Part and object bodies are sent as unsigned
/// payloads so large parts are not hashed twice. Control requests sign their body.
pub struct S3Client {
    http: reqwest::Client,
    endpoint: Url,
    host: String,
    region: String,
    credentials: Credentials,
}

impl S3Client {
    /// Creates a client for the store at `endpoint`, an `http` or `https` URL.
    pub fn new(endpoint: &str, region: impl Into<String>, credentials: Credentials) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|err| {
            UploadError::InvalidArgument(format!("invalid endpoint {endpoint:?}: {err}"))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(UploadError::InvalidArgument(
                "only 'http' and 'https' endpoints are supported".into(),
            ));
        }
        let Some(host) = endpoint.host_str() else {
            return Err(UploadError::InvalidArgument(format!(
                "endpoint {endpoint} has no host"
            )));
        };
        let host = match endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };

        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            http,
            endpoint,
            host,
            region: region.into(),
            credentials,
        })
    }

    fn path(&self, bucket: &str, key: &str) -> String {
        let base = self.endpoint.path().trim_end_matches('/');
        format!(
            "{base}/{}/{}",
            sign::pct_encode(bucket),
            sign::pct_encode_path(key.trim_start_matches('/'))
        )
    }
}

impl fmt::Debug for S3Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Client")
            .field("endpoint", &self.endpoint.as_str())
            .field("region", &self.region)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3Client {
    #[tracing::instrument(level = "trace", skip_all, fields(method = %request.method, key = %request.key))]
    async fn send(&self, request: StoreRequest) -> Result<StoreResponse> {
        let path = self.path(&request.bucket, &request.key);
        let payload_hash = if request.method == Method::PUT {
            UNSIGNED_PAYLOAD.to_owned()
        } else {
            sign::sha256_hex(&request.body)
        };

        let headers = sign::sign(
            SigningRequest {
                method: request.method.as_str(),
                host: &self.host,
                path: &path,
                query: &request.query,
                payload_hash: &payload_hash,
                headers: Default::default(),
            },
            &self.credentials,
            &self.region,
            Utc::now(),
        );

        let query = sign::canonical_query(&request.query);
        let mut url = format!("{}://{}{path}", self.endpoint.scheme(), self.host);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        let mut builder = self.http.request(request.method, url);
        for (name, value) in headers {
            // reqwest derives the host header from the URL
            if name != "host" {
                builder = builder.header(name, value);
            }
        }

        let response = builder.body(request.body).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        tracing::trace!(status, body_len = body.len(), "received response");

        Ok(StoreResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials::new("access", "hunter2")
    }

    #[test]
    fn builds_path_style_paths() {
        let client = S3Client::new("https://s3.example.org", "us-east-1", credentials()).unwrap();
        assert_eq!(client.host, "s3.example.org");
        assert_eq!(client.path("bench", "dir/a file.bin"), "/bench/dir/a%20file.bin");
    }

    #[test]
    fn keeps_explicit_ports() {
        let client = S3Client::new("http://localhost:9000/", "us-east-1", credentials()).unwrap();
        assert_eq!(client.host, "localhost:9000");
        assert_eq!(client.path("b", "k"), "/b/k");
    }

    #[test]
    fn rejects_unsupported_endpoints() {
        let err = S3Client::new("ftp://example.org", "us-east-1", credentials()).unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));

        let err = S3Client::new("not a url", "us-east-1", credentials()).unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));
    }

    #[test]
    fn debug_hides_secret() {
        let client = S3Client::new("https://s3.example.org", "us-east-1", credentials()).unwrap();
        assert!(!format!("{client:?}").contains("hunter2"));
    }
}
