//! Uploading a file as parallel parts of one object.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use stripebench_io::{ByteRange, PartitionPlan, TaskGroup};

use crate::error::{Result, UploadError};
use crate::manifest::{CompletedPart, CompletionManifest};
use crate::response::{etag_header, unquote_etag, xml_tag};
use crate::source::{PartSource, SourceMode};
use crate::store::{Method, ObjectStore, StoreRequest, StoreResponse};

/// Counts part retries of one upload.
///
/// Clones share the same count, so every part task can record its retries.
#[derive(Clone, Debug, Default)]
pub struct RetryCounter(Arc<AtomicU32>);

impl RetryCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one retry.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// The number of retries recorded so far.
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// The result of a successful upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOutcome {
    /// The ETag of the final object, without quotes.
    pub etag: String,
    /// Number of parts the object was sent in. A single-request upload counts as one part.
    pub parts: u32,
    /// Size of the uploaded file.
    pub size: u64,
    /// Time from the first request to the last response.
    pub elapsed: Duration,
}

/// Uploads files to one key of a bucket.
///
/// With more than one worker the file is split like a benchmark extent and every part is sent
/// concurrently through the multipart protocol. A part whose response carries no ETag is sent again
/// up to `max_retries` times. With a single worker the whole file goes out in one request.
#[derive(Debug)]
pub struct MultipartUpload {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    workers: u32,
    max_retries: u32,
    source: SourceMode,
}

impl MultipartUpload {
    /// Prepares an upload to `key` in `bucket`, using one worker and two retries per part.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            key: key.into(),
            workers: 1,
            max_retries: 2,
            source: SourceMode::default(),
        }
    }

    /// Sets the number of concurrently uploaded parts.
    pub fn workers(mut self, workers: u32) -> Self {
        self.workers = workers;
        self
    }

    /// Sets how often a part without an ETag is sent again.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets how part bodies are read.
    pub fn source(mut self, source: SourceMode) -> Self {
        self.source = source;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            return Err(UploadError::InvalidArgument(format!(
                "number of jobs must be at least one, {} provided",
                self.workers
            )));
        }
        if self.max_retries < 1 {
            return Err(UploadError::InvalidArgument(format!(
                "number of retries must be at least one, {} provided",
                self.max_retries
            )));
        }
        Ok(())
    }

    /// Uploads the file at `path`, recording part retries in `retries`.
    #[tracing::instrument(skip_all, fields(path = %path.display(), bucket = %self.bucket, key = %self.key))]
    pub async fn upload(&self, path: &Path, retries: &RetryCounter) -> Result<UploadOutcome> {
        self.validate()?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(UploadError::io(format!("cannot open file {}", path.display())))?;
        let size = metadata.len();

        let start = Instant::now();
        let (etag, parts) = if self.workers == 1 {
            (self.put_object(path, size).await?, 1)
        } else {
            (self.multipart(path, size, retries).await?, self.workers)
        };

        let outcome = UploadOutcome {
            etag,
            parts,
            size,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            parts,
            size,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            retries = retries.get(),
            "upload complete"
        );
        Ok(outcome)
    }

    async fn put_object(&self, path: &Path, size: u64) -> Result<String> {
        let source = PartSource::open(path, size, 1, self.source).await?;
        let body = source.read(ByteRange::new(0, size)).await?;

        let request = StoreRequest::new(Method::PUT, &self.bucket, &self.key).body(body);
        let response = self.store.send(request).await?;
        check_status("PutObject", &response)?;

        let etag = etag_header(&response.headers).ok_or_else(|| UploadError::Protocol {
            operation: "PutObject",
            status: response.status,
            code: "missing ETag header".into(),
        })?;
        Ok(unquote_etag(&etag).to_owned())
    }

    async fn multipart(&self, path: &Path, size: u64, retries: &RetryCounter) -> Result<String> {
        let plan = PartitionPlan::new(size, self.workers)?;

        let upload_id = self.initiate().await?;
        tracing::debug!(%upload_id, parts = plan.worker_count(), "started multipart upload");

        match self.send_parts(path, &plan, &upload_id, retries).await {
            Ok(etag) => Ok(etag),
            Err(err) => {
                self.abort(&upload_id).await;
                Err(err)
            }
        }
    }

    async fn initiate(&self) -> Result<String> {
        let request = StoreRequest::new(Method::POST, &self.bucket, &self.key).query("uploads", "");
        let response = self.store.send(request).await?;
        check_status("CreateMultipartUpload", &response)?;

        xml_tag(&response.text(), "UploadId").ok_or_else(|| UploadError::Protocol {
            operation: "CreateMultipartUpload",
            status: response.status,
            code: "missing UploadId".into(),
        })
    }

    async fn send_parts(
        &self,
        path: &Path,
        plan: &PartitionPlan,
        upload_id: &str,
        retries: &RetryCounter,
    ) -> Result<String> {
        let source = PartSource::open(path, plan.total_extent(), plan.worker_count(), self.source)
            .await?;

        let mut group = TaskGroup::new();
        for assignment in plan.assignments(0) {
            let part = PartTask {
                store: Arc::clone(&self.store),
                bucket: self.bucket.clone(),
                key: self.key.clone(),
                upload_id: upload_id.to_owned(),
                number: assignment.index as u32 + 1,
                range: assignment.file_range,
                max_retries: self.max_retries,
            };
            let source = source.clone();
            let retries = retries.clone();
            group.spawn(async move { part.run(&source, &retries).await });
        }
        let parts = group.join_all().await?;

        let manifest = CompletionManifest::new(parts);
        let request = StoreRequest::new(Method::POST, &self.bucket, &self.key)
            .query("uploadId", upload_id)
            .body(manifest.to_body());
        let response = self.store.send(request).await?;
        check_status("CompleteMultipartUpload", &response)?;

        let etag = xml_tag(&response.text(), "ETag").ok_or_else(|| UploadError::Protocol {
            operation: "CompleteMultipartUpload",
            status: response.status,
            code: "missing ETag".into(),
        })?;
        Ok(unquote_etag(&etag).to_owned())
    }

    /// Releases the parts of a failed upload on the store.
    async fn abort(&self, upload_id: &str) {
        let request =
            StoreRequest::new(Method::DELETE, &self.bucket, &self.key).query("uploadId", upload_id);
        match self.store.send(request).await {
            Ok(response) if !response.is_error() => {
                tracing::debug!(upload_id, "aborted multipart upload");
            }
            Ok(response) => {
                tracing::warn!(upload_id, status = response.status, "failed to abort multipart upload");
            }
            Err(err) => {
                tracing::warn!(upload_id, error = &err as &dyn std::error::Error, "failed to abort multipart upload");
            }
        }
    }
}

/// Everything one part task needs, owned so the task can run detached.
struct PartTask {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    upload_id: String,
    number: u32,
    range: ByteRange,
    max_retries: u32,
}

impl PartTask {
    async fn run(self, source: &PartSource, retries: &RetryCounter) -> Result<CompletedPart> {
        let body = source.read(self.range).await?;
        let attempts = 1 + self.max_retries;

        for attempt in 1..=attempts {
            let request = StoreRequest::new(Method::PUT, &self.bucket, &self.key)
                .query("partNumber", self.number.to_string())
                .query("uploadId", &self.upload_id)
                .body(body.clone());
            let response = self.store.send(request).await?;
            check_status("UploadPart", &response)?;

            if let Some(etag) = etag_header(&response.headers) {
                tracing::debug!(part = self.number, attempt, "uploaded part");
                return Ok(CompletedPart {
                    number: self.number,
                    etag,
                });
            }

            if attempt < attempts {
                retries.increment();
                tracing::warn!(part = self.number, attempt, "no ETag in part response, retrying");
            }
        }

        Err(UploadError::PartUpload {
            part: self.number,
            attempts,
        })
    }
}

fn check_status(operation: &'static str, response: &StoreResponse) -> Result<()> {
    if !response.is_error() {
        return Ok(());
    }
    let code = xml_tag(&response.text(), "Code").unwrap_or_else(|| "unknown error".into());
    Err(UploadError::Protocol {
        operation,
        status: response.status,
        code,
    })
}
