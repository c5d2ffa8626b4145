use std::sync::Arc;

use stripebench_io::pattern;
use stripebench_test::fixtures;
use stripebench_test::store::{FINAL_ETAG, MockStore, UPLOAD_ID};
use stripebench_upload::{MultipartUpload, RetryCounter, SourceMode, UploadError};

fn upload(store: &Arc<MockStore>) -> MultipartUpload {
    MultipartUpload::new(store.clone(), "bench", "data.bin")
}

#[tokio::test]
async fn manifest_lists_parts_in_order() {
    stripebench_test::tracing::init();
    let file = fixtures::pattern_file(4000);
    let store = Arc::new(MockStore::new());
    let retries = RetryCounter::new();

    let outcome = upload(&store)
        .workers(4)
        .upload(file.path(), &retries)
        .await
        .unwrap();
    assert_eq!(outcome.etag, FINAL_ETAG);
    assert_eq!(outcome.parts, 4);
    assert_eq!(outcome.size, 4000);
    assert_eq!(retries.get(), 0);

    let manifest = store.manifest().unwrap();
    let expected: String = (1..=4)
        .map(|n| format!("<Part><ETag>&quot;etag-{n}&quot;</ETag><PartNumber>{n}</PartNumber></Part>"))
        .collect();
    assert!(manifest.contains(&expected), "{manifest}");

    let complete = store.requests_for("complete");
    assert_eq!(complete[0].query["uploadId"], UPLOAD_ID);
}

#[tokio::test]
async fn parts_cover_the_file() {
    stripebench_test::tracing::init();
    let file = fixtures::pattern_file(1003);
    let contents = pattern::window(0, 1003);

    for mode in [SourceMode::None, SourceMode::Preload, SourceMode::Map] {
        let store = Arc::new(MockStore::new());
        upload(&store)
            .workers(3)
            .source(mode)
            .upload(file.path(), &RetryCounter::new())
            .await
            .unwrap();

        let mut parts = store.requests_for("part");
        parts.sort_by_key(|r| r.query["partNumber"].parse::<u32>().unwrap());
        let lengths: Vec<_> = parts.iter().map(|r| r.body.len()).collect();
        assert_eq!(lengths, [334, 334, 335], "{mode}");

        let joined: Vec<u8> = parts.iter().flat_map(|r| r.body.iter().copied()).collect();
        assert_eq!(joined, contents.as_ref(), "{mode}");
    }
}

#[tokio::test]
async fn part_without_etag_exhausts_retries() {
    stripebench_test::tracing::init();
    let file = fixtures::pattern_file(4000);
    let store = Arc::new(MockStore::new());
    store.drop_etag(2);
    let retries = RetryCounter::new();

    let err = upload(&store)
        .workers(4)
        .max_retries(2)
        .upload(file.path(), &retries)
        .await
        .unwrap_err();

    assert!(
        matches!(err, UploadError::PartUpload { part: 2, attempts: 3 }),
        "{err:?}"
    );
    assert!(retries.get() >= 1);
    assert_eq!(store.requests_for("complete").len(), 0);
    assert_eq!(store.requests_for("abort").len(), 1);
}

#[tokio::test]
async fn initiate_error_surfaces_store_code() {
    stripebench_test::tracing::init();
    let file = fixtures::pattern_file(100);
    let store = Arc::new(MockStore::new());
    store.fail("initiate", 403, "AccessDenied");

    let err = upload(&store)
        .workers(2)
        .upload(file.path(), &RetryCounter::new())
        .await
        .unwrap_err();

    match err {
        UploadError::Protocol {
            operation,
            status,
            code,
        } => {
            assert_eq!(operation, "CreateMultipartUpload");
            assert_eq!(status, 403);
            assert_eq!(code, "AccessDenied");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.requests_for("part").is_empty());
}

#[tokio::test]
async fn part_error_status_is_not_retried() {
    stripebench_test::tracing::init();
    let file = fixtures::pattern_file(100);
    let store = Arc::new(MockStore::new());
    store.fail("part", 500, "InternalError");
    let retries = RetryCounter::new();

    let err = upload(&store)
        .workers(2)
        .upload(file.path(), &retries)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Protocol { status: 500, .. }));
    assert_eq!(retries.get(), 0);
}

#[tokio::test]
async fn complete_error_aborts_upload() {
    stripebench_test::tracing::init();
    let file = fixtures::pattern_file(4000);
    let store = Arc::new(MockStore::new());
    store.fail("complete", 500, "InternalError");

    let err = upload(&store)
        .workers(4)
        .upload(file.path(), &RetryCounter::new())
        .await
        .unwrap_err();

    match err {
        UploadError::Protocol {
            operation,
            status,
            code,
        } => {
            assert_eq!(operation, "CompleteMultipartUpload");
            assert_eq!(status, 500);
            assert_eq!(code, "InternalError");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(store.requests_for("part").len(), 4);

    let aborts = store.requests_for("abort");
    assert_eq!(aborts.len(), 1);
    assert_eq!(aborts[0].query["uploadId"], UPLOAD_ID);
}

#[tokio::test]
async fn single_job_uses_one_put() {
    stripebench_test::tracing::init();
    let file = fixtures::file_with(b"hello object store");
    let store = Arc::new(MockStore::new());

    let outcome = upload(&store)
        .upload(file.path(), &RetryCounter::new())
        .await
        .unwrap();

    assert_eq!(outcome.etag, FINAL_ETAG);
    assert_eq!(outcome.parts, 1);
    let requests = store.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body.as_ref(), b"hello object store");
    assert!(requests[0].query.is_empty());
}

#[tokio::test]
async fn rejects_invalid_parameters() {
    let file = fixtures::file_with(b"x");
    let store = Arc::new(MockStore::new());

    let err = upload(&store)
        .workers(0)
        .upload(file.path(), &RetryCounter::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidArgument(_)));

    let err = upload(&store)
        .max_retries(0)
        .upload(file.path(), &RetryCounter::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidArgument(_)));

    assert!(store.requests().is_empty());
}
