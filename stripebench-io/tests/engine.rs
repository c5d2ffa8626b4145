use std::fs;

use bytes::Bytes;
use stripebench_io::transfer::TransferOptions;
use stripebench_io::{
    Benchmark, ByteRange, Error, Mode, StrategyKind, SyncPolicy, Transfer, pattern,
};

const STRATEGIES: [StrategyKind; 3] = [
    StrategyKind::Buffered,
    StrategyKind::Unbuffered,
    StrategyKind::MemoryMapped,
];

#[tokio::test]
async fn write_then_read_across_strategies() {
    stripebench_test::tracing::init();
    let dir = tempfile::tempdir().unwrap();
    let extent = 3 * 4096 + 123;

    for writer in STRATEGIES {
        let path = dir.path().join(format!("{writer}.bin"));
        let source = pattern::window(0, extent as usize);

        let report = Benchmark::builder(&path, extent)
            .workers(3)
            .mode(Mode::Write)
            .strategy(writer)
            .sync(SyncPolicy::Worker)
            .source(source.clone())
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();
        assert!(report.buffer.is_none());
        assert_eq!(report.bytes_moved(), extent);
        assert_eq!(fs::read(&path).unwrap(), source.as_ref());

        for reader in STRATEGIES {
            let report = Benchmark::builder(&path, extent)
                .workers(4)
                .strategy(reader)
                .build()
                .unwrap()
                .run()
                .await
                .unwrap();

            let buffer = report.buffer.as_ref().unwrap();
            assert_eq!(buffer.as_ref(), source.as_ref(), "{writer} -> {reader}");
            assert_eq!(report.results.len(), report.plan.worker_count() as usize);
        }
    }
}

#[tokio::test]
async fn reads_with_small_blocks() {
    stripebench_test::tracing::init();
    let file = stripebench_test::fixtures::pattern_file(10_000);

    for strategy in [StrategyKind::Buffered, StrategyKind::Unbuffered] {
        let report = Benchmark::builder(file.path(), 10_000)
            .workers(3)
            .strategy(strategy)
            .block_size(Some(97))
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        let buffer = report.buffer.unwrap();
        assert_eq!(buffer.as_ref(), pattern::window(0, 10_000).as_ref());
    }
}

#[tokio::test]
async fn global_offset_reads_a_shard() {
    stripebench_test::tracing::init();
    let file = stripebench_test::fixtures::pattern_file(8192);

    let report = Benchmark::builder(file.path(), 4096)
        .workers(2)
        .global_offset(4096)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let buffer = report.buffer.unwrap();
    assert_eq!(buffer.as_ref(), pattern::window(4096, 4096).as_ref());
    // word 512 starts the second half of the file
    assert_eq!(&buffer[..8], &512u64.to_le_bytes());
}

#[tokio::test]
async fn divisor_reads_leading_bytes_only() {
    stripebench_test::tracing::init();
    let file = stripebench_test::fixtures::pattern_file(1000);

    let report = Benchmark::builder(file.path(), 1000)
        .workers(2)
        .divisor(4)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.plan.transfer_extent(), 250);
    assert_eq!(report.bytes_moved(), 250);

    let buffer = report.buffer.unwrap();
    assert_eq!(&buffer[..125], pattern::window(0, 125).as_ref());
    assert!(buffer[125..500].iter().all(|b| *b == 0));
    assert_eq!(&buffer[500..625], pattern::window(500, 125).as_ref());
}

#[tokio::test]
async fn mmap_write_extends_the_file() {
    stripebench_test::tracing::init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sparse.bin");

    Benchmark::builder(&path, 4096)
        .mode(Mode::Write)
        .strategy(StrategyKind::MemoryMapped)
        .global_offset(8192)
        .sync(SyncPolicy::None)
        .source(Bytes::from(vec![0xab; 4096]))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let contents = fs::read(&path).unwrap();
    assert_eq!(contents.len(), 12288);
    assert!(contents[..8192].iter().all(|b| *b == 0));
    assert!(contents[8192..].iter().all(|b| *b == 0xab));
}

#[test]
fn unbuffered_read_stops_at_end_of_file() {
    let file = stripebench_test::fixtures::pattern_file(100);
    let strategy = StrategyKind::Unbuffered.strategy(TransferOptions::default());

    let mut buf = vec![0; 200];
    let result = strategy
        .execute(file.path(), ByteRange::new(0, 200), Transfer::Read(&mut buf))
        .unwrap();
    assert_eq!(result.bytes_moved, 100);
    assert_eq!(&buf[..100], pattern::window(0, 100).as_ref());
}

#[tokio::test]
async fn mmap_read_stops_at_end_of_file() {
    stripebench_test::tracing::init();
    let file = stripebench_test::fixtures::pattern_file(100);

    let report = Benchmark::builder(file.path(), 8202)
        .strategy(StrategyKind::MemoryMapped)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.bytes_moved(), 100);
    let buffer = report.buffer.unwrap();
    assert_eq!(&buffer[..100], pattern::window(0, 100).as_ref());
}

#[test]
fn buffered_short_read_fails() {
    let file = stripebench_test::fixtures::pattern_file(100);
    let strategy = StrategyKind::Buffered.strategy(TransferOptions::default());

    let mut buf = vec![0; 200];
    let err = strategy
        .execute(file.path(), ByteRange::new(0, 200), Transfer::Read(&mut buf))
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn buffer_length_must_match_range() {
    let file = stripebench_test::fixtures::pattern_file(100);
    let strategy = StrategyKind::MemoryMapped.strategy(TransferOptions::default());

    let mut buf = vec![0; 10];
    let err = strategy
        .execute(file.path(), ByteRange::new(0, 20), Transfer::Read(&mut buf))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}
