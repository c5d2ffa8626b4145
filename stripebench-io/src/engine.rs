//! The parallel transfer engine.
//!
//! A [`Benchmark`] moves one extent of a file with a fixed number of workers. Each worker runs on
//! the blocking thread pool and transfers a single range with the selected strategy. The reported
//! aggregate bandwidth is measured over the wall-clock time of the whole fan-out.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::buffer;
use crate::error::{Error, Result};
use crate::fanout::TaskGroup;
use crate::partition::PartitionPlan;
use crate::pattern;
use crate::transfer::{
    Mode, StrategyKind, Transfer, TransferOptions, TransferResult, TransferStrategy, gibps,
};

/// When written data is flushed to stable storage.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// Sync the whole filesystem once all workers are done, inside the timed region.
    #[default]
    End,
    /// Every worker flushes its own range before finishing.
    Worker,
    /// Leave flushing to the operating system.
    None,
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncPolicy::End => "end",
            SyncPolicy::Worker => "worker",
            SyncPolicy::None => "none",
        })
    }
}

impl FromStr for SyncPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "end" => Ok(SyncPolicy::End),
            "worker" => Ok(SyncPolicy::Worker),
            "none" => Ok(SyncPolicy::None),
            _ => Err(Error::invalid(format!(
                r#"unknown sync policy "{s}": expected one of "end", "worker", "none""#
            ))),
        }
    }
}

/// Configures a [`Benchmark`].
#[derive(Debug)]
pub struct BenchmarkBuilder {
    path: PathBuf,
    extent: u64,
    workers: u32,
    mode: Mode,
    strategy: StrategyKind,
    divisor: u32,
    global_offset: u64,
    sync: SyncPolicy,
    block_size: Option<u64>,
    source: Option<Bytes>,
}

impl BenchmarkBuilder {
    /// Sets the number of workers. Defaults to `1`.
    pub fn workers(mut self, workers: u32) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the transfer direction. Defaults to [`Mode::Read`].
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the transfer strategy. Defaults to [`StrategyKind::Unbuffered`].
    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Transfers only the leading `1 / divisor` of every worker's range. Defaults to `1`.
    pub fn divisor(mut self, divisor: u32) -> Self {
        self.divisor = divisor;
        self
    }

    /// Sets where the extent starts within the file. Defaults to `0`.
    pub fn global_offset(mut self, offset: u64) -> Self {
        self.global_offset = offset;
        self
    }

    /// Sets the sync policy of write runs. Defaults to [`SyncPolicy::End`].
    pub fn sync(mut self, sync: SyncPolicy) -> Self {
        self.sync = sync;
        self
    }

    /// Caps the size of a single read or write call.
    pub fn block_size(mut self, block_size: Option<u64>) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the data written by a write run.
    ///
    /// Must be exactly as long as the extent. Defaults to the sequential test pattern at the
    /// extent's offset in the file.
    pub fn source(mut self, source: Bytes) -> Self {
        self.source = Some(source);
        self
    }

    /// Validates the configuration and computes the partition plan.
    ///
    /// Memory-mapped runs need page-aligned ranges, which may reduce the number of workers.
    pub fn build(self) -> Result<Benchmark> {
        if self.block_size == Some(0) {
            return Err(Error::invalid("block size must be at least 1"));
        }
        if usize::try_from(self.extent).is_err() {
            return Err(Error::invalid(format!(
                "extent of {} bytes does not fit into memory",
                self.extent
            )));
        }
        if let Some(ref source) = self.source {
            if source.len() as u64 != self.extent {
                return Err(Error::invalid(format!(
                    "source of {} bytes does not match extent of {} bytes",
                    source.len(),
                    self.extent
                )));
            }
        }

        let plan = if self.strategy.requires_page_alignment() {
            let plan = PartitionPlan::page_aligned(
                self.extent,
                self.workers,
                self.divisor,
                buffer::page_size(),
            )?;
            if plan.worker_count() != self.workers {
                tracing::info!(
                    requested = self.workers,
                    workers = plan.worker_count(),
                    "reduced worker count to keep ranges page aligned"
                );
            }
            plan
        } else {
            PartitionPlan::with_divisor(self.extent, self.workers, self.divisor)?
        };

        Ok(Benchmark {
            path: self.path,
            plan,
            mode: self.mode,
            strategy: self.strategy,
            global_offset: self.global_offset,
            sync: self.sync,
            block_size: self.block_size,
            source: self.source,
        })
    }
}

/// A configured parallel transfer of one extent of a file.
#[derive(Debug)]
pub struct Benchmark {
    path: PathBuf,
    plan: PartitionPlan,
    mode: Mode,
    strategy: StrategyKind,
    global_offset: u64,
    sync: SyncPolicy,
    block_size: Option<u64>,
    source: Option<Bytes>,
}

impl Benchmark {
    /// Starts configuring a transfer of `extent` bytes of the file at `path`.
    pub fn builder(path: impl Into<PathBuf>, extent: u64) -> BenchmarkBuilder {
        BenchmarkBuilder {
            path: path.into(),
            extent,
            workers: 1,
            mode: Mode::default(),
            strategy: StrategyKind::default(),
            divisor: 1,
            global_offset: 0,
            sync: SyncPolicy::default(),
            block_size: None,
            source: None,
        }
    }

    /// The partition plan the workers will follow.
    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    /// The file this benchmark transfers.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs all workers and waits for them.
    ///
    /// Fails with the first worker error. Remaining workers are cancelled on a best-effort basis:
    /// blocking calls already in progress finish in the background.
    #[tracing::instrument(level = "debug", skip_all, fields(
        path = %self.path.display(),
        mode = ?self.mode,
        strategy = %self.strategy,
        workers = self.plan.worker_count(),
    ))]
    pub async fn run(self) -> Result<RunReport> {
        let options = TransferOptions {
            block_size: self.block_size,
            sync: self.mode == Mode::Write && self.sync == SyncPolicy::Worker,
        };
        let strategy: Arc<dyn TransferStrategy> = Arc::from(self.strategy.strategy(options));
        let path: Arc<Path> = Arc::from(self.path.as_path());

        let (results, elapsed, buffer) = match self.mode {
            Mode::Read => {
                let (results, elapsed, buffer) = self.read(&strategy, &path).await?;
                (results, elapsed, Some(buffer))
            }
            Mode::Write => {
                let (results, elapsed) = self.write(&strategy, &path).await?;
                (results, elapsed, None)
            }
        };

        let aggregate_gibps = gibps(self.plan.transfer_extent(), elapsed);
        tracing::info!(
            bytes = self.plan.transfer_extent(),
            elapsed_ms = elapsed.as_millis() as u64,
            aggregate_gibps,
            "transfer complete"
        );

        Ok(RunReport {
            plan: self.plan,
            elapsed,
            aggregate_gibps,
            results,
            buffer,
        })
    }

    async fn read(
        &self,
        strategy: &Arc<dyn TransferStrategy>,
        path: &Arc<Path>,
    ) -> Result<(Vec<TransferResult>, Duration, BytesMut)> {
        let extent = self.plan.total_extent() as usize;
        let buffer = buffer::allocate(extent, self.strategy.requires_page_alignment());
        let regions = buffer::split_regions(buffer, &self.plan);

        let mut group = TaskGroup::new();
        let start = Instant::now();
        for (assignment, mut region) in self.plan.assignments(self.global_offset).zip(regions) {
            let strategy = Arc::clone(strategy);
            let path = Arc::clone(path);
            group.spawn_blocking(move || {
                let range = assignment.file_range;
                tracing::debug!(worker = assignment.index, %range, "reading");
                let dest = &mut region[..range.length as usize];
                let result = strategy.execute(&path, range, Transfer::Read(dest))?;
                Ok::<_, Error>((result, region))
            });
        }
        let joined = group.join_all().await?;
        let elapsed = start.elapsed();

        let (results, regions): (Vec<_>, Vec<_>) = joined.into_iter().unzip();
        Ok((results, elapsed, buffer::join_regions(regions)))
    }

    async fn write(
        &self,
        strategy: &Arc<dyn TransferStrategy>,
        path: &Arc<Path>,
    ) -> Result<(Vec<TransferResult>, Duration)> {
        if self.strategy.requires_page_alignment() {
            self.ensure_file_length().await?;
        }

        let extent = self.plan.total_extent() as usize;
        let source = match self.source {
            Some(ref source) => source.clone(),
            None => pattern::window(self.global_offset, extent),
        };
        let views = buffer::slice_regions(&source, &self.plan);

        let mut group = TaskGroup::new();
        let start = Instant::now();
        for (assignment, view) in self.plan.assignments(self.global_offset).zip(views) {
            let strategy = Arc::clone(strategy);
            let path = Arc::clone(path);
            group.spawn_blocking(move || {
                let range = assignment.file_range;
                tracing::debug!(worker = assignment.index, %range, "writing");
                let src = &view[..range.length as usize];
                strategy.execute(&path, range, Transfer::Write(src))
            });
        }
        let results = group.join_all().await?;

        if self.sync == SyncPolicy::End {
            tokio::task::spawn_blocking(nix::unistd::sync).await?;
        }
        let elapsed = start.elapsed();

        Ok((results, elapsed))
    }

    /// Extends the file so that every mapped range lies within it.
    async fn ensure_file_length(&self) -> Result<()> {
        let required = self.global_offset + self.plan.total_extent();
        let display = self.path.display();

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await
            .map_err(Error::io(format!("failed to open {display}")))?;
        let metadata = file
            .metadata()
            .await
            .map_err(Error::io(format!("failed to stat {display}")))?;

        if metadata.len() < required {
            tracing::debug!(from = metadata.len(), to = required, "extending file for mapping");
            file.set_len(required)
                .await
                .map_err(Error::io(format!("failed to extend {display}")))?;
        }
        Ok(())
    }
}

/// The outcome of a [`Benchmark`] run.
#[derive(Debug)]
pub struct RunReport {
    /// The plan the workers followed.
    pub plan: PartitionPlan,
    /// Wall-clock time from launching the first worker to joining the last.
    pub elapsed: Duration,
    /// The transferred extent over `elapsed`, in GiB/s. Zero if `elapsed` was too short to measure.
    pub aggregate_gibps: f64,
    /// One result per worker, in plan order.
    pub results: Vec<TransferResult>,
    /// The data read by a read run.
    pub buffer: Option<BytesMut>,
}

impl RunReport {
    /// Total bytes moved by all workers.
    pub fn bytes_moved(&self) -> u64 {
        self.results.iter().map(|r| r.bytes_moved).sum()
    }

    /// Per-worker bandwidths in plan order.
    pub fn bandwidths(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.bandwidth_gibps).collect()
    }
}
