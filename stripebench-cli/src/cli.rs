use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use argh::FromArgs;
use bytesize::ByteSize;
use stripebench_io::shard::stripes_in;
use stripebench_io::{
    BandwidthReport, Benchmark, JobShard, LfsTopology, Mode, StrategyKind, SyncPolicy,
    TopologyProvider, pattern,
};
use stripebench_upload::{
    Credentials, MultipartUpload, ObjectStore, RetryCounter, S3Client, SourceMode,
};

use crate::config::{Config, Topology};
use crate::observability;
use crate::output::{Bandwidth, Layout, ReadHeader, Uploaded};

/// Parallel I/O benchmarks for striped filesystems.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Read(ReadCommand),
    Write(WriteCommand),
    Upload(UploadCommand),
    Layout(LayoutCommand),
    CreateFile(CreateFileCommand),
    CheckDirectIo(CheckDirectIoCommand),
    Version(VersionCommand),
}

/// measure the read bandwidth of a file
///
/// By default one thread per stripe is started. When launched by a job launcher, every process
/// reads its own shard of the file and prints a single bandwidth number.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "read")]
struct ReadCommand {
    /// file to read
    #[argh(positional)]
    file: PathBuf,

    /// number of threads, defaults to the stripe count
    #[argh(option, short = 't')]
    threads: Option<u32>,

    /// transfer mode: buffered, unbuffered or mmap
    #[argh(option, short = 'm', default = "StrategyKind::Unbuffered")]
    mode: StrategyKind,

    /// read only the leading 1/divisor of every thread's range
    #[argh(option, short = 'd', default = "1")]
    divisor: u32,

    /// report bandwidth per OST
    #[argh(switch, short = 'o')]
    per_ost: bool,

    /// print the bandwidth only
    #[argh(switch, short = 'b')]
    bw_only: bool,

    /// upper bound on the size of a single read call
    #[argh(option)]
    block_size: Option<ByteSize>,
}

/// measure the write bandwidth of a file
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "write")]
struct WriteCommand {
    /// file to write
    #[argh(positional)]
    file: PathBuf,

    /// number of bytes to write, shared by all processes of a job
    #[argh(option, short = 'n')]
    size: ByteSize,

    /// number of threads
    #[argh(option, short = 't', default = "1")]
    threads: u32,

    /// transfer mode: buffered, unbuffered or mmap
    #[argh(option, short = 'm', default = "StrategyKind::Unbuffered")]
    mode: StrategyKind,

    /// when to flush written data: end, worker or none
    #[argh(option)]
    sync: Option<SyncPolicy>,

    /// upper bound on the size of a single write call
    #[argh(option)]
    block_size: Option<ByteSize>,

    /// print the bandwidth only
    #[argh(switch, short = 'b')]
    bw_only: bool,
}

/// upload a file to an S3-compatible object store
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "upload")]
struct UploadCommand {
    /// endpoint URL, http[s]://host[:port]
    #[argh(option, short = 'e')]
    endpoint: Option<String>,

    /// bucket name
    #[argh(option, short = 'b')]
    bucket: String,

    /// object key
    #[argh(option, short = 'k')]
    key: String,

    /// file to upload
    #[argh(option, short = 'f')]
    file: PathBuf,

    /// number of parts uploaded in parallel
    #[argh(option, short = 'j')]
    jobs: Option<u32>,

    /// credentials file in AWS format
    #[argh(option)]
    credentials: Option<PathBuf>,

    /// profile in the credentials file
    #[argh(option, short = 'p')]
    profile: Option<String>,

    /// how often a part without an ETag is sent again
    #[argh(option, short = 'r')]
    retries: Option<u32>,

    /// how parts are read: none, preload or map
    #[argh(option, short = 'm')]
    source: Option<SourceMode>,

    /// access key, requires a secret key
    #[argh(option, short = 'a')]
    access_key: Option<String>,

    /// secret key, requires an access key
    #[argh(option, short = 's')]
    secret_key: Option<String>,

    /// region used for signing
    #[argh(option)]
    region: Option<String>,
}

/// print the stripe layout of a file
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "layout")]
struct LayoutCommand {
    /// file to inspect
    #[argh(positional)]
    file: PathBuf,
}

/// create a file filled with a sequence of 64-bit integers
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "create-file")]
struct CreateFileCommand {
    /// file to create
    #[argh(positional)]
    file: PathBuf,

    /// size of the file
    #[argh(positional)]
    size: ByteSize,

    /// stripe size of the new file, requires a stripe count
    #[argh(option)]
    stripe_size: Option<ByteSize>,

    /// stripe count of the new file, requires a stripe size
    #[argh(option)]
    stripe_count: Option<u32>,
}

/// check whether a filesystem accepts O_DIRECT writes
///
/// Writes one page to the given file, creating it if needed.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "check-direct-io")]
struct CheckDirectIoCommand {
    /// file to write
    #[argh(positional)]
    file: PathBuf,
}

/// print the stripebench version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .worker_threads(config.runtime.worker_threads)
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    // Output is printed only once a command has succeeded, failed runs print nothing but the error.
    let output = runtime.block_on(async move {
        match args.command {
            Command::Read(command) => read(&config, command).await,
            Command::Write(command) => write(&config, command).await,
            Command::Upload(command) => upload(&config, command).await,
            Command::Layout(command) => layout(&config, command).await,
            Command::CreateFile(command) => create_file(&config, command).await,
            Command::CheckDirectIo(command) => check_direct_io(command).await,
            Command::Version(VersionCommand {}) => unreachable!(),
        }
    })?;
    print!("{output}");

    Ok(())
}

async fn query_layout(config: &Config, path: &Path) -> Result<stripebench_io::StripeLayout> {
    let provider: Box<dyn TopologyProvider> = config.topology.provider()?;
    let path = path.to_owned();
    let layout = tokio::task::spawn_blocking(move || provider.layout(&path)).await??;
    Ok(layout)
}

async fn read(config: &Config, command: ReadCommand) -> Result<String> {
    let layout = query_layout(config, &command.file)
        .await
        .with_context(|| format!("cannot get the layout of {}", command.file.display()))?;
    let file_size = tokio::fs::metadata(&command.file)
        .await
        .with_context(|| format!("cannot open file {}", command.file.display()))?
        .len();

    let shard = JobShard::from_env()?;
    let range = shard.range(file_size);
    let stripe_count = if shard.is_distributed() {
        stripes_in(range.length, layout.stripe_size()) as u32
    } else {
        layout.stripe_count()
    };
    let workers = command.threads.unwrap_or(stripe_count).max(1);
    let brief = command.bw_only || shard.is_distributed();

    let block_size = command.block_size.or(config.benchmark.block_size);
    let report = Benchmark::builder(&command.file, range.length)
        .workers(workers)
        .mode(Mode::Read)
        .strategy(command.mode)
        .divisor(command.divisor)
        .global_offset(range.offset)
        .block_size(block_size.map(|size| size.as_u64()))
        .build()?
        .run()
        .await
        .with_context(|| format!("cannot read {}", command.file.display()))?;
    tracing::info!(
        rank = shard.rank(),
        bytes = report.bytes_moved(),
        elapsed = ?report.elapsed,
        "read finished"
    );

    let mut output = String::new();
    if !brief {
        let header = ReadHeader {
            path: &command.file,
            file_size,
            layout: &layout,
            plan: &report.plan,
            strategy: command.mode,
        };
        output.push_str(&header.to_string());
    }

    let bandwidth = Bandwidth {
        gibps: report.aggregate_gibps,
        elapsed: report.elapsed,
        brief,
        with_elapsed: false,
    };
    output.push_str(&bandwidth.to_string());

    if command.per_ost || config.benchmark.report_units {
        let units = if shard.is_distributed() {
            layout.units_for(range)
        } else {
            layout.unit_indices().to_vec()
        };
        let report = BandwidthReport::new(&report.results, Some(units.as_slice()));
        output.push_str(&report.to_string());
    }

    Ok(output)
}

async fn write(config: &Config, command: WriteCommand) -> Result<String> {
    let shard = JobShard::from_env()?;
    let range = shard.range(command.size.as_u64());
    let brief = command.bw_only || shard.is_distributed();

    let block_size = command.block_size.or(config.benchmark.block_size);
    let report = Benchmark::builder(&command.file, range.length)
        .workers(command.threads)
        .mode(Mode::Write)
        .strategy(command.mode)
        .global_offset(range.offset)
        .sync(command.sync.unwrap_or(config.benchmark.sync))
        .block_size(block_size.map(|size| size.as_u64()))
        .build()?
        .run()
        .await
        .with_context(|| format!("cannot write {}", command.file.display()))?;

    tracing::info!(
        rank = shard.rank(),
        bytes = report.bytes_moved(),
        elapsed = ?report.elapsed,
        "write finished"
    );

    let bandwidth = Bandwidth {
        gibps: report.aggregate_gibps,
        elapsed: report.elapsed,
        brief,
        with_elapsed: true,
    };
    Ok(bandwidth.to_string())
}

async fn upload(config: &Config, command: UploadCommand) -> Result<String> {
    let settings = &config.upload;

    let Some(endpoint) = command.endpoint.as_deref().or(settings.endpoint.as_deref()) else {
        bail!("no endpoint given, pass --endpoint or set upload.endpoint");
    };

    let credentials = Credentials::resolve(
        command
            .access_key
            .as_deref()
            .or(settings.access_key.as_deref()),
        command
            .secret_key
            .as_deref()
            .or(settings.secret_key.as_deref()),
        command
            .credentials
            .as_deref()
            .or(settings.credentials_file.as_deref()),
        command.profile.as_deref().or(settings.profile.as_deref()),
    )?;

    let region = command.region.as_deref().unwrap_or(&settings.region);
    let store: Arc<dyn ObjectStore> = Arc::new(S3Client::new(endpoint, region, credentials)?);

    let upload = MultipartUpload::new(store, command.bucket, command.key)
        .workers(command.jobs.unwrap_or(settings.jobs))
        .max_retries(command.retries.unwrap_or(settings.max_retries))
        .source(command.source.unwrap_or(settings.source));

    let retries = RetryCounter::new();
    let outcome = upload.upload(&command.file, &retries).await?;
    tracing::info!(
        parts = outcome.parts,
        size = outcome.size,
        elapsed = ?outcome.elapsed,
        "upload finished"
    );

    let uploaded = Uploaded {
        etag: &outcome.etag,
        retries: retries.get(),
    };
    Ok(uploaded.to_string())
}

async fn layout(config: &Config, command: LayoutCommand) -> Result<String> {
    let layout = query_layout(config, &command.file)
        .await
        .with_context(|| format!("cannot get the layout of {}", command.file.display()))?;
    Ok(Layout(&layout).to_string())
}

async fn create_file(config: &Config, command: CreateFileCommand) -> Result<String> {
    let striping = match (command.stripe_size, command.stripe_count) {
        (Some(size), Some(count)) => Some((size.as_u64(), count)),
        (None, None) => None,
        _ => bail!("--stripe-size and --stripe-count have to be given together"),
    };

    let lfs = match &config.topology {
        Topology::Lfs { command: lfs } => LfsTopology::new(lfs),
        Topology::Static { .. } if striping.is_some() => {
            bail!("striped files require the lfs topology")
        }
        Topology::Static { .. } => LfsTopology::default(),
    };

    let path = command.file;
    let size = command.size.as_u64();
    tokio::task::spawn_blocking(move || {
        if let Some((stripe_size, stripe_count)) = striping {
            lfs.create_striped(&path, stripe_size, stripe_count)?;
        }
        pattern::create_file(&path, size)
    })
    .await??;

    Ok(String::new())
}

async fn check_direct_io(command: CheckDirectIoCommand) -> Result<String> {
    let path = command.file;
    tokio::task::spawn_blocking(move || stripebench_io::check_direct_io(&path)).await??;
    Ok("O_DIRECT supported\n".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::from_args(&["stripebench"], args).unwrap()
    }

    #[test]
    fn read_defaults() {
        let args = parse(&["read", "/lustre/data.bin"]);
        let Command::Read(read) = args.command else {
            panic!("expected read command");
        };
        assert_eq!(read.file, PathBuf::from("/lustre/data.bin"));
        assert_eq!(read.threads, None);
        assert_eq!(read.mode, StrategyKind::Unbuffered);
        assert_eq!(read.divisor, 1);
        assert!(!read.per_ost);
        assert!(!read.bw_only);
    }

    #[test]
    fn read_flags() {
        let args = parse(&[
            "-c",
            "bench.yml",
            "read",
            "data.bin",
            "-t",
            "8",
            "-m",
            "mmap",
            "-d",
            "4",
            "-o",
            "-b",
            "--block-size",
            "4MiB",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("bench.yml")));

        let Command::Read(read) = args.command else {
            panic!("expected read command");
        };
        assert_eq!(read.threads, Some(8));
        assert_eq!(read.mode, StrategyKind::MemoryMapped);
        assert_eq!(read.divisor, 4);
        assert!(read.per_ost);
        assert!(read.bw_only);
        assert_eq!(read.block_size, Some(ByteSize::mib(4)));
    }

    #[test]
    fn write_flags() {
        let args = parse(&["write", "out.bin", "-n", "1GiB", "--sync", "worker"]);
        let Command::Write(write) = args.command else {
            panic!("expected write command");
        };
        assert_eq!(write.size, ByteSize::gib(1));
        assert_eq!(write.threads, 1);
        assert_eq!(write.sync, Some(SyncPolicy::Worker));
    }

    #[test]
    fn upload_flags() {
        let args = parse(&[
            "upload", "-e", "http://localhost:9000", "-b", "bench", "-k", "data", "-f",
            "data.bin", "-j", "16", "-m", "preload",
        ]);
        let Command::Upload(upload) = args.command else {
            panic!("expected upload command");
        };
        assert_eq!(upload.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(upload.jobs, Some(16));
        assert_eq!(upload.source, Some(SourceMode::Preload));
        assert_eq!(upload.retries, None);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Args::from_args(&["stripebench"], &["read", "data.bin", "-m", "direct"]).is_err());
    }

    #[tokio::test]
    async fn creates_pattern_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pattern.bin");
        let command = CreateFileCommand {
            file: path.clone(),
            size: ByteSize::b(64),
            stripe_size: None,
            stripe_count: None,
        };

        let output = create_file(&Config::default(), command).await.unwrap();
        assert!(output.is_empty());

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents.len(), 64);
        assert_eq!(&contents[8..16], &1u64.to_le_bytes());
    }

    fn static_topology() -> Config {
        Config {
            topology: Topology::Static {
                stripe_size: 4096,
                unit_indices: vec![0],
            },
            ..Default::default()
        }
    }

    fn read_command(file: &Path) -> ReadCommand {
        ReadCommand {
            file: file.to_owned(),
            threads: None,
            mode: StrategyKind::Unbuffered,
            divisor: 1,
            per_ost: false,
            bw_only: false,
            block_size: None,
        }
    }

    #[tokio::test]
    async fn read_renders_header_and_bandwidth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pattern.bin");
        stripebench_io::pattern::create_file(&path, 8192).unwrap();

        let output = read(&static_topology(), read_command(&path)).await.unwrap();

        assert!(output.starts_with("File:         "), "{output}");
        assert!(output.contains("# threads:    1\n"), "{output}");
        assert!(output.contains("Read mode:    unbuffered\n"), "{output}");
        assert!(
            output.contains("Bandwidth: ") || output.contains("Elapsed time < 1ms"),
            "{output}"
        );
    }

    #[tokio::test]
    async fn failed_read_renders_nothing() {
        // a directory has a size and a layout, but cannot be read
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("entry.bin"), b"keeps the directory non-empty").unwrap();

        let result = read(&static_topology(), read_command(dir.path())).await;
        assert!(result.is_err());
    }

    #[test]
    fn parses_check_direct_io() {
        let args = parse(&["check-direct-io", "/lustre/odirect.bin"]);
        let Command::CheckDirectIo(command) = args.command else {
            panic!("expected check-direct-io command");
        };
        assert_eq!(command.file, PathBuf::from("/lustre/odirect.bin"));
    }

    #[tokio::test]
    async fn rejects_partial_striping() {
        let dir = tempfile::tempdir().unwrap();
        let command = CreateFileCommand {
            file: dir.path().join("pattern.bin"),
            size: ByteSize::b(64),
            stripe_size: Some(ByteSize::mib(1)),
            stripe_count: None,
        };

        assert!(create_file(&Config::default(), command).await.is_err());
    }
}
