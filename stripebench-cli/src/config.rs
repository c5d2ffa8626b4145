//! Configuration for the stripebench tools.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//!
//! 1. Command line flags of the individual subcommands
//! 2. Environment variables (prefixed with `SB__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `SB__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `SB__LOGGING__LEVEL=debug` sets the log level
//! - `SB__TOPOLOGY__TYPE=static` replaces `lfs getstripe` with a fixed layout
//! - `SB__UPLOAD__ENDPOINT=https://s3.example.org` sets the object store endpoint
//!
//! # YAML Configuration File
//!
//! ```yaml
//! benchmark:
//!   sync: worker
//!   block_size: 4 MiB
//!
//! topology:
//!   type: static
//!   stripe_size: 1048576
//!   unit_indices: [0, 1, 2, 3]
//!
//! upload:
//!   endpoint: https://s3.example.org
//!   profile: bench
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use stripebench_io::{
    LfsTopology, StaticTopology, StorageUnitIndex, StripeLayout, SyncPolicy, TopologyProvider,
};
use stripebench_upload::SourceMode;
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "SB__";

/// Newtype around `String` that keeps secrets out of debug output.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl std::ops::Deref for ConfigSecret {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

/// Runtime configuration for the Tokio async runtime.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads of the async runtime.
    ///
    /// File transfers run on the blocking pool, so this mostly affects the uploader. Defaults to
    /// the number of available CPUs.
    ///
    /// # Environment Variable
    ///
    /// `SB__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

/// Defaults for the read and write benchmarks.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Benchmark {
    /// When written data is flushed to disk: `end`, `worker` or `none`.
    ///
    /// # Environment Variable
    ///
    /// `SB__BENCHMARK__SYNC`
    pub sync: SyncPolicy,

    /// Upper bound on the size of a single read or write call.
    ///
    /// Unset moves every worker's range in as few calls as possible.
    ///
    /// # Environment Variable
    ///
    /// `SB__BENCHMARK__BLOCK_SIZE`
    pub block_size: Option<ByteSize>,

    /// Always print per-OST bandwidth and statistics after a read.
    ///
    /// # Environment Variable
    ///
    /// `SB__BENCHMARK__REPORT_UNITS`
    pub report_units: bool,
}

/// Where stripe layouts come from.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Topology {
    /// Ask Lustre through `lfs getstripe`.
    Lfs {
        /// Path or name of the `lfs` binary.
        ///
        /// # Environment Variable
        ///
        /// `SB__TOPOLOGY__COMMAND`
        command: PathBuf,
    },
    /// Use the same layout for every file, for filesystems without striping.
    Static {
        /// Size of a stripe in bytes.
        stripe_size: u64,
        /// One storage target per stripe.
        unit_indices: Vec<u32>,
    },
}

impl Default for Topology {
    fn default() -> Self {
        Topology::Lfs {
            command: PathBuf::from("lfs"),
        }
    }
}

impl Topology {
    /// Creates the configured layout provider.
    pub fn provider(&self) -> Result<Box<dyn TopologyProvider>> {
        let provider: Box<dyn TopologyProvider> = match self {
            Topology::Lfs { command } => Box::new(LfsTopology::new(command)),
            Topology::Static {
                stripe_size,
                unit_indices,
            } => {
                let units: Vec<_> = unit_indices.iter().copied().map(StorageUnitIndex).collect();
                let layout = StripeLayout::new(*stripe_size, units.len() as u32, units)?;
                Box::new(StaticTopology::new(layout))
            }
        };
        Ok(provider)
    }
}

/// Object store settings of the uploader.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Upload {
    /// Endpoint URL of the object store, `http[s]://host[:port]`.
    ///
    /// # Environment Variable
    ///
    /// `SB__UPLOAD__ENDPOINT`
    pub endpoint: Option<String>,

    /// Region used for request signing.
    pub region: String,

    /// Access key id. Takes precedence over the credentials file together with `secret_key`.
    pub access_key: Option<String>,

    /// Secret access key.
    ///
    /// # Environment Variable
    ///
    /// `SB__UPLOAD__SECRET_KEY`
    pub secret_key: Option<ConfigSecret>,

    /// Credentials file in AWS command line format. Defaults to `~/.aws/credentials`.
    pub credentials_file: Option<PathBuf>,

    /// Profile to read from the credentials file. Defaults to `default`.
    pub profile: Option<String>,

    /// How often a part without an ETag is sent again.
    pub max_retries: u32,

    /// Number of parts uploaded in parallel.
    pub jobs: u32,

    /// How part bodies are read: `none`, `preload` or `map`.
    pub source: SourceMode,
}

impl Default for Upload {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".into(),
            access_key: None,
            secret_key: None,
            credentials_file: None,
            profile: None,
            max_retries: 2,
            jobs: 1,
            source: SourceMode::None,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Compact output with colors.
    Pretty,

    /// Plain text output without colors.
    Simplified,

    /// JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::error::Error for FormatParseError {}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, so benchmark output on stdout stays parsable.
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable provides more granular control per module if needed.
    ///
    /// # Default
    ///
    /// `WARN`
    ///
    /// # Environment Variable
    ///
    /// `SB__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`] for available options.
    ///
    /// # Environment Variable
    ///
    /// `SB__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::WARN,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct of the stripebench tools.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub logging: Logging,

    /// Async runtime configuration.
    pub runtime: Runtime,

    /// Benchmark defaults.
    pub benchmark: Benchmark,

    /// Stripe layout source.
    pub topology: Topology,

    /// Uploader settings.
    pub upload: Upload,
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file cannot be read or parsed, or if environment variables
    /// contain invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}
