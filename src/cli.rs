//! Command-line interface definitions for dupecache.
//!
//! Global options (verbosity, config file, JSON errors) come first, then a
//! subcommand. Flags left unset fall through to the config file and
//! `DUPECACHE_*` environment variables.
//!
//! # Example
//!
//! ```bash
//! # One-shot scan, writing Result.txt in the current directory
//! dupecache scan ~/Pictures ~/Backup
//!
//! # JSON report on stdout, 8 workers, ignore files under 1 MiB
//! dupecache scan ~/Pictures --format json --workers 8 --min-size 1MiB
//!
//! # Re-scan every 10 minutes until Ctrl+C
//! dupecache watch ~/Pictures --interval 600
//!
//! # Drop cache records of deleted files
//! dupecache cache sweep
//! ```

use std::path::PathBuf;

use bytesize::ByteSize;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::ConfigOverrides;
use crate::pool::QueueOrder;

/// Concurrent duplicate file finder with a persistent fingerprint cache.
///
/// Files are grouped by size and BLAKE3 digest. Digests are cached by path,
/// size and modification time, so unchanged files are never read twice.
#[derive(Debug, Parser)]
#[command(name = "dupecache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: platform config dir)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Report fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan directories once and write a duplicate report
    Scan(ScanArgs),
    /// Re-scan directories periodically until interrupted
    Watch(WatchArgs),
    /// Inspect or maintain the fingerprint cache
    Cache(CacheArgs),
}

/// Options shared by `scan` and `watch`.
#[derive(Debug, Args)]
pub struct ScanOptions {
    /// Directories (or files) to scan
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Minimum file size to consider (e.g. 512, 4KiB, 1MB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Number of hashing worker threads
    #[arg(short = 'j', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Pending files allowed before directory walking pauses
    #[arg(long, value_name = "N")]
    pub queue_depth: Option<usize>,

    /// Order in which queued files are hashed
    #[arg(long, value_enum)]
    pub queue_order: Option<QueueOrderArg>,

    /// Report file to write
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Fingerprint cache database
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Do not read or write the fingerprint cache
    #[arg(long, conflicts_with = "cache")]
    pub no_cache: bool,

    /// Do not sweep deleted files from the cache before scanning
    #[arg(long)]
    pub no_sweep: bool,

    /// Follow symbolic links during scan
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// What to print on stdout
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl ScanOptions {
    /// Flags that override configuration layers.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            workers: self.workers,
            max_queue_depth: self.queue_depth,
            min_size: self.min_size,
            queue_order: self.queue_order.map(QueueOrder::from),
            cache_path: self.cache.clone(),
            output: self.output.clone(),
            sweep_on_start: self.no_sweep.then_some(false),
            follow_symlinks: self.follow_symlinks.then_some(true),
            skip_hidden: self.skip_hidden.then_some(true),
            ..ConfigOverrides::default()
        }
    }
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    #[command(flatten)]
    pub options: ScanOptions,
}

/// Arguments for the watch subcommand.
#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub options: ScanOptions,

    /// Seconds to wait between passes
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Seconds between interim reports during a pass
    #[arg(long, value_name = "SECS")]
    pub report_interval: Option<u64>,

    /// Maximum groups shown in interim reports
    #[arg(long, value_name = "N")]
    pub max_groups: Option<usize>,

    /// Stop after this many passes
    #[arg(long, value_name = "N")]
    pub passes: Option<usize>,
}

impl WatchArgs {
    /// Flags that override configuration layers.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            background_interval_secs: self.interval,
            report_interval_secs: self.report_interval,
            report_group_limit: self.max_groups,
            ..self.options.overrides()
        }
    }
}

/// Arguments for the cache subcommand.
#[derive(Debug, Args)]
pub struct CacheArgs {
    /// Fingerprint cache database
    #[arg(long, value_name = "PATH", global = true)]
    pub cache: Option<PathBuf>,

    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache maintenance actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum CacheAction {
    /// Show the cache location and record count
    Stats,
    /// Remove records whose file no longer exists
    Sweep,
    /// Remove every record
    Clear,
}

/// What `scan` prints on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// Full JSON report
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Queue order as a CLI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueueOrderArg {
    /// Newest queued file first
    Lifo,
    /// Oldest queued file first
    Fifo,
}

impl From<QueueOrderArg> for QueueOrder {
    fn from(arg: QueueOrderArg) -> Self {
        match arg {
            QueueOrderArg::Lifo => QueueOrder::Lifo,
            QueueOrderArg::Fifo => QueueOrder::Fifo,
        }
    }
}

/// Parse a human-readable size such as `512`, `4KiB` or `1 MB` into bytes.
///
/// Decimal (KB, MB) and binary (KiB, MiB) units are accepted,
/// case-insensitively.
///
/// # Examples
///
/// ```
/// use dupecache::cli::parse_size;
///
/// assert_eq!(parse_size("512").unwrap(), 512);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// ```
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    s.parse::<ByteSize>()
        .map(|size| size.as_u64())
        .map_err(|e| format!("Invalid size '{s}': {e}"))
}
