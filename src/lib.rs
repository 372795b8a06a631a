//! dupecache - Concurrent Duplicate File Finder
//!
//! Finds duplicate files across directory trees by content. Files are
//! fingerprinted by size and BLAKE3 digest on a pool of worker threads, and
//! digests are kept in a persistent cache keyed by path, size and
//! modification time so unchanged files are never rehashed.
//!
//! The library is organised as:
//!
//! - [`cache`]: persistent fingerprint cache (SQLite or in-memory)
//! - [`scanner`]: directory walking, hashing and fingerprinting
//! - [`pool`]: bounded task queue and worker threads
//! - [`duplicates`]: duplicate index, scan coordinator and reports
//! - [`output`]: `Result.txt` and JSON renderings

pub mod cache;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod pool;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytesize::ByteSize;

use crate::cache::FingerprintCache;
use crate::cli::{CacheAction, CacheArgs, Cli, Commands, OutputFormat, ScanOptions, WatchArgs};
use crate::config::{Config, ConfigOverrides};
use crate::duplicates::{DuplicateReport, ReportKind, ScanCoordinator};
use crate::error::ExitCode;
use crate::output::{JsonOutput, TextOutput};
use crate::progress::Progress;
use crate::scanner::walker::walk_roots;
use crate::signal::ShutdownHandler;

/// Run the application for parsed command-line arguments.
///
/// # Errors
///
/// Returns an error for fatal failures: bad configuration, an unusable
/// cache database, an interrupted one-shot scan or an unwritable report.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let config_file = cli.config.as_deref();

    match cli.command {
        Commands::Scan(args) => {
            let config = Config::load(config_file, &args.options.overrides())
                .context("Failed to load configuration")?;
            run_scan(&args.options, &config, cli.quiet)
        }
        Commands::Watch(args) => {
            let config = Config::load(config_file, &args.overrides())
                .context("Failed to load configuration")?;
            run_watch(&args, &config, cli.quiet)
        }
        Commands::Cache(args) => {
            let overrides = ConfigOverrides {
                cache_path: args.cache.clone(),
                ..ConfigOverrides::default()
            };
            let config =
                Config::load(config_file, &overrides).context("Failed to load configuration")?;
            run_cache(&args, &config)
        }
    }
}

fn open_cache(config: &Config, no_cache: bool) -> Result<Option<Arc<FingerprintCache>>> {
    if no_cache {
        log::info!("Fingerprint cache disabled");
        return Ok(None);
    }
    let path = config.resolved_cache_path()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory {}", parent.display()))?;
    }
    let cache = FingerprintCache::open(&path)
        .with_context(|| format!("Failed to open fingerprint cache {}", path.display()))?;
    Ok(Some(Arc::new(cache)))
}

fn build_coordinator(
    options: &ScanOptions,
    config: &Config,
    shutdown: &ShutdownHandler,
    quiet: bool,
    passes: Option<usize>,
) -> Result<ScanCoordinator> {
    let cache = open_cache(config, options.no_cache)?;
    let coordinator_config = config.coordinator_config().with_background_passes(passes);
    let show_progress = !quiet && options.format == OutputFormat::Text;

    Ok(ScanCoordinator::new(coordinator_config, cache)
        .with_shutdown_flag(shutdown.get_flag())
        .with_progress_callback(Arc::new(Progress::new(!show_progress))))
}

fn run_scan(options: &ScanOptions, config: &Config, quiet: bool) -> Result<ExitCode> {
    let shutdown = signal::install_handler()?;
    let coordinator = build_coordinator(options, config, &shutdown, quiet, None)?;

    let entries = walk_roots(
        options.paths.clone(),
        config.walker_config(),
        Some(shutdown.get_flag()),
    );
    let report = coordinator.run_once(entries)?;

    TextOutput::new(&report)
        .save(&config.output)
        .with_context(|| format!("Failed to write report {}", config.output.display()))?;

    let exit_code = ExitCode::from_report(&report);
    match options.format {
        OutputFormat::Json => {
            JsonOutput::new(&report, exit_code).write_to(&mut std::io::stdout().lock(), true)?;
        }
        OutputFormat::Text if !quiet => print_summary(&report, &config.output),
        OutputFormat::Text => {}
    }
    Ok(exit_code)
}

fn run_watch(args: &WatchArgs, config: &Config, quiet: bool) -> Result<ExitCode> {
    let options = &args.options;
    let shutdown = signal::install_handler()?;
    let coordinator = build_coordinator(options, config, &shutdown, true, args.passes)?;

    let roots: Vec<PathBuf> = options.paths.clone();
    let walker_config = config.walker_config();
    let flag = shutdown.get_flag();

    let mut last_report: Option<DuplicateReport> = None;
    let mut write_error: Option<anyhow::Error> = None;

    let passes = coordinator.run_background(
        || walk_roots(roots.clone(), walker_config.clone(), Some(Arc::clone(&flag))),
        |report, kind| match kind {
            ReportKind::Interim => {
                log::info!(
                    "In progress: {} files found, {} duplicate groups so far",
                    report.stats.files_found,
                    report.groups.len()
                );
            }
            ReportKind::PassComplete => {
                if let Err(e) = TextOutput::new(report).save(&config.output) {
                    log::error!("Failed to write report {}: {}", config.output.display(), e);
                    write_error = Some(e.into());
                }
                if options.format == OutputFormat::Json {
                    write_watch_json(report, &mut std::io::stdout().lock());
                } else if !quiet {
                    print_summary(report, &config.output);
                }
                last_report = Some(report.clone());
            }
        },
    )?;
    log::info!("Watch finished after {} passes", passes);

    if let Some(e) = write_error {
        return Err(e.context(format!("Failed to write report {}", config.output.display())));
    }
    if shutdown.is_shutdown_requested() {
        return Ok(ExitCode::Interrupted);
    }
    Ok(last_report
        .as_ref()
        .map_or(ExitCode::NoDuplicates, ExitCode::from_report))
}

fn run_cache(args: &CacheArgs, config: &Config) -> Result<ExitCode> {
    let path = config.resolved_cache_path()?;
    let cache = FingerprintCache::open(&path)
        .with_context(|| format!("Failed to open fingerprint cache {}", path.display()))?;

    match args.action {
        CacheAction::Stats => {
            let records = cache.len()?;
            let on_disk = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            println!("Cache:   {}", path.display());
            println!("Records: {}", records);
            println!("Size:    {}", ByteSize::b(on_disk));
        }
        CacheAction::Sweep => {
            let stats = cache.sweep_deleted()?;
            println!(
                "Checked {} records, removed {} for deleted files ({} failed)",
                stats.checked, stats.removed, stats.failed
            );
            if stats.corrupt > 0 {
                println!("Removed {} corrupt records", stats.corrupt);
            }
        }
        CacheAction::Clear => {
            let records = cache.len()?;
            cache.clear()?;
            println!("Removed {} records from {}", records, path.display());
        }
    }
    Ok(ExitCode::Success)
}

/// Print one compact JSON line for a finished watch pass.
///
/// A failed write is logged and the watch keeps going. Returns whether the
/// line was written.
fn write_watch_json<W: Write + ?Sized>(report: &DuplicateReport, writer: &mut W) -> bool {
    let code = ExitCode::from_report(report);
    match JsonOutput::new(report, code).write_to(writer, false) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Failed to write JSON report to stdout: {}", e);
            false
        }
    }
}

fn print_summary(report: &DuplicateReport, output: &Path) {
    let stats = &report.stats;
    println!(
        "Scanned {} files ({} from cache, {} hashed, {} read) in {:.2?}",
        stats.files_scanned,
        stats.cache_hits,
        stats.files_hashed,
        ByteSize::b(stats.bytes_hashed),
        stats.duration
    );
    if stats.files_skipped > 0 {
        println!("Skipped {} files (too small or not regular files)", stats.files_skipped);
    }
    if report.has_duplicates() {
        println!(
            "Found {} duplicate groups: {} redundant files, {} reclaimable",
            report.groups.len(),
            report.duplicate_files(),
            ByteSize::b(report.wasted_space())
        );
    } else {
        println!("No duplicates found");
    }
    if stats.has_errors() {
        println!("{} files could not be read:", stats.errors.len());
        for failure in &stats.errors {
            println!("  {}: {}", failure.path.display(), failure.reason);
        }
    }
    for warning in &stats.warnings {
        println!("Warning: {}", warning);
    }
    println!("Report written to {}", output.display());
}
