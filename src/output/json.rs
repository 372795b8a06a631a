//! JSON output formatter for duplicate scan results.
//!
//! Provides machine-readable JSON output for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "duplicates": [
//!     {
//!       "digest": "8f1c...",
//!       "size": 1024,
//!       "files": ["/path/to/file1.txt", "/path/to/file2.txt"]
//!     }
//!   ],
//!   "errors": [{ "path": "/locked.bin", "reason": "Permission denied" }],
//!   "warnings": [],
//!   "summary": {
//!     "files_found": 100,
//!     "files_scanned": 98,
//!     "cache_hits": 90,
//!     "duplicate_groups": 5,
//!     "wasted_space": 51200,
//!     "scan_duration_ms": 1234,
//!     "interrupted": false,
//!     "exit_code": 0
//!   }
//! }
//! ```

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::duplicates::{DuplicateGroup, DuplicateReport, ScanFailure};
use crate::error::ExitCode;

/// A single duplicate group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicateGroup {
    /// BLAKE3 digest as hexadecimal string (64 characters)
    pub digest: String,
    /// File size in bytes
    pub size: u64,
    /// Paths as reported by the walker
    pub files: Vec<String>,
}

impl From<&DuplicateGroup> for JsonDuplicateGroup {
    fn from(group: &DuplicateGroup) -> Self {
        Self {
            digest: group.digest.clone(),
            size: group.size,
            files: group
                .paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

/// A file that could not be fingerprinted.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFailure {
    /// Path of the file
    pub path: String,
    /// Why it failed
    pub reason: String,
}

impl From<&ScanFailure> for JsonFailure {
    fn from(failure: &ScanFailure) -> Self {
        Self {
            path: failure.path.to_string_lossy().into_owned(),
            reason: failure.reason.clone(),
        }
    }
}

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Paths accepted from the walk
    pub files_found: usize,
    /// Files fingerprinted (hashed or from cache)
    pub files_scanned: usize,
    /// Paths excluded (below threshold, not a file, excluded path)
    pub files_skipped: usize,
    /// Files whose content was hashed
    pub files_hashed: usize,
    /// Files whose digest came from the cache
    pub cache_hits: usize,
    /// Cache hits as a percentage of scanned files
    pub cache_hit_rate: f64,
    /// Bytes read for hashing
    pub bytes_hashed: u64,
    /// Number of duplicate groups
    pub duplicate_groups: usize,
    /// Total number of duplicate files (excluding originals)
    pub duplicate_files: usize,
    /// Space reclaimable by removing duplicates (bytes)
    pub wasted_space: u64,
    /// Duration of the scan in milliseconds
    pub scan_duration_ms: u64,
    /// Whether the scan was interrupted
    pub interrupted: bool,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DC000")
    pub exit_code_name: String,
    /// When this output was produced
    pub generated_at: DateTime<Utc>,
}

impl JsonSummary {
    /// Create a JSON summary from a report and an exit code.
    #[must_use]
    pub fn from_report(report: &DuplicateReport, exit_code: ExitCode) -> Self {
        let stats = &report.stats;
        Self {
            files_found: stats.files_found,
            files_scanned: stats.files_scanned,
            files_skipped: stats.files_skipped,
            files_hashed: stats.files_hashed,
            cache_hits: stats.cache_hits,
            cache_hit_rate: stats.cache_hit_rate(),
            bytes_hashed: stats.bytes_hashed,
            duplicate_groups: report.groups.len(),
            duplicate_files: report.duplicate_files(),
            wasted_space: report.wasted_space(),
            scan_duration_ms: stats.duration.as_millis() as u64,
            interrupted: stats.interrupted,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
            generated_at: Utc::now(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// List of duplicate groups
    pub duplicates: Vec<JsonDuplicateGroup>,
    /// Files that could not be fingerprinted
    pub errors: Vec<JsonFailure>,
    /// Non-fatal warnings (e.g. cache writes that failed)
    pub warnings: Vec<String>,
    /// Scan summary statistics
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Create a new JSON output from a report and exit code.
    ///
    /// # Example
    ///
    /// ```
    /// use dupecache::duplicates::DuplicateReport;
    /// use dupecache::error::ExitCode;
    /// use dupecache::output::json::JsonOutput;
    ///
    /// let output = JsonOutput::new(&DuplicateReport::default(), ExitCode::NoDuplicates);
    /// assert!(output.duplicates.is_empty());
    /// ```
    #[must_use]
    pub fn new(report: &DuplicateReport, exit_code: ExitCode) -> Self {
        Self {
            duplicates: report.groups.iter().map(JsonDuplicateGroup::from).collect(),
            errors: report.stats.errors.iter().map(JsonFailure::from).collect(),
            warnings: report.stats.warnings.clone(),
            summary: JsonSummary::from_report(report, exit_code),
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer.
    ///
    /// # Arguments
    ///
    /// * `writer` - The writer to output to (e.g., stdout)
    /// * `pretty` - Whether to pretty-print the output
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        pretty: bool,
    ) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    /// Write pretty JSON to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: &Path) -> Result<(), JsonOutputError> {
        let json = self.to_json_pretty()?;
        super::write_atomic(path, |w| {
            w.write_all(json.as_bytes())?;
            w.write_all(b"\n")
        })?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
