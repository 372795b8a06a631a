//! Output formatters for duplicate scan results.
//!
//! This module provides two renderings of a [`DuplicateReport`]:
//! - Text, the `Result.txt` listing grouped by size then digest
//! - JSON for automation and scripting
//!
//! # Example
//!
//! ```no_run
//! use dupecache::duplicates::{CoordinatorConfig, ScanCoordinator};
//! use dupecache::output::TextOutput;
//! use std::path::{Path, PathBuf};
//!
//! let coordinator = ScanCoordinator::new(CoordinatorConfig::default(), None);
//! let report = coordinator
//!     .run_once_files(vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")])
//!     .unwrap();
//!
//! TextOutput::new(&report).save(Path::new("Result.txt")).unwrap();
//! ```
//!
//! [`DuplicateReport`]: crate::duplicates::DuplicateReport

pub mod json;
pub mod text;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

// Re-export main types
pub use json::{JsonOutput, JsonOutputError};
pub use text::TextOutput;

/// Write a file atomically: render into a sibling temp file, then rename.
///
/// Readers never observe a half-written report. The temp file is removed if
/// rendering fails.
///
/// # Errors
///
/// Returns any I/O error from creating, writing or renaming the file.
pub fn write_atomic<F>(path: &Path, render: F) -> io::Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let mut temp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let result = File::create(&temp_path).and_then(|file| {
        let mut writer = BufWriter::new(file);
        render(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    });

    match result.and_then(|()| fs::rename(&temp_path, path)) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            Err(e)
        }
    }
}
