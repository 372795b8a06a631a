//! Plain-text report, the `Result.txt` format.
//!
//! ```text
//! Files:
//! Size: 10 bytes (10 B)
//! Digest: 8f1c...
//! /data/a.txt
//! /data/b.txt
//! ```
//!
//! Groups are listed by descending size, then digest. The size header is
//! written once per size even when several digests share it.

use std::io::{self, Write};
use std::path::Path;

use bytesize::ByteSize;

use crate::duplicates::DuplicateReport;

/// Text formatter for a [`DuplicateReport`].
pub struct TextOutput<'a> {
    report: &'a DuplicateReport,
}

impl<'a> TextOutput<'a> {
    /// Create a new text formatter.
    #[must_use]
    pub fn new(report: &'a DuplicateReport) -> Self {
        Self { report }
    }

    /// Write the listing to `writer`.
    ///
    /// # Errors
    ///
    /// Returns any error from the writer.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "Files:")?;

        let mut current_size = None;
        for group in &self.report.groups {
            if current_size != Some(group.size) {
                current_size = Some(group.size);
                writeln!(
                    writer,
                    "Size: {} bytes ({})",
                    group.size,
                    ByteSize::b(group.size)
                )?;
            }
            writeln!(writer, "Digest: {}", group.digest)?;
            for path in &group.paths {
                writeln!(writer, "{}", path.display())?;
            }
        }
        Ok(())
    }

    /// Render the listing as a string.
    #[must_use]
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        // Writing to a Vec cannot fail
        let _ = self.write_to(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Write the listing to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from writing or renaming the file.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        super::write_atomic(path, |w| self.write_to(w))?;
        log::info!(
            "Wrote {} duplicate groups to {}",
            self.report.groups.len(),
            path.display()
        );
        Ok(())
    }
}
