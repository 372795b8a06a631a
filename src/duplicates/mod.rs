//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Indexing fingerprints by size and digest
//! - Running scan passes over a worker pool
//! - Duplicate group and report types

pub mod coordinator;
pub mod groups;
pub mod index;
pub mod job;

pub use coordinator::{CoordinatorConfig, ReportKind, ScanCoordinator};
pub use groups::{DuplicateGroup, DuplicateReport, ScanFailure, ScanStats};
pub use index::{DuplicateIndex, IndexSnapshot};
pub use job::{ScanJob, StatsCollector};
