//! Directory walker implementation using jwalk for parallel traversal.
//!
//! # Overview
//!
//! [`Walker`] produces the lazy sequence of [`WalkEntry`] values that the
//! scan coordinator consumes. Directories are reported too (with
//! `is_dir = true`); filtering to regular files happens downstream, as does
//! every size or content decision.
//!
//! Children of each directory are sorted by name so that repeated walks of
//! an unchanged tree yield entries in the same order.
//!
//! # Example
//!
//! ```no_run
//! use dupecache::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"), WalkerConfig::default());
//! let files = walker
//!     .walk()
//!     .filter_map(Result::ok)
//!     .filter(|e| !e.is_dir)
//!     .count();
//! println!("{} files", files);
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jwalk::WalkDir;

use super::{ScanError, WalkEntry, WalkerConfig};

/// Directory walker for parallel file discovery.
#[derive(Debug, Clone)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set to `true`, iteration ends at the next entry.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Root directory of this walker.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the directory tree.
    ///
    /// Errors are yielded as [`ScanError::PathUnreadable`] values rather
    /// than stopping iteration. A root that is a plain file yields that
    /// file alone.
    pub fn walk(&self) -> impl Iterator<Item = Result<WalkEntry, ScanError>> + '_ {
        self.clone().into_walk()
    }

    /// Consume the walker into an owned lazy iterator.
    pub fn into_walk(self) -> impl Iterator<Item = Result<WalkEntry, ScanError>> {
        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(|_depth, _path, _read_dir_state, children| {
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        let root_is_file = self.root.is_file();
        let shutdown_flag = self.shutdown_flag.clone();

        walk_dir
            .into_iter()
            .take_while(move |_| {
                let stop = shutdown_flag
                    .as_ref()
                    .is_some_and(|f| f.load(Ordering::SeqCst));
                if stop {
                    log::debug!("Walker: Shutdown requested, stopping iteration");
                }
                !stop
            })
            .filter_map(move |entry_result| {
                match entry_result {
                    Ok(entry) => {
                        let path = entry.path();

                        // The root itself is only interesting when it is a file
                        if path == self.root && !root_is_file {
                            return None;
                        }

                        let file_type = entry.file_type();
                        if file_type.is_symlink() && !self.config.follow_symlinks {
                            log::trace!("Skipping symlink: {}", path.display());
                            return None;
                        }

                        Some(Ok(WalkEntry {
                            path,
                            is_dir: file_type.is_dir(),
                        }))
                    }
                    Err(e) => {
                        let path = e
                            .path()
                            .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                        log::warn!("Walker error for {}: {}", path.display(), e);
                        Some(Err(ScanError::PathUnreadable {
                            path,
                            reason: e.to_string(),
                        }))
                    }
                }
            })
    }
}

/// Walk several roots one after another.
///
/// Roots that do not exist produce a single [`ScanError::PathUnreadable`].
pub fn walk_roots(
    roots: Vec<PathBuf>,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
) -> impl Iterator<Item = Result<WalkEntry, ScanError>> {
    roots.into_iter().flat_map(move |root| {
        if !root.exists() {
            log::warn!("Path not found: {}", root.display());
            let err = ScanError::PathUnreadable {
                reason: "path not found".to_string(),
                path: root,
            };
            return Box::new(std::iter::once(Err(err)))
                as Box<dyn Iterator<Item = Result<WalkEntry, ScanError>>>;
        }

        let mut walker = Walker::new(&root, config.clone());
        if let Some(flag) = &shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }
        Box::new(walker.into_walk())
    })
}
