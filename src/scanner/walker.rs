//! Directory walker implementation using jwalk for parallel traversal.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for traversing a photo library
//! and producing the classified listing (images, videos, other files) the
//! deduplication engine consumes. It uses [`jwalk`] for parallel directory
//! reading.
//!
//! # Features
//!
//! - Parallel directory traversal using rayon thread pool
//! - Configurable symlink following
//! - Hidden file filtering
//! - Excluded directories (the duplicates folder is never rescanned)
//! - Graceful shutdown via atomic flag
//!
//! # Example
//!
//! ```no_run
//! use photodupe::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Pictures"), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size()),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jwalk::WalkDir;

use super::{ClassifiedFiles, FileRecord, ScanError, WalkerConfig};

/// Directory walker for parallel file discovery.
#[derive(Debug)]
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
    /// When the flag is set to `true`, the walker will stop iteration
    /// as soon as possible.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Walk the directory tree, yielding file records.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping
    /// iteration. Children are visited in file-name order.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> + '_ {
        let excluded: Vec<PathBuf> = self
            .config
            .exclude_dirs
            .iter()
            .map(|dir| comparable_path(dir))
            .collect();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(move |_depth, _path, _read_dir_state, children| {
                // Sort children for deterministic output
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });

                if excluded.is_empty() {
                    return;
                }
                for entry in children.iter_mut().flatten() {
                    let skip = entry.file_type().is_dir()
                        && excluded.contains(&comparable_path(&entry.path()));
                    if skip {
                        log::debug!("Not descending into excluded {}", entry.path().display());
                        entry.read_children_path = None;
                    }
                }
            });

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            match entry_result {
                Ok(entry) => {
                    let path = entry.path();
                    let file_type = entry.file_type();

                    if file_type.is_dir() {
                        return None;
                    }

                    if file_type.is_symlink() && !self.config.follow_symlinks {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }

                    let metadata = match std::fs::metadata(&path) {
                        Ok(m) => m,
                        Err(e) => return Some(Err(self.handle_io_error(&path, e))),
                    };

                    if !metadata.is_file() {
                        return None;
                    }

                    Some(Ok(FileRecord::with_size(path, metadata.len())))
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    Some(Err(ScanError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }))
                }
            }
        })
    }

    /// Walk the tree and split the files into images, videos and other.
    ///
    /// Returns the listing together with every error encountered.
    #[must_use]
    pub fn classify(&self) -> (ClassifiedFiles, Vec<ScanError>) {
        let mut files = ClassifiedFiles::default();
        let mut errors = Vec::new();

        for entry in self.walk() {
            match entry {
                Ok(record) => files.push(record),
                Err(e) => errors.push(e),
            }
        }

        log::info!(
            "Scan complete: {} images, {} videos, {} other files",
            files.images.len(),
            files.videos.len(),
            files.other.len()
        );

        (files, errors)
    }

    fn handle_io_error(&self, path: &Path, error: std::io::Error) -> ScanError {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::PermissionDenied => {
                log::warn!("Permission denied: {}", path.display());
                ScanError::PermissionDenied(path.to_path_buf())
            }
            ErrorKind::NotFound => {
                log::debug!("File not found (may have been deleted): {}", path.display());
                ScanError::NotFound(path.to_path_buf())
            }
            _ => {
                log::warn!("I/O error for {}: {}", path.display(), error);
                ScanError::Io {
                    path: path.to_path_buf(),
                    source: error,
                }
            }
        }
    }
}

/// Absolute, symlink-free form of `path`, so `./_dupes`, `_dupes` and
/// `/photos/_dupes` compare equal. Paths that do not exist yet are only
/// made absolute.
fn comparable_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
