//! Scanner module for file discovery, classification and fingerprinting.
//!
//! This module provides functionality for:
//! - Parallel directory walking using jwalk
//! - Classifying files into images, videos and other files by extension
//! - Exact content digests with SHA-256
//! - Perceptual image hashes
//! - Video frame sampling through ffmpeg
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal producing a [`ClassifiedFiles`] listing
//! - [`hasher`]: SHA-256 file hashing (streaming)
//! - [`perceptual`]: 64-bit perceptual hashes behind the [`ImageDecoder`] trait
//! - [`video`]: Frame counts and frame grabs behind the [`VideoFrameSampler`] trait
//!
//! # Example
//!
//! ```no_run
//! use photodupe::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("."), WalkerConfig::default());
//! let (files, errors) = walker.classify();
//! println!(
//!     "{} images, {} videos, {} other files ({} errors)",
//!     files.images.len(),
//!     files.videos.len(),
//!     files.other.len(),
//!     errors.len()
//! );
//! ```

pub mod hasher;
pub mod perceptual;
pub mod video;
pub mod walker;

use std::cmp::Ordering;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// Re-export main types
pub use hasher::{ExactDigest, Hasher};
pub use perceptual::{ImageCrateDecoder, ImageDecoder, PerceptualError, PerceptualHash};
pub use video::{video_profile, FfmpegSampler, VideoError, VideoFrameSampler, VideoProfile};
pub use walker::Walker;

/// File extensions treated as images (lowercase, without the dot).
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "heic", "webp",
];

/// File extensions treated as videos (lowercase, without the dot).
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "wmv", "m4v", "3gp"];

/// A discovered file: its path plus a lazily read size.
///
/// Identity, ordering and hashing only consider the path. The size is read
/// from the filesystem the first time it is requested and cached for the
/// rest of the run; a failed metadata read yields 0.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Path to the file
    pub path: PathBuf,
    size: OnceLock<u64>,
}

impl FileRecord {
    /// Create a record whose size is read lazily.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: OnceLock::new(),
        }
    }

    /// Create a record with a known size (no filesystem access for the size).
    #[must_use]
    pub fn with_size(path: impl Into<PathBuf>, size: u64) -> Self {
        let size_cell = OnceLock::new();
        let _ = size_cell.set(size);
        Self {
            path: path.into(),
            size: size_cell,
        }
    }

    /// File size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        *self.size.get_or_init(|| match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                log::debug!("Cannot read size of {}: {}", self.path.display(), e);
                0
            }
        })
    }

    /// The media kind implied by this file's extension.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_path(&self.path)
    }
}

impl PartialEq for FileRecord {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileRecord {}

impl Hash for FileRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for FileRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

/// Broad media category of a file, keyed on its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Still image (jpg, png, heic, ...)
    Image,
    /// Video container (mp4, mov, ...)
    Video,
    /// Anything else
    Other,
}

impl MediaKind {
    /// Classify a path by its (case-insensitive) extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Self::Image
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Self::Video
        } else {
            Self::Other
        }
    }
}

/// Three disjoint file lists produced by a directory scan.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedFiles {
    /// Image files
    pub images: Vec<FileRecord>,
    /// Video files
    pub videos: Vec<FileRecord>,
    /// Every other file
    pub other: Vec<FileRecord>,
}

impl ClassifiedFiles {
    /// Sort records into the three lists by extension.
    ///
    /// # Example
    ///
    /// ```
    /// use photodupe::scanner::{ClassifiedFiles, FileRecord};
    ///
    /// let files = ClassifiedFiles::classify(vec![
    ///     FileRecord::with_size("/a.JPG", 10),
    ///     FileRecord::with_size("/b.mp4", 10),
    ///     FileRecord::with_size("/c.txt", 10),
    /// ]);
    /// assert_eq!(files.images.len(), 1);
    /// assert_eq!(files.videos.len(), 1);
    /// assert_eq!(files.other.len(), 1);
    /// ```
    #[must_use]
    pub fn classify(records: impl IntoIterator<Item = FileRecord>) -> Self {
        let mut files = Self::default();
        for record in records {
            files.push(record);
        }
        files
    }

    /// Add one record to the list matching its extension.
    pub fn push(&mut self, record: FileRecord) {
        match record.kind() {
            MediaKind::Image => self.images.push(record),
            MediaKind::Video => self.videos.push(record),
            MediaKind::Other => self.other.push(record),
        }
    }

    /// Total number of files across all three lists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len() + self.videos.len() + self.other.len()
    }

    /// Check if no files were classified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over every record (images, then videos, then other).
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.images
            .iter()
            .chain(self.videos.iter())
            .chain(self.other.iter())
    }

    /// Sum of all file sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.iter().map(FileRecord::size).sum()
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    /// Warning: May cause infinite loops with symlink cycles.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Directories never descended into (e.g. the duplicates folder).
    pub exclude_dirs: Vec<PathBuf>,
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Hashing stopped because shutdown was requested.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
