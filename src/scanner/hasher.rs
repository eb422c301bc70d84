//! SHA-256 file hasher with streaming support.
//!
//! # Overview
//!
//! This module provides the [`Hasher`] struct for computing exact content
//! digests. Files are streamed through SHA-256 in fixed-size chunks so memory
//! use stays constant regardless of file size.
//!
//! # Example
//!
//! ```no_run
//! use photodupe::scanner::Hasher;
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let digest = hasher.digest(Path::new("photo.jpg")).unwrap();
//! println!("{}", digest);
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::HashError;

/// Size of each read when streaming a file through the hasher.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 digest of a file's full content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExactDigest(pub [u8; 32]);

impl ExactDigest {
    /// Lowercase hexadecimal representation (64 characters).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ExactDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Streaming SHA-256 file hasher.
#[derive(Debug, Clone, Default)]
pub struct Hasher {
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Hasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown flag; hashing of large files stops between chunks
    /// once the flag is raised.
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

    /// Compute the SHA-256 digest of the whole file.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file doesn't exist
    /// - `PermissionDenied` if the file cannot be read
    /// - `Interrupted` if shutdown was requested while reading
    /// - `Io` for any other read failure
    pub fn digest(&self, path: &Path) -> Result<ExactDigest, HashError> {
        let mut file = File::open(path).map_err(|e| map_io_error(path, e))?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }

            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io_error(path, e)),
            };
            hasher.update(&buffer[..read]);
        }

        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        log::trace!("Digest computed: {}", path.display());
        Ok(ExactDigest(out))
    }
}

fn map_io_error(path: &Path, error: io::Error) -> HashError {
    match error.kind() {
        io::ErrorKind::NotFound => HashError::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => HashError::PermissionDenied(path.to_path_buf()),
        _ => HashError::Io {
            path: path.to_path_buf(),
            source: error,
        },
    }
}
