//! Operation log for destructive actions.
//!
//! Every delete, trash or move performed by the resolver is reported to an
//! [`OperationSink`] as soon as it completes. The CSV implementation,
//! [`CsvOperationLog`], appends one row per action and flushes it
//! immediately, so the log stays consistent even if the run is cut short.
//!
//! # Columns
//!
//! - `timestamp`: Time of the action (RFC 3339)
//! - `operation`: `delete`, `trash` or `move`
//! - `source`: Path of the duplicate that was acted on
//! - `target`: Destination for moves, empty otherwise
//! - `size`: File size in bytes
//! - `original`: The file kept in place of the duplicate
//!
//! # Example
//!
//! ```no_run
//! use photodupe::output::oplog::{CsvOperationLog, Operation, OperationKind, OperationSink};
//!
//! let log = CsvOperationLog::create("operations.csv").unwrap();
//! log.record(&Operation::new(OperationKind::Delete, "/photos/b.jpg", None, 1024, "/photos/a.jpg"))
//!     .unwrap();
//! ```

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while writing or reading the operation log.
#[derive(Debug, Error)]
pub enum OperationLogError {
    /// The log file could not be opened or created.
    #[error("Cannot open operation log {path}: {source}")]
    Open {
        /// Log file path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization or parsing.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The log writer lock was poisoned by a panicking thread.
    #[error("Operation log lock poisoned")]
    Poisoned,
}

/// The kind of destructive action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Permanent removal
    Delete,
    /// Moved to the system trash
    Trash,
    /// Moved into the duplicates folder
    Move,
}

/// One destructive action, as logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Time of the action (RFC 3339, UTC)
    pub timestamp: String,
    /// What was done
    pub operation: OperationKind,
    /// The duplicate acted on
    pub source: PathBuf,
    /// Destination of a move
    pub target: Option<PathBuf>,
    /// File size in bytes
    pub size: u64,
    /// The file kept in its place
    pub original: PathBuf,
}

impl Operation {
    /// Create an operation stamped with the current time.
    #[must_use]
    pub fn new(
        operation: OperationKind,
        source: impl Into<PathBuf>,
        target: Option<PathBuf>,
        size: u64,
        original: impl Into<PathBuf>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            operation,
            source: source.into(),
            target,
            size,
            original: original.into(),
        }
    }
}

/// Receiver for destructive actions, called synchronously after each one.
pub trait OperationSink: Send + Sync {
    /// Persist one operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation could not be stored.
    fn record(&self, operation: &Operation) -> Result<(), OperationLogError>;
}

/// Append-only CSV operation log.
pub struct CsvOperationLog {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
    recorded: Mutex<Vec<Operation>>,
}

impl std::fmt::Debug for CsvOperationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvOperationLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CsvOperationLog {
    /// Open `path` for appending, writing the header if the file is new or empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, OperationLogError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |source| OperationLogError::Open {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(open_error)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_error)?;
        let is_new = file.metadata().map_err(open_error)?.len() == 0;

        let writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);

        log::debug!("Operation log opened: {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(writer),
            recorded: Mutex::new(Vec::new()),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Operations recorded through this handle (not earlier runs).
    #[must_use]
    pub fn session_operations(&self) -> Vec<Operation> {
        self.recorded
            .lock()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }

    /// Read every operation from an existing log.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a row is malformed.
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<Operation>, OperationLogError> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)?;
        let operations = reader
            .deserialize()
            .collect::<Result<Vec<Operation>, csv::Error>>()?;
        log::debug!(
            "Read {} operations from {}",
            operations.len(),
            path.display()
        );
        Ok(operations)
    }
}

impl OperationSink for CsvOperationLog {
    fn record(&self, operation: &Operation) -> Result<(), OperationLogError> {
        {
            let mut writer = self
                .writer
                .lock()
                .map_err(|_| OperationLogError::Poisoned)?;
            writer.serialize(operation)?;
            writer.flush()?;
        }
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.push(operation.clone());
        }
        Ok(())
    }
}

/// In-memory sink, used when no log file is configured.
#[derive(Debug, Default)]
pub struct MemoryOperationLog {
    operations: Mutex<Vec<Operation>>,
}

impl MemoryOperationLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the recorded operations.
    #[must_use]
    pub fn into_operations(self) -> Vec<Operation> {
        self.operations.into_inner().unwrap_or_default()
    }
}

impl OperationSink for MemoryOperationLog {
    fn record(&self, operation: &Operation) -> Result<(), OperationLogError> {
        self.operations
            .lock()
            .map_err(|_| OperationLogError::Poisoned)?
            .push(operation.clone());
        Ok(())
    }
}
