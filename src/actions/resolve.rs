//! Resolution of duplicate groups: delete, trash or move.
//!
//! # Overview
//!
//! [`resolve`] walks every duplicate of every group (never the original)
//! and applies the configured [`ResolutionMode`]:
//! - Permanent deletion
//! - Move to system trash (recoverable)
//! - Move into a duplicates folder, suffixing `_1`, `_2`, ... on name clashes
//!
//! In dry-run mode nothing is touched; the report only counts what would
//! have been done. Otherwise each successful action is passed to the
//! [`OperationSink`] before the next one starts, and failures are collected
//! in the report without stopping the batch.
//!
//! # Example
//!
//! ```no_run
//! use photodupe::actions::{resolve, ResolveConfig};
//! use photodupe::duplicates::DuplicateFinder;
//! use std::path::Path;
//!
//! let finder = DuplicateFinder::with_defaults(Default::default());
//! let (groups, _) = finder.find_duplicates(Path::new("/photos")).unwrap();
//!
//! let report = resolve(&groups, &ResolveConfig::trash().with_dry_run(true), None, None);
//! println!("{}", report.summary());
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytesize::ByteSize;
use thiserror::Error;

use crate::duplicates::DuplicateGroup;
use crate::output::oplog::{Operation, OperationKind, OperationSink};

/// Error type for resolution actions.
#[derive(Debug, Error)]
pub enum ActionError {
    /// File was not found (may have been deleted or moved).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied when attempting the action.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Trash operation failed.
    #[error("trash operation failed for {path}: {message}")]
    TrashFailed {
        /// File being trashed
        path: PathBuf,
        /// Diagnostic from the trash backend
        message: String,
    },

    /// Permanent delete operation failed.
    #[error("delete failed for {path}: {message}")]
    DeleteFailed {
        /// File being deleted
        path: PathBuf,
        /// Diagnostic from the OS
        message: String,
    },

    /// Move into the duplicates folder failed.
    #[error("move of {path} to {target} failed: {message}")]
    MoveFailed {
        /// File being moved
        path: PathBuf,
        /// Intended destination
        target: PathBuf,
        /// Diagnostic from the OS
        message: String,
    },

    /// The duplicates folder exists but is not a directory.
    #[error("duplicates folder is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ActionError {
    /// Get the path associated with this error.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p)
            | Self::PermissionDenied(p)
            | Self::NotADirectory(p)
            | Self::TrashFailed { path: p, .. }
            | Self::DeleteFailed { path: p, .. }
            | Self::MoveFailed { path: p, .. }
            | Self::Io { path: p, .. } => p,
        }
    }
}

fn map_io_error(path: &Path, error: io::Error) -> ActionError {
    match error.kind() {
        io::ErrorKind::NotFound => ActionError::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => ActionError::PermissionDenied(path.to_path_buf()),
        _ => ActionError::Io {
            path: path.to_path_buf(),
            source: error,
        },
    }
}

/// What to do with each duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Remove permanently
    Delete,
    /// Move to the system trash
    Trash,
    /// Move into the given folder
    MoveTo(PathBuf),
}

impl ResolutionMode {
    /// Operation kind recorded in the log for this mode.
    #[must_use]
    pub fn operation_kind(&self) -> OperationKind {
        match self {
            Self::Delete => OperationKind::Delete,
            Self::Trash => OperationKind::Trash,
            Self::MoveTo(_) => OperationKind::Move,
        }
    }

    /// Imperative verb for log lines.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Trash => "trash",
            Self::MoveTo(_) => "move",
        }
    }

    /// Past-tense verb for summaries.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Delete => "Deleted",
            Self::Trash => "Trashed",
            Self::MoveTo(_) => "Moved",
        }
    }
}

/// Configuration for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveConfig {
    /// Action applied to each duplicate.
    pub mode: ResolutionMode,
    /// Count only, never touch the filesystem.
    pub dry_run: bool,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self::delete()
    }
}

impl ResolveConfig {
    /// Permanent deletion.
    #[must_use]
    pub fn delete() -> Self {
        Self {
            mode: ResolutionMode::Delete,
            dry_run: false,
        }
    }

    /// Move to the system trash.
    #[must_use]
    pub fn trash() -> Self {
        Self {
            mode: ResolutionMode::Trash,
            dry_run: false,
        }
    }

    /// Move into `folder`.
    #[must_use]
    pub fn move_to(folder: impl Into<PathBuf>) -> Self {
        Self {
            mode: ResolutionMode::MoveTo(folder.into()),
            dry_run: false,
        }
    }

    /// Enable/disable dry-run.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Check the duplicates folder is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NotADirectory`] if the folder exists as a file.
    pub fn validate(&self) -> Result<(), ActionError> {
        if let ResolutionMode::MoveTo(ref folder) = self.mode {
            if folder.exists() && !folder.is_dir() {
                return Err(ActionError::NotADirectory(folder.clone()));
            }
        }
        Ok(())
    }
}

/// A duplicate that could not be acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    /// The duplicate
    pub path: PathBuf,
    /// Why the action failed
    pub message: String,
}

/// Outcome of a resolution run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// Duplicates acted on (or that would be, in dry-run)
    pub files_acted_on: usize,
    /// Bytes freed (or that would be, in dry-run)
    pub bytes_recovered: u64,
    /// Number of duplicates considered
    pub candidates: usize,
    /// Duplicates whose action failed
    pub failures: Vec<ActionFailure>,
    /// Successful actions the operation sink failed to store
    pub unlogged: usize,
    /// Whether this was a dry run
    pub dry_run: bool,
}

impl RemovalReport {
    /// Number of failed actions.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Check if every action succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        let prefix = if self.dry_run { "Would act on" } else { "Acted on" };
        let mut text = format!(
            "{} {} of {} duplicate(s), {} recovered",
            prefix,
            self.files_acted_on,
            self.candidates,
            ByteSize(self.bytes_recovered)
        );
        if !self.all_succeeded() {
            text.push_str(&format!(", {} failed", self.failure_count()));
        }
        text
    }
}

/// Callback trait for resolution progress reporting.
pub trait ResolveProgressCallback: Send + Sync {
    /// Called before each duplicate is handled.
    fn on_before_action(&self, path: &Path, index: usize, total: usize);

    /// Called after a successful action.
    fn on_action_success(&self, path: &Path, size: u64);

    /// Called after a failed action.
    fn on_action_failure(&self, path: &Path, error: &str);

    /// Called when the run completes.
    fn on_complete(&self, report: &RemovalReport);
}

/// Permanently delete a file.
///
/// # Errors
///
/// - `NotFound` if the file doesn't exist
/// - `PermissionDenied` if deletion is not allowed
/// - `DeleteFailed` if the removal fails
pub fn delete_file(path: &Path) -> Result<(), ActionError> {
    if !path.exists() {
        return Err(ActionError::NotFound(path.to_path_buf()));
    }

    fs::remove_file(path).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => ActionError::PermissionDenied(path.to_path_buf()),
        _ => ActionError::DeleteFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
    })?;

    log::info!("Deleted: {}", path.display());
    Ok(())
}

/// Move a file to the system trash.
///
/// # Errors
///
/// - `NotFound` if the file doesn't exist
/// - `TrashFailed` if the trash operation fails
pub fn trash_file(path: &Path) -> Result<(), ActionError> {
    if !path.exists() {
        return Err(ActionError::NotFound(path.to_path_buf()));
    }

    trash::delete(path).map_err(|e| ActionError::TrashFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    log::info!("Moved to trash: {}", path.display());
    Ok(())
}

/// First free destination for `file_name` in `folder`.
///
/// `photo.jpg` becomes `photo_1.jpg`, `photo_2.jpg`, ... while the name is
/// taken.
#[must_use]
pub fn unique_target(folder: &Path, file_name: &Path) -> PathBuf {
    let candidate = folder.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file_name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u64..)
        .map(|n| folder.join(format!("{stem}_{n}{extension}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Move a file into `folder`, creating the folder if needed.
///
/// Falls back to copy and remove when a rename is not possible (for
/// instance across filesystems). Returns the final destination.
///
/// # Errors
///
/// - `NotFound` if the file doesn't exist
/// - `NotADirectory` if `folder` exists as a file
/// - `MoveFailed` if both rename and copy fail
pub fn move_file(path: &Path, folder: &Path) -> Result<PathBuf, ActionError> {
    if !path.exists() {
        return Err(ActionError::NotFound(path.to_path_buf()));
    }
    if folder.exists() && !folder.is_dir() {
        return Err(ActionError::NotADirectory(folder.to_path_buf()));
    }
    fs::create_dir_all(folder).map_err(|e| map_io_error(folder, e))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| ActionError::NotFound(path.to_path_buf()))?;
    let target = unique_target(folder, Path::new(file_name));

    if let Err(rename_error) = fs::rename(path, &target) {
        log::debug!(
            "Rename of {} failed ({}), copying instead",
            path.display(),
            rename_error
        );
        copy_then_remove(path, &target).map_err(|e| ActionError::MoveFailed {
            path: path.to_path_buf(),
            target: target.clone(),
            message: e.to_string(),
        })?;
    }

    log::info!("Moved: {} -> {}", path.display(), target.display());
    Ok(target)
}

/// Copy `path` to `target`, then remove `path`.
///
/// On any failure the source is kept and `target` (possibly partial) is
/// removed.
fn copy_then_remove(path: &Path, target: &Path) -> io::Result<()> {
    let result = fs::copy(path, target).and_then(|_| fs::remove_file(path));
    if result.is_err() {
        if let Err(e) = fs::remove_file(target) {
            log::debug!("Could not clean up {}: {}", target.display(), e);
        }
    }
    result
}

/// Apply `config` to every duplicate of every group.
///
/// Originals are never touched. In dry-run mode neither the filesystem nor
/// the sink is used. Sink errors are logged and counted in
/// [`RemovalReport::unlogged`]; they do not undo the action.
pub fn resolve(
    groups: &[DuplicateGroup],
    config: &ResolveConfig,
    sink: Option<&dyn OperationSink>,
    callback: Option<&dyn ResolveProgressCallback>,
) -> RemovalReport {
    let total: usize = groups.iter().map(DuplicateGroup::duplicate_count).sum();
    let mut report = RemovalReport {
        candidates: total,
        dry_run: config.dry_run,
        ..Default::default()
    };

    let mut index = 0;
    for group in groups {
        for duplicate in &group.duplicates {
            let path = duplicate.path.as_path();
            if let Some(cb) = callback {
                cb.on_before_action(path, index, total);
            }
            index += 1;

            let size = duplicate.size();

            if config.dry_run {
                log::info!(
                    "[dry-run] Would {} {} (keeping {})",
                    config.mode.name(),
                    path.display(),
                    group.original.path.display()
                );
                report.files_acted_on += 1;
                report.bytes_recovered += size;
                if let Some(cb) = callback {
                    cb.on_action_success(path, size);
                }
                continue;
            }

            let outcome = match config.mode {
                ResolutionMode::Delete => delete_file(path).map(|()| None),
                ResolutionMode::Trash => trash_file(path).map(|()| None),
                ResolutionMode::MoveTo(ref folder) => move_file(path, folder).map(Some),
            };

            match outcome {
                Ok(target) => {
                    report.files_acted_on += 1;
                    report.bytes_recovered += size;

                    if let Some(sink) = sink {
                        let operation = Operation::new(
                            config.mode.operation_kind(),
                            path,
                            target,
                            size,
                            group.original.path.clone(),
                        );
                        if let Err(e) = sink.record(&operation) {
                            log::error!("Failed to log operation on {}: {}", path.display(), e);
                            report.unlogged += 1;
                        }
                    }

                    if let Some(cb) = callback {
                        cb.on_action_success(path, size);
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    log::warn!("Failed to resolve {}: {}", path.display(), message);
                    if let Some(cb) = callback {
                        cb.on_action_failure(path, &message);
                    }
                    report.failures.push(ActionFailure {
                        path: path.to_path_buf(),
                        message,
                    });
                }
            }
        }
    }

    if let Some(cb) = callback {
        cb.on_complete(&report);
    }

    log::info!("{}", report.summary());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::{select_original, MatchKind};
    use crate::output::oplog::{MemoryOperationLog, OperationLogError};
    use crate::scanner::FileRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn group_of(paths: &[PathBuf]) -> DuplicateGroup {
        select_original(
            paths.iter().map(|p| FileRecord::new(p.clone())).collect(),
            MatchKind::Exact,
        )
        .unwrap()
    }

    /// Library with one group: a.jpg (original), b.jpg and c.jpg duplicates.
    fn library() -> (TempDir, DuplicateGroup) {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            create_file(dir.path(), "a.jpg", b"1234"),
            create_file(dir.path(), "b.jpg", b"1234"),
            create_file(dir.path(), "c.jpg", b"1234"),
        ];
        let group = group_of(&paths);
        (dir, group)
    }

    struct FailingSink;

    impl OperationSink for FailingSink {
        fn record(&self, _operation: &Operation) -> Result<(), OperationLogError> {
            Err(OperationLogError::Poisoned)
        }
    }

    #[derive(Default)]
    struct RecordingCallback {
        before: AtomicUsize,
        failures: AtomicUsize,
        completed: Mutex<Option<RemovalReport>>,
    }

    impl ResolveProgressCallback for RecordingCallback {
        fn on_before_action(&self, _path: &Path, _index: usize, _total: usize) {
            self.before.fetch_add(1, Ordering::SeqCst);
        }
        fn on_action_success(&self, _path: &Path, _size: u64) {}
        fn on_action_failure(&self, _path: &Path, _error: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        fn on_complete(&self, report: &RemovalReport) {
            *self.completed.lock().unwrap() = Some(report.clone());
        }
    }

    // ==================== Helper Tests ====================

    #[test]
    fn test_unique_target_suffixes() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            unique_target(dir.path(), Path::new("photo.jpg")),
            dir.path().join("photo.jpg")
        );

        create_file(dir.path(), "photo.jpg", b"x");
        create_file(dir.path(), "photo_1.jpg", b"x");
        assert_eq!(
            unique_target(dir.path(), Path::new("photo.jpg")),
            dir.path().join("photo_2.jpg")
        );

        create_file(dir.path(), "README", b"x");
        assert_eq!(
            unique_target(dir.path(), Path::new("README")),
            dir.path().join("README_1")
        );
    }

    #[test]
    fn test_delete_file_not_found() {
        assert!(matches!(
            delete_file(Path::new("/no/such/file.jpg")),
            Err(ActionError::NotFound(_))
        ));
    }

    #[test]
    fn test_move_file_creates_folder_and_avoids_clash() {
        let dir = TempDir::new().unwrap();
        let dupes = dir.path().join("dupes");
        let first = create_file(dir.path(), "x.jpg", b"first");
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let second = create_file(&sub, "x.jpg", b"second");

        let t1 = move_file(&first, &dupes).unwrap();
        let t2 = move_file(&second, &dupes).unwrap();

        assert_eq!(t1, dupes.join("x.jpg"));
        assert_eq!(t2, dupes.join("x_1.jpg"));
        assert!(!first.exists());
        assert_eq!(fs::read(&t2).unwrap(), b"second");
    }

    #[test]
    fn test_copy_then_remove_moves_content() {
        let dir = TempDir::new().unwrap();
        let src = create_file(dir.path(), "x.jpg", b"pixels");
        let target = dir.path().join("y.jpg");

        copy_then_remove(&src, &target).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&target).unwrap(), b"pixels");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_copy_leaves_no_partial_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("mem.bin");

        // Opens as a regular file, but reading from offset 0 fails
        let result = copy_then_remove(Path::new("/proc/self/mem"), &target);
        assert!(result.is_err());
        assert!(!target.exists());
    }

    #[test]
    fn test_move_into_file_rejected() {
        let dir = TempDir::new().unwrap();
        let blocker = create_file(dir.path(), "dupes", b"not a folder");
        let src = create_file(dir.path(), "x.jpg", b"x");

        assert!(matches!(
            move_file(&src, &blocker),
            Err(ActionError::NotADirectory(_))
        ));
        assert!(ResolveConfig::move_to(&blocker).validate().is_err());
        assert!(ResolveConfig::move_to(dir.path().join("new")).validate().is_ok());
    }

    // ==================== Resolve Tests ====================

    #[test]
    fn test_dry_run_touches_nothing() {
        let (dir, group) = library();
        let sink = MemoryOperationLog::new();

        let report = resolve(
            &[group],
            &ResolveConfig::delete().with_dry_run(true),
            Some(&sink),
            None,
        );

        assert!(report.dry_run);
        assert_eq!(report.files_acted_on, 2);
        assert_eq!(report.bytes_recovered, 8);
        assert!(dir.path().join("b.jpg").exists());
        assert!(dir.path().join("c.jpg").exists());
        assert!(sink.into_operations().is_empty());
    }

    #[test]
    fn test_delete_keeps_original_and_logs() {
        let (dir, group) = library();
        let sink = MemoryOperationLog::new();

        let report = resolve(&[group], &ResolveConfig::delete(), Some(&sink), None);

        assert_eq!(report.files_acted_on, 2);
        assert_eq!(report.bytes_recovered, 8);
        assert!(report.all_succeeded());
        assert!(dir.path().join("a.jpg").exists());
        assert!(!dir.path().join("b.jpg").exists());
        assert!(!dir.path().join("c.jpg").exists());

        let ops = sink.into_operations();
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.operation == OperationKind::Delete));
        assert!(ops.iter().all(|op| op.original == dir.path().join("a.jpg")));
        assert!(ops.iter().all(|op| op.target.is_none()));
    }

    #[test]
    fn test_dry_run_matches_destructive_counts() {
        let (_dir_a, group_a) = library();
        let (_dir_b, group_b) = library();

        let simulated = resolve(&[group_a], &ResolveConfig::delete().with_dry_run(true), None, None);
        let real = resolve(&[group_b], &ResolveConfig::delete(), None, None);

        assert_eq!(simulated.files_acted_on, real.files_acted_on);
        assert_eq!(simulated.bytes_recovered, real.bytes_recovered);
    }

    #[test]
    fn test_move_mode_records_targets() {
        let (dir, group) = library();
        let dupes = dir.path().join("duplicates");
        let sink = MemoryOperationLog::new();

        let report = resolve(&[group], &ResolveConfig::move_to(&dupes), Some(&sink), None);

        assert_eq!(report.files_acted_on, 2);
        assert!(dupes.join("b.jpg").exists());
        assert!(dupes.join("c.jpg").exists());
        let ops = sink.into_operations();
        assert_eq!(ops[0].target.as_deref(), Some(dupes.join("b.jpg").as_path()));
        assert_eq!(ops[0].operation, OperationKind::Move);
    }

    #[test]
    fn test_failures_continue_batch() {
        let (dir, group) = library();
        fs::remove_file(dir.path().join("b.jpg")).unwrap();
        let callback = RecordingCallback::default();

        let report = resolve(&[group], &ResolveConfig::delete(), None, Some(&callback));

        assert_eq!(report.candidates, 2);
        assert_eq!(report.files_acted_on, 1);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failures[0].path, dir.path().join("b.jpg"));
        assert!(!dir.path().join("c.jpg").exists());
        assert_eq!(callback.before.load(Ordering::SeqCst), 2);
        assert_eq!(callback.failures.load(Ordering::SeqCst), 1);
        assert_eq!(callback.completed.lock().unwrap().as_ref(), Some(&report));
    }

    #[test]
    fn test_sink_failure_is_counted() {
        let (_dir, group) = library();
        let report = resolve(&[group], &ResolveConfig::delete(), Some(&FailingSink), None);

        assert_eq!(report.files_acted_on, 2);
        assert_eq!(report.unlogged, 2);
    }

    #[test]
    fn test_report_summary() {
        let report = RemovalReport {
            files_acted_on: 2,
            candidates: 3,
            bytes_recovered: 2048,
            failures: vec![ActionFailure {
                path: PathBuf::from("/x"),
                message: "boom".to_string(),
            }],
            unlogged: 0,
            dry_run: true,
        };
        let summary = report.summary();
        assert!(summary.starts_with("Would act on 2 of 3"));
        assert!(summary.ends_with("1 failed"));
    }
}
