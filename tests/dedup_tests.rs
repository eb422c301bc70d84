use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use clap::Parser;
use photodupe::actions::{resolve, ResolveConfig};
use photodupe::cli::Cli;
use photodupe::duplicates::{DuplicateFinder, FinderConfig, FinderError, MatchKind};
use photodupe::error::ExitCode;
use photodupe::output::{CsvOperationLog, MemoryOperationLog, OperationKind, RecoveryScript, ScriptType};
use photodupe::scanner::{Walker, WalkerConfig};
use tempfile::TempDir;

static CWD_LOCK: Mutex<()> = Mutex::new(());

/// Current directory switched for one test, restored on drop.
struct CurrentDir {
    previous: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl CurrentDir {
    fn enter(dir: &Path) -> Self {
        let lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for CurrentDir {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.previous);
    }
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

fn finder() -> DuplicateFinder {
    DuplicateFinder::new(FinderConfig::default().with_threads(Some(2)))
}

fn listing(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    paths.sort();
    paths
}

// ==================== End-to-End Tests ====================

#[test]
fn test_identical_text_files_resolved() {
    let dir = TempDir::new().unwrap();
    let a = write(dir.path(), "a.txt", "X");
    let b = write(dir.path(), "b.txt", "X");
    let c = write(dir.path(), "c.txt", "Y");

    let (groups, _) = finder().find_duplicates(dir.path()).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].kind, MatchKind::Exact);
    assert_eq!(groups[0].original.path, a);
    assert_eq!(groups[0].duplicates.len(), 1);
    assert_eq!(groups[0].duplicates[0].path, b);

    let report = resolve(&groups, &ResolveConfig::delete(), None, None);
    assert_eq!(report.files_acted_on, 1);
    assert_eq!(report.bytes_recovered, 1);
    assert!(report.all_succeeded());
    assert_eq!(listing(dir.path()), vec![a, c]);
}

#[test]
fn test_n_identical_and_m_distinct() {
    let dir = TempDir::new().unwrap();
    for i in 0..4 {
        write(dir.path(), &format!("copy_{i}.png"), "same picture bytes");
    }
    for i in 0..3 {
        write(dir.path(), &format!("unique_{i}.png"), &format!("unique {i}"));
    }

    let (groups, summary) = finder().find_duplicates(dir.path()).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 4);
    assert_eq!(summary.total_files, 7);
    assert_eq!(summary.duplicate_files, 3);
}

#[test]
fn test_dry_run_matches_destructive_run() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a/1.jpg", "photo one");
    write(dir.path(), "b/1.jpg", "photo one");
    write(dir.path(), "c/1.jpg", "photo one");
    write(dir.path(), "a/2.jpg", "photo two!");
    write(dir.path(), "b/2.jpg", "photo two!");

    let (groups, _) = finder().find_duplicates(dir.path()).unwrap();
    let before = count_files(dir.path());

    let sink = MemoryOperationLog::new();
    let dry = resolve(
        &groups,
        &ResolveConfig::delete().with_dry_run(true),
        Some(&sink),
        None,
    );
    assert_eq!(count_files(dir.path()), before);
    assert!(sink.into_operations().is_empty());

    let real = resolve(&groups, &ResolveConfig::delete(), None, None);
    assert_eq!(dry.files_acted_on, real.files_acted_on);
    assert_eq!(dry.bytes_recovered, real.bytes_recovered);
    assert_eq!(real.files_acted_on, 3);
    assert_eq!(count_files(dir.path()), before - 3);
    assert!(dir.path().join("a/1.jpg").exists());
    assert!(dir.path().join("a/2.jpg").exists());
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .map(|p| if p.is_dir() { count_files(&p) } else { 1 })
        .sum()
}

#[test]
fn test_move_with_log_and_recovery_script() {
    let library = TempDir::new().unwrap();
    let dupes = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    let a = write(library.path(), "x/img.jpg", "pixels");
    let b = write(library.path(), "y/img.jpg", "pixels");
    let c = write(library.path(), "z/img.jpg", "pixels");

    let (groups, _) = finder().find_duplicates(library.path()).unwrap();
    let log_path = logs.path().join("ops.csv");
    let log = CsvOperationLog::create(&log_path).unwrap();

    let report = resolve(&groups, &ResolveConfig::move_to(dupes.path()), Some(&log), None);
    assert_eq!(report.files_acted_on, 2);
    assert!(a.exists());
    assert!(!b.exists());
    assert!(!c.exists());
    assert!(dupes.path().join("img.jpg").exists());
    assert!(dupes.path().join("img_1.jpg").exists());

    let operations = CsvOperationLog::read(&log_path).unwrap();
    assert_eq!(operations.len(), 2);
    assert!(operations.iter().all(|op| op.operation == OperationKind::Move));
    assert!(operations.iter().all(|op| op.original == a));
    assert_eq!(operations[0].source, b);
    assert_eq!(operations[0].target.as_deref(), Some(dupes.path().join("img.jpg").as_path()));

    let script = RecoveryScript::new(&operations, ScriptType::Posix);
    assert_eq!(script.reversible_count(), 2);
    let mut out = Vec::new();
    script.write_to(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("mv -n"));
    assert!(text.contains(&b.display().to_string()));
    assert!(text.contains(&c.display().to_string()));
}

#[test]
fn test_duplicates_folder_inside_library_is_not_rescanned() {
    let library = TempDir::new().unwrap();
    write(library.path(), "a.jpg", "same");
    write(library.path(), "_dupes/old.jpg", "same");

    let config = FinderConfig::default()
        .with_threads(Some(1))
        .with_walker_config(photodupe::scanner::WalkerConfig {
            exclude_dirs: vec![library.path().join("_dupes")],
            ..Default::default()
        });
    let (groups, summary) = DuplicateFinder::new(config)
        .find_duplicates(library.path())
        .unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.total_files, 1);
}

#[test]
fn test_relative_duplicates_folder_not_walked_from_dot() {
    let library = TempDir::new().unwrap();
    write(library.path(), "a.jpg", "same");
    write(library.path(), "_dupes/old.jpg", "same");
    let _cwd = CurrentDir::enter(library.path());

    let config = WalkerConfig {
        exclude_dirs: vec![PathBuf::from("_dupes")],
        ..Default::default()
    };
    let (files, errors) = Walker::new(Path::new("."), config).classify();

    assert!(errors.is_empty());
    assert_eq!(files.len(), 1);
    assert!(files.images[0].path.ends_with("a.jpg"));
}

// ==================== Application Tests ====================

#[test]
fn test_run_app_rerun_with_relative_move_to_keeps_library_file() {
    let library = TempDir::new().unwrap();
    let a = write(library.path(), "a.jpg", "same");
    let b = write(library.path(), "b.jpg", "same");
    let old = write(library.path(), "_dupes/old.jpg", "same");
    let _cwd = CurrentDir::enter(library.path());

    let cli = Cli::try_parse_from(["photodupe", "-q", "dedup", ".", "--move-to", "_dupes"]).unwrap();
    assert_eq!(photodupe::run_app(cli).unwrap(), ExitCode::Success);

    // The earlier copy in the duplicates folder never competes as original
    assert!(a.exists());
    assert!(!b.exists());
    assert!(old.exists());
    assert!(library.path().join("_dupes/b.jpg").exists());
    assert_eq!(fs::read_dir(library.path().join("_dupes")).unwrap().count(), 2);
}

#[test]
fn test_run_app_dry_run_exit_codes() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", "X");
    write(dir.path(), "b.txt", "X");
    let path = dir.path().to_string_lossy().into_owned();

    let cli = Cli::try_parse_from(["photodupe", "-q", "dedup", &path, "--dry-run"]).unwrap();
    assert_eq!(photodupe::run_app(cli).unwrap(), ExitCode::Success);
    assert!(dir.path().join("b.txt").exists());

    let empty = TempDir::new().unwrap();
    let path = empty.path().to_string_lossy().into_owned();
    let cli = Cli::try_parse_from(["photodupe", "-q", "dedup", &path]).unwrap();
    assert_eq!(photodupe::run_app(cli).unwrap(), ExitCode::NoDuplicates);
}

#[test]
fn test_run_app_move_writes_log_and_script() {
    let library = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    write(library.path(), "a.txt", "X");
    let b = write(library.path(), "b.txt", "X");
    let dupes = work.path().join("dupes");
    let log = work.path().join("ops.csv");
    let script = work.path().join("restore.sh");

    let cli = Cli::try_parse_from([
        "photodupe".to_string(),
        "-q".to_string(),
        "dedup".to_string(),
        library.path().to_string_lossy().into_owned(),
        "--move-to".to_string(),
        dupes.to_string_lossy().into_owned(),
        "--log".to_string(),
        log.to_string_lossy().into_owned(),
        "--recovery-script".to_string(),
        script.to_string_lossy().into_owned(),
    ])
    .unwrap();

    assert_eq!(photodupe::run_app(cli).unwrap(), ExitCode::Success);
    assert!(!b.exists());
    assert!(dupes.join("b.txt").exists());
    assert_eq!(CsvOperationLog::read(&log).unwrap().len(), 1);
    assert!(fs::read_to_string(&script).unwrap().contains("# RESTORE:"));
}

#[test]
fn test_run_app_missing_path_is_finder_error() {
    let cli = Cli::try_parse_from(["photodupe", "-q", "dedup", "/no/such/library"]).unwrap();
    let err = photodupe::run_app(cli).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FinderError>(),
        Some(FinderError::PathNotFound(_))
    ));
}

#[test]
fn test_run_app_recovery_script_from_log() {
    let work = TempDir::new().unwrap();
    let log = work.path().join("ops.csv");
    fs::write(
        &log,
        "timestamp,operation,source,target,size,original\n\
         2026-01-01T00:00:00Z,move,/photos/b.jpg,/dupes/b.jpg,10,/photos/a.jpg\n\
         2026-01-01T00:00:01Z,delete,/photos/c.jpg,,10,/photos/a.jpg\n",
    )
    .unwrap();
    let out = work.path().join("restore.ps1");

    let cli = Cli::try_parse_from([
        "photodupe".to_string(),
        "-q".to_string(),
        "recovery-script".to_string(),
        log.to_string_lossy().into_owned(),
        "--output".to_string(),
        out.to_string_lossy().into_owned(),
        "--shell".to_string(),
        "powershell".to_string(),
    ])
    .unwrap();

    assert_eq!(photodupe::run_app(cli).unwrap(), ExitCode::Success);
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("Move-Item -LiteralPath '/dupes/b.jpg'"));
    assert!(text.contains("/photos/c.jpg"));
}
