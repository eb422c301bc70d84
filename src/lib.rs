//! photodupe - photo library deduplication.
//!
//! Finds byte-identical files (SHA-256), visually similar images (pHash) and
//! matching videos (sampled frame histograms), keeps the largest file of
//! each group and deletes, trashes or moves the others. Every destructive
//! action can be logged to CSV and reversed with a generated script.
//!
//! The library entry points are [`duplicates::DuplicateFinder`] and
//! [`actions::resolve`]; [`run_app`] wires them to the command line.

pub mod actions;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bytesize::ByteSize;
use yansi::Paint;

use crate::actions::{resolve, RemovalReport, ResolutionMode};
use crate::cli::{Cli, Commands, DedupArgs, OutputFormat, RecoveryScriptArgs};
use crate::config::Config;
use crate::duplicates::{DuplicateFinder, DuplicateGroup, ScanSummary};
use crate::error::ExitCode;
use crate::output::{
    CsvOperationLog, JsonOutput, MemoryOperationLog, Operation, OperationSink, RecoveryScript,
    ScriptType,
};
use crate::progress::Progress;

/// Run the application for parsed command-line arguments.
///
/// # Errors
///
/// Returns an error for invalid configuration, an unreadable target, an
/// interrupted scan ([`duplicates::FinderError::Interrupted`]) or failed
/// output. Per-file failures are not errors; they show up in the exit code.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    match cli.command {
        Commands::Dedup(ref args) => run_dedup(&cli, args),
        Commands::RecoveryScript(ref args) => run_recovery_script(args),
    }
}

fn run_dedup(cli: &Cli, args: &DedupArgs) -> anyhow::Result<ExitCode> {
    let mut config =
        Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_cli(args);
    config.validate()?;

    let resolve_config = config.resolve_config()?;
    resolve_config.validate()?;

    let handler = signal::install_handler()?;
    let quiet = cli.quiet || args.output == OutputFormat::Json;
    let progress = Arc::new(Progress::new(quiet));

    let finder_config = config
        .finder_config()
        .with_shutdown_flag(handler.get_flag())
        .with_progress_callback(progress.clone());
    let finder = DuplicateFinder::with_defaults(finder_config);

    let (groups, summary) = finder.find_duplicates(&args.path)?;

    let csv_log = match config.operation_log {
        Some(ref path) if !resolve_config.dry_run => Some(
            CsvOperationLog::create(path)
                .with_context(|| format!("Failed to open operation log {}", path.display()))?,
        ),
        _ => None,
    };
    let memory_log = MemoryOperationLog::new();
    let sink: &dyn OperationSink = match csv_log {
        Some(ref log) => log,
        None => &memory_log,
    };

    let report = resolve(&groups, &resolve_config, Some(sink), Some(progress.as_ref()));

    let operations = match csv_log {
        Some(ref log) => log.session_operations(),
        None => memory_log.into_operations(),
    };

    if let Some(ref path) = args.recovery_script {
        if resolve_config.dry_run {
            log::warn!("Dry run: no recovery script written");
        } else {
            write_recovery_script(path, &operations, ScriptType::detect())?;
        }
    }

    let problems = summary.skipped_files() + summary.scan_errors + report.failure_count();
    let exit_code = ExitCode::for_outcome(groups.len(), problems);

    match args.output {
        OutputFormat::Json => {
            let output = JsonOutput::new(&groups, &summary, exit_code)
                .with_report(&report, &resolve_config.mode);
            output.write_to(&mut std::io::stdout().lock(), true)?;
        }
        OutputFormat::Text if !cli.quiet => {
            print_text(&groups, &summary, &report, &resolve_config.mode);
        }
        OutputFormat::Text => {}
    }

    Ok(exit_code)
}

fn run_recovery_script(args: &RecoveryScriptArgs) -> anyhow::Result<ExitCode> {
    let operations = CsvOperationLog::read(&args.log)
        .with_context(|| format!("Failed to read operation log {}", args.log.display()))?;
    let script_type = args.shell.map_or_else(ScriptType::detect, ScriptType::from);

    match args.output {
        Some(ref path) => write_recovery_script(path, &operations, script_type)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            RecoveryScript::new(&operations, script_type).write_to(&mut stdout)?;
        }
    }
    Ok(ExitCode::Success)
}

fn write_recovery_script(
    path: &Path,
    operations: &[Operation],
    script_type: ScriptType,
) -> anyhow::Result<()> {
    let script = RecoveryScript::new(operations, script_type);
    let file = File::create(path)
        .with_context(|| format!("Failed to create recovery script {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    script.write_to(&mut writer)?;
    writer.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }

    log::info!(
        "Recovery script written to {} ({} moves reversible)",
        path.display(),
        script.reversible_count()
    );
    Ok(())
}

fn print_text(
    groups: &[DuplicateGroup],
    summary: &ScanSummary,
    report: &RemovalReport,
    mode: &ResolutionMode,
) {
    let action = if report.dry_run { "would " } else { "" };

    for group in groups {
        println!(
            "{} {} {}",
            "keep".green().bold(),
            format!("[{}]", group.kind).cyan(),
            group.original.path.display()
        );
        for duplicate in &group.duplicates {
            println!(
                "  {}{} {} ({})",
                action.dim(),
                mode.name().red(),
                duplicate.path.display(),
                ByteSize(duplicate.size())
            );
        }
    }
    if !groups.is_empty() {
        println!();
    }

    println!(
        "{} {} files ({} images, {} videos), {}",
        "Scanned".bold(),
        summary.total_files,
        summary.images,
        summary.videos,
        summary.total_size_display()
    );
    println!(
        "  exact: {} groups, perceptual: {} groups, video: {} groups",
        summary.exact.groups, summary.perceptual.groups, summary.video.groups
    );
    println!(
        "  {} duplicate files in {} groups, {} reclaimable ({:.1}%)",
        summary.duplicate_files,
        summary.duplicate_groups,
        summary.reclaimable_display(),
        summary.wasted_percentage()
    );
    for reason in &summary.skipped_passes {
        println!("  {} {}", "skipped pass:".yellow(), reason);
    }
    if summary.skipped_files() > 0 || summary.scan_errors > 0 {
        println!(
            "  {} {} unreadable files, {} walk errors",
            "warning:".yellow(),
            summary.skipped_files(),
            summary.scan_errors
        );
    }

    if report.dry_run {
        println!(
            "{} would {} {} files, freeing {}",
            "Dry run:".bold(),
            mode.name(),
            report.files_acted_on,
            ByteSize(report.bytes_recovered)
        );
    } else {
        println!(
            "{} {} files, recovered {}",
            mode.verb().bold(),
            report.files_acted_on,
            ByteSize(report.bytes_recovered)
        );
    }
    for failure in &report.failures {
        println!(
            "  {} {}: {}",
            "failed:".red(),
            failure.path.display(),
            failure.message
        );
    }
    if report.unlogged > 0 {
        println!(
            "  {} {} actions missing from the operation log",
            "warning:".yellow(),
            report.unlogged
        );
    }
}
