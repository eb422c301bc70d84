//! Command-line interface definitions for photodupe.
//!
//! Global options (verbosity, color, error format, config file) apply to
//! every subcommand.
//!
//! # Example
//!
//! ```bash
//! # Preview what would be removed
//! photodupe dedup ~/Pictures --dry-run
//!
//! # Move duplicates aside and keep a log for recovery
//! photodupe dedup ~/Pictures --move-to ~/dupes --log ops.csv
//!
//! # Build a recovery script from that log
//! photodupe recovery-script ops.csv --output restore.sh
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::output::ScriptType;

/// Photo library deduplication.
///
/// photodupe finds byte-identical files, visually similar images and
/// matching videos, keeps the largest copy of each and deletes, trashes or
/// moves the rest.
#[derive(Debug, Parser)]
#[command(name = "photodupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (default: platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Find duplicates in a directory and resolve them
    Dedup(DedupArgs),
    /// Generate a script that reverses the moves in an operation log
    RecoveryScript(RecoveryScriptArgs),
}

/// Arguments for the dedup subcommand.
#[derive(Debug, Args)]
pub struct DedupArgs {
    /// Directory to deduplicate
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Similarity sensitivity between 0 and 1 (1 means identical)
    #[arg(short, long, value_name = "S", value_parser = parse_sensitivity)]
    pub sensitivity: Option<f64>,

    /// Report what would be done without touching any file
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Number of worker threads (default: one per CPU core)
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Permanently delete duplicates
    #[arg(long, conflicts_with_all = ["trash", "move_to"])]
    pub delete: bool,

    /// Move duplicates to the system trash
    #[arg(long, conflicts_with = "move_to")]
    pub trash: bool,

    /// Move duplicates into this folder
    #[arg(long, value_name = "DIR")]
    pub move_to: Option<PathBuf>,

    /// Number of later videos compared against each video
    #[arg(long, value_name = "N")]
    pub video_compare_limit: Option<usize>,

    /// Append every action to this CSV operation log
    #[arg(long = "log", value_name = "CSV")]
    pub log: Option<PathBuf>,

    /// Write a recovery script for this run's actions
    #[arg(long, value_name = "PATH")]
    pub recovery_script: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Follow symbolic links during scan
    ///
    /// Warning: May cause infinite loops if symlinks form cycles.
    #[arg(long)]
    pub follow_symlinks: bool,
}

/// Arguments for the recovery-script subcommand.
#[derive(Debug, Args)]
pub struct RecoveryScriptArgs {
    /// Operation log written by `dedup --log`
    #[arg(value_name = "LOG")]
    pub log: PathBuf,

    /// Write the script here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Script dialect (default: detected from the platform)
    #[arg(long, value_enum)]
    pub shell: Option<ShellArg>,
}

/// Output format for dedup results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Recovery script dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShellArg {
    /// POSIX sh
    Posix,
    /// Windows PowerShell
    Powershell,
}

impl From<ShellArg> for ScriptType {
    fn from(shell: ShellArg) -> Self {
        match shell {
            ShellArg::Posix => ScriptType::Posix,
            ShellArg::Powershell => ScriptType::PowerShell,
        }
    }
}

/// Parse a sensitivity value in `[0, 1]`.
///
/// # Examples
///
/// ```
/// use photodupe::cli::parse_sensitivity;
///
/// assert_eq!(parse_sensitivity("0.95").unwrap(), 0.95);
/// assert!(parse_sensitivity("1.5").is_err());
/// ```
///
/// # Errors
///
/// Returns an error if the value is not a number or lies outside `[0, 1]`.
pub fn parse_sensitivity(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: '{s}'"))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("Sensitivity must be between 0 and 1, got {value}"));
    }
    Ok(value)
}
