//! Exit codes and structured errors for the command line.

use serde::Serialize;

/// Process exit codes.
///
/// - 0: Duplicates found and handled
/// - 1: Unexpected failure
/// - 2: Nothing to do, no duplicates found
/// - 3: Finished, but some files were skipped or some actions failed
/// - 130: Interrupted by Ctrl+C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Duplicates were found and handled.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// The run completed without finding duplicates.
    NoDuplicates = 2,
    /// The run completed with skipped files or failed actions.
    PartialSuccess = 3,
    /// The run was interrupted by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "PD000",
            Self::GeneralError => "PD001",
            Self::NoDuplicates => "PD002",
            Self::PartialSuccess => "PD003",
            Self::Interrupted => "PD130",
        }
    }

    /// Pick the exit code for a finished run.
    ///
    /// `problems` counts files that were skipped during scanning plus
    /// actions that failed during resolution.
    #[must_use]
    pub fn for_outcome(duplicate_groups: usize, problems: usize) -> Self {
        if problems > 0 {
            Self::PartialSuccess
        } else if duplicate_groups == 0 {
            Self::NoDuplicates
        } else {
            Self::Success
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "PD001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
