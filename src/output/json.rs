//! JSON output formatter for deduplication results.
//!
//! Provides machine-readable output for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "duplicates": [
//!     {
//!       "kind": "exact",
//!       "original": "/photos/a.jpg",
//!       "original_size": 1024,
//!       "duplicates": [{ "path": "/photos/b.jpg", "size": 1024 }]
//!     }
//!   ],
//!   "summary": {
//!     "total_files": 100,
//!     "duplicate_groups": 5,
//!     "reclaimable_space": 51200,
//!     "exit_code": 0,
//!     "exit_code_name": "PD000"
//!   },
//!   "report": {
//!     "mode": "trash",
//!     "dry_run": true,
//!     "files_acted_on": 5,
//!     "bytes_recovered": 51200,
//!     "failures": []
//!   }
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use crate::actions::{RemovalReport, ResolutionMode};
use crate::duplicates::{DuplicateGroup, MatchKind, PassStats, ScanSummary};
use crate::error::ExitCode;

/// One duplicate file in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFile {
    /// Path as listed
    pub path: String,
    /// File size in bytes
    pub size: u64,
}

/// A single duplicate group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicateGroup {
    /// Pass that produced the group
    pub kind: MatchKind,
    /// The file that is kept
    pub original: String,
    /// Size of the original in bytes
    pub original_size: u64,
    /// The files to remove or move
    pub duplicates: Vec<JsonFile>,
}

impl JsonDuplicateGroup {
    /// Convert a [`DuplicateGroup`].
    #[must_use]
    pub fn from_duplicate_group(group: &DuplicateGroup) -> Self {
        Self {
            kind: group.kind,
            original: group.original.path.to_string_lossy().into_owned(),
            original_size: group.original.size(),
            duplicates: group
                .duplicates
                .iter()
                .map(|f| JsonFile {
                    path: f.path.to_string_lossy().into_owned(),
                    size: f.size(),
                })
                .collect(),
        }
    }
}

/// Counters for one pass.
#[derive(Debug, Clone, Serialize)]
pub struct JsonPassStats {
    /// Files handed to the pass
    pub candidates: usize,
    /// Files that could not be fingerprinted
    pub failed: usize,
    /// Groups produced
    pub groups: usize,
    /// Duplicates in those groups
    pub duplicates: usize,
}

impl From<PassStats> for JsonPassStats {
    fn from(stats: PassStats) -> Self {
        Self {
            candidates: stats.candidates,
            failed: stats.failed,
            groups: stats.groups,
            duplicates: stats.duplicates,
        }
    }
}

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Total number of files listed
    pub total_files: usize,
    /// Image files
    pub images: usize,
    /// Video files
    pub videos: usize,
    /// Total size of all listed files in bytes
    pub total_size: u64,
    /// Number of duplicate groups
    pub duplicate_groups: usize,
    /// Number of duplicate files (excluding originals)
    pub duplicate_files: usize,
    /// Space that can be reclaimed (bytes)
    pub reclaimable_space: u64,
    /// Exact pass counters
    pub exact: JsonPassStats,
    /// Perceptual pass counters
    pub perceptual: JsonPassStats,
    /// Video pass counters
    pub video: JsonPassStats,
    /// Passes that did not run and why
    pub skipped_passes: Vec<String>,
    /// Errors encountered while listing files
    pub scan_errors: usize,
    /// Duration of the scan in milliseconds
    pub scan_duration_ms: u64,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "PD000")
    pub exit_code_name: String,
}

impl JsonSummary {
    /// Create a JSON summary from a [`ScanSummary`] and an exit code.
    #[must_use]
    pub fn from_scan_summary(summary: &ScanSummary, exit_code: ExitCode) -> Self {
        Self {
            total_files: summary.total_files,
            images: summary.images,
            videos: summary.videos,
            total_size: summary.total_size,
            duplicate_groups: summary.duplicate_groups,
            duplicate_files: summary.duplicate_files,
            reclaimable_space: summary.reclaimable_space,
            exact: summary.exact.into(),
            perceptual: summary.perceptual.into(),
            video: summary.video.into(),
            skipped_passes: summary.skipped_passes.clone(),
            scan_errors: summary.scan_errors,
            scan_duration_ms: summary.scan_duration.as_millis() as u64,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// A failed action in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFailure {
    /// The duplicate
    pub path: String,
    /// Why the action failed
    pub message: String,
}

/// Resolution outcome in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    /// `delete`, `trash` or `move`
    pub mode: String,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Duplicates acted on
    pub files_acted_on: usize,
    /// Bytes freed
    pub bytes_recovered: u64,
    /// Actions the operation log failed to store
    pub unlogged: usize,
    /// Failed actions
    pub failures: Vec<JsonFailure>,
}

impl JsonReport {
    /// Convert a [`RemovalReport`].
    #[must_use]
    pub fn from_report(report: &RemovalReport, mode: &ResolutionMode) -> Self {
        Self {
            mode: mode.name().to_string(),
            dry_run: report.dry_run,
            files_acted_on: report.files_acted_on,
            bytes_recovered: report.bytes_recovered,
            unlogged: report.unlogged,
            failures: report
                .failures
                .iter()
                .map(|f| JsonFailure {
                    path: f.path.to_string_lossy().into_owned(),
                    message: f.message.clone(),
                })
                .collect(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Duplicate groups
    pub duplicates: Vec<JsonDuplicateGroup>,
    /// Scan summary statistics
    pub summary: JsonSummary,
    /// Resolution outcome, absent when nothing was resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<JsonReport>,
}

impl JsonOutput {
    /// Create a JSON output from groups, summary and exit code.
    ///
    /// # Example
    ///
    /// ```
    /// use photodupe::duplicates::ScanSummary;
    /// use photodupe::error::ExitCode;
    /// use photodupe::output::json::JsonOutput;
    ///
    /// let output = JsonOutput::new(&[], &ScanSummary::default(), ExitCode::NoDuplicates);
    /// assert!(output.duplicates.is_empty());
    /// assert_eq!(output.summary.exit_code, 2);
    /// ```
    #[must_use]
    pub fn new(groups: &[DuplicateGroup], summary: &ScanSummary, exit_code: ExitCode) -> Self {
        Self {
            duplicates: groups
                .iter()
                .map(JsonDuplicateGroup::from_duplicate_group)
                .collect(),
            summary: JsonSummary::from_scan_summary(summary, exit_code),
            report: None,
        }
    }

    /// Attach the resolution outcome.
    #[must_use]
    pub fn with_report(mut self, report: &RemovalReport, mode: &ResolutionMode) -> Self {
        self.report = Some(JsonReport::from_report(report, mode));
        self
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer, followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionFailure;
    use crate::duplicates::select_original;
    use crate::scanner::FileRecord;
    use std::path::PathBuf;
    use std::time::Duration;

    fn create_test_groups() -> Vec<DuplicateGroup> {
        vec![
            select_original(
                vec![
                    FileRecord::with_size("/photos/a.jpg", 1024),
                    FileRecord::with_size("/photos/b.jpg", 1024),
                ],
                MatchKind::Exact,
            )
            .unwrap(),
            select_original(
                vec![
                    FileRecord::with_size("/photos/big.png", 4096),
                    FileRecord::with_size("/photos/small.png", 1000),
                    FileRecord::with_size("/photos/mid.png", 2000),
                ],
                MatchKind::Perceptual,
            )
            .unwrap(),
        ]
    }

    fn create_test_summary() -> ScanSummary {
        ScanSummary {
            total_files: 10,
            images: 8,
            videos: 2,
            total_size: 20_000,
            duplicate_groups: 2,
            duplicate_files: 3,
            reclaimable_space: 4024,
            skipped_passes: vec!["video: no frame sampler available".to_string()],
            scan_duration: Duration::from_millis(1234),
            ..Default::default()
        }
    }

    #[test]
    fn test_json_output_empty() {
        let output = JsonOutput::new(&[], &ScanSummary::default(), ExitCode::NoDuplicates);
        assert!(output.duplicates.is_empty());
        assert!(output.report.is_none());
        assert_eq!(output.summary.exit_code_name, "PD002");
    }

    #[test]
    fn test_json_output_with_groups() {
        let output = JsonOutput::new(
            &create_test_groups(),
            &create_test_summary(),
            ExitCode::Success,
        );

        assert_eq!(output.duplicates.len(), 2);
        assert_eq!(output.duplicates[0].original, "/photos/a.jpg");
        assert_eq!(output.duplicates[0].duplicates.len(), 1);

        let perceptual = &output.duplicates[1];
        assert_eq!(perceptual.kind, MatchKind::Perceptual);
        assert_eq!(perceptual.original, "/photos/big.png");
        assert_eq!(perceptual.original_size, 4096);
        assert_eq!(perceptual.duplicates[0].path, "/photos/mid.png");
        assert_eq!(perceptual.duplicates[1].size, 1000);
        assert_eq!(output.summary.scan_duration_ms, 1234);
    }

    #[test]
    fn test_to_json_compact() {
        let output = JsonOutput::new(&[], &ScanSummary::default(), ExitCode::Success);
        let json = output.to_json().unwrap();

        assert!(!json.contains('\n'));
        assert!(json.starts_with('{'));
        assert!(!json.contains("\"report\""));
    }

    #[test]
    fn test_to_json_pretty() {
        let output = JsonOutput::new(&[], &ScanSummary::default(), ExitCode::Success);
        assert!(output.to_json_pretty().unwrap().contains('\n'));
    }

    #[test]
    fn test_json_is_valid() {
        let output = JsonOutput::new(
            &create_test_groups(),
            &create_test_summary(),
            ExitCode::Success,
        );
        let parsed: serde_json::Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();

        assert_eq!(parsed["duplicates"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["duplicates"][1]["kind"], "perceptual");
        assert_eq!(parsed["summary"]["total_files"], 10);
        assert_eq!(parsed["summary"]["exact"]["groups"], 0);
        assert_eq!(
            parsed["summary"]["skipped_passes"][0],
            "video: no frame sampler available"
        );
    }

    #[test]
    fn test_json_with_report() {
        let report = RemovalReport {
            files_acted_on: 2,
            bytes_recovered: 3000,
            candidates: 3,
            failures: vec![ActionFailure {
                path: PathBuf::from("/photos/mid.png"),
                message: "permission denied".to_string(),
            }],
            unlogged: 0,
            dry_run: false,
        };
        let output = JsonOutput::new(&[], &ScanSummary::default(), ExitCode::PartialSuccess)
            .with_report(&report, &ResolutionMode::Delete);

        let parsed: serde_json::Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();
        assert_eq!(parsed["report"]["mode"], "delete");
        assert_eq!(parsed["report"]["files_acted_on"], 2);
        assert_eq!(parsed["report"]["failures"][0]["path"], "/photos/mid.png");
        assert_eq!(parsed["summary"]["exit_code"], 3);
    }

    #[test]
    fn test_write_to() {
        let output = JsonOutput::new(&[], &ScanSummary::default(), ExitCode::Success);
        let mut buffer = Vec::new();

        output.write_to(&mut buffer, false).unwrap();

        let written = String::from_utf8(buffer).unwrap();
        assert!(written.starts_with('{'));
        assert!(written.ends_with("}\n"));
    }
}
