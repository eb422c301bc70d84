//! Recovery script generation from the operation log.
//!
//! A recovery script undoes what can be undone after a run:
//!
//! * **Moves** are reversed, newest first, so files that were renamed on a
//!   name clash return to their own original locations.
//! * **Trashed** files are listed as comments; they can be restored from
//!   the system trash.
//! * **Deleted** files are listed as comments; they cannot be recovered.
//!
//! Scripts default to dry-run mode and require a `--confirm` argument, for
//! POSIX shells and PowerShell alike.
//!
//! # Usage
//!
//! ```rust,ignore
//! use photodupe::output::oplog::CsvOperationLog;
//! use photodupe::output::script::{RecoveryScript, ScriptType};
//!
//! let operations = CsvOperationLog::read("operations.csv")?;
//! let script = RecoveryScript::new(&operations, ScriptType::detect());
//! script.write_to(&mut std::io::stdout())?;
//! ```

use std::io::Write;
use std::path::Path;

use bytesize::ByteSize;

use super::oplog::{Operation, OperationKind};

/// Type of script to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    /// POSIX-compliant shell script (sh/bash/zsh)
    Posix,
    /// Windows PowerShell script
    PowerShell,
}

impl ScriptType {
    /// Detect the appropriate script type for the current platform.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(windows) {
            Self::PowerShell
        } else {
            Self::Posix
        }
    }
}

/// Formatter for recovery scripts.
pub struct RecoveryScript<'a> {
    /// Operations in the order they were performed
    pub operations: &'a [Operation],
    /// The type of script to generate
    pub script_type: ScriptType,
}

impl<'a> RecoveryScript<'a> {
    /// Create a new recovery script formatter.
    #[must_use]
    pub fn new(operations: &'a [Operation], script_type: ScriptType) -> Self {
        Self {
            operations,
            script_type,
        }
    }

    /// Number of moves the script can reverse.
    #[must_use]
    pub fn reversible_count(&self) -> usize {
        self.moves().count()
    }

    fn moves(&self) -> impl Iterator<Item = (&'a Operation, &'a Path)> {
        let operations: &'a [Operation] = self.operations;
        operations
            .iter()
            .rev()
            .filter(|op| op.operation == OperationKind::Move)
            .filter_map(|op| op.target.as_deref().map(|t| (op, t)))
    }

    fn removed(&self, kind: OperationKind) -> impl Iterator<Item = &'a Operation> {
        let operations: &'a [Operation] = self.operations;
        operations.iter().filter(move |op| op.operation == kind)
    }

    /// Write the generated script to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        match self.script_type {
            ScriptType::Posix => self.write_posix(writer),
            ScriptType::PowerShell => self.write_powershell(writer),
        }
    }

    fn write_header<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let restorable: u64 = self.moves().map(|(op, _)| op.size).sum();
        writeln!(writer, "# photodupe recovery script")?;
        writeln!(
            writer,
            "# Generated on: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(writer, "#")?;
        writeln!(
            writer,
            "# Moves to reverse: {} ({})",
            self.reversible_count(),
            ByteSize(restorable)
        )?;
        writeln!(
            writer,
            "# Trashed files: {}",
            self.removed(OperationKind::Trash).count()
        )?;
        writeln!(
            writer,
            "# Deleted files (not recoverable): {}",
            self.removed(OperationKind::Delete).count()
        )?;
        writeln!(writer)
    }

    fn write_posix<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "#!/bin/sh")?;
        self.write_header(writer)?;

        writeln!(writer, "# Default to dry-run mode for safety")?;
        writeln!(writer, "DRY_RUN=1")?;
        writeln!(writer, "if [ \"$1\" = \"--confirm\" ]; then")?;
        writeln!(writer, "    DRY_RUN=0")?;
        writeln!(writer, "fi")?;
        writeln!(writer)?;
        writeln!(writer, "RESTORED_COUNT=0")?;
        writeln!(writer)?;

        for (op, target) in self.moves() {
            let source = escape_posix(&op.source);
            let target = escape_posix(target);
            writeln!(
                writer,
                "# RESTORE: {} (kept: {})",
                comment_safe(&source),
                comment_safe(&escape_posix(&op.original))
            )?;
            writeln!(writer, "if [ \"$DRY_RUN\" -eq 0 ]; then")?;
            if let Some(parent) = op.source.parent() {
                writeln!(writer, "    mkdir -p {}", escape_posix(parent))?;
            }
            writeln!(writer, "    mv -n {target} {source} && \\")?;
            writeln!(writer, "    RESTORED_COUNT=$((RESTORED_COUNT + 1))")?;
            writeln!(writer, "else")?;
            writeln!(writer, "    printf 'would restore: %s\\n' {source}")?;
            writeln!(writer, "fi")?;
            writeln!(writer)?;
        }

        for op in self.removed(OperationKind::Trash) {
            writeln!(
                writer,
                "# TRASHED (restore from system trash): {}",
                comment_safe(&escape_posix(&op.source))
            )?;
        }
        for op in self.removed(OperationKind::Delete) {
            writeln!(
                writer,
                "# DELETED (not recoverable): {}",
                comment_safe(&escape_posix(&op.source))
            )?;
        }
        writeln!(writer)?;

        writeln!(writer, "if [ \"$DRY_RUN\" -eq 0 ]; then")?;
        writeln!(writer, "    echo \"Recovery complete. Restored $RESTORED_COUNT files.\"")?;
        writeln!(writer, "else")?;
        writeln!(writer, "    echo \"Dry run complete. Run with --confirm to restore files.\"")?;
        writeln!(writer, "fi")?;

        Ok(())
    }

    fn write_powershell<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.write_header(writer)?;

        writeln!(writer, "# Default to dry-run mode for safety")?;
        writeln!(writer, "$DryRun = $true")?;
        writeln!(writer, "if ($args[0] -eq \"--confirm\") {{")?;
        writeln!(writer, "    $DryRun = $false")?;
        writeln!(writer, "}}")?;
        writeln!(writer)?;
        writeln!(writer, "$RestoredCount = 0")?;
        writeln!(writer)?;

        for (op, target) in self.moves() {
            let source = escape_powershell(&op.source);
            let target = escape_powershell(target);
            writeln!(
                writer,
                "# RESTORE: {} (kept: {})",
                comment_safe(&source),
                comment_safe(&escape_powershell(&op.original))
            )?;
            writeln!(writer, "if (-not $DryRun) {{")?;
            if let Some(parent) = op.source.parent() {
                writeln!(
                    writer,
                    "    New-Item -ItemType Directory -Force -Path {} | Out-Null",
                    escape_powershell(parent)
                )?;
            }
            writeln!(writer, "    if (-not (Test-Path -LiteralPath {source})) {{")?;
            writeln!(writer, "        Move-Item -LiteralPath {target} -Destination {source}")?;
            writeln!(writer, "        if ($?) {{ $RestoredCount++ }}")?;
            writeln!(writer, "    }}")?;
            writeln!(writer, "}} else {{")?;
            writeln!(writer, "    Write-Host ('would restore: ' + {source})")?;
            writeln!(writer, "}}")?;
            writeln!(writer)?;
        }

        for op in self.removed(OperationKind::Trash) {
            writeln!(
                writer,
                "# TRASHED (restore from system trash): {}",
                comment_safe(&escape_powershell(&op.source))
            )?;
        }
        for op in self.removed(OperationKind::Delete) {
            writeln!(
                writer,
                "# DELETED (not recoverable): {}",
                comment_safe(&escape_powershell(&op.source))
            )?;
        }
        writeln!(writer)?;

        writeln!(writer, "if (-not $DryRun) {{")?;
        writeln!(writer, "    Write-Host \"Recovery complete. Restored $RestoredCount files.\"")?;
        writeln!(writer, "}} else {{")?;
        writeln!(
            writer,
            "    Write-Host \"Dry run complete. Run with --confirm to restore files.\""
        )?;
        writeln!(writer, "}}")?;

        Ok(())
    }

    /// Generate the script as a string.
    ///
    /// # Errors
    ///
    /// Returns an error if formatting fails.
    pub fn to_script_string(&self) -> std::io::Result<String> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn escape_posix(path: &Path) -> String {
    let s = path.to_string_lossy();
    // Wrap in single quotes, escape single quotes as '\''
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn escape_powershell(path: &Path) -> String {
    let s = path.to_string_lossy();
    // PowerShell also closes single-quoted strings on the typographic quotes
    let mut escaped = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        if matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
            escaped.push(c);
        }
        escaped.push(c);
    }
    format!("'{escaped}'")
}

/// Keep a quoted path on one comment line.
fn comment_safe(quoted: &str) -> String {
    quoted.replace('\n', "\\n").replace('\r', "\\r")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn operations() -> Vec<Operation> {
        vec![
            Operation::new(
                OperationKind::Move,
                "/photos/a/x.jpg",
                Some(PathBuf::from("/dupes/x.jpg")),
                100,
                "/photos/x.jpg",
            ),
            Operation::new(
                OperationKind::Move,
                "/photos/b/x.jpg",
                Some(PathBuf::from("/dupes/x_1.jpg")),
                50,
                "/photos/x.jpg",
            ),
            Operation::new(OperationKind::Delete, "/photos/gone.jpg", None, 10, "/photos/kept.jpg"),
            Operation::new(OperationKind::Trash, "/photos/bin.jpg", None, 10, "/photos/kept.jpg"),
        ]
    }

    #[test]
    fn test_escape_posix() {
        assert_eq!(escape_posix(Path::new("/foo/bar.txt")), "'/foo/bar.txt'");
        assert_eq!(
            escape_posix(Path::new("/foo's/bar.txt")),
            "'/foo'\\''s/bar.txt'"
        );
        assert_eq!(
            escape_posix(Path::new("/foo$bar/`baz`.txt")),
            "'/foo$bar/`baz`.txt'"
        );
    }

    #[test]
    fn test_escape_powershell() {
        assert_eq!(
            escape_powershell(Path::new("C:\\foo's\\bar.txt")),
            "'C:\\foo''s\\bar.txt'"
        );
    }

    #[test]
    fn test_posix_reverses_moves_newest_first() {
        let ops = operations();
        let script = RecoveryScript::new(&ops, ScriptType::Posix)
            .to_script_string()
            .unwrap();

        assert!(script.starts_with("#!/bin/sh"));
        assert!(script.contains("DRY_RUN=1"));
        let second = script
            .find("mv -n '/dupes/x_1.jpg' '/photos/b/x.jpg'")
            .unwrap();
        let first = script.find("mv -n '/dupes/x.jpg' '/photos/a/x.jpg'").unwrap();
        assert!(second < first);
        assert!(script.contains("mkdir -p '/photos/a'"));
        assert!(script.contains("# DELETED (not recoverable): '/photos/gone.jpg'"));
        assert!(script.contains("# TRASHED (restore from system trash): '/photos/bin.jpg'"));
        assert!(!script.contains("mv -n '/photos/gone.jpg'"));
    }

    #[test]
    fn test_powershell_script() {
        let ops = operations();
        let script = RecoveryScript::new(&ops, ScriptType::PowerShell)
            .to_script_string()
            .unwrap();

        assert!(script.contains("$DryRun = $true"));
        assert!(script.contains("Move-Item -LiteralPath '/dupes/x.jpg' -Destination '/photos/a/x.jpg'"));
        assert!(script.contains("# DELETED (not recoverable): '/photos/gone.jpg'"));
    }

    #[test]
    fn test_escape_powershell_typographic_quotes() {
        assert_eq!(
            escape_powershell(Path::new("C:\\it\u{2019}s.jpg")),
            "'C:\\it\u{2019}\u{2019}s.jpg'"
        );
    }

    #[test]
    fn test_dry_run_line_keeps_path_literal() {
        let ops = vec![Operation::new(
            OperationKind::Move,
            "/photos/$(touch x).jpg",
            Some(PathBuf::from("/dupes/`id`.jpg")),
            1,
            "/photos/kept.jpg",
        )];

        let posix = RecoveryScript::new(&ops, ScriptType::Posix)
            .to_script_string()
            .unwrap();
        assert!(posix.contains("printf 'would restore: %s\\n' '/photos/$(touch x).jpg'"));
        assert!(!posix.lines().any(|l| l.contains('"') && l.contains("$(touch")));

        let powershell = RecoveryScript::new(&ops, ScriptType::PowerShell)
            .to_script_string()
            .unwrap();
        assert!(powershell.contains("Write-Host ('would restore: ' + '/photos/$(touch x).jpg')"));
        assert!(!powershell.lines().any(|l| l.contains('"') && l.contains("$(touch")));
    }

    #[test]
    fn test_newline_in_path_stays_in_comment() {
        let ops = vec![
            Operation::new(
                OperationKind::Move,
                "/photos/a\nrm -rf x.jpg",
                Some(PathBuf::from("/dupes/a.jpg")),
                1,
                "/photos/kept.jpg",
            ),
            Operation::new(
                OperationKind::Delete,
                "/photos/b\r\nrm -rf y.jpg",
                None,
                1,
                "/photos/kept.jpg",
            ),
        ];

        for script_type in [ScriptType::Posix, ScriptType::PowerShell] {
            let script = RecoveryScript::new(&ops, script_type)
                .to_script_string()
                .unwrap();
            assert!(script.contains("# RESTORE: '/photos/a\\nrm -rf x.jpg'"));
            assert!(script.contains("# DELETED (not recoverable): '/photos/b\\r\\nrm -rf y.jpg'"));
            assert!(!script.lines().any(|l| l.starts_with("rm -rf y.jpg")));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_posix_dry_run_executes_no_path_text() {
        let dir = tempfile::TempDir::new().unwrap();
        let substituted = dir.path().join("substituted");
        let backticked = dir.path().join("backticked");
        let injected = dir.path().join("injected");
        let ops = vec![
            Operation::new(
                OperationKind::Move,
                format!("/photos/$(touch {}).jpg", substituted.display()),
                Some(PathBuf::from("/dupes/a.jpg")),
                1,
                "/photos/kept.jpg",
            ),
            Operation::new(
                OperationKind::Move,
                format!("/photos/`touch {}`.jpg", backticked.display()),
                Some(PathBuf::from("/dupes/b.jpg")),
                1,
                "/photos/kept.jpg",
            ),
            Operation::new(
                OperationKind::Delete,
                format!("/photos/c\ntouch {}\n.jpg", injected.display()),
                None,
                1,
                "/photos/kept.jpg",
            ),
        ];
        let script_path = dir.path().join("restore.sh");
        std::fs::write(
            &script_path,
            RecoveryScript::new(&ops, ScriptType::Posix)
                .to_script_string()
                .unwrap(),
        )
        .unwrap();

        let output = std::process::Command::new("sh")
            .arg(&script_path)
            .output()
            .unwrap();
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("would restore: /photos/$(touch"));
        assert!(!substituted.exists());
        assert!(!backticked.exists());
        assert!(!injected.exists());
    }

    #[test]
    fn test_reversible_count() {
        let ops = operations();
        assert_eq!(RecoveryScript::new(&ops, ScriptType::Posix).reversible_count(), 2);
        assert_eq!(RecoveryScript::new(&[], ScriptType::Posix).reversible_count(), 0);
    }

    #[test]
    fn test_script_type_detect() {
        let detected = ScriptType::detect();
        if cfg!(windows) {
            assert_eq!(detected, ScriptType::PowerShell);
        } else {
            assert_eq!(detected, ScriptType::Posix);
        }
    }
}
