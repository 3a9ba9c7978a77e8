//! Persisted log of divergences.

use crate::error::Error;
use crate::reporting::DivergenceReport;
use crate::truncate::{Limits, canonicalize_env_text, truncate_text};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub(crate) const SEPARATOR: &str =
    "================================================================================";
pub(crate) const REFERENCE_HEADER: &str = "--- reference ---";
pub(crate) const UNDER_TEST_HEADER: &str = "--- under-test ---";
pub(crate) const DIFF_HEADER: &str = "--- DIFF (stdout) ---";
pub(crate) const NO_STDOUT_DIFF: &str = "(no stdout diff)";

/// A log file receiving one block per diverging case, in run order.
///
/// Captured output is written as captured, cut down to the configured [`Limits`]. Environment
/// dumps are canonicalized only when [`DivergenceLog::with_env_canonicalization`] asks for it.
pub struct DivergenceLog {
    path: PathBuf,
    writer: BufWriter<File>,
    limits: Limits,
    canonicalize_env: bool,
}

impl DivergenceLog {
    /// Creates (or truncates) the log at `path`. The containing directory must exist.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        ensure_parent_exists(&path)?;

        let file = File::create(&path)?;
        tracing::debug!(target: "runner", "writing divergence log to {}", path.display());

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            limits: Limits::default(),
            canonicalize_env: false,
        })
    }

    /// Overrides the truncation limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Sorts and masks output that looks like an environment dump before writing it.
    #[must_use]
    pub const fn with_env_canonicalization(mut self, enabled: bool) -> Self {
        self.canonicalize_env = enabled;
        self
    }

    fn shrink(&self, text: &str) -> String {
        if self.canonicalize_env {
            canonicalize_env_text(text, self.limits)
        } else {
            truncate_text(text, self.limits)
        }
    }

    /// Appends one divergence block.
    pub fn record(&mut self, report: &DivergenceReport) -> Result<(), Error> {
        let mut block = Vec::new();
        let w = &mut block;

        writeln!(w)?;
        writeln!(w, "{SEPARATOR}")?;
        writeln!(w, "Test #{}", report.ordinal)?;
        writeln!(w, "ID: {}", report.id)?;
        writeln!(w, "KIND: {}", report.kind)?;
        writeln!(w, "COMMAND:")?;
        writeln!(w, "{}", report.command)?;

        for (header, exit, timed_out, stdout, stderr) in [
            (
                REFERENCE_HEADER,
                report.reference_exit,
                report.reference_timed_out,
                &report.reference_stdout,
                &report.reference_stderr,
            ),
            (
                UNDER_TEST_HEADER,
                report.under_test_exit,
                report.under_test_timed_out,
                &report.under_test_stdout,
                &report.under_test_stderr,
            ),
        ] {
            writeln!(w)?;
            writeln!(w, "{header}")?;
            if timed_out {
                writeln!(w, "EXIT CODE: {exit} (timed out)")?;
            } else {
                writeln!(w, "EXIT CODE: {exit}")?;
            }
            writeln!(w, "STDOUT:")?;
            write!(w, "{}", self.shrink(stdout))?;
            writeln!(w)?;
            writeln!(w, "STDERR:")?;
            write!(w, "{}", self.shrink(stderr))?;
            writeln!(w)?;
        }

        writeln!(w, "{DIFF_HEADER}")?;
        if report.stdout_diff.is_empty() {
            writeln!(w, "{NO_STDOUT_DIFF}")?;
        } else {
            write!(w, "{}", truncate_text(&report.stdout_diff, self.limits))?;
        }
        writeln!(w, "{SEPARATOR}")?;

        self.writer.write_all(&block)?;

        Ok(())
    }

    /// Flushes the log and returns its path.
    pub fn finish(mut self) -> Result<PathBuf, Error> {
        self.writer.flush()?;
        Ok(self.path)
    }
}

/// Fails with [`Error::OutputDirMissing`] unless the directory that would contain `path`
/// exists.
pub(crate) fn ensure_parent_exists(path: &Path) -> Result<(), Error> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(()),
    };

    if parent.is_dir() {
        Ok(())
    } else {
        Err(Error::OutputDirMissing(parent.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::Case;
    use crate::execution::ExecutionResult;
    use crate::reporting::CaseResult;
    use assert_fs::prelude::*;
    use std::time::Duration;

    fn report(ordinal: usize, text: &str, reference: &str, under_test: &str) -> DivergenceReport {
        CaseResult::new(
            ordinal,
            Case::new(u64::try_from(ordinal).unwrap() + 100, "echo", text),
            ExecutionResult::new(0, reference, ""),
            ExecutionResult::new(0, under_test, "minishell: warning\n"),
        )
        .divergence()
        .unwrap()
    }

    #[test]
    fn writes_blocks_in_order() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.child("logs/divergences.log");
        std::fs::create_dir(dir.child("logs").path()).unwrap();

        let mut log = DivergenceLog::create(path.path()).unwrap();
        log.record(&report(1, "echo one", "one\n", "uno\n")).unwrap();
        log.record(&report(4, "echo four", "four\n", "")).unwrap();
        let written = log.finish().unwrap();
        assert_eq!(written, path.path());

        let text = std::fs::read_to_string(path.path()).unwrap();
        let first = text.find("Test #1").unwrap();
        let second = text.find("Test #4").unwrap();
        assert!(first < second);

        assert!(text.contains("ID: 101\nKIND: echo\nCOMMAND:\necho one\n"));
        assert!(text.contains("--- reference ---\nEXIT CODE: 0\nSTDOUT:\none\n"));
        assert!(text.contains("--- under-test ---"));
        assert!(text.contains("minishell: warning"));
        assert!(text.contains("--- reference stdout\n+++ under-test stdout\n"));
        assert!(text.contains("-one\n+uno\n"));
    }

    #[test]
    fn timeouts_are_marked() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.child("d.log");

        let report = CaseResult::new(
            1,
            Case::new(1, "loop", "sleep 100"),
            ExecutionResult::new(0, "", ""),
            ExecutionResult::from_timeout("", "", Duration::from_secs(5)),
        )
        .divergence()
        .unwrap();

        let mut log = DivergenceLog::create(path.path()).unwrap();
        log.record(&report).unwrap();
        log.finish().unwrap();

        let text = std::fs::read_to_string(path.path()).unwrap();
        assert!(text.contains("EXIT CODE: 124 (timed out)"));
        assert!(text.contains("(no stdout diff)"));
    }

    #[test]
    fn long_output_is_truncated() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.child("d.log");

        let long: String = (0..50).map(|i| std::format!("line {i}\n")).collect();
        let mut log = DivergenceLog::create(path.path()).unwrap().with_limits(Limits {
            max_chars: 10_000,
            max_lines: 10,
        });
        log.record(&report(1, "seq 50", &long, "")).unwrap();
        log.finish().unwrap();

        let text = std::fs::read_to_string(path.path()).unwrap();
        assert!(text.contains("exceeded lines limit"));
        assert!(!text.contains("line 40\n"));
    }

    #[test]
    fn assignment_heavy_output_is_written_as_captured() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.child("d.log");

        let mut log = DivergenceLog::create(path.path()).unwrap();
        log.record(&report(1, "printf ...", "b=2\na=1\nplain\nXDG_X=1\n", ""))
            .unwrap();
        log.finish().unwrap();

        let text = std::fs::read_to_string(path.path()).unwrap();
        assert!(text.contains("STDOUT:\nb=2\na=1\nplain\nXDG_X=1\n\nSTDERR:"));
        assert!(text.contains("-b=2\n-a=1\n-plain\n-XDG_X=1\n"));
    }

    #[test]
    fn env_canonicalization_is_opt_in() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.child("d.log");

        let mut log = DivergenceLog::create(path.path())
            .unwrap()
            .with_env_canonicalization(true);
        log.record(&report(1, "env", "b=2\na=1\nplain\nXDG_X=1\n", ""))
            .unwrap();
        log.finish().unwrap();

        let text = std::fs::read_to_string(path.path()).unwrap();
        assert!(text.contains("STDOUT:\na=1\nb=2\n\nSTDERR:"));
    }

    #[test]
    fn missing_output_directory_is_setup_error() {
        let err = DivergenceLog::create("/nonexistent/shelldiff/out.log")
            .err()
            .unwrap();
        assert!(matches!(err, Error::OutputDirMissing(_)));
        assert!(err.is_setup_error());
    }
}
