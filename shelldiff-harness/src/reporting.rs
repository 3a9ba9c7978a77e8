//! Reporting utilities for case results.

use crate::case::Case;
use crate::comparison::{CaseComparison, ExitCodeComparison, StringComparison, Verdict};
use crate::config::OutputFormat;
use crate::error::Error;
use crate::execution::ExecutionResult;
use crate::util::{unified_stdout_diff, write_diff};
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;

/// Maximum number of characters of command text shown on a status line.
const STATUS_LINE_MAX_CHARS: usize = 120;

/// Result of running a single case under both shells.
#[derive(Clone, Debug)]
pub struct CaseResult {
    /// One-based position of the case within the run.
    pub ordinal: usize,
    /// The case that was run.
    pub case: Case,
    /// Result from the reference shell.
    pub reference: ExecutionResult,
    /// Result from the shell under test.
    pub under_test: ExecutionResult,
    /// The comparison of the two results.
    pub comparison: CaseComparison,
}

impl CaseResult {
    /// Compares two results of the same case.
    pub fn new(
        ordinal: usize,
        case: Case,
        reference: ExecutionResult,
        under_test: ExecutionResult,
    ) -> Self {
        let comparison = CaseComparison::new(&reference, &under_test);
        Self {
            ordinal,
            case,
            reference,
            under_test,
            comparison,
        }
    }

    /// Returns the verdict for this case.
    pub const fn verdict(&self) -> Verdict {
        self.comparison.verdict()
    }

    /// Returns a divergence report if the case diverged.
    pub fn divergence(&self) -> Option<DivergenceReport> {
        match self.verdict() {
            Verdict::Matched => None,
            Verdict::Diverged => Some(DivergenceReport::new(self)),
        }
    }

    /// Writes the one-line `[OK] -- <command>` status for this case.
    pub fn write_status_line<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        let status = match self.verdict() {
            Verdict::Matched => "OK".green(),
            Verdict::Diverged => "KO".red(),
        };

        writeln!(
            writer,
            "[{status}] -- {}",
            self.case.display_text(STATUS_LINE_MAX_CHARS)
        )
    }

    /// Writes the details of this result. Matching cases are only detailed when `verbose`.
    pub fn write_details<W: Write>(&self, mut writer: W, verbose: bool) -> std::io::Result<()> {
        if !verbose && self.verdict() == Verdict::Matched {
            return Ok(());
        }

        writeln!(
            writer,
            "    {} {}",
            "Case".bright_yellow(),
            self.case.to_string().italic()
        )?;

        match self.comparison.exit_code {
            ExitCodeComparison::Same(code) => {
                writeln!(
                    writer,
                    "      exit code matches ({}) {}",
                    code.to_string().green(),
                    "✔️".green()
                )?;
            }
            ExitCodeComparison::Differs {
                reference,
                under_test,
            } => {
                writeln!(
                    writer,
                    "      exit code mismatch: {} from reference vs. {} from under-test",
                    reference.to_string().cyan(),
                    under_test.to_string().bright_red()
                )?;
            }
        }

        if self.comparison.reference_timed_out {
            writeln!(writer, "      reference {}", "timed out".bright_red())?;
        }
        if self.comparison.under_test_timed_out {
            writeln!(writer, "      under-test {}", "timed out".bright_red())?;
        }

        match &self.comparison.stdout {
            StringComparison::Same(s) => {
                writeln!(writer, "      stdout matches {}", "✔️".green())?;

                if verbose && !s.is_empty() {
                    writeln!(
                        writer,
                        "          {}",
                        "------ reference <> under-test: stdout ------------------------".cyan()
                    )?;
                    writeln!(writer, "{}", indent::indent_all_by(10, s))?;
                }
            }
            StringComparison::Differs {
                reference,
                under_test,
            }
            | StringComparison::Ignored {
                reference,
                under_test,
            } => {
                writeln!(writer, "      stdout {}", "DIFFERS:".bright_red())?;
                writeln!(
                    writer,
                    "          {}",
                    "------ reference <> under-test: stdout ------------------------".cyan()
                )?;

                write_diff(&mut writer, 10, reference, under_test)?;

                writeln!(
                    writer,
                    "          {}",
                    "---------------------------------------------------------------".cyan()
                )?;
            }
        }

        let (reference_stderr, under_test_stderr) = self.comparison.stderr_pair();
        if reference_stderr.is_empty() && under_test_stderr.is_empty() {
            writeln!(writer, "      stderr empty")?;
        } else {
            writeln!(writer, "      stderr {}", "ignored".cyan())?;
            for (label, text) in [
                ("reference", reference_stderr),
                ("under-test", under_test_stderr),
            ] {
                writeln!(
                    writer,
                    "          {}",
                    std::format!("------ {label}: stderr ------------------------------").cyan()
                )?;
                writeln!(writer, "{}", indent::indent_all_by(10, text))?;
            }
        }

        Ok(())
    }
}

/// Structured description of one diverging case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DivergenceReport {
    /// One-based position of the case within the run.
    pub ordinal: usize,
    /// Case identifier.
    pub id: u64,
    /// Case kind.
    pub kind: String,
    /// Literal command text.
    pub command: String,
    /// Exit code from the reference shell.
    pub reference_exit: i32,
    /// Exit code from the shell under test.
    pub under_test_exit: i32,
    /// Whether the reference run timed out.
    pub reference_timed_out: bool,
    /// Whether the under-test run timed out.
    pub under_test_timed_out: bool,
    /// Stdout from the reference shell.
    pub reference_stdout: String,
    /// Stdout from the shell under test.
    pub under_test_stdout: String,
    /// Unified diff of the stdout captures, reference first. Empty if stdout matched.
    pub stdout_diff: String,
    /// Stderr from the reference shell.
    pub reference_stderr: String,
    /// Stderr from the shell under test.
    pub under_test_stderr: String,
}

impl DivergenceReport {
    fn new(result: &CaseResult) -> Self {
        Self {
            ordinal: result.ordinal,
            id: result.case.id,
            kind: result.case.kind.clone(),
            command: result.case.text.clone(),
            reference_exit: result.reference.exit_code,
            under_test_exit: result.under_test.exit_code,
            reference_timed_out: result.reference.timed_out,
            under_test_timed_out: result.under_test.timed_out,
            reference_stdout: result.reference.stdout.clone(),
            under_test_stdout: result.under_test.stdout.clone(),
            stdout_diff: unified_stdout_diff(&result.reference.stdout, &result.under_test.stdout),
            reference_stderr: result.reference.stderr.clone(),
            under_test_stderr: result.under_test.stderr.clone(),
        }
    }
}

/// Aggregate outcome of a run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Results of all cases that ran, in run order.
    pub results: Vec<CaseResult>,
    /// Reports for the diverging cases, in run order.
    pub divergences: Vec<DivergenceReport>,
    /// Location of the persisted divergence log, if one was written.
    pub log_path: Option<PathBuf>,
    /// Whether the run was stopped before every case had run.
    pub interrupted: bool,
    /// Wall-clock duration of the run.
    pub duration: std::time::Duration,
}

impl RunSummary {
    /// Number of cases that ran.
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Number of cases that diverged.
    pub fn divergence_count(&self) -> usize {
        self.divergences.len()
    }

    /// Number of cases in which at least one shell timed out.
    pub fn timeout_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.comparison.any_timed_out())
            .count()
    }

    /// Returns whether every case that ran matched.
    pub fn is_success(&self) -> bool {
        self.divergences.is_empty()
    }

    /// Writes the run summary.
    pub fn write_summary<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        let divergence_count = self.divergence_count();
        let formatted_divergences = if divergence_count > 0 {
            divergence_count.to_string().red()
        } else {
            divergence_count.to_string().green()
        };

        let timeout_count = self.timeout_count();
        let formatted_timeouts = if timeout_count > 0 {
            timeout_count.to_string().magenta()
        } else {
            timeout_count.to_string().green()
        };

        writeln!(
            writer,
            "================================================================================"
        )?;
        writeln!(
            writer,
            "{} case(s) ran{}: {} matched, {} diverged, {} timed out.",
            self.total(),
            if self.interrupted { " (partial)" } else { "" },
            (self.total() - divergence_count).to_string().green(),
            formatted_divergences,
            formatted_timeouts,
        )?;

        if self.interrupted {
            writeln!(writer, "{}", "run interrupted; remaining cases skipped".yellow())?;
        }

        if let Some(log_path) = &self.log_path {
            writeln!(writer, "see {} for details on divergences", log_path.display())?;
        }

        writeln!(writer, "duration: {:?}", self.duration)?;
        writeln!(
            writer,
            "================================================================================"
        )?;

        Ok(())
    }
}

/// Streams case results and the final summary in the configured format.
pub(crate) struct Reporter {
    format: OutputFormat,
    verbose: bool,
    progress: Box<dyn Write + Send + Sync>,
    report: Box<dyn Write + Send + Sync>,
}

impl Reporter {
    /// Creates a reporter writing progress to stderr and reports to stdout.
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self::with_writers(
            format,
            verbose,
            Box::new(std::io::stderr()),
            Box::new(std::io::stdout()),
        )
    }

    pub fn with_writers(
        format: OutputFormat,
        verbose: bool,
        progress: Box<dyn Write + Send + Sync>,
        report: Box<dyn Write + Send + Sync>,
    ) -> Self {
        Self {
            format,
            verbose,
            progress,
            report,
        }
    }

    /// Reports a single case as soon as it completes.
    pub fn case_completed(&mut self, result: &CaseResult) -> std::io::Result<()> {
        if !matches!(self.format, OutputFormat::Pretty) {
            return Ok(());
        }

        result.write_status_line(&mut self.progress)?;
        result.write_details(&mut self.progress, self.verbose)?;
        self.progress.flush()
    }

    /// Reports the end of the run.
    pub fn run_completed(&mut self, summary: &RunSummary) -> Result<(), Error> {
        if matches!(self.format, OutputFormat::Junit) {
            self.write_junit(summary)?;
        }

        summary.write_summary(&mut self.progress)?;
        self.progress.flush()?;

        Ok(())
    }

    fn write_junit(&mut self, summary: &RunSummary) -> Result<(), Error> {
        let mut report = junit_report::Report::new();
        let mut suite = junit_report::TestSuite::new("shelldiff");

        for r in &summary.results {
            let name = std::format!("{} {}", r.case, r.case.display_text(STATUS_LINE_MAX_CHARS));
            let duration = r.comparison.duration.reference + r.comparison.duration.under_test;
            let duration = duration.try_into().unwrap_or_default();

            let mut test_case = match r.verdict() {
                Verdict::Matched => junit_report::TestCase::success(&name, duration),
                Verdict::Diverged => {
                    junit_report::TestCase::failure(&name, duration, "divergence", "shells diverged")
                }
            };

            let mut output_buf: Vec<u8> = vec![];
            r.write_details(&mut output_buf, true)?;

            let output = String::from_utf8_lossy(&output_buf);
            test_case.set_system_out(strip_ansi_escapes::strip_str(output).as_str());

            suite.add_testcase(test_case);
        }

        report.add_testsuite(suite);

        report
            .write_xml(&mut self.report)
            .map_err(|e| Error::Report(e.to_string()))?;
        writeln!(self.report)?;
        self.report.flush()?;

        Ok(())
    }
}
