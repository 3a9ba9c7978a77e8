//! Comparison types for case results.

use crate::execution::ExecutionResult;

/// Comparison of durations between reference and under-test runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct DurationComparison {
    /// Duration of the reference run.
    pub reference: std::time::Duration,
    /// Duration of the under-test run.
    pub under_test: std::time::Duration,
}

/// Comparison of exit codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCodeComparison {
    /// Exit codes match.
    Same(i32),
    /// Exit codes differ.
    Differs {
        /// Exit code from the reference shell.
        reference: i32,
        /// Exit code from the shell under test.
        under_test: i32,
    },
}

impl ExitCodeComparison {
    fn new(reference: i32, under_test: i32) -> Self {
        if reference == under_test {
            Self::Same(reference)
        } else {
            Self::Differs {
                reference,
                under_test,
            }
        }
    }

    /// Returns whether this comparison indicates a failure.
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Differs { .. })
    }
}

/// Comparison of captured output (stdout/stderr).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StringComparison {
    /// Output was captured but takes no part in the verdict.
    Ignored {
        /// Output from the reference shell.
        reference: String,
        /// Output from the shell under test.
        under_test: String,
    },
    /// Outputs match.
    Same(String),
    /// Outputs differ.
    Differs {
        /// Output from the reference shell.
        reference: String,
        /// Output from the shell under test.
        under_test: String,
    },
}

impl StringComparison {
    fn new(reference: &str, under_test: &str) -> Self {
        if reference == under_test {
            Self::Same(reference.to_owned())
        } else {
            Self::Differs {
                reference: reference.to_owned(),
                under_test: under_test.to_owned(),
            }
        }
    }

    /// Returns whether this comparison indicates a failure.
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Differs { .. })
    }
}

/// Final classification of a case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Both shells agreed on exit code and stdout.
    Matched,
    /// The shells disagreed.
    Diverged,
}

/// Full comparison between the reference and under-test runs of one case.
#[derive(Clone, Debug)]
pub struct CaseComparison {
    /// Comparison of exit codes.
    pub exit_code: ExitCodeComparison,
    /// Comparison of stdout.
    pub stdout: StringComparison,
    /// Both stderr captures; never part of the verdict.
    pub stderr: StringComparison,
    /// Whether the reference run timed out.
    pub reference_timed_out: bool,
    /// Whether the under-test run timed out.
    pub under_test_timed_out: bool,
    /// Comparison of durations.
    pub duration: DurationComparison,
}

impl CaseComparison {
    /// Compares two results of the same case.
    pub fn new(reference: &ExecutionResult, under_test: &ExecutionResult) -> Self {
        Self {
            exit_code: ExitCodeComparison::new(reference.exit_code, under_test.exit_code),
            stdout: StringComparison::new(&reference.stdout, &under_test.stdout),
            stderr: StringComparison::Ignored {
                reference: reference.stderr.clone(),
                under_test: under_test.stderr.clone(),
            },
            reference_timed_out: reference.timed_out,
            under_test_timed_out: under_test.timed_out,
            duration: DurationComparison {
                reference: reference.duration,
                under_test: under_test.duration,
            },
        }
    }

    /// Returns whether this comparison indicates a failure.
    pub const fn is_failure(&self) -> bool {
        self.exit_code.is_failure() || self.stdout.is_failure()
    }

    /// Returns the verdict for the case.
    pub const fn verdict(&self) -> Verdict {
        if self.is_failure() {
            Verdict::Diverged
        } else {
            Verdict::Matched
        }
    }

    /// Returns whether either side ran out of time.
    pub const fn any_timed_out(&self) -> bool {
        self.reference_timed_out || self.under_test_timed_out
    }

    /// Returns the reference and under-test stderr captures.
    pub fn stderr_pair(&self) -> (&str, &str) {
        match &self.stderr {
            StringComparison::Ignored {
                reference,
                under_test,
            }
            | StringComparison::Differs {
                reference,
                under_test,
            } => (reference, under_test),
            StringComparison::Same(s) => (s, s),
        }
    }

    /// Returns the reference and under-test stdout captures.
    pub fn stdout_pair(&self) -> (&str, &str) {
        match &self.stdout {
            StringComparison::Ignored {
                reference,
                under_test,
            }
            | StringComparison::Differs {
                reference,
                under_test,
            } => (reference, under_test),
            StringComparison::Same(s) => (s, s),
        }
    }

    /// Returns the reference and under-test exit codes.
    pub const fn exit_codes(&self) -> (i32, i32) {
        match self.exit_code {
            ExitCodeComparison::Same(code) => (code, code),
            ExitCodeComparison::Differs {
                reference,
                under_test,
            } => (reference, under_test),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn stderr_differences_do_not_diverge() {
        let reference = ExecutionResult::new(0, "hello\n", "");
        let under_test = ExecutionResult::new(0, "hello\n", "minishell: warning\n");

        let comparison = CaseComparison::new(&reference, &under_test);
        assert_eq!(comparison.verdict(), Verdict::Matched);
        assert_eq!(comparison.stderr_pair(), ("", "minishell: warning\n"));
    }

    #[test]
    fn exit_code_difference_diverges() {
        let comparison = CaseComparison::new(
            &ExecutionResult::new(3, "", ""),
            &ExecutionResult::new(0, "", ""),
        );

        assert_eq!(comparison.verdict(), Verdict::Diverged);
        assert_eq!(comparison.exit_codes(), (3, 0));
        assert!(!comparison.stdout.is_failure());
    }

    #[test]
    fn stdout_difference_diverges() {
        let comparison = CaseComparison::new(
            &ExecutionResult::new(0, "a\n", ""),
            &ExecutionResult::new(0, "b\n", ""),
        );

        assert_eq!(comparison.verdict(), Verdict::Diverged);
        assert_eq!(comparison.stdout_pair(), ("a\n", "b\n"));
    }

    #[test]
    fn one_sided_timeout_diverges() {
        let reference = ExecutionResult::new(0, "", "");
        let under_test = ExecutionResult::from_timeout("", "", Duration::from_secs(1));

        let comparison = CaseComparison::new(&reference, &under_test);
        assert_eq!(comparison.verdict(), Verdict::Diverged);
        assert!(comparison.under_test_timed_out);
        assert!(!comparison.reference_timed_out);
        assert!(comparison.any_timed_out());
    }

    #[test]
    fn verdict_agrees_with_result_equality() {
        let results = [
            ExecutionResult::new(0, "x\n", ""),
            ExecutionResult::new(0, "x\n", "noise"),
            ExecutionResult::new(1, "x\n", ""),
            ExecutionResult::new(0, "y\n", ""),
            ExecutionResult::from_timeout("x\n", "", Duration::from_secs(1)),
        ];

        for left in &results {
            for right in &results {
                let expected = if left == right {
                    Verdict::Matched
                } else {
                    Verdict::Diverged
                };
                assert_eq!(CaseComparison::new(left, right).verdict(), expected);
            }
        }
    }
}
