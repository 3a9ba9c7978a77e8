//! Differential runner implementation.

use crate::case::Case;
use crate::comparison::Verdict;
use crate::config::RunnerConfig;
use crate::error::Error;
use crate::execution::ExecutionResult;
use crate::logfile::DivergenceLog;
use crate::mapfile::MappingWriter;
use crate::reporting::{CaseResult, Reporter, RunSummary};
use crate::shell::ShellAdapter;
use crate::workdir::WorkDir;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Runs cases under a reference shell and a shell under test and compares the results.
///
/// Cases run strictly one after another, in the order given; each case runs exactly once
/// under each shell. A diverging case never stops the run. Only setup errors do.
pub struct DifferentialRunner {
    reference: Arc<dyn ShellAdapter>,
    under_test: Arc<dyn ShellAdapter>,
    config: RunnerConfig,
    reporter: Reporter,
    log: Option<DivergenceLog>,
    mapping: Option<MappingWriter>,
}

impl DifferentialRunner {
    /// Creates a new runner. Progress goes to stderr and reports to stdout.
    pub fn new(
        reference: Arc<dyn ShellAdapter>,
        under_test: Arc<dyn ShellAdapter>,
        config: RunnerConfig,
    ) -> Self {
        let reporter = Reporter::new(config.format, config.verbose);

        Self {
            reference,
            under_test,
            config,
            reporter,
            log: None,
            mapping: None,
        }
    }

    /// Persists a block for every divergence to the given log.
    #[must_use]
    pub fn with_log(mut self, log: DivergenceLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Persists one row per executed case to the given mapping table.
    #[must_use]
    pub fn with_mapping(mut self, mapping: MappingWriter) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Redirects progress output and the final report.
    #[must_use]
    pub fn with_output(
        mut self,
        progress: Box<dyn Write + Send + Sync>,
        report: Box<dyn Write + Send + Sync>,
    ) -> Self {
        self.reporter =
            Reporter::with_writers(self.config.format, self.config.verbose, progress, report);
        self
    }

    /// Returns the cases that a run over `cases` would execute, after applying the kind
    /// filter and the limit.
    pub fn select_cases(&self, cases: Vec<Case>) -> Vec<Case> {
        self.config.select_cases(cases)
    }

    /// Runs the selected cases and returns the summary.
    ///
    /// If the interrupt flag is raised, no further cases are started and the summary covers
    /// the cases that completed.
    pub async fn run(mut self, cases: Vec<Case>) -> Result<RunSummary, Error> {
        let start_time = std::time::Instant::now();
        let cases = self.select_cases(cases);
        let case_count = cases.len();

        tracing::debug!(
            target: "runner",
            "running {case_count} case(s): {} vs. {}",
            self.reference.name(),
            self.under_test.name()
        );

        let mut summary = RunSummary::default();

        for (index, case) in cases.into_iter().enumerate() {
            if self.config.interrupt.load(Ordering::SeqCst) {
                tracing::debug!(
                    target: "runner",
                    "interrupted; skipping {} remaining case(s)",
                    case_count - index
                );
                summary.interrupted = true;
                break;
            }

            let result = self.run_case(index + 1, case).await?;

            self.reporter.case_completed(&result)?;

            if let Some(mapping) = &mut self.mapping {
                mapping.record(&result)?;
            }

            if let Some(divergence) = result.divergence() {
                if let Some(log) = &mut self.log {
                    log.record(&divergence)?;
                }
                summary.divergences.push(divergence);
            }

            summary.results.push(result);
        }

        if let Some(log) = self.log.take() {
            summary.log_path = Some(log.finish()?);
        }

        if let Some(mapping) = self.mapping.take() {
            let path = mapping.finish()?;
            tracing::debug!(target: "runner", "mapping table written to {}", path.display());
        }

        summary.duration = start_time.elapsed();
        self.reporter.run_completed(&summary)?;

        Ok(summary)
    }

    /// Runs a single case under both shells, in a fresh working directory.
    pub async fn run_case(&self, ordinal: usize, case: Case) -> Result<CaseResult, Error> {
        let work_dir = WorkDir::new(self.config.fixtures_dir.as_deref())?;
        let working_dir = work_dir.path().to_owned();

        tracing::debug!(target: "runner", "{case}: running reference");
        let reference = execute(&self.reference, &case, working_dir.clone()).await?;

        work_dir.reset()?;

        tracing::debug!(target: "runner", "{case}: running under test");
        let under_test = execute(&self.under_test, &case, working_dir).await?;

        let result = CaseResult::new(ordinal, case, reference, under_test);

        match result.verdict() {
            Verdict::Matched => tracing::debug!(target: "runner", "{}: matched", result.case),
            Verdict::Diverged => tracing::debug!(target: "runner", "{}: diverged", result.case),
        }

        Ok(result)
    }
}

/// Runs one execution on the blocking pool; the async caller waits for it to finish.
async fn execute(
    shell: &Arc<dyn ShellAdapter>,
    case: &Case,
    working_dir: PathBuf,
) -> Result<ExecutionResult, Error> {
    let shell = Arc::clone(shell);
    let case = case.clone();

    tokio::task::spawn_blocking(move || shell.execute(&case, &working_dir)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvPolicy, OutputFormat, ShellConfig};
    use crate::reporting::tests::SharedBuf;
    use crate::shell::{ReferenceShell, UnderTestShell};
    use assert_fs::prelude::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    type Behavior = Box<dyn Fn(&Case, &Path) -> ExecutionResult + Send + Sync>;

    /// A shell whose behavior is scripted by a closure.
    struct FakeShell {
        name: &'static str,
        behavior: Behavior,
        calls: Mutex<Vec<u64>>,
    }

    impl FakeShell {
        fn new(
            name: &'static str,
            behavior: impl Fn(&Case, &Path) -> ExecutionResult + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior: Box::new(behavior),
                calls: Mutex::new(vec![]),
            })
        }

        /// Echoes the case text back on stdout.
        fn echo(name: &'static str) -> Arc<Self> {
            Self::new(name, |case, _| {
                ExecutionResult::new(0, std::format!("{}\n", case.text), "")
            })
        }

        fn calls(&self) -> Vec<u64> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ShellAdapter for FakeShell {
        fn name(&self) -> &str {
            self.name
        }

        fn execute(&self, case: &Case, working_dir: &Path) -> Result<ExecutionResult, Error> {
            self.calls.lock().unwrap().push(case.id);
            Ok((self.behavior)(case, working_dir))
        }
    }

    fn cases(n: u64) -> Vec<Case> {
        (1..=n)
            .map(|i| Case::new(i, "General", &std::format!("echo {i}")))
            .collect()
    }

    fn quiet(runner: DifferentialRunner) -> (DifferentialRunner, SharedBuf) {
        let progress = SharedBuf::default();
        let runner = runner.with_output(Box::new(progress.clone()), Box::new(SharedBuf::default()));
        (runner, progress)
    }

    fn config() -> RunnerConfig {
        RunnerConfig::new("bash", "./minishell").with_format(OutputFormat::Terse)
    }

    #[tokio::test]
    async fn matching_shells_produce_no_divergences() {
        let reference = FakeShell::echo("bash");
        let under_test = FakeShell::echo("minishell");

        let (runner, _) = quiet(DifferentialRunner::new(
            reference.clone(),
            under_test.clone(),
            config(),
        ));
        let summary = runner.run(cases(3)).await.unwrap();

        assert_eq!(summary.total(), 3);
        assert!(summary.is_success());
        assert!(!summary.interrupted);
        assert_eq!(reference.calls(), vec![1, 2, 3]);
        assert_eq!(under_test.calls(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn divergence_does_not_stop_the_run() {
        let reference = FakeShell::echo("bash");
        let under_test = FakeShell::new("minishell", |case, _| {
            if case.id == 2 || case.id == 4 {
                ExecutionResult::new(1, "", "minishell: syntax error\n")
            } else {
                ExecutionResult::new(0, std::format!("{}\n", case.text), "")
            }
        });

        let (runner, _) = quiet(DifferentialRunner::new(
            reference,
            under_test.clone(),
            config(),
        ));
        let summary = runner.run(cases(5)).await.unwrap();

        assert_eq!(summary.total(), 5);
        assert_eq!(summary.divergence_count(), 2);
        assert_eq!(
            summary.divergences.iter().map(|d| d.id).collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert_eq!(under_test.calls(), vec![1, 2, 3, 4, 5]);
        assert!(!summary.is_success());
    }

    #[tokio::test]
    async fn timeout_on_one_side_is_a_divergence() {
        let reference = FakeShell::new("bash", |_, _| ExecutionResult::new(0, "", ""));
        let under_test = FakeShell::new("minishell", |_, _| {
            ExecutionResult::from_timeout("", "", Duration::from_millis(100))
        });

        let (runner, _) = quiet(DifferentialRunner::new(reference, under_test, config()));
        let summary = runner
            .run(vec![Case::new(1, "General", "cat")])
            .await
            .unwrap();

        assert_eq!(summary.divergence_count(), 1);
        assert_eq!(summary.timeout_count(), 1);
        let report = &summary.divergences[0];
        assert!(report.under_test_timed_out);
        assert!(!report.reference_timed_out);
        assert_eq!(report.under_test_exit, crate::TIMEOUT_EXIT_CODE);
    }

    #[tokio::test]
    async fn limit_and_kind_filter_select_cases() {
        let reference = FakeShell::echo("bash");
        let under_test = FakeShell::echo("minishell");

        let mut all = cases(4);
        all.push(Case::new(10, "pipes", "echo a | cat"));
        all.push(Case::new(11, "pipes", "echo b | cat"));
        all.push(Case::new(12, "pipes", "echo c | cat"));

        let config = config()
            .with_kind_filter(Some("pipes".into()))
            .with_limit(Some(2));
        let (runner, _) = quiet(DifferentialRunner::new(
            reference.clone(),
            under_test,
            config,
        ));
        let summary = runner.run(all).await.unwrap();

        assert_eq!(summary.total(), 2);
        assert_eq!(reference.calls(), vec![10, 11]);
    }

    #[tokio::test]
    async fn interrupt_stops_starting_new_cases() {
        let interrupt = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupt);

        let reference = FakeShell::echo("bash");
        let under_test = FakeShell::new("minishell", move |case, _| {
            if case.id == 2 {
                flag.store(true, Ordering::SeqCst);
            }
            ExecutionResult::new(0, std::format!("{}\n", case.text), "")
        });

        let config = config().with_interrupt(interrupt);
        let (runner, _) = quiet(DifferentialRunner::new(
            reference.clone(),
            under_test,
            config,
        ));
        let summary = runner.run(cases(5)).await.unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.total(), 2);
        assert_eq!(reference.calls(), vec![1, 2]);
    }

    #[tokio::test]
    async fn both_shells_start_from_the_same_snapshot() {
        let fixtures = assert_fs::TempDir::new().unwrap();
        fixtures.child("sample_0.txt").write_str("fixture\n").unwrap();

        // The reference shell clobbers the fixture and leaves a new file behind.
        let reference = FakeShell::new("bash", |_, dir| {
            std::fs::write(dir.join("sample_0.txt"), "clobbered\n").unwrap();
            std::fs::write(dir.join("out.txt"), "leftover\n").unwrap();
            ExecutionResult::new(0, "fixture\n", "")
        });
        let under_test = FakeShell::new("minishell", |_, dir| {
            let contents = std::fs::read_to_string(dir.join("sample_0.txt")).unwrap();
            let exit_code = i32::from(dir.join("out.txt").exists());
            ExecutionResult::new(exit_code, contents, "")
        });

        let config = config().with_fixtures_dir(Some(fixtures.path().to_owned()));
        let (runner, _) = quiet(DifferentialRunner::new(reference, under_test, config));
        let summary = runner
            .run(vec![Case::new(1, "General", "cat sample_0.txt > out.txt")])
            .await
            .unwrap();

        assert!(summary.is_success());
    }

    #[tokio::test]
    async fn each_case_gets_its_own_directory() {
        let seen = Arc::new(Mutex::new(vec![]));
        let seen_by_shell = Arc::clone(&seen);

        let reference = FakeShell::new("bash", move |_, dir| {
            seen_by_shell.lock().unwrap().push(dir.to_owned());
            ExecutionResult::new(0, "", "")
        });
        let under_test = FakeShell::new("minishell", |_, _| ExecutionResult::new(0, "", ""));

        let (runner, _) = quiet(DifferentialRunner::new(reference, under_test, config()));
        runner.run(cases(2)).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
        assert!(!seen[0].exists());
    }

    #[tokio::test]
    async fn pretty_output_streams_status_lines() {
        let reference = FakeShell::echo("bash");
        let under_test = FakeShell::new("minishell", |case, _| {
            ExecutionResult::new(i32::from(case.id == 2), "", "")
        });

        let config = config().with_format(OutputFormat::Pretty);
        let (runner, progress) = quiet(DifferentialRunner::new(reference, under_test, config));
        runner.run(cases(2)).await.unwrap();

        let text = progress.contents();
        assert!(text.contains("[KO] -- echo 1\n"));
        assert!(text.contains("[KO] -- echo 2\n"));
        assert!(text.contains("2 case(s) ran"));
    }

    #[tokio::test]
    async fn log_and_mapping_are_written() {
        let out = assert_fs::TempDir::new().unwrap();
        let log_path = out.child("divergences.log");
        let map_path = out.child("map.csv");

        let reference = FakeShell::echo("bash");
        let under_test = FakeShell::new("minishell", |case, _| {
            if case.id == 2 {
                ExecutionResult::new(0, "wrong\n", "")
            } else {
                ExecutionResult::new(0, std::format!("{}\n", case.text), "")
            }
        });

        let (runner, _) = quiet(
            DifferentialRunner::new(reference, under_test, config())
                .with_log(DivergenceLog::create(log_path.path()).unwrap())
                .with_mapping(MappingWriter::create(map_path.path()).unwrap()),
        );
        let summary = runner.run(cases(3)).await.unwrap();

        assert_eq!(summary.log_path.as_deref(), Some(log_path.path()));

        let log = std::fs::read_to_string(log_path.path()).unwrap();
        assert!(log.contains("Test #2"));
        assert!(!log.contains("Test #1"));

        let map = std::fs::read_to_string(map_path.path()).unwrap();
        assert_eq!(
            map,
            "id,command,reference_exit,under_test_exit,match\n\
             1,echo 1,0,0,1\n\
             2,echo 2,0,0,0\n\
             3,echo 3,0,0,1\n"
        );
    }

    #[tokio::test]
    async fn real_shells_agree_on_simple_commands() {
        let (Ok(bash), Ok(sh)) = (which::which("bash"), which::which("sh")) else {
            return;
        };

        let bin_dir = assert_fs::TempDir::new().unwrap();
        let reference = ReferenceShell::new(
            ShellConfig::reference(bash),
            Duration::from_secs(5),
            EnvPolicy::Inherit,
        )
        .unwrap();
        let mut under_test = UnderTestShell::new(
            ShellConfig::under_test(sh),
            Duration::from_secs(5),
            EnvPolicy::Inherit,
        );
        under_test.prepare_binary(bin_dir.path()).unwrap();

        let (runner, _) = quiet(DifferentialRunner::new(
            Arc::new(reference),
            Arc::new(under_test),
            config(),
        ));
        let summary = runner
            .run(vec![
                Case::new(1, "echo", "echo hello"),
                Case::new(2, "exit", "exit 3"),
            ])
            .await
            .unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.results[0].reference.stdout, "hello\n");
        assert_eq!(summary.results[1].under_test.exit_code, 3);
    }
}
