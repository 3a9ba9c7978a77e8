//! Configuration types for the harness.

use crate::case::Case;
use crate::loader::filter_by_kind;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

/// How the environment of spawned shells is constructed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvPolicy {
    /// Pass the harness's own environment through unchanged.
    #[default]
    Inherit,
    /// Start from an empty environment with a small, fixed set of variables.
    Clean,
}

/// Configuration for one shell.
#[derive(Clone, Debug)]
pub struct ShellConfig {
    /// Path to the shell binary. Bare names are resolved against `PATH`.
    pub path: PathBuf,
    /// Arguments passed ahead of the command (or ahead of nothing, for stdin-driven shells).
    pub default_args: Vec<String>,
    /// PATH to prepend when the environment is [`EnvPolicy::Clean`].
    pub default_path_var: Option<String>,
}

impl ShellConfig {
    /// Returns a configuration for a bash-compatible reference shell, with its
    /// personal and system startup files disabled.
    pub fn reference(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default_args: vec!["--noprofile".into(), "--norc".into()],
            default_path_var: None,
        }
    }

    /// Returns a configuration for a stdin-driven shell under test.
    pub fn under_test(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default_args: vec![],
            default_path_var: None,
        }
    }

    /// Computes the PATH variable to use under [`EnvPolicy::Clean`].
    pub fn compute_clean_path_var(&self) -> String {
        let mut dirs = vec![];

        // Start with any default we were provided.
        if let Some(default_path_var) = &self.default_path_var {
            dirs.extend(
                std::env::split_paths(default_path_var).map(|p| p.to_string_lossy().to_string()),
            );
        }

        // Add hard-coded paths that will work on *most* Unix-like systems.
        dirs.extend([
            "/usr/local/sbin".into(),
            "/usr/local/bin".into(),
            "/usr/sbin".into(),
            "/usr/bin".into(),
            "/sbin".into(),
            "/bin".into(),
        ]);

        // Handle systems that store their standard POSIX binaries elsewhere (e.g., NixOS).
        if let Some(host_path) = std::env::var_os("PATH") {
            for path in std::env::split_paths(&host_path) {
                let path_str = path.to_string_lossy().to_string();
                if !dirs.contains(&path_str) && path.join("sh").is_file() {
                    dirs.push(path_str);
                }
            }
        }

        dirs.join(":")
    }
}

/// Output format for run results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Human-readable colored output, streamed as cases complete.
    #[default]
    Pretty,
    /// `JUnit` XML format.
    Junit,
    /// Summary only.
    Terse,
}

/// Configuration for a differential run.
///
/// Constructed once at startup and handed to the runner; nothing in the harness consults
/// the process environment or configuration files on its own.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// The trusted reference shell.
    pub reference: ShellConfig,
    /// The shell being validated.
    pub under_test: ShellConfig,
    /// Wall-clock limit applied to each individual execution.
    pub timeout: Duration,
    /// Run only the first `limit` cases.
    pub limit: Option<usize>,
    /// Run only cases with this kind.
    pub kind_filter: Option<String>,
    /// Directory whose contents seed each case's working directory.
    pub fixtures_dir: Option<PathBuf>,
    /// Environment policy shared by both shells.
    pub env_policy: EnvPolicy,
    /// Output format.
    pub format: OutputFormat,
    /// Whether to report details for matching cases too.
    pub verbose: bool,
    /// Set to request that no further cases be started.
    pub interrupt: Arc<AtomicBool>,
}

impl RunnerConfig {
    /// Creates a new runner config with default values.
    pub fn new(reference_path: impl Into<PathBuf>, under_test_path: impl Into<PathBuf>) -> Self {
        Self {
            reference: ShellConfig::reference(reference_path),
            under_test: ShellConfig::under_test(under_test_path),
            timeout: crate::execution::DEFAULT_TIMEOUT,
            limit: None,
            kind_filter: None,
            fixtures_dir: None,
            env_policy: EnvPolicy::default(),
            format: OutputFormat::default(),
            verbose: false,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the per-execution timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Limits the run to a prefix of the loaded cases.
    #[must_use]
    pub const fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Restricts the run to cases of the given kind.
    #[must_use]
    pub fn with_kind_filter(mut self, kind: Option<String>) -> Self {
        self.kind_filter = kind;
        self
    }

    /// Sets the directory used to seed per-case working directories.
    #[must_use]
    pub fn with_fixtures_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.fixtures_dir = dir;
        self
    }

    /// Sets the environment policy.
    #[must_use]
    pub const fn with_env_policy(mut self, policy: EnvPolicy) -> Self {
        self.env_policy = policy;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enables or disables verbose reporting.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Uses the given flag as the interrupt signal.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Returns the cases a run would execute: those passing the kind filter, cut to the
    /// limit, in their original order.
    pub fn select_cases(&self, cases: Vec<Case>) -> Vec<Case> {
        let mut cases = match &self.kind_filter {
            Some(kind) => filter_by_kind(cases, kind),
            None => cases,
        };

        if let Some(limit) = self.limit {
            cases.truncate(limit);
        }

        cases
    }
}
