//! Differential execution engine for validating a shell implementation against a
//! reference shell.
//!
//! The harness loads a table of command cases, runs every case once under the reference
//! shell (e.g., bash) and once under the shell being validated, and compares the observable
//! results of the two runs. A case *matches* when both shells report the same exit code and
//! write exactly the same bytes to stdout; stderr is captured and reported but never decides
//! the outcome.
//!
//! # Pieces
//!
//! 1. [`Case`] values are produced by the [`CaseLoader`] from a `,`- or `;`-delimited table.
//! 2. [`ShellAdapter`] implementations ([`ReferenceShell`], [`UnderTestShell`]) know how to
//!    deliver a case's command text to one concrete shell and capture an [`ExecutionResult`].
//! 3. [`DifferentialRunner`] drives both adapters for every case, in order, one case at a time,
//!    and hands each [`CaseResult`] to the configured reporters.
//! 4. [`LogSummary`] reads a persisted divergence log back and groups its blocks for triage.

mod case;
mod comparison;
mod config;
mod error;
mod execution;
pub mod generator;
mod loader;
mod logfile;
pub mod logsummary;
mod mapfile;
mod reporting;
mod runner;
mod shell;
pub mod truncate;
pub mod util;
mod workdir;

pub use case::Case;
pub use comparison::{
    CaseComparison, DurationComparison, ExitCodeComparison, StringComparison, Verdict,
};
pub use config::{EnvPolicy, OutputFormat, RunnerConfig, ShellConfig};
pub use error::Error;
pub use execution::{DEFAULT_TIMEOUT, ExecutionResult, TIMEOUT_EXIT_CODE};
pub use loader::{CaseLoader, filter_by_kind};
pub use logfile::DivergenceLog;
pub use logsummary::{DivergenceFlags, LogSummary, LoggedDivergence, Subsystem};
pub use mapfile::MappingWriter;
pub use reporting::{CaseResult, DivergenceReport, RunSummary};
pub use runner::DifferentialRunner;
pub use shell::{PermissionGuard, ReferenceShell, ShellAdapter, UnderTestShell};
pub use workdir::WorkDir;
