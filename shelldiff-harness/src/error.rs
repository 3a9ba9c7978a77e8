use std::path::PathBuf;

/// Monolithic error type for the harness.
///
/// Every variant is fatal to a run. Per-case anomalies such as timeouts are not errors;
/// they are recorded in the [`ExecutionResult`](crate::ExecutionResult) instead.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A shell binary could not be found.
    #[error("shell binary not found: {0}")]
    BinaryNotFound(PathBuf),

    /// A path that should name a regular file names something else.
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    /// A shell binary exists but cannot be executed.
    #[error("shell binary is not executable: {0}")]
    NotExecutable(PathBuf),

    /// The shell under test was used before its binary was prepared.
    #[error("shell under test has not been prepared; call prepare_binary first")]
    BinaryNotPrepared,

    /// Permissions prevented preparing the shell-under-test binary.
    #[error("permission denied preparing {path}: {source}")]
    PermissionDenied {
        /// The file that could not be read or modified.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The case source exists but could not be read.
    #[error("failed to read case source {0}: {1}")]
    CaseSourceUnreadable(PathBuf, std::io::Error),

    /// A divergence log to summarize could not be read.
    #[error("failed to read divergence log {0}: {1}")]
    LogUnreadable(PathBuf, std::io::Error),

    /// The directory that should receive an output artifact does not exist.
    #[error("output directory does not exist: {0}")]
    OutputDirMissing(PathBuf),

    /// A shell process could not be started.
    #[error("failed to spawn {0}: {1}")]
    Spawn(PathBuf, std::io::Error),

    /// A temporary directory could not be created or populated.
    #[error("failed to set up temporary directory: {0}")]
    TempDir(std::io::Error),

    /// A CSV table could not be parsed or written.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A report could not be rendered.
    #[error("failed to write report: {0}")]
    Report(String),

    /// A background execution task failed to complete.
    #[error("execution task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    /// Some other I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns whether this error stems from the environment the run was set up in (binaries,
    /// inputs, output locations, processes, the filesystem) as opposed to a failure inside the
    /// harness itself.
    pub const fn is_setup_error(&self) -> bool {
        !matches!(self, Self::Report(_) | Self::TaskFailed(_))
    }
}
