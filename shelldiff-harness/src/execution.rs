//! Execution logic for running shell commands.

use crate::config::{EnvPolicy, ShellConfig};
use crate::error::Error;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Default wall-clock limit for a single execution.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit code reported for an execution that was killed because it ran out of time.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How long to keep collecting output after killing a timed-out process.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Outcome of running one case under one shell.
///
/// Two results are equal when their exit codes and stdout are equal. Stderr, the timeout
/// flag and the duration are carried along for reporting but do not take part in equality.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    /// Exit code of the shell; [`TIMEOUT_EXIT_CODE`] when it timed out.
    pub exit_code: i32,
    /// Everything the shell wrote to stdout.
    pub stdout: String,
    /// Everything the shell wrote to stderr.
    pub stderr: String,
    /// Whether the execution was cut short by the timeout.
    pub timed_out: bool,
    /// Wall-clock duration of the execution.
    pub duration: Duration,
}

impl ExecutionResult {
    /// Creates a result for an execution that completed on its own.
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
            duration: Duration::ZERO,
        }
    }

    /// Creates a result for an execution that was killed after `timeout` elapsed, keeping
    /// whatever output had been produced up to that point.
    pub fn from_timeout(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let mut stderr = stderr.into();
        stderr.push_str(std::format!("\n[timeout after {timeout:?}]").as_str());

        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            stdout: stdout.into(),
            stderr,
            timed_out: true,
            duration: timeout,
        }
    }
}

impl PartialEq for ExecutionResult {
    fn eq(&self, other: &Self) -> bool {
        self.exit_code == other.exit_code && self.stdout == other.stdout
    }
}

impl Eq for ExecutionResult {}

/// Creates a command for the given shell, rooted in `working_dir`.
pub(crate) fn create_command(
    shell_config: &ShellConfig,
    program: &Path,
    env_policy: EnvPolicy,
    working_dir: &Path,
) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(&shell_config.default_args);

    if matches!(env_policy, EnvPolicy::Clean) {
        cmd.env_clear();
        // Set locale to C for consistent behavior across systems.
        cmd.env("LC_ALL", "C");
        // Hard-code a well known prompt for PS1.
        cmd.env("PS1", "test$ ");
        cmd.env("HOME", working_dir);
        cmd.env("PATH", shell_config.compute_clean_path_var());
    }

    cmd.current_dir(working_dir);

    cmd
}

/// Runs `cmd` to completion or until `timeout` elapses, capturing stdout and stderr in full.
///
/// When `stdin` is provided it is written to the child's standard input, which is then
/// closed; otherwise the child's standard input is the null device.
///
/// The timeout covers both the exit of the child and the closing of its output pipes, so a
/// background process that keeps stdout open also counts as running over time.
pub(crate) fn run_command(
    mut cmd: Command,
    stdin: Option<Vec<u8>>,
    timeout: Duration,
) -> Result<ExecutionResult, Error> {
    let program = PathBuf::from(cmd.get_program());

    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    // SAFETY:
    // The child gets its own session so it never touches our controlling terminal and so
    // that a timeout can take down everything it started with a single killpg(). Calling
    // pre_exec can be unsafe as it runs in the child process after fork() but before exec(),
    // and there are constraints around what can be safely done in that context. However,
    // setsid() does not allocate memory or touch any state inherited from the parent.
    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt;

        cmd.pre_exec(|| {
            let _ = nix::unistd::setsid();
            Ok(())
        });
    }

    let start_time = Instant::now();
    let deadline = start_time + timeout;

    let mut child = cmd.spawn().map_err(|e| Error::Spawn(program.clone(), e))?;
    tracing::debug!(target: "exec", pid = child.id(), "spawned {}", program.display());

    let (done_tx, done_rx) = mpsc::channel();
    let stdout = OutputPipe::spawn(child.stdout.take(), done_tx.clone());
    let stderr = OutputPipe::spawn(child.stderr.take(), done_tx);

    if let (Some(mut pipe), Some(input)) = (child.stdin.take(), stdin) {
        std::thread::spawn(move || {
            // The shell may exit without consuming all of its input; that's not our problem.
            let _ = pipe.write_all(&input);
        });
    }

    let mut grace_deadline = None;

    let status = match child.wait_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(Some(status)) => status,
        Ok(None) => {
            tracing::debug!(target: "exec", pid = child.id(), "timed out; killing process group");
            terminate(&mut child);
            grace_deadline = Some(Instant::now() + KILL_GRACE);
            child.wait()?
        }
        Err(e) => {
            terminate(&mut child);
            let _ = child.wait();
            return Err(e.into());
        }
    };

    // Wait for both pipes to reach EOF.
    let mut open_pipes = 2;
    while open_pipes > 0 {
        let wait_until = grace_deadline.unwrap_or(deadline);
        match done_rx.recv_timeout(wait_until.saturating_duration_since(Instant::now())) {
            Ok(()) => open_pipes -= 1,
            Err(mpsc::RecvTimeoutError::Timeout) if grace_deadline.is_none() => {
                tracing::debug!(
                    target: "exec",
                    "output still open at deadline; killing leftover processes"
                );
                terminate(&mut child);
                grace_deadline = Some(Instant::now() + KILL_GRACE);
            }
            Err(_) => break,
        }
    }

    let duration = start_time.elapsed();

    if grace_deadline.is_some() {
        let mut result = ExecutionResult::from_timeout(stdout.text(), stderr.text(), timeout);
        result.duration = duration;
        return Ok(result);
    }

    Ok(ExecutionResult {
        exit_code: exit_code_of(status),
        stdout: stdout.text(),
        stderr: stderr.text(),
        timed_out: false,
        duration,
    })
}

/// Kills the child and everything else in its process group.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(pgid) = i32::try_from(child.id()) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
    }

    let _ = child.kill();
}

/// Maps an exit status to a shell-style exit code; death by signal N becomes 128 + N.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

/// Output collected from one of the child's pipes by a background thread.
struct OutputPipe {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl OutputPipe {
    fn spawn<R: Read + Send + 'static>(pipe: Option<R>, done: mpsc::Sender<()>) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::clone(&buffer);

        std::thread::spawn(move || {
            if let Some(mut pipe) = pipe {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => shared
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&chunk[..n]),
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => (),
                        Err(_) => break,
                    }
                }
            }

            let _ = done.send(());
        });

        Self { buffer }
    }

    /// Returns what has been collected so far, replacing invalid UTF-8 sequences.
    fn text(&self) -> String {
        let bytes = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
