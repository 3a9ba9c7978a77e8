//! Shell adapters: the per-shell knowledge of how to deliver a case's command text.

use crate::case::Case;
use crate::config::{EnvPolicy, ShellConfig};
use crate::error::Error;
use crate::execution::{ExecutionResult, create_command, run_command};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// A shell that can execute cases.
///
/// Implementations hold no mutable state between calls; the working directory passed to
/// [`execute`](ShellAdapter::execute) is the only side channel between executions.
pub trait ShellAdapter: Send + Sync {
    /// Short, human-readable name for reports.
    fn name(&self) -> &str;

    /// Executes the case's command text with `working_dir` as the current directory.
    ///
    /// Timeouts are not errors: they yield a result flagged as timed out. An `Err` means the
    /// shell could not be run at all.
    fn execute(&self, case: &Case, working_dir: &Path) -> Result<ExecutionResult, Error>;
}

/// The trusted reference shell. Receives command text as a `-c` argument.
pub struct ReferenceShell {
    name: String,
    config: ShellConfig,
    program: PathBuf,
    timeout: Duration,
    env_policy: EnvPolicy,
}

impl ReferenceShell {
    /// Creates a reference shell, resolving and validating its binary.
    pub fn new(config: ShellConfig, timeout: Duration, env_policy: EnvPolicy) -> Result<Self, Error> {
        let program = resolve_binary(&config.path)?;
        let name = display_name(&program, "reference");

        tracing::debug!(target: "prepare", "reference shell resolved to {}", program.display());

        Ok(Self {
            name,
            config,
            program,
            timeout,
            env_policy,
        })
    }

    /// Returns the resolved path of the reference shell binary.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ShellAdapter for ReferenceShell {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, case: &Case, working_dir: &Path) -> Result<ExecutionResult, Error> {
        let mut cmd = create_command(&self.config, &self.program, self.env_policy, working_dir);
        cmd.arg("-c").arg(&case.text);

        run_command(cmd, None, self.timeout)
    }
}

/// The shell being validated. Reads command text from stdin, one line per command.
///
/// The binary is never executed in place; [`prepare_binary`](UnderTestShell::prepare_binary)
/// must first make an executable copy in a scratch directory.
pub struct UnderTestShell {
    name: String,
    config: ShellConfig,
    prepared: Option<PathBuf>,
    timeout: Duration,
    env_policy: EnvPolicy,
}

impl UnderTestShell {
    /// Creates a shell-under-test adapter. No filesystem access happens until the binary is
    /// prepared.
    pub fn new(config: ShellConfig, timeout: Duration, env_policy: EnvPolicy) -> Self {
        let name = display_name(&config.path, "under-test");

        Self {
            name,
            config,
            prepared: None,
            timeout,
            env_policy,
        }
    }

    /// Copies the source binary into `temp_dir` and makes the copy executable.
    ///
    /// If the source cannot be read, its permission bits are temporarily widened for the
    /// copy and then put back. The source's permission bits are unchanged when this returns,
    /// whether it succeeds or not; a failure to put them back is logged, not returned.
    pub fn prepare_binary(&mut self, temp_dir: &Path) -> Result<&Path, Error> {
        let source = self.config.path.as_path();

        let metadata = fs::metadata(source).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::BinaryNotFound(source.to_owned()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path: source.to_owned(),
                source: e,
            },
            _ => Error::Io(e),
        })?;

        if !metadata.is_file() {
            return Err(Error::NotAFile(source.to_owned()));
        }

        let dest = temp_dir.join(
            source
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("shell_under_test")),
        );

        tracing::debug!(
            target: "prepare",
            "copying {} to {}",
            source.display(),
            dest.display()
        );

        copy_relaxing_permissions(source, &dest, copy_executable)?;

        if !is_executable(&dest) {
            return Err(Error::NotExecutable(dest));
        }

        Ok(self.prepared.insert(dest).as_path())
    }
}

impl ShellAdapter for UnderTestShell {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, case: &Case, working_dir: &Path) -> Result<ExecutionResult, Error> {
        let program = self.prepared.as_deref().ok_or(Error::BinaryNotPrepared)?;
        let cmd = create_command(&self.config, program, self.env_policy, working_dir);

        let mut input = case.text.clone().into_bytes();
        input.push(b'\n');

        run_command(cmd, Some(input), self.timeout)
    }
}

/// Temporarily widened permissions on an existing file.
///
/// The original permissions are put back by [`restore`](PermissionGuard::restore), or on
/// drop if `restore` was never called.
pub struct PermissionGuard {
    path: PathBuf,
    original: fs::Permissions,
    restored: bool,
}

impl PermissionGuard {
    /// Makes the file at `path` readable (and writable) by its owner and readable by others.
    pub fn relax(path: &Path) -> std::io::Result<Self> {
        let original = fs::metadata(path)?.permissions();

        let mut relaxed = original.clone();
        #[cfg(unix)]
        relaxed.set_mode(original.mode() | 0o644);
        #[cfg(not(unix))]
        relaxed.set_readonly(false);

        fs::set_permissions(path, relaxed)?;

        Ok(Self {
            path: path.to_owned(),
            original,
            restored: false,
        })
    }

    /// Returns the permissions the file had before they were relaxed.
    pub const fn original(&self) -> &fs::Permissions {
        &self.original
    }

    /// Puts the original permissions back.
    pub fn restore(mut self) -> std::io::Result<()> {
        self.restored = true;
        fs::set_permissions(&self.path, self.original.clone())
    }
}

impl Drop for PermissionGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }

        if let Err(e) = fs::set_permissions(&self.path, self.original.clone()) {
            tracing::warn!(
                target: "prepare",
                "failed to restore permissions of {}: {e}",
                self.path.display()
            );
        }
    }
}

/// Copies `source` to `dest` with `copy`. If the copy is denied, the source's permissions
/// are relaxed for one more attempt and put back afterwards.
fn copy_relaxing_permissions(
    source: &Path,
    dest: &Path,
    copy: impl Fn(&Path, &Path) -> std::io::Result<()>,
) -> Result<(), Error> {
    match copy(source, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            let _ = fs::remove_file(dest);

            tracing::debug!(
                target: "prepare",
                "{} is not readable; relaxing its permissions for the copy",
                source.display()
            );

            let guard = PermissionGuard::relax(source).map_err(|e| Error::PermissionDenied {
                path: source.to_owned(),
                source: e,
            })?;

            let copied = copy(source, dest);

            if let Err(restore_err) = guard.restore() {
                tracing::warn!(
                    target: "prepare",
                    "failed to restore permissions of {}: {restore_err}",
                    source.display()
                );
            }

            copied.map_err(|e| {
                let _ = fs::remove_file(dest);
                Error::PermissionDenied {
                    path: source.to_owned(),
                    source: e,
                }
            })
        }
        Err(e) => {
            let _ = fs::remove_file(dest);
            Err(Error::Io(e))
        }
    }
}

/// Copies `source` to `dest` and leaves `dest` readable, executable and not writable.
fn copy_executable(source: &Path, dest: &Path) -> std::io::Result<()> {
    fs::copy(source, dest)?;

    let mut perms = fs::metadata(dest)?.permissions();
    #[cfg(unix)]
    perms.set_mode((perms.mode() | 0o555) & !0o222);
    #[cfg(not(unix))]
    perms.set_readonly(true);

    fs::set_permissions(dest, perms)
}

/// Resolves a shell path, consulting `PATH` for bare names, and checks that it can be run.
fn resolve_binary(path: &Path) -> Result<PathBuf, Error> {
    if path.components().count() == 1 && !path.is_absolute() {
        return which::which(path).map_err(|_| Error::BinaryNotFound(path.to_owned()));
    }

    if !path.exists() {
        return Err(Error::BinaryNotFound(path.to_owned()));
    }

    if !path.is_file() {
        return Err(Error::NotAFile(path.to_owned()));
    }

    if !is_executable(path) {
        return Err(Error::NotExecutable(path.to_owned()));
    }

    Ok(path.to_owned())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn display_name(path: &Path, fallback: &str) -> String {
    path.file_name()
        .map_or_else(|| fallback.to_owned(), |n| n.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::DEFAULT_TIMEOUT;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use pretty_assertions::assert_eq;

    fn sh_path() -> Option<PathBuf> {
        which::which("sh").ok()
    }

    fn write_script(dir: &TempDir, name: &str, body: &str, mode: u32) -> PathBuf {
        let file = dir.child(name);
        file.write_str(body).unwrap();
        #[cfg(unix)]
        fs::set_permissions(file.path(), fs::Permissions::from_mode(mode)).unwrap();
        #[cfg(not(unix))]
        let _ = mode;
        file.path().to_owned()
    }

    #[cfg(unix)]
    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o7777
    }

    #[test]
    fn reference_shell_runs_command_as_argument() {
        let Some(sh) = sh_path() else {
            return;
        };

        let config = ShellConfig {
            path: sh,
            default_args: vec![],
            default_path_var: None,
        };
        let shell = ReferenceShell::new(config, DEFAULT_TIMEOUT, EnvPolicy::Inherit).unwrap();
        let work_dir = TempDir::new().unwrap();

        let result = shell
            .execute(&Case::new(1, "General", "echo hello"), work_dir.path())
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello\n");

        let result = shell
            .execute(&Case::new(2, "General", "exit 3"), work_dir.path())
            .unwrap();
        assert_eq!(result.exit_code, 3);
    }

    #[test]
    fn reference_shell_runs_in_working_directory() {
        let Some(sh) = sh_path() else {
            return;
        };

        let shell = ReferenceShell::new(
            ShellConfig::under_test(sh),
            DEFAULT_TIMEOUT,
            EnvPolicy::Inherit,
        )
        .unwrap();
        let work_dir = TempDir::new().unwrap();
        work_dir.child("marker.txt").touch().unwrap();

        let result = shell
            .execute(&Case::new(1, "General", "ls"), work_dir.path())
            .unwrap();
        assert_eq!(result.stdout, "marker.txt\n");
    }

    #[test]
    fn missing_reference_binary_is_setup_error() {
        let config = ShellConfig::reference("/nonexistent/bin/bash");
        let err = ReferenceShell::new(config, DEFAULT_TIMEOUT, EnvPolicy::Inherit)
            .err()
            .unwrap();
        assert!(matches!(err, Error::BinaryNotFound(_)));
        assert!(err.is_setup_error());
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_reference_binary_is_setup_error() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "fake-bash", "#!/bin/sh\n", 0o644);

        let err = ReferenceShell::new(ShellConfig::reference(path), DEFAULT_TIMEOUT, EnvPolicy::Inherit)
            .err()
            .unwrap();
        assert!(matches!(err, Error::NotExecutable(_)));
    }

    #[test]
    fn under_test_shell_requires_preparation() {
        let shell = UnderTestShell::new(
            ShellConfig::under_test("./minishell"),
            DEFAULT_TIMEOUT,
            EnvPolicy::Inherit,
        );
        let work_dir = TempDir::new().unwrap();

        let err = shell
            .execute(&Case::new(1, "General", "true"), work_dir.path())
            .unwrap_err();
        assert!(matches!(err, Error::BinaryNotPrepared));
    }

    #[test]
    fn under_test_shell_reads_command_from_stdin() {
        let Some(sh) = sh_path() else {
            return;
        };

        let bin_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let mut shell = UnderTestShell::new(
            ShellConfig::under_test(sh),
            DEFAULT_TIMEOUT,
            EnvPolicy::Inherit,
        );
        shell.prepare_binary(bin_dir.path()).unwrap();

        let result = shell
            .execute(&Case::new(1, "General", "echo hello"), work_dir.path())
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello\n");
    }

    #[cfg(unix)]
    #[test]
    fn prepare_copies_without_touching_source_permissions() {
        let src_dir = TempDir::new().unwrap();
        let bin_dir = TempDir::new().unwrap();
        let source = write_script(&src_dir, "minishell", "#!/bin/sh\nexec sh\n", 0o644);

        let mut shell = UnderTestShell::new(
            ShellConfig::under_test(&source),
            DEFAULT_TIMEOUT,
            EnvPolicy::Inherit,
        );
        let prepared = shell.prepare_binary(bin_dir.path()).unwrap().to_owned();

        assert_eq!(prepared, bin_dir.path().join("minishell"));
        assert_eq!(mode_of(&prepared) & 0o111, 0o111);
        assert_eq!(mode_of(&prepared) & 0o222, 0);
        assert_eq!(mode_of(&source), 0o644);
        assert_eq!(shell.prepared.as_deref(), Some(prepared.as_path()));
    }

    #[cfg(unix)]
    #[test]
    fn prepare_restores_permissions_of_unreadable_source() {
        // Root reads the source regardless of its mode, so nothing would be relaxed.
        if nix::unistd::geteuid().is_root() {
            eprintln!("skipping: running as root");
            return;
        }

        let src_dir = TempDir::new().unwrap();
        let bin_dir = TempDir::new().unwrap();
        let source = write_script(&src_dir, "minishell", "#!/bin/sh\nexec sh\n", 0o000);

        let mut shell = UnderTestShell::new(
            ShellConfig::under_test(&source),
            DEFAULT_TIMEOUT,
            EnvPolicy::Inherit,
        );
        let prepared = shell.prepare_binary(bin_dir.path()).unwrap().to_owned();

        assert_eq!(mode_of(&source), 0o000);
        assert_eq!(
            fs::read_to_string(&prepared).unwrap(),
            "#!/bin/sh\nexec sh\n"
        );
    }

    /// Copies like the OS would for an unprivileged user: denied while the owner can't read.
    #[cfg(unix)]
    fn copy_as_owner(source: &Path, dest: &Path) -> std::io::Result<()> {
        if mode_of(source) & 0o400 == 0 {
            return Err(std::io::ErrorKind::PermissionDenied.into());
        }
        copy_executable(source, dest)
    }

    #[cfg(unix)]
    #[test]
    fn denied_copy_is_retried_with_relaxed_permissions() {
        let src_dir = TempDir::new().unwrap();
        let bin_dir = TempDir::new().unwrap();
        let source = write_script(&src_dir, "minishell", "#!/bin/sh\nexec sh\n", 0o000);
        let dest = bin_dir.path().join("minishell");

        copy_relaxing_permissions(&source, &dest, copy_as_owner).unwrap();

        assert_eq!(mode_of(&source), 0o000);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "#!/bin/sh\nexec sh\n");
        assert_eq!(mode_of(&dest) & 0o111, 0o111);
    }

    #[cfg(unix)]
    #[test]
    fn denied_retry_restores_permissions_and_removes_partial_copy() {
        let src_dir = TempDir::new().unwrap();
        let bin_dir = TempDir::new().unwrap();
        let source = write_script(&src_dir, "minishell", "#!/bin/sh\n", 0o100);
        let dest = bin_dir.path().join("minishell");

        let always_denied = |_: &Path, dest: &Path| -> std::io::Result<()> {
            fs::write(dest, "partial")?;
            Err(std::io::ErrorKind::PermissionDenied.into())
        };

        let err = copy_relaxing_permissions(&source, &dest, always_denied).unwrap_err();

        assert!(matches!(err, Error::PermissionDenied { .. }));
        assert_eq!(mode_of(&source), 0o100);
        assert!(!dest.exists());
    }

    #[test]
    fn prepare_rejects_missing_and_directory_sources() {
        let bin_dir = TempDir::new().unwrap();

        let mut missing = UnderTestShell::new(
            ShellConfig::under_test("/nonexistent/minishell"),
            DEFAULT_TIMEOUT,
            EnvPolicy::Inherit,
        );
        assert!(matches!(
            missing.prepare_binary(bin_dir.path()),
            Err(Error::BinaryNotFound(_))
        ));

        let mut dir = UnderTestShell::new(
            ShellConfig::under_test(bin_dir.path()),
            DEFAULT_TIMEOUT,
            EnvPolicy::Inherit,
        );
        assert!(matches!(
            dir.prepare_binary(bin_dir.path()),
            Err(Error::NotAFile(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn permission_guard_restores_on_drop_and_on_restore() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "file", "contents", 0o200);

        {
            let guard = PermissionGuard::relax(&path).unwrap();
            assert_eq!(mode_of(&path), 0o644);
            assert_eq!(guard.original().mode() & 0o7777, 0o200);
        }
        assert_eq!(mode_of(&path), 0o200);

        let guard = PermissionGuard::relax(&path).unwrap();
        guard.restore().unwrap();
        assert_eq!(mode_of(&path), 0o200);
    }
}
