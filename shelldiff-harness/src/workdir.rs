//! Per-case working directories.

use crate::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

/// A scratch directory owned by one case and shared by its two executions.
///
/// The directory is seeded from an optional fixtures directory and removed when dropped.
pub struct WorkDir {
    dir: tempfile::TempDir,
    fixtures: Option<PathBuf>,
}

impl WorkDir {
    /// Creates a fresh working directory, seeded with the contents of `fixtures` if given.
    pub fn new(fixtures: Option<&Path>) -> Result<Self, Error> {
        let dir = tempfile::Builder::new()
            .prefix("shelldiff-case-")
            .tempdir()
            .map_err(Error::TempDir)?;

        let work_dir = Self {
            dir,
            fixtures: fixtures.map(Path::to_path_buf),
        };
        work_dir.seed()?;

        Ok(work_dir)
    }

    /// Returns the path of the directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Empties the directory and re-seeds it, so the next execution starts from the same
    /// snapshot the previous one did.
    pub fn reset(&self) -> Result<(), Error> {
        for entry in fs::read_dir(self.path()).map_err(Error::TempDir)? {
            let entry = entry.map_err(Error::TempDir)?;
            remove_entry(&entry.path()).map_err(Error::TempDir)?;
        }

        self.seed()
    }

    fn seed(&self) -> Result<(), Error> {
        let Some(fixtures) = &self.fixtures else {
            return Ok(());
        };

        copy_tree(fixtures, self.path()).map_err(Error::TempDir)
    }
}

fn copy_tree(source: &Path, dest: &Path) -> std::io::Result<()> {
    for entry in walkdir::WalkDir::new(source).min_depth(1) {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Removes a file or directory tree, making directories writable first if needed (a
/// command under test may well have run `chmod 0 some_dir`).
fn remove_entry(path: &Path) -> std::io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.is_dir() {
        return fs::remove_file(path);
    }

    if fs::remove_dir_all(path).is_ok() {
        return Ok(());
    }

    #[cfg(unix)]
    for entry in walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(entry.path(), fs::Permissions::from_mode(0o700));
    }

    fs::remove_dir_all(path)
}
