//! Mapping table: one row per executed case.

use crate::comparison::Verdict;
use crate::error::Error;
use crate::logfile::ensure_parent_exists;
use crate::reporting::CaseResult;
use std::fs::File;
use std::path::PathBuf;

#[derive(serde::Serialize)]
struct MappingRow<'a> {
    id: u64,
    command: &'a str,
    reference_exit: i32,
    under_test_exit: i32,
    #[serde(rename = "match")]
    matched: u8,
}

/// Writes a comma-delimited table with columns
/// `id,command,reference_exit,under_test_exit,match`.
pub struct MappingWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl MappingWriter {
    /// Creates (or truncates) the table at `path`. The containing directory must exist.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        ensure_parent_exists(&path)?;

        let writer = csv::Writer::from_path(&path)?;
        tracing::debug!(target: "runner", "writing mapping table to {}", path.display());

        Ok(Self { path, writer })
    }

    /// Appends the row for one case.
    pub fn record(&mut self, result: &CaseResult) -> Result<(), Error> {
        self.writer.serialize(MappingRow {
            id: result.case.id,
            command: &result.case.text,
            reference_exit: result.reference.exit_code,
            under_test_exit: result.under_test.exit_code,
            matched: u8::from(result.verdict() == Verdict::Matched),
        })?;

        Ok(())
    }

    /// Flushes the table and returns its path.
    pub fn finish(mut self) -> Result<PathBuf, Error> {
        self.writer.flush()?;
        Ok(self.path)
    }
}
