//! Summaries of a divergence log.
//!
//! A log written by [`DivergenceLog`](crate::DivergenceLog) is split back into its blocks. Each
//! block is flagged by what diverged and filed under a subsystem guessed from the first line of
//! its command, so a long log can be triaged at a glance.

use crate::error::Error;
use crate::logfile::{DIFF_HEADER, NO_STDOUT_DIFF, REFERENCE_HEADER, SEPARATOR, UNDER_TEST_HEADER};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;

/// Default number of entries listed by [`LogSummary::write_to`].
pub const DEFAULT_MAX_ENTRIES: usize = 200;

/// Area of shell behavior a divergence most likely belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subsystem {
    /// The `env` builtin.
    Env,
    /// The `export` builtin.
    Export,
    /// The `unset` builtin.
    Unset,
    /// `echo` and parameter expansion.
    Expansion,
    /// Pathname expansion.
    Wildcard,
    /// The `cd` builtin.
    Cd,
    /// Anything else.
    Other,
}

impl Subsystem {
    /// Classifies a command by its first line. Rules are tried in declaration order.
    pub fn classify(command: &str) -> Self {
        let first = command.lines().next().unwrap_or_default();

        if first.starts_with("env") {
            Self::Env
        } else if first.starts_with("export") {
            Self::Export
        } else if first.starts_with("unset") {
            Self::Unset
        } else if first.starts_with("echo") || first.contains('$') {
            Self::Expansion
        } else if first.contains(['*', '?', '[']) {
            Self::Wildcard
        } else if first.starts_with("cd") {
            Self::Cd
        } else {
            Self::Other
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Export => "export",
            Self::Unset => "unset",
            Self::Expansion => "expansion",
            Self::Wildcard => "wildcard",
            Self::Cd => "cd",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a logged divergence differed on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DivergenceFlags {
    /// The log carries a non-empty stdout diff.
    pub stdout_diff: bool,
    /// The two exit codes (or their timeout marks) differ.
    pub exit_mismatch: bool,
    /// The shell under test wrote to stderr.
    pub stderr: bool,
}

impl fmt::Display for DivergenceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = [
            (self.stdout_diff, "STDOUT_DIFF"),
            (self.exit_mismatch, "EXIT_MISMATCH"),
            (self.stderr, "STDERR"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();

        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// One block of a divergence log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggedDivergence {
    /// The `Test #` number of the block.
    pub ordinal: usize,
    /// The command text, as logged.
    pub command: String,
    /// Where the divergence was filed.
    pub subsystem: Subsystem,
    /// What differed.
    pub flags: DivergenceFlags,
}

/// The divergences found in a log, ordered by test number.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogSummary {
    /// Parsed blocks.
    pub entries: Vec<LoggedDivergence>,
}

impl LogSummary {
    /// Reads and parses the log at `path`.
    pub fn read(path: &Path) -> Result<Self, Error> {
        let bytes = std::fs::read(path).map_err(|e| Error::LogUnreadable(path.to_owned(), e))?;
        let summary = Self::parse(&String::from_utf8_lossy(&bytes));

        tracing::debug!(
            target: "load",
            "parsed {} divergence(s) from {}",
            summary.entries.len(),
            path.display()
        );

        Ok(summary)
    }

    /// Parses log text. Blocks without a `Test #` line are ignored.
    pub fn parse(text: &str) -> Self {
        let mut blocks = vec![];
        let mut current = vec![];

        for line in text.lines() {
            if line == SEPARATOR {
                blocks.push(std::mem::take(&mut current));
            } else {
                current.push(line);
            }
        }
        blocks.push(current);

        let mut entries: Vec<_> = blocks.iter().filter_map(|b| parse_block(b)).collect();
        entries.sort_by_key(|e| e.ordinal);

        Self { entries }
    }

    /// Counts entries per subsystem.
    pub fn by_subsystem(&self) -> BTreeMap<Subsystem, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.subsystem).or_insert(0) += 1;
        }
        counts
    }

    /// Writes the totals, then up to `max_entries` entries, one per line.
    pub fn write_to(&self, w: &mut impl Write, max_entries: usize) -> std::io::Result<()> {
        writeln!(w, "COUNT {}", self.entries.len())?;

        let totals: Vec<_> = self
            .by_subsystem()
            .into_iter()
            .map(|(subsystem, count)| std::format!("{subsystem}={count}"))
            .collect();
        writeln!(w, "BY_SUBSYSTEM {}", totals.join(" "))?;

        for entry in self.entries.iter().take(max_entries) {
            let first_line = entry.command.lines().next().unwrap_or_default();
            writeln!(
                w,
                "Test#{}: {} {} -- cmd: {first_line}",
                entry.ordinal, entry.subsystem, entry.flags
            )?;
        }

        Ok(())
    }
}

fn parse_block(lines: &[&str]) -> Option<LoggedDivergence> {
    let ordinal = lines
        .iter()
        .find_map(|l| l.strip_prefix("Test #"))?
        .trim()
        .parse()
        .ok()?;

    let find = |header: &str| lines.iter().position(|l| *l == header);
    let reference = find(REFERENCE_HEADER);
    let under_test = find(UNDER_TEST_HEADER);
    let diff = find(DIFF_HEADER);

    let command = find("COMMAND:")
        .and_then(|start| {
            let end = reference
                .or(under_test)
                .or(diff)
                .unwrap_or(lines.len());
            lines.get(start + 1..end)
        })
        .map_or_else(String::new, |c| c.join("\n").trim().to_owned());

    let exit_code = |header: Option<usize>| {
        header
            .and_then(|i| lines.get(i + 1))
            .and_then(|l| l.strip_prefix("EXIT CODE:"))
            .map(str::trim)
    };
    let exit_mismatch = matches!(
        (exit_code(reference), exit_code(under_test)),
        (Some(r), Some(u)) if r != u
    );

    let stderr = under_test
        .and_then(|start| {
            let end = diff.filter(|d| *d > start).unwrap_or(lines.len());
            let section = lines.get(start..end)?;
            let body = section.iter().position(|l| *l == "STDERR:")?;
            section.get(body + 1..)
        })
        .is_some_and(|body| body.iter().any(|l| !l.trim().is_empty()));

    let stdout_diff = diff
        .and_then(|d| lines.get(d + 1..))
        .is_some_and(|body| {
            !body.contains(&NO_STDOUT_DIFF) && body.iter().any(|l| !l.trim().is_empty())
        });

    Some(LoggedDivergence {
        ordinal,
        subsystem: Subsystem::classify(&command),
        command,
        flags: DivergenceFlags {
            stdout_diff,
            exit_mismatch,
            stderr,
        },
    })
}
