//! Loading of case tables.
//!
//! A case table is a delimited text file with one case per row, in one of two shapes:
//!
//! * `id, kind, text` (any further columns are ignored)
//! * `id, text` (the kind defaults to `generated`)
//!
//! The delimiter is `;` if the first line contains one, `,` otherwise. A first row in which
//! any cell contains `test` (in any case) is taken to be a header and skipped.

use crate::case::{Case, GENERATED_KIND, UNCATEGORIZED_KIND, normalize_text};
use crate::error::Error;
use std::path::PathBuf;

/// One row of a case table, before normalization.
#[derive(Debug, PartialEq, Eq)]
enum Row<'a> {
    /// `id, kind, text, ...`
    WithKind {
        id: &'a str,
        kind: &'a str,
        text: &'a str,
    },
    /// `id, text`
    Bare { id: &'a str, text: &'a str },
}

impl<'a> Row<'a> {
    fn parse(record: &'a csv::StringRecord) -> Option<Self> {
        match (record.get(0), record.get(1), record.get(2)) {
            (Some(id), Some(kind), Some(text)) => Some(Self::WithKind { id, kind, text }),
            (Some(id), Some(text), None) => Some(Self::Bare { id, text }),
            _ => None,
        }
    }

    /// Turns the row into a case; `ordinal` stands in for an id that isn't a plain integer.
    fn into_case(self, ordinal: u64) -> Option<Case> {
        let (id, kind, text) = match self {
            Self::WithKind { id, kind, text } => {
                let kind = kind.trim();
                let kind = if kind.is_empty() {
                    UNCATEGORIZED_KIND
                } else {
                    kind
                };
                (id, kind, text)
            }
            Self::Bare { id, text } => (id, GENERATED_KIND, text),
        };

        let text = normalize_text(text);
        if text.is_empty() {
            return None;
        }

        Some(Case {
            id: parse_id(id).unwrap_or(ordinal),
            kind: kind.to_owned(),
            text,
        })
    }
}

/// Loads cases from a case table on disk.
pub struct CaseLoader {
    path: PathBuf,
}

impl CaseLoader {
    /// Creates a loader for the table at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads all cases, in file order.
    ///
    /// A missing or empty file yields no cases; it's up to the caller to decide whether
    /// that is a problem. A file that exists but can't be read is an error.
    pub fn load(&self) -> Result<Vec<Case>, Error> {
        if !self.path.exists() {
            tracing::debug!(target: "load", "case source {} does not exist", self.path.display());
            return Ok(vec![]);
        }

        let contents = std::fs::read(&self.path)
            .map_err(|e| Error::CaseSourceUnreadable(self.path.clone(), e))?;

        let cases = parse_cases(&contents)?;

        tracing::debug!(
            target: "load",
            "loaded {} case(s) from {}",
            cases.len(),
            self.path.display()
        );

        Ok(cases)
    }
}

/// Parses a case table held in memory.
pub(crate) fn parse_cases(contents: &[u8]) -> Result<Vec<Case>, Error> {
    let first_line = contents.split(|b| *b == b'\n').next().unwrap_or_default();
    if first_line.is_empty() && contents.len() <= 1 {
        return Ok(vec![]);
    }

    let delimiter = if first_line.contains(&b';') { b';' } else { b',' };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(contents);

    let mut cases = vec![];
    let mut record = csv::StringRecord::new();
    let mut first_row = true;
    let mut next_ordinal: u64 = 0;

    while reader.read_record(&mut record)? {
        // The record's position is where the reader stopped after the previous record, so
        // any blank rows in between come first.
        let resumed_at = record.position().map_or(0, csv::Position::byte);
        let ordinal = next_ordinal + blank_rows_at(contents, resumed_at);
        next_ordinal = ordinal + 1;

        if std::mem::take(&mut first_row) && is_header(&record) {
            tracing::debug!(target: "load", "skipping header row");
            continue;
        }

        let Some(row) = Row::parse(&record) else {
            tracing::debug!(target: "load", row = ordinal, "skipping row with too few cells");
            continue;
        };

        match row.into_case(ordinal) {
            Some(case) => cases.push(case),
            None => tracing::debug!(target: "load", row = ordinal, "skipping row with empty text"),
        }
    }

    Ok(cases)
}

/// Counts the empty rows starting at byte `offset`, the point where the csv reader resumed.
fn blank_rows_at(contents: &[u8], offset: u64) -> u64 {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let mut rest = contents.get(offset..).unwrap_or_default();

    // A `\r\n` terminator is consumed up to its `\r`; its `\n` ends no row.
    if offset > 0 && contents.get(offset - 1) == Some(&b'\r') {
        rest = rest.strip_prefix(b"\n").unwrap_or(rest);
    }

    let mut blanks = 0;
    while let Some(after) = rest
        .strip_prefix(b"\r\n")
        .or_else(|| rest.strip_prefix(b"\n"))
        .or_else(|| rest.strip_prefix(b"\r"))
    {
        rest = after;
        blanks += 1;
    }

    blanks
}

/// Keeps only the cases of the given kind.
pub fn filter_by_kind(cases: Vec<Case>, kind: &str) -> Vec<Case> {
    cases.into_iter().filter(|c| c.kind == kind).collect()
}

fn is_header(record: &csv::StringRecord) -> bool {
    record
        .iter()
        .any(|cell| cell.to_lowercase().contains("test"))
}

fn parse_id(id: &str) -> Option<u64> {
    let id = id.trim();
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    id.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use pretty_assertions::assert_eq;

    fn load_str(contents: &str) -> Vec<Case> {
        parse_cases(contents.as_bytes()).unwrap()
    }

    #[test]
    fn three_column_semicolon_table() {
        let cases = load_str("id;kind;test\n1;echo;echo hello\n2;exit;exit 3\n");
        assert_eq!(
            cases,
            vec![
                Case::new(1, "echo", "echo hello"),
                Case::new(2, "exit", "exit 3"),
            ]
        );
    }

    #[test]
    fn two_column_comma_table_defaults_kind() {
        let cases = load_str("id,test\n10,echo a\n11,ls\n");
        assert_eq!(
            cases,
            vec![
                Case::new(10, GENERATED_KIND, "echo a"),
                Case::new(11, GENERATED_KIND, "ls"),
            ]
        );
    }

    #[test]
    fn header_detection_is_case_insensitive() {
        let cases = load_str("ID,Kind,TEST\n1,k,true\n");
        assert_eq!(cases, vec![Case::new(1, "k", "true")]);
    }

    #[test]
    fn header_only_checked_on_first_row() {
        let cases = load_str("1,test,echo one\n2,test,echo two\n");
        assert_eq!(cases, vec![Case::new(2, "test", "echo two")]);
    }

    #[test]
    fn extra_columns_are_ignored() {
        let cases = load_str("1;kind;echo x;ignored;also ignored\n");
        assert_eq!(cases, vec![Case::new(1, "kind", "echo x")]);
    }

    #[test]
    fn blank_kind_becomes_uncategorized() {
        let cases = load_str("1;  ;pwd\n");
        assert_eq!(cases, vec![Case::new(1, UNCATEGORIZED_KIND, "pwd")]);
    }

    #[test]
    fn carriage_returns_and_whitespace_are_stripped() {
        let cases = load_str("1,k,  echo hi  \r\n2,echo there\r\n");
        assert_eq!(cases[0].text, "echo hi");
        assert_eq!(cases[1].text, "echo there");
    }

    #[test]
    fn rows_with_empty_text_or_too_few_cells_are_skipped() {
        let cases = load_str("1,k,   \nlonely\n\n2,k,echo ok\n");
        assert_eq!(cases, vec![Case::new(2, "k", "echo ok")]);
    }

    #[test]
    fn non_numeric_id_falls_back_to_row_ordinal() {
        let cases = load_str("id,kind,test\nabc,k,echo a\n-4,k,echo b\n");
        assert_eq!(cases[0].id, 1);
        assert_eq!(cases[1].id, 2);
    }

    #[test]
    fn ordinal_counts_rows_not_lines() {
        let cases = load_str(
            "id;kind;test\nx;k;\"printf 'a\nb\nc'\"\n\ny;k;echo after\nz;k;echo last\n",
        );
        let ids: Vec<_> = cases.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[test]
    fn ordinal_counts_blank_rows_with_crlf_endings() {
        let cases = load_str("id,kind,test\r\nabc,k,echo a\r\n\r\ndef,k,echo b\r\n");
        let ids: Vec<_> = cases.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn duplicate_ids_are_kept() {
        let cases = load_str("5,echo a\n5,echo b\n");
        assert_eq!(cases.len(), 2);
        assert!(cases.iter().all(|c| c.id == 5));
    }

    #[test]
    fn quoted_cells_may_contain_delimiters_and_newlines() {
        let cases = load_str("1;k;\"echo a; echo b\"\n2,k;\"printf 'x\ny'\"\n");
        assert_eq!(cases[0].text, "echo a; echo b");
        assert_eq!(cases[1].text, "printf 'x\ny'");
        assert_eq!(cases[1].id, 1);
    }

    #[test]
    fn empty_input_yields_no_cases() {
        assert!(load_str("").is_empty());
        assert!(load_str("\n").is_empty());
    }

    #[test]
    fn missing_file_yields_no_cases() {
        let loader = CaseLoader::new("/nonexistent/shelldiff/cases.csv");
        assert!(loader.load().unwrap().is_empty());
    }

    #[test]
    fn loads_from_file() {
        let dir = assert_fs::TempDir::new().unwrap();
        let table = dir.child("cases.csv");
        table.write_str("id;kind;test\n1;echo;echo hello\n").unwrap();

        let cases = CaseLoader::new(table.path()).load().unwrap();
        assert_eq!(cases, vec![Case::new(1, "echo", "echo hello")]);
    }

    #[test]
    fn filter_keeps_matching_kind_in_order() {
        let cases = vec![
            Case::new(1, "manual", "a"),
            Case::new(2, "generated", "b"),
            Case::new(3, "manual", "c"),
        ];

        let ids: Vec<_> = filter_by_kind(cases, "manual").iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
