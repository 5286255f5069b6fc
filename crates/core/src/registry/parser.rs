//! Pipe-delimited registry parser with row-level recovery.
//!
//! ### Line Grammar
//! - Fields are separated by `|`; a field starting with `"` is quoted and may
//!   contain `|` literally, with `""` standing for one quote.
//! - Rows with fewer fields than the schema are padded with nulls.
//!
//! ### Recovery
//! Free-text columns in the published file sometimes embed ` |` sequences.
//! When a row has too many fields it is re-split treating `|` as a delimiter
//! only when not preceded by a space. Rows still too wide are dropped and
//! written to the error ledger.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::Error;
use crate::dataset::fingerprint::Fingerprinter;

use super::ledger::ErrorLedger;
use super::record::Record;
use super::schema::ColumnSchema;

const DELIMITER: char = '|';
const QUOTE: char = '"';

/// Result of parsing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Column values, at most schema-length of them.
    Retained(Vec<String>),
    /// The line could not be reduced to the schema length.
    Dropped,
}

/// Rows retained from a full pass over the raw file.
#[derive(Debug)]
pub struct ParsedRows {
    pub records: Vec<Record>,
    pub dropped: usize,
    pub header_skipped: bool,
    /// SHA-256 of the raw file bytes.
    pub fingerprint: String,
}

/// Split on `|`, honouring double-quoted fields.
pub fn split_quoted(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut at_field_start = true;
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == QUOTE {
                if chars.peek() == Some(&QUOTE) {
                    chars.next();
                    field.push(QUOTE);
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            DELIMITER => {
                fields.push(std::mem::take(&mut field));
                at_field_start = true;
                continue;
            }
            QUOTE if at_field_start => in_quotes = true,
            _ => field.push(c),
        }
        at_field_start = false;
    }

    fields.push(field);
    fields
}

/// Split on `|` only where the delimiter is not preceded by a space.
pub fn split_unspaced(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut prev = None;

    for (i, c) in line.char_indices() {
        if c == DELIMITER && prev != Some(' ') {
            fields.push(line[start..i].to_string());
            start = i + c.len_utf8();
        }
        prev = Some(c);
    }

    fields.push(line[start..].to_string());
    fields
}

/// Whether a row's first column looks like the file's header label.
fn looks_like_header(values: &[Option<String>]) -> bool {
    values
        .first()
        .and_then(Option::as_deref)
        .is_some_and(|first| first.to_lowercase().contains("registro"))
}

/// Streaming parser bound to one column schema.
#[derive(Debug, Clone)]
pub struct RecordParser {
    schema: ColumnSchema,
}

impl RecordParser {
    pub fn new(schema: ColumnSchema) -> Self {
        Self { schema }
    }

    /// Classify one non-empty line.
    pub fn parse_line(&self, line: &str) -> RowOutcome {
        let width = self.schema.len();
        let columns = split_quoted(line);
        if columns.len() <= width {
            return RowOutcome::Retained(columns);
        }

        let recovered = split_unspaced(line);
        if recovered.len() <= width {
            tracing::trace!(raw = columns.len(), recovered = recovered.len(), "recovered over-wide row");
            RowOutcome::Retained(recovered)
        } else {
            RowOutcome::Dropped
        }
    }

    /// Parse the raw file at `path`, sending unrecoverable lines to `ledger`.
    ///
    /// The ledger is flushed once after the pass, only if rows were dropped.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, `Error::DatasetBuild`
    /// if no usable row remains.
    pub fn parse_file(&self, path: impl AsRef<Path>, ledger: &mut ErrorLedger) -> Result<ParsedRows, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::DatasetBuild(format!("source file not found: {}", path.display()))
            } else {
                Error::Io(e)
            }
        })?;

        let mut reader = BufReader::with_capacity(1 << 20, file);
        let mut fingerprint = Fingerprinter::new();
        let mut buf = Vec::with_capacity(1024);
        let mut rows: Vec<Vec<Option<String>>> = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            fingerprint.update(&buf);

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }

            match self.parse_line(line) {
                RowOutcome::Retained(columns) => rows.push(columns.into_iter().map(Some).collect()),
                RowOutcome::Dropped => {
                    tracing::debug!(line = %line, "dropping unrecoverable row");
                    ledger.record(line);
                }
            }
        }

        let header_skipped = rows.first().is_some_and(|first| looks_like_header(first));
        if header_skipped {
            rows.remove(0);
        }

        let dropped = ledger.len();
        if dropped > 0 {
            ledger.flush()?;
            tracing::warn!(dropped, ledger = %ledger.path().display(), "unrecoverable rows written to error ledger");
        }

        if rows.is_empty() {
            return Err(Error::DatasetBuild(format!("no usable rows in {}", path.display())));
        }

        let records: Vec<Record> = rows
            .into_iter()
            .map(|values| Record::new(self.schema.clone(), values))
            .collect();

        tracing::info!(retained = records.len(), dropped, header_skipped, "parsed registry file");

        Ok(ParsedRows { records, dropped, header_skipped, fingerprint: fingerprint.finish() })
    }
}
