//! Batch export of registry records.
//!
//! A batch is all-or-nothing: if any requested code is missing, nothing is
//! rendered and every missing code is reported at once.

use rust_xlsxwriter::Workbook;

use crate::Error;
use crate::dataset::Dataset;
use crate::query::filter_many;
use crate::registry::Record;

/// Default export name when the requested one sanitizes to nothing.
pub const DEFAULT_EXPORT_NAME: &str = "exportacao_cas";

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Result of a batch export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Export<T> {
    Ready(T),
    /// Codes with no match, in input order; no output was produced.
    Missing(Vec<String>),
}

/// Spreadsheet bytes and the file name to offer them under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetExport {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Replace runs of characters outside `[A-Za-z0-9_-]` with `_` and trim
/// surrounding underscores.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() { DEFAULT_EXPORT_NAME.to_string() } else { trimmed.to_string() }
}

/// Render records as an XLSX workbook: a header row from the first record's
/// columns, then one row per record. Null fields are left blank.
pub fn render_spreadsheet(records: &[Record]) -> Result<Vec<u8>, Error> {
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        for (col, name) in first.column_names().iter().enumerate() {
            sheet.write_string(0, col as u16, name.as_str())?;
        }

        for (i, record) in records.iter().enumerate() {
            let row = u32::try_from(i + 1).map_err(|_| Error::Serialization("too many rows for a worksheet".into()))?;
            for (col, value) in record.values().iter().enumerate() {
                if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                    sheet.write_string(row, col as u16, value)?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Spreadsheet export of `codes` under a sanitized `name`.xlsx.
pub fn export_spreadsheet<S: AsRef<str>>(
    dataset: &Dataset, codes: &[S], name: &str,
) -> Result<Export<SpreadsheetExport>, Error> {
    let batch = filter_many(dataset, codes);
    if !batch.is_complete() {
        return Ok(Export::Missing(batch.missing));
    }

    let bytes = render_spreadsheet(&batch.matched)?;
    let file_name = format!("{}.xlsx", sanitize_file_name(name));
    tracing::debug!(file_name = %file_name, rows = batch.matched.len(), bytes = bytes.len(), "rendered spreadsheet");

    Ok(Export::Ready(SpreadsheetExport { file_name, bytes }))
}

/// Structured export: the matched records, unchanged and in order.
pub fn export_json<S: AsRef<str>>(dataset: &Dataset, codes: &[S]) -> Export<Vec<Record>> {
    let batch = filter_many(dataset, codes);
    if batch.is_complete() { Export::Ready(batch.matched) } else { Export::Missing(batch.missing) }
}
