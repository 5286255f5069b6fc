//! Batch export tools: `ca_export_xlsx`, `ca_export_json`.
//!
//! Both reject an empty code list and fail the whole batch, listing every
//! missing code, when any code is unknown.

use std::path::Path;

use caepi_core::export::{DEFAULT_EXPORT_NAME, XLSX_CONTENT_TYPE};
use caepi_core::query::normalize_codes;
use caepi_core::{Error, Export, Record, RegistryService};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

/// Parameters for `ca_export_xlsx`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExportXlsxParams {
    /// Certificate numbers to export. Blank entries and duplicates are ignored.
    pub codes: Vec<String>,

    /// Base name of the spreadsheet file (without extension).
    /// Characters outside `[A-Za-z0-9_-]` are replaced with `_`.
    #[serde(default)]
    pub name: Option<String>,
}

/// Parameters for `ca_export_json`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExportJsonParams {
    /// Certificate numbers to export. Blank entries and duplicates are ignored.
    pub codes: Vec<String>,
}

/// Output of `ca_export_xlsx`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExportXlsxOutput {
    pub file_name: String,
    /// Where the spreadsheet was written.
    pub path: String,
    pub content_type: String,
    pub rows: usize,
    pub bytes: usize,
}

/// Output of `ca_export_json`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportJsonOutput {
    pub count: usize,
    /// Current record per code, in request order.
    pub records: Vec<Record>,
}

fn require_codes(codes: &[String]) -> Result<Vec<String>, Error> {
    let normalized = normalize_codes(codes);
    if normalized.is_empty() {
        return Err(Error::InvalidInput("codes must contain at least one non-empty code".into()));
    }
    Ok(normalized)
}

pub async fn export_xlsx_impl(
    service: &RegistryService, export_dir: &Path, params: ExportXlsxParams,
) -> Result<CallToolResult, McpError> {
    let codes = require_codes(&params.codes)?;
    let name = params.name.as_deref().unwrap_or(DEFAULT_EXPORT_NAME);

    let export = match service.export_spreadsheet(&codes, name).await? {
        Export::Ready(export) => export,
        Export::Missing(codes) => return ToolError::NotFound { codes }.into_result(),
    };

    let path = export_dir.join(&export.file_name);
    let write = async {
        tokio::fs::create_dir_all(export_dir).await?;
        tokio::fs::write(&path, &export.bytes).await
    };
    if let Err(e) = write.await {
        return ToolError::ExportWrite(format!("{}: {e}", path.display())).into_result();
    }

    tracing::info!(path = %path.display(), rows = codes.len(), "spreadsheet exported");
    json_result(&ExportXlsxOutput {
        file_name: export.file_name,
        path: path.display().to_string(),
        content_type: XLSX_CONTENT_TYPE.to_string(),
        rows: codes.len(),
        bytes: export.bytes.len(),
    })
}

pub async fn export_json_impl(service: &RegistryService, params: ExportJsonParams) -> Result<CallToolResult, McpError> {
    let codes = require_codes(&params.codes)?;

    match service.export_json(&codes).await? {
        Export::Ready(records) => json_result(&ExportJsonOutput { count: records.len(), records }),
        Export::Missing(codes) => ToolError::NotFound { codes }.into_result(),
    }
}
