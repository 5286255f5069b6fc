//! Single-code lookup tools: `ca_current`, `ca_history`, `ca_validity`.

use caepi_core::{Record, RegistryService};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

/// Parameters for the single-code lookup tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CodeParams {
    /// Certificate number (RegistroCA), e.g. "12345". Surrounding whitespace is ignored.
    pub code: String,
}

/// Output of `ca_current`.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentOutput {
    pub code: String,
    /// The most recent update for the certificate.
    pub record: Record,
}

/// Output of `ca_history`.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryOutput {
    pub code: String,
    pub updates: usize,
    /// Every update in chronological order.
    pub records: Vec<Record>,
}

/// Output of `ca_validity`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValidityOutput {
    pub code: String,
    pub valid: bool,
}

pub async fn current_impl(service: &RegistryService, params: CodeParams) -> Result<CallToolResult, McpError> {
    let code = params.code.trim().to_string();
    match service.current(&code).await? {
        Some(record) => json_result(&CurrentOutput { code, record }),
        None => ToolError::not_found(code).into_result(),
    }
}

pub async fn history_impl(service: &RegistryService, params: CodeParams) -> Result<CallToolResult, McpError> {
    let code = params.code.trim().to_string();
    match service.history(&code).await? {
        Some(records) => json_result(&HistoryOutput { code, updates: records.len(), records }),
        None => ToolError::not_found(code).into_result(),
    }
}

pub async fn validity_impl(service: &RegistryService, params: CodeParams) -> Result<CallToolResult, McpError> {
    let code = params.code.trim().to_string();
    match service.validity(&code).await? {
        Some(valid) => json_result(&ValidityOutput { code, valid }),
        None => ToolError::not_found(code).into_result(),
    }
}
