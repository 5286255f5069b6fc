//! MCP tool implementations.
//!
//! This module contains all tools exposed by the CA registry server.

pub mod dataset;
pub mod export;
pub mod lookup;

use caepi_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

pub use dataset::{refresh_impl, status_impl};
pub use export::{ExportJsonParams, ExportXlsxParams, export_json_impl, export_xlsx_impl};
pub use lookup::{CodeParams, current_impl, history_impl, validity_impl};

/// Pretty-printed JSON success result.
pub(crate) fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value).map_err(Error::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
