//! Tool-level outcomes that are not core errors.
//!
//! Unknown codes are data, not failures: they become an error *result* the
//! caller can read, while build failures stay protocol errors.

use rmcp::model::{CallToolResult, Content, ErrorCode, ErrorData as McpError};
use serde::Serialize;

/// Structured errors for the CA registry tools.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// One or more requested codes are not in the registry.
    #[error("NOT_FOUND: {}", codes.join(", "))]
    NotFound { codes: Vec<String> },

    /// The export blob could not be written under the export directory.
    #[error("EXPORT_WRITE_FAILED: {0}")]
    ExportWrite(String),
}

#[derive(Serialize)]
struct NotFoundPayload<'a> {
    error: &'static str,
    message: String,
    missing: &'a [String],
}

impl ToolError {
    pub fn not_found(code: impl Into<String>) -> Self {
        ToolError::NotFound { codes: vec![code.into()] }
    }

    /// Not-found becomes an error result; everything else a protocol error.
    pub fn into_result(self) -> Result<CallToolResult, McpError> {
        if let ToolError::NotFound { codes } = &self {
            let payload = NotFoundPayload { error: "NOT_FOUND", message: self.to_string(), missing: codes };
            let json = serde_json::to_string_pretty(&payload)
                .map_err(|e| McpError::internal_error(format!("failed to serialize result: {e}"), None))?;
            return Ok(CallToolResult::error(vec![Content::text(json)]));
        }
        Err(self.into())
    }
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let code = match &err {
            ToolError::NotFound { .. } => -32004,
            ToolError::ExportWrite(_) => -32030,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
