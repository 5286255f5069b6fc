//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::path::PathBuf;

use caepi_core::RegistryService;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::tools::{
    CodeParams, ExportJsonParams, ExportXlsxParams, current_impl, export_json_impl, export_xlsx_impl, history_impl,
    refresh_impl, status_impl, validity_impl,
};

/// The main MCP server handler for the CA registry.
#[derive(Clone)]
pub struct CaepiServer {
    tool_router: ToolRouter<Self>,
    service: RegistryService,
    export_dir: PathBuf,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl CaepiServer {
    /// Create a new server handler over a shared registry service.
    pub fn new(service: RegistryService, export_dir: impl Into<PathBuf>) -> Self {
        Self { tool_router: Self::tool_router(), service, export_dir: export_dir.into() }
    }

    #[tool(description = "Current (most recent) registry record for a CA certificate number.")]
    async fn ca_current(&self, params: Parameters<CodeParams>) -> Result<CallToolResult, McpError> {
        current_impl(&self.service, params.0).await
    }

    #[tool(description = "Full update history of a CA certificate number, oldest first.")]
    async fn ca_history(&self, params: Parameters<CodeParams>) -> Result<CallToolResult, McpError> {
        history_impl(&self.service, params.0).await
    }

    #[tool(description = "Whether a CA certificate is currently valid (status VÁLIDO).")]
    async fn ca_validity(&self, params: Parameters<CodeParams>) -> Result<CallToolResult, McpError> {
        validity_impl(&self.service, params.0).await
    }

    /// Batch spreadsheet export.
    ///
    /// The workbook is written under the configured export directory; if any
    /// code is unknown, nothing is written and all unknown codes are listed.
    #[tool(
        description = "Export the current records of several CA numbers to an XLSX file. Fails listing every unknown code."
    )]
    async fn ca_export_xlsx(&self, params: Parameters<ExportXlsxParams>) -> Result<CallToolResult, McpError> {
        export_xlsx_impl(&self.service, &self.export_dir, params.0).await
    }

    #[tool(description = "Export the current records of several CA numbers as JSON. Fails listing every unknown code.")]
    async fn ca_export_json(&self, params: Parameters<ExportJsonParams>) -> Result<CallToolResult, McpError> {
        export_json_impl(&self.service, params.0).await
    }

    #[tool(description = "Report the registry cache state and loaded dataset summary without downloading anything.")]
    async fn dataset_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.service).await
    }

    #[tool(description = "Download and rebuild the registry dataset now, regardless of its age.")]
    async fn dataset_refresh(&self) -> Result<CallToolResult, McpError> {
        refresh_impl(&self.service).await
    }
}

impl ServerHandler for CaepiServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "caepi-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Lookups over the Brazilian CA (Certificado de Aprovação) safety-equipment registry. \
                 The dataset is downloaded on first use and refreshed every 24 hours."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
