//! Dataset maintenance tools: `dataset_status`, `dataset_refresh`.

use caepi_core::{DatasetInfo, RegistryService};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Output of `dataset_status`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DatasetStatusOutput {
    /// Cache state: `unloaded`, `rebuilding` or `fresh`.
    pub state: String,
    /// Summary of the loaded dataset, if any.
    pub dataset: Option<DatasetInfo>,
}

/// Report the cache state without triggering a rebuild.
pub async fn status_impl(service: &RegistryService) -> Result<CallToolResult, McpError> {
    let state = service.cache().state_name().await.to_string();
    let dataset = service.info().await;
    json_result(&DatasetStatusOutput { state, dataset })
}

/// Force a rebuild from the remote archive.
pub async fn refresh_impl(service: &RegistryService) -> Result<CallToolResult, McpError> {
    let info = service.refresh().await?;
    tracing::info!(records = info.record_count, dropped = info.dropped_rows, "dataset refreshed on request");
    json_result(&info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{SAMPLE, json, service};

    #[tokio::test]
    async fn test_status_does_not_load() {
        let (_dir, _config, service) = service(Some(SAMPLE));

        let output = json(&status_impl(&service).await.unwrap());
        assert_eq!(output["state"], "unloaded");
        assert!(output["dataset"].is_null());
    }

    #[tokio::test]
    async fn test_status_after_lookup() {
        let (_dir, _config, service) = service(Some(SAMPLE));
        service.current("000123").await.unwrap();

        let output = json(&status_impl(&service).await.unwrap());
        assert_eq!(output["state"], "fresh");
        assert_eq!(output["dataset"]["record_count"], 3);
        assert_eq!(output["dataset"]["distinct_codes"], 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_reports_every_strategy() {
        let (_dir, _config, service) = service(Some(SAMPLE));

        let err = refresh_impl(&service).await.unwrap_err();
        assert!(err.message.contains("ftp-pasv: offline"), "{}", err.message);
        assert!(err.message.contains("ftp-epsv: offline"), "{}", err.message);
    }
}
