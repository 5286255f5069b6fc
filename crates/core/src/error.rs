//! Unified error types for the CA registry service.
//!
//! Build failures (schema, acquisition, extraction, dataset) are kept apart
//! from not-found results, which are plain `Option`s in the query layer.

use rmcp::model::{ErrorCode, ErrorData as McpError};

use crate::config::ConfigError;

/// Unified error types for the CA registry service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty code list).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded or validated.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    /// Column schema file is missing or malformed.
    #[error("SCHEMA_ERROR: {0}")]
    Schema(String),

    /// Every transport strategy failed; one reason per strategy, in order.
    #[error("ACQUISITION_FAILED: {}", reasons.join(" | "))]
    Acquisition { reasons: Vec<String> },

    /// The downloaded archive could not be decoded.
    #[error("EXTRACTION_FAILED: {0}")]
    Extraction(String),

    /// Parsing left no usable rows.
    #[error("DATASET_BUILD_FAILED: {0}")]
    DatasetBuild(String),

    /// Export encoding failed.
    #[error("SERIALIZATION_FAILED: {0}")]
    Serialization(String),

    /// Filesystem operation failed outside a more specific stage.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a failure to build the dataset, as opposed to a
    /// problem with the caller's input.
    pub fn is_build_failure(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Schema(_)
                | Error::Acquisition { .. }
                | Error::Extraction(_)
                | Error::DatasetBuild(_)
                | Error::Io(_)
        )
    }
}

impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::Config(_) => -32020,
            Error::Schema(_) => -32021,
            Error::Acquisition { .. } => -32022,
            Error::Extraction(_) => -32023,
            Error::DatasetBuild(_) => -32024,
            Error::Serialization(_) => -32025,
            Error::Io(_) => -32026,
        };
        let message = match &err {
            Error::InvalidInput(msg) => msg.clone(),
            other => other.to_string(),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
