//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

/// File names live directly under `data_dir`; separators would escape it.
fn check_file_name(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if value.contains('/') || value.contains('\\') || value == "." || value == ".." {
        return Err(invalid(field, "must be a bare file name"));
    }
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `ttl_secs` is 0
    /// - `timeout_ms` is less than 100ms or exceeds 10 minutes
    /// - `transfer_timeout_ms` is below `timeout_ms` or exceeds 2 hours
    /// - `ftp_host` or `user_agent` is empty
    /// - any file name is empty or contains a path separator
    /// - `mirror_url` is set but is not an http(s) URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs == 0 {
            return Err(invalid("ttl_secs", "must be greater than 0"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 600_000 {
            return Err(invalid("timeout_ms", "must not exceed 10 minutes (600000ms)"));
        }

        if self.transfer_timeout_ms < self.timeout_ms {
            return Err(invalid("transfer_timeout_ms", "must be at least timeout_ms"));
        }
        if self.transfer_timeout_ms > 7_200_000 {
            return Err(invalid("transfer_timeout_ms", "must not exceed 2 hours (7200000ms)"));
        }

        if self.ftp_host.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "ftp_host".into(),
                hint: "Set CAEPI_FTP_HOST environment variable".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        check_file_name("archive_name", &self.archive_name)?;
        check_file_name("source_file_name", &self.source_file_name)?;
        check_file_name("schema_file_name", &self.schema_file_name)?;
        check_file_name("error_ledger_name", &self.error_ledger_name)?;

        if self.archive_name == self.source_file_name {
            return Err(invalid("archive_name", "must differ from source_file_name"));
        }

        if let Some(mirror) = &self.mirror_url
            && !(mirror.starts_with("http://") || mirror.starts_with("https://"))
        {
            return Err(invalid("mirror_url", "must be an http:// or https:// URL"));
        }

        if self.ttl_secs < 60 {
            tracing::warn!(ttl_secs = self.ttl_secs, "very short ttl_secs; the archive will be re-downloaded often");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_ttl_zero() {
        let config = AppConfig { ttl_secs: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "ttl_secs"));
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_transfer_timeout_below_operation_timeout() {
        let config = AppConfig { timeout_ms: 5_000, transfer_timeout_ms: 1_000, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "transfer_timeout_ms"));
    }

    #[test]
    fn test_validate_transfer_timeout_exceeds_limit() {
        let config = AppConfig { transfer_timeout_ms: 7_200_001, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "transfer_timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { timeout_ms: 600_001, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_missing_host() {
        let config = AppConfig { ftp_host: "  ".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_validate_file_name_with_separator() {
        let config = AppConfig { source_file_name: "../etc/passwd".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "source_file_name"));
    }

    #[test]
    fn test_validate_archive_equals_source() {
        let config = AppConfig { archive_name: "tgg_export_caepi.txt".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "archive_name"));
    }

    #[test]
    fn test_validate_mirror_scheme() {
        let config = AppConfig { mirror_url: Some("ftp://mirror.example/caepi.zip".into()), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "mirror_url"));

        let config = AppConfig { mirror_url: Some("https://mirror.example/caepi.zip".into()), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig { ttl_secs: 1, timeout_ms: 100, ..Default::default() };
        assert!(config.validate().is_ok());

        let config = AppConfig { timeout_ms: 600_000, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
