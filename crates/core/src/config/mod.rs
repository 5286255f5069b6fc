//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CAEPI_*)
//! 2. TOML config file (if CAEPI_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CAEPI_*)
/// 2. TOML config file (if CAEPI_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the raw dataset, the scratch archive, the column
    /// schema file and the error ledger.
    ///
    /// Set via CAEPI_DATA_DIR environment variable.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory where spreadsheet exports are written.
    ///
    /// Set via CAEPI_EXPORT_DIR environment variable.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// FTP host publishing the registry archive.
    #[serde(default = "default_ftp_host")]
    pub ftp_host: String,

    #[serde(default = "default_ftp_port")]
    pub ftp_port: u16,

    /// Remote directory holding the archive.
    #[serde(default = "default_ftp_path")]
    pub ftp_path: String,

    /// Archive file name, both remote and as the local scratch file.
    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    /// Raw dataset file name inside the archive.
    #[serde(default = "default_source_file_name")]
    pub source_file_name: String,

    #[serde(default = "default_schema_file_name")]
    pub schema_file_name: String,

    #[serde(default = "default_error_ledger_name")]
    pub error_ledger_name: String,

    /// Freshness window of the raw dataset file, in seconds.
    ///
    /// Set via CAEPI_TTL_SECS environment variable.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Timeout per network operation in milliseconds.
    ///
    /// Set via CAEPI_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound on one transport strategy's whole download in milliseconds.
    ///
    /// Set via CAEPI_TRANSFER_TIMEOUT_MS environment variable.
    #[serde(default = "default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,

    /// Optional HTTP(S) mirror of the archive, tried after the FTP strategies.
    ///
    /// Set via CAEPI_MIRROR_URL environment variable.
    #[serde(default)]
    pub mirror_url: Option<String>,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./exports")
}

fn default_ftp_host() -> String {
    "ftp.mtps.gov.br".into()
}

fn default_ftp_port() -> u16 {
    21
}

fn default_ftp_path() -> String {
    "portal/fiscalizacao/seguranca-e-saude-no-trabalho/caepi/".into()
}

fn default_archive_name() -> String {
    "tgg_export_caepi.zip".into()
}

fn default_source_file_name() -> String {
    "tgg_export_caepi.txt".into()
}

fn default_schema_file_name() -> String {
    "config_nomes_colunas.csv".into()
}

fn default_error_ledger_name() -> String {
    "CAs_com_erros.txt".into()
}

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_transfer_timeout_ms() -> u64 {
    15 * 60 * 1000
}

fn default_user_agent() -> String {
    "caepi/0.1".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            export_dir: default_export_dir(),
            ftp_host: default_ftp_host(),
            ftp_port: default_ftp_port(),
            ftp_path: default_ftp_path(),
            archive_name: default_archive_name(),
            source_file_name: default_source_file_name(),
            schema_file_name: default_schema_file_name(),
            error_ledger_name: default_error_ledger_name(),
            ttl_secs: default_ttl_secs(),
            timeout_ms: default_timeout_ms(),
            transfer_timeout_ms: default_transfer_timeout_ms(),
            mirror_url: None,
            user_agent: default_user_agent(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Total time one transport strategy may spend on a download.
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    /// Freshness window of the raw dataset file.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn source_path(&self) -> PathBuf {
        self.data_dir.join(&self.source_file_name)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join(&self.archive_name)
    }

    pub fn schema_path(&self) -> PathBuf {
        self.data_dir.join(&self.schema_file_name)
    }

    pub fn error_ledger_path(&self) -> PathBuf {
        self.data_dir.join(&self.error_ledger_name)
    }

    /// Full `ftp://` URL of the remote archive.
    pub fn ftp_url(&self) -> String {
        format!(
            "ftp://{}/{}/{}",
            self.ftp_host,
            self.ftp_path.trim_matches('/'),
            self.archive_name
        )
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `CAEPI_`
    /// 2. TOML file from `CAEPI_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("CAEPI_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CAEPI_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.ftp_host, "ftp.mtps.gov.br");
        assert_eq!(config.ftp_port, 21);
        assert_eq!(config.archive_name, "tgg_export_caepi.zip");
        assert_eq!(config.source_file_name, "tgg_export_caepi.txt");
        assert_eq!(config.ttl_secs, 86_400);
        assert_eq!(config.timeout_ms, 120_000);
        assert!(config.mirror_url.is_none());
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert_eq!(config.transfer_timeout(), Duration::from_secs(15 * 60));
        assert_eq!(config.ttl(), Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn test_paths_are_under_data_dir() {
        let config = AppConfig { data_dir: PathBuf::from("/srv/caepi"), ..Default::default() };
        assert_eq!(config.source_path(), PathBuf::from("/srv/caepi/tgg_export_caepi.txt"));
        assert_eq!(config.archive_path(), PathBuf::from("/srv/caepi/tgg_export_caepi.zip"));
        assert_eq!(config.schema_path(), PathBuf::from("/srv/caepi/config_nomes_colunas.csv"));
        assert_eq!(config.error_ledger_path(), PathBuf::from("/srv/caepi/CAs_com_erros.txt"));
    }

    #[test]
    fn test_ftp_url() {
        let config = AppConfig::default();
        assert_eq!(
            config.ftp_url(),
            "ftp://ftp.mtps.gov.br/portal/fiscalizacao/seguranca-e-saude-no-trabalho/caepi/tgg_export_caepi.zip"
        );
    }
}
