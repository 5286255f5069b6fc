//! Query surface over the cached dataset.
//!
//! Every call first asks the [`DatasetCache`] for the current dataset (which
//! may rebuild it), then delegates to the query or export engine.

use std::sync::Arc;

use crate::Error;
use crate::dataset::{DatasetCache, DatasetInfo};
use crate::export::{self, Export, SpreadsheetExport};
use crate::query;
use crate::registry::Record;

/// Shared handle to the registry; cheap to clone.
#[derive(Clone)]
pub struct RegistryService {
    cache: Arc<DatasetCache>,
}

impl RegistryService {
    pub fn new(cache: Arc<DatasetCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &DatasetCache {
        &self.cache
    }

    /// Current record for `code`; `Ok(None)` when the code is unknown.
    pub async fn current(&self, code: &str) -> Result<Option<Record>, Error> {
        let dataset = self.cache.get_dataset().await?;
        Ok(query::current_for(&dataset, code))
    }

    /// Every update for `code` in chronological order.
    pub async fn history(&self, code: &str) -> Result<Option<Vec<Record>>, Error> {
        let dataset = self.cache.get_dataset().await?;
        Ok(query::updates_for(&dataset, code))
    }

    pub async fn validity(&self, code: &str) -> Result<Option<bool>, Error> {
        let dataset = self.cache.get_dataset().await?;
        Ok(query::is_valid(&dataset, code))
    }

    pub async fn export_spreadsheet(&self, codes: &[String], name: &str) -> Result<Export<SpreadsheetExport>, Error> {
        let dataset = self.cache.get_dataset().await?;
        export::export_spreadsheet(&dataset, codes, name)
    }

    pub async fn export_json(&self, codes: &[String]) -> Result<Export<Vec<Record>>, Error> {
        let dataset = self.cache.get_dataset().await?;
        Ok(export::export_json(&dataset, codes))
    }

    /// Summary of the loaded dataset; never triggers a rebuild.
    pub async fn info(&self) -> Option<DatasetInfo> {
        self.cache.info().await
    }

    /// Force a rebuild from the remote source.
    pub async fn refresh(&self) -> Result<DatasetInfo, Error> {
        Ok(self.cache.refresh().await?.info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dataset::SnapshotSource;
    use crate::registry::schema::tests::REGISTRY_COLUMNS;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Unreachable;

    #[async_trait]
    impl SnapshotSource for Unreachable {
        async fn refresh(&self) -> Result<(), Error> {
            Err(Error::Acquisition { reasons: vec!["ftp-pasv: unreachable".into()] })
        }
    }

    fn service_with_raw(raw: Option<&str>) -> (TempDir, RegistryService) {
        let dir = TempDir::new().unwrap();
        let config = AppConfig { data_dir: dir.path().to_path_buf(), ..Default::default() };
        std::fs::write(config.schema_path(), REGISTRY_COLUMNS.join(",")).unwrap();
        if let Some(raw) = raw {
            std::fs::write(config.source_path(), raw).unwrap();
        }
        let cache = Arc::new(DatasetCache::new(&config, Arc::new(Unreachable)));
        (dir, RegistryService::new(cache))
    }

    #[tokio::test]
    async fn test_lookups_against_fresh_file() {
        let (_dir, service) = service_with_raw(Some("000123|2020|VENCIDO\n000123|2030|VÁLIDO\n"));

        assert_eq!(service.history("000123").await.unwrap().unwrap().len(), 2);
        assert_eq!(service.current("000123").await.unwrap().unwrap().get("DataValidade"), Some("2030"));
        assert_eq!(service.validity("000123").await.unwrap(), Some(true));
        assert_eq!(service.validity("999999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_build_failure_is_not_not_found() {
        let (_dir, service) = service_with_raw(None);

        let err = service.current("000123").await.unwrap_err();
        assert!(err.is_build_failure());
        assert!(service.info().await.is_none());
    }

    #[tokio::test]
    async fn test_batch_export_with_missing_code_fails_whole_batch() {
        let (_dir, service) = service_with_raw(Some("000123|2030|VÁLIDO\n"));
        let codes = vec!["000123".to_string(), "999999".to_string()];

        let result = service.export_spreadsheet(&codes, "relatorio").await.unwrap();
        assert_eq!(result, Export::Missing(vec!["999999".to_string()]));

        let result = service.export_json(&codes).await.unwrap();
        assert_eq!(result, Export::Missing(vec!["999999".to_string()]));
    }
}
