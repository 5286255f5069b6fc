//! Remote snapshot source: download, extract, clean up.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use caepi_core::config::ConfigError;
use caepi_core::{AppConfig, Error, SnapshotSource};

use crate::acquire::{
    AcquisitionManager, DataChannelMode, FtpStrategy, FtpTarget, HttpMirrorStrategy, remove_if_exists,
};
use crate::archive::ArchiveExtractor;

/// Refreshes the raw dataset file from the remote archive.
///
/// Transport order is FTP passive, FTP extended passive, then the HTTP
/// mirror when one is configured.
pub struct RemoteSnapshotSource {
    acquisition: AcquisitionManager,
    extractor: Arc<ArchiveExtractor>,
    data_dir: PathBuf,
    source_file_name: String,
}

impl RemoteSnapshotSource {
    pub fn new(
        acquisition: AcquisitionManager, extractor: ArchiveExtractor, data_dir: impl Into<PathBuf>,
        source_file_name: impl Into<String>,
    ) -> Self {
        Self {
            acquisition,
            extractor: Arc::new(extractor),
            data_dir: data_dir.into(),
            source_file_name: source_file_name.into(),
        }
    }

    /// Build the default transport chain and extractor from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let target = FtpTarget::from_config(config);
        let mut acquisition = AcquisitionManager::new(config.archive_path())
            .with_stale_path(config.source_path())
            .with_transfer_timeout(config.transfer_timeout())
            .with_strategy(FtpStrategy::new(target.clone(), DataChannelMode::Passive, config.timeout()))
            .with_strategy(FtpStrategy::new(target, DataChannelMode::ExtendedPassive, config.timeout()));

        if let Some(mirror) = config.mirror_url.as_deref() {
            let strategy = HttpMirrorStrategy::new(mirror, &config.user_agent, config.timeout())
                .map_err(|e| ConfigError::Invalid { field: "mirror_url".into(), reason: e.to_string() })?;
            acquisition = acquisition.with_strategy(strategy);
        }

        tracing::debug!(strategies = ?acquisition.strategy_names(), "configured transport chain");
        Ok(Self::new(acquisition, ArchiveExtractor::default(), &config.data_dir, &config.source_file_name))
    }

    pub fn acquisition(&self) -> &AcquisitionManager {
        &self.acquisition
    }
}

#[async_trait]
impl SnapshotSource for RemoteSnapshotSource {
    async fn refresh(&self) -> Result<(), Error> {
        tokio::fs::create_dir_all(&self.data_dir).await?;

        let archive = self.acquisition.acquire_snapshot().await?;

        let extractor = Arc::clone(&self.extractor);
        let destination = self.data_dir.clone();
        let target = self.source_file_name.clone();
        let archive_path = archive.clone();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&archive_path, &destination, &target))
            .await
            .map_err(|e| Error::Extraction(format!("extraction task failed: {e}")));

        if let Err(e) = remove_if_exists(&archive).await {
            tracing::warn!(path = %archive.display(), error = %e, "failed to remove archive");
        }

        let raw = extracted??;
        tracing::info!(path = %raw.display(), "raw dataset refreshed");
        Ok(())
    }
}
