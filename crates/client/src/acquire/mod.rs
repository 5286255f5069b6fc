//! Snapshot acquisition with ordered transport fallback.
//!
//! ### Strategy Chain
//! - Strategies are tried in order; the first success wins.
//! - Every failure is recorded as `name: reason`; if all fail, the caller
//!   gets every reason, not just the last one.
//! - Each strategy's whole download is bounded by the transfer timeout, on
//!   top of the per-operation timeouts the strategies apply themselves.
//!
//! ### Scratch Files
//! - Stale raw/archive files from the previous cycle are deleted first.
//! - Strategies write to `<archive>.part` and rename on success; a partial
//!   download never lands on the archive path.

pub mod ftp;
pub mod http;
pub mod scratch;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use caepi_core::Error;

pub use ftp::{DataChannelMode, FtpError, FtpStrategy, FtpTarget};
pub use http::HttpMirrorStrategy;
pub use scratch::ScratchFile;

const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// One way of downloading the archive.
#[async_trait]
pub trait TransportStrategy: Send + Sync {
    /// Short name used in logs and failure reasons.
    fn name(&self) -> &str;

    /// Download the archive to `destination`, returning the byte count.
    async fn fetch(&self, destination: &Path) -> Result<u64, TransportError>;
}

/// Failure of a single transport strategy.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Ftp(#[from] FtpError),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err.to_string())
    }
}

/// Runs transport strategies in order until one produces the archive.
pub struct AcquisitionManager {
    strategies: Vec<Box<dyn TransportStrategy>>,
    archive_path: PathBuf,
    stale_paths: Vec<PathBuf>,
    transfer_timeout: Duration,
}

/// Await `fut`, failing with [`TransportError::Timeout`] after `limit`.
pub(crate) async fn deadline<T, E>(
    limit: Duration, fut: impl Future<Output = Result<T, E>>,
) -> Result<T, TransportError>
where
    E: Into<TransportError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(TransportError::Timeout(limit.as_millis() as u64)),
    }
}

/// Remove `path`, treating "already gone" as success.
pub(crate) async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl AcquisitionManager {
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        let archive_path = archive_path.into();
        let stale_paths = vec![archive_path.clone()];
        Self { strategies: Vec::new(), archive_path, stale_paths, transfer_timeout: DEFAULT_TRANSFER_TIMEOUT }
    }

    /// Cap on the total time any single strategy may take.
    pub fn with_transfer_timeout(mut self, limit: Duration) -> Self {
        self.transfer_timeout = limit;
        self
    }

    /// Append a strategy to the end of the chain.
    pub fn with_strategy(mut self, strategy: impl TransportStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Also delete `path` before each acquisition (e.g. the raw dataset file).
    pub fn with_stale_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stale_paths.push(path.into());
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Download a fresh archive to the scratch path.
    ///
    /// # Errors
    ///
    /// Returns `Error::Acquisition` listing every strategy's failure, in
    /// order, when none succeeded.
    pub async fn acquire_snapshot(&self) -> Result<PathBuf, Error> {
        for stale in &self.stale_paths {
            remove_if_exists(stale).await?;
        }

        if let Some(parent) = self.archive_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut reasons = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            tracing::debug!(strategy = strategy.name(), "trying transport strategy");
            match deadline(self.transfer_timeout, strategy.fetch(&self.archive_path)).await {
                Ok(bytes) => {
                    tracing::info!(strategy = strategy.name(), bytes, "archive downloaded");
                    return Ok(self.archive_path.clone());
                }
                Err(e) => {
                    tracing::warn!(strategy = strategy.name(), error = %e, "transport strategy failed");
                    reasons.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        if reasons.is_empty() {
            reasons.push("no transport strategies configured".to_string());
        }
        Err(Error::Acquisition { reasons })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Scripted {
        name: &'static str,
        payload: Option<&'static [u8]>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TransportStrategy for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self, destination: &Path) -> Result<u64, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.payload {
                Some(bytes) => {
                    tokio::fs::write(destination, bytes).await?;
                    Ok(bytes.len() as u64)
                }
                None => Err(TransportError::Http(format!("{} unavailable", self.name))),
            }
        }
    }

    fn scripted(name: &'static str, payload: Option<&'static [u8]>) -> (Scripted, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (Scripted { name, payload, calls: calls.clone() }, calls)
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let dir = TempDir::new().unwrap();
        let (a, _) = scripted("a", None);
        let (b, b_calls) = scripted("b", Some(b"PK\x03\x04"));
        let (c, c_calls) = scripted("c", Some(b"unused"));

        let manager = AcquisitionManager::new(dir.path().join("caepi.zip"))
            .with_strategy(a)
            .with_strategy(b)
            .with_strategy(c);

        let path = manager.acquire_snapshot().await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"PK\x03\x04");
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_failures_are_aggregated_in_order() {
        let dir = TempDir::new().unwrap();
        let (a, _) = scripted("ftp-pasv", None);
        let (b, _) = scripted("ftp-epsv", None);

        let manager = AcquisitionManager::new(dir.path().join("caepi.zip"))
            .with_strategy(a)
            .with_strategy(b);

        match manager.acquire_snapshot().await {
            Err(Error::Acquisition { reasons }) => {
                assert_eq!(reasons.len(), 2);
                assert!(reasons[0].starts_with("ftp-pasv: "));
                assert!(reasons[1].starts_with("ftp-epsv: "));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    /// Writes through a scratch file, then never finishes.
    struct Stalled;

    #[async_trait]
    impl TransportStrategy for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn fetch(&self, destination: &Path) -> Result<u64, TransportError> {
            let mut scratch = ScratchFile::create(destination).await?;
            scratch.write_all(b"PK").await?;
            std::future::pending::<()>().await;
            scratch.commit().await.map_err(Into::into)
        }
    }

    #[tokio::test]
    async fn test_transfer_timeout_moves_to_next_strategy() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("caepi.zip");
        let (b, b_calls) = scripted("b", Some(b"PK\x03\x04"));

        let manager = AcquisitionManager::new(&archive)
            .with_transfer_timeout(Duration::from_millis(100))
            .with_strategy(Stalled)
            .with_strategy(b);

        manager.acquire_snapshot().await.unwrap();
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&archive).unwrap(), b"PK\x03\x04");
        assert!(!dir.path().join("caepi.zip.part").exists());
    }

    #[tokio::test]
    async fn test_empty_chain_fails() {
        let dir = TempDir::new().unwrap();
        let manager = AcquisitionManager::new(dir.path().join("caepi.zip"));
        assert!(matches!(manager.acquire_snapshot().await, Err(Error::Acquisition { reasons }) if reasons.len() == 1));
    }

    #[tokio::test]
    async fn test_stale_files_are_removed_before_download() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("tgg_export_caepi.txt");
        let archive = dir.path().join("tgg_export_caepi.zip");
        std::fs::write(&raw, "old").unwrap();
        std::fs::write(&archive, "old").unwrap();

        let (a, _) = scripted("a", None);
        let manager = AcquisitionManager::new(&archive).with_stale_path(&raw).with_strategy(a);

        assert!(manager.acquire_snapshot().await.is_err());
        assert!(!raw.exists());
        assert!(!archive.exists());
    }
}
