//! TTL-driven dataset cache.
//!
//! ### State Machine
//! - `Fresh` and the raw file is younger than the TTL: serve from memory.
//! - Raw file missing or older than the TTL: `Rebuilding` (refresh through the
//!   snapshot source), then `Unloaded`, then parse back to `Fresh`.
//! - Any failure leaves the cache `Unloaded` for the next caller.
//!
//! Freshness is measured from the raw file's modification time, so a file
//! replaced out of band is honoured (and re-parsed if its mtime changed).
//! Rebuilds are serialised behind one async mutex: concurrent callers that
//! observe staleness wait for a single rebuild. The observable state sits in
//! a separate lock that is only held for reads and swaps, so status queries
//! see `Rebuilding` while a download is in flight.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{Mutex, RwLock};

use super::{Dataset, DatasetInfo, SnapshotSource};
use crate::Error;
use crate::config::AppConfig;
use crate::registry::{ColumnSchema, ErrorLedger, RecordParser};

/// Lifecycle of the in-memory dataset.
#[derive(Debug, Default)]
pub enum CacheState {
    #[default]
    Unloaded,
    Rebuilding,
    Fresh { dataset: Arc<Dataset>, source_modified: SystemTime },
}

impl CacheState {
    pub fn name(&self) -> &'static str {
        match self {
            CacheState::Unloaded => "unloaded",
            CacheState::Rebuilding => "rebuilding",
            CacheState::Fresh { .. } => "fresh",
        }
    }
}

/// Owns the parsed dataset and rebuilds it when stale.
pub struct DatasetCache {
    source_path: PathBuf,
    schema_path: PathBuf,
    ledger_path: PathBuf,
    ttl: Duration,
    source: Arc<dyn SnapshotSource>,
    rebuild_lock: Mutex<()>,
    state: RwLock<CacheState>,
}

/// Modification time of the raw file, `None` if it does not exist.
async fn modified_time(path: &Path) -> Result<Option<SystemTime>, Error> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta.modified()?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

fn is_stale(modified: Option<SystemTime>, ttl: Duration) -> bool {
    match modified {
        None => true,
        // A modification time in the future counts as fresh.
        Some(m) => SystemTime::now().duration_since(m).unwrap_or(Duration::ZERO) > ttl,
    }
}

impl DatasetCache {
    pub fn new(config: &AppConfig, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            source_path: config.source_path(),
            schema_path: config.schema_path(),
            ledger_path: config.error_ledger_path(),
            ttl: config.ttl(),
            source,
            rebuild_lock: Mutex::new(()),
            state: RwLock::new(CacheState::Unloaded),
        }
    }

    /// Current dataset, rebuilding first if the raw file is missing or stale.
    ///
    /// # Errors
    ///
    /// Propagates schema, acquisition, extraction and dataset-build errors.
    /// The cache is left `Unloaded` so the next call retries.
    pub async fn get_dataset(&self) -> Result<Arc<Dataset>, Error> {
        let modified = modified_time(&self.source_path).await?;
        if !is_stale(modified, self.ttl)
            && let Some(dataset) = self.loaded(modified).await
        {
            return Ok(dataset);
        }

        let _rebuild = self.rebuild_lock.lock().await;

        let mut modified = modified_time(&self.source_path).await?;
        if is_stale(modified, self.ttl) {
            tracing::info!(path = %self.source_path.display(), "registry file missing or stale, rebuilding");
            self.rebuild().await?;
            modified = modified_time(&self.source_path).await?;
        }

        if let Some(dataset) = self.loaded(modified).await {
            return Ok(dataset);
        }

        self.load().await
    }

    /// Rebuild unconditionally and return the new dataset.
    pub async fn refresh(&self) -> Result<Arc<Dataset>, Error> {
        let _rebuild = self.rebuild_lock.lock().await;
        self.rebuild().await?;
        self.load().await
    }

    /// Summary of the loaded dataset, without triggering any I/O.
    pub async fn info(&self) -> Option<DatasetInfo> {
        match &*self.state.read().await {
            CacheState::Fresh { dataset, .. } => Some(dataset.info()),
            _ => None,
        }
    }

    pub async fn state_name(&self) -> &'static str {
        self.state.read().await.name()
    }

    /// The in-memory dataset, if it was parsed from a file with mtime `modified`.
    async fn loaded(&self, modified: Option<SystemTime>) -> Option<Arc<Dataset>> {
        match &*self.state.read().await {
            CacheState::Fresh { dataset, source_modified } if Some(*source_modified) == modified => {
                Some(Arc::clone(dataset))
            }
            _ => None,
        }
    }

    async fn set_state(&self, next: CacheState) {
        *self.state.write().await = next;
    }

    async fn rebuild(&self) -> Result<(), Error> {
        self.set_state(CacheState::Rebuilding).await;
        let result = self.source.refresh().await;

        if let Err(e) = &result {
            self.set_state(CacheState::Unloaded).await;
            tracing::error!(error = %e, "registry rebuild failed");
        }
        result
    }

    async fn load(&self) -> Result<Arc<Dataset>, Error> {
        self.set_state(CacheState::Rebuilding).await;

        match self.parse().await {
            Ok((dataset, modified)) => {
                let next = CacheState::Fresh { dataset: Arc::clone(&dataset), source_modified: modified };
                self.set_state(next).await;
                Ok(dataset)
            }
            Err(e) => {
                self.set_state(CacheState::Unloaded).await;
                Err(e)
            }
        }
    }

    async fn parse(&self) -> Result<(Arc<Dataset>, SystemTime), Error> {
        let modified = modified_time(&self.source_path)
            .await?
            .ok_or_else(|| Error::DatasetBuild(format!("source file not found: {}", self.source_path.display())))?;

        let source_path = self.source_path.clone();
        let schema_path = self.schema_path.clone();
        let ledger_path = self.ledger_path.clone();

        let parsed = tokio::task::spawn_blocking(move || {
            let schema = ColumnSchema::load(&schema_path)?;
            let mut ledger = ErrorLedger::new(ledger_path);
            RecordParser::new(schema).parse_file(&source_path, &mut ledger)
        })
        .await
        .map_err(|e| Error::DatasetBuild(format!("parse task failed: {e}")))??;

        let dataset = Arc::new(Dataset::from_parsed(parsed, modified));
        tracing::info!(records = dataset.len(), fingerprint = %dataset.fingerprint(), "registry dataset loaded");
        Ok((dataset, modified))
    }
}
