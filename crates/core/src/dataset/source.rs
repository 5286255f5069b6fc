//! Seam between the dataset cache and whatever produces the raw file.

use async_trait::async_trait;

use crate::Error;

/// Produces a fresh raw registry file at the configured source path.
///
/// The network implementation lives in `caepi-client`; tests use fakes.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Replace the raw dataset file on disk.
    ///
    /// # Errors
    ///
    /// `Error::Acquisition` when no transport succeeded, `Error::Extraction`
    /// when the archive could not be decoded.
    async fn refresh(&self) -> Result<(), Error>;
}
