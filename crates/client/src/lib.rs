//! Network and archive code for the CA registry.
//!
//! This crate provides the acquisition manager with its transport strategies,
//! the ZIP extractor with its manual fallback, and the
//! [`RemoteSnapshotSource`] that chains both for the dataset cache.

pub mod acquire;
pub mod archive;
pub mod refresh;

pub use acquire::{
    AcquisitionManager, DataChannelMode, FtpStrategy, FtpTarget, HttpMirrorStrategy, TransportError, TransportStrategy,
};
pub use archive::{ArchiveError, ArchiveExtractor, CentralDirectoryStrategy, ExtractionStrategy, LocalHeaderStrategy};
pub use refresh::RemoteSnapshotSource;
