//! Core types and shared functionality for the CA registry service.
//!
//! This crate provides:
//! - Column schema, record model and the resilient registry parser
//! - TTL-driven dataset cache behind a `SnapshotSource` seam
//! - Query and export engines
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod query;
pub mod registry;
pub mod service;

pub use config::AppConfig;
pub use dataset::{Dataset, DatasetCache, DatasetInfo, SnapshotSource};
pub use error::Error;
pub use export::Export;
pub use query::BatchResult;
pub use registry::{ColumnSchema, Record};
pub use service::RegistryService;
