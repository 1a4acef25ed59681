//! Port trait definitions
//!
//! These traits define the interfaces that data-source adapters must implement.

pub mod provider;

pub use provider::{CatalogRow, DownloadOutcome, DownloadRequest, Provider, PublishRequest};
