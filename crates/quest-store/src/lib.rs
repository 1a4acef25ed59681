//! Quest Store - Metadata storage ports and adapters
//!
//! This crate defines the storage ports for the per-project metadata database
//! and provides the embedded SQLite adapter.

pub mod ports;
pub mod sqlite;

pub use ports::{
    CatalogStore, CollectionStore, CredentialStore, DatasetDeletion, DatasetQuery, DatasetStore,
    MetadataStore, ProjectStore,
};
pub use sqlite::SqliteStore;
