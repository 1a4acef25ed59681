//! Quest Engine - Provider, catalog, dataset and tool pipeline
//!
//! This crate implements the use cases of Quest on top of the core models and
//! the metadata store. Everything hangs off the [`Quest`] context, which owns
//! the settings, the plugin registry, the cached provider set, the active
//! project's database binding and the task table.

pub mod catalog;
pub mod collections;
pub mod context;
pub mod datasets;
pub mod metadata;
pub mod projects;
pub mod providers;
pub mod publish;
pub mod registry;
pub mod tasks;
pub mod tools;
pub mod user_provider;

pub use catalog::{SearchOptions, SearchResult, TagOptions};
pub use context::{Quest, QuestBuilder};
pub use datasets::{DataRequest, DatasetFilters, StageOptions};
pub use metadata::MetadataUpdate;
pub use registry::{PluginRegistry, ProviderSet};
pub use tasks::{TaskFilter, TaskRecord, TaskStatus};
pub use tools::{Tool, ToolContext, ToolFilters, ToolMetadata, ToolOutput};
