//! Error types for Quest

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuestError {
    // URI errors
    #[error("Invalid URI: {uri} ({reason})")]
    InvalidUri { uri: String, reason: String },

    #[error("URI {uri} is a {kind} URI, which is not accepted here")]
    RejectedUri { uri: String, kind: String },

    #[error("URIs must all be of the same type, found: {kinds}")]
    MixedUris { kinds: String },

    // Project errors
    #[error("Project not found: {name}")]
    ProjectNotFound { name: String },

    #[error("Project already exists: {name}")]
    ProjectExists { name: String },

    #[error("No active project. Create or select a project first")]
    NoActiveProject,

    // Collection errors
    #[error("Collection not found: {name}")]
    CollectionNotFound { name: String },

    #[error("Collection already exists: {name}")]
    CollectionExists { name: String },

    // Catalog errors
    #[error("Catalog entry not found: {uri}")]
    CatalogEntryNotFound { uri: String },

    #[error("Search returned {count} catalog entries, more than the maximum of {max}")]
    TooManyCatalogEntries { count: usize, max: usize },

    #[error("Invalid query '{query}': {reason}")]
    InvalidQuery { query: String, reason: String },

    // Dataset errors
    #[error("Dataset not found: {name}")]
    DatasetNotFound { name: String },

    #[error("Invalid options for {target}: {reason}")]
    InvalidOptions { target: String, reason: String },

    #[error("Incompatible inputs for tool {tool}: {reason}")]
    IncompatibleInputs { tool: String, reason: String },

    // Plugin errors
    #[error("Provider not found: {name}")]
    ProviderNotFound { name: String },

    #[error("Service not found: {uri}")]
    ServiceNotFound { uri: String },

    #[error("Publisher not found: {uri}")]
    PublisherNotFound { uri: String },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("No I/O handler registered for file format '{format}'")]
    UnsupportedFormat { format: String },

    #[error("Failed to load plugin {name}: {reason}")]
    PluginLoad { name: String, reason: String },

    #[error("{operation} is not supported by {plugin}")]
    NotSupported { plugin: String, operation: String },

    // Provider errors
    #[error("Provider {provider} failed: {reason}")]
    Provider { provider: String, reason: String },

    #[error("No Data Available for {uri}")]
    NoDataAvailable { uri: String },

    #[error("Credentials required for provider {provider}. Add them with set_provider_credentials")]
    MissingCredentials { provider: String },

    // Task errors
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    #[error("Invalid manifest at {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl QuestError {
    /// Shorthand for an invalid-options error
    pub fn invalid_options(target: impl Into<String>, reason: impl Into<String>) -> Self {
        QuestError::InvalidOptions {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a provider failure
    pub fn provider(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        QuestError::Provider {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is caused by the caller's input rather than by state or I/O
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            QuestError::InvalidUri { .. }
                | QuestError::RejectedUri { .. }
                | QuestError::MixedUris { .. }
                | QuestError::ProjectNotFound { .. }
                | QuestError::ProjectExists { .. }
                | QuestError::CollectionNotFound { .. }
                | QuestError::CollectionExists { .. }
                | QuestError::CatalogEntryNotFound { .. }
                | QuestError::InvalidQuery { .. }
                | QuestError::DatasetNotFound { .. }
                | QuestError::InvalidOptions { .. }
                | QuestError::IncompatibleInputs { .. }
                | QuestError::ProviderNotFound { .. }
                | QuestError::ServiceNotFound { .. }
                | QuestError::PublisherNotFound { .. }
                | QuestError::ToolNotFound { .. }
                | QuestError::TaskNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for QuestError {
    fn from(err: serde_json::Error) -> Self {
        QuestError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for QuestError {
    fn from(err: serde_yaml::Error) -> Self {
        QuestError::Serialization(format!("YAML: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, QuestError>;
