//! Plugin registry
//!
//! Providers, tools and I/O handlers are registered explicitly. Providers are
//! registered as factories so that one that fails to construct is logged and
//! skipped without affecting the others; the constructed set is cached by the
//! `Quest` context until it is explicitly refreshed.

use quest_core::error::Result;
use quest_core::formats::{IoHandler, IoRegistry};
use quest_core::ports::Provider;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::tools::{RemoveOutliers, Tool};
use crate::user_provider::load_user_providers;

/// Constructor of a provider plugin
pub type ProviderFactory = Arc<dyn Fn() -> Result<Arc<dyn Provider>> + Send + Sync>;

/// Loaded providers keyed by name
pub type ProviderSet = BTreeMap<String, Arc<dyn Provider>>;

/// Explicit registration of every plugin kind
#[derive(Clone, Default)]
pub struct PluginRegistry {
    providers: Vec<(String, ProviderFactory)>,
    tools: BTreeMap<String, Arc<dyn Tool>>,
    io: IoRegistry,
}

impl PluginRegistry {
    /// Empty registry with no plugins at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the in-tree tools and I/O handlers
    pub fn with_builtin() -> Self {
        let mut registry = Self {
            io: IoRegistry::with_builtin(),
            ..Self::default()
        };
        registry.register_tool(Arc::new(RemoveOutliers));
        registry
    }

    /// Register a provider factory under `name`
    pub fn register_provider<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Arc<dyn Provider>> + Send + Sync + 'static,
    {
        self.providers.push((name.into(), Arc::new(factory)));
        self
    }

    /// Register an already constructed provider
    pub fn register_provider_instance(&mut self, provider: Arc<dyn Provider>) -> &mut Self {
        let name = provider.name().to_string();
        self.register_provider(name, move || Ok(provider.clone()))
    }

    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn register_io_handler(&mut self, handler: Arc<dyn IoHandler>) -> &mut Self {
        self.io.register(handler);
        self
    }

    pub fn tools(&self) -> &BTreeMap<String, Arc<dyn Tool>> {
        &self.tools
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn io(&self) -> &IoRegistry {
        &self.io
    }

    /// Instantiate every registered provider plus the user providers in `user_services`
    ///
    /// Load failures are logged and the offending plugin is omitted.
    pub async fn load_providers(&self, user_services: &[String]) -> ProviderSet {
        let mut set = ProviderSet::new();

        for (name, factory) in &self.providers {
            match factory() {
                Ok(provider) => {
                    debug!(provider = %name, "Loaded provider");
                    set.insert(provider.name().to_string(), provider);
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "Skipping provider that failed to load")
                }
            }
        }

        for provider in load_user_providers(user_services).await {
            if set.contains_key(provider.name()) {
                warn!(provider = %provider.name(), "User provider shadows a registered provider");
            }
            set.insert(provider.name().to_string(), provider);
        }

        set
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("providers", &self.providers.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("io", &self.io)
            .finish()
    }
}
