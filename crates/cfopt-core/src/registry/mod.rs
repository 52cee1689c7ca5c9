//! Plugin-based provider registry
//!
//! DNS providers register a factory under their type name, and the daemon
//! builds the configured provider through the registry instead of matching
//! on provider types itself.
//!
//! ## Registration
//!
//! Implementations register themselves during initialization:
//!
//! ```rust,ignore
//! // In the cfopt-provider-cloudflare crate
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cfopt_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! cfopt_provider_cloudflare::register(&registry);
//!
//! let provider = registry.create_provider(&config.provider)?;
//! ```

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Provider registry for plugin-based DNS provider creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// Registering the same name again replaces the earlier factory.
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(name.into(), factory);
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error)`: If provider type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers.get(provider_type).ok_or_else(|| {
            Error::config(format!(
                "Unknown provider type: {} (registered: {})",
                provider_type,
                sorted_names(&providers).join(", ")
            ))
        })?;

        factory.create(config)
    }

    /// List all registered provider types, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        sorted_names(&providers)
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }
}

fn sorted_names(providers: &HashMap<String, Box<dyn DnsProviderFactory>>) -> Vec<String> {
    let mut names: Vec<String> = providers.keys().cloned().collect();
    names.sort();
    names
}
