use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use super::catalog::StrategyCatalog;
use super::resolve::Registry;
use crate::attributes::AttributeMap;
use crate::authenticator::Authenticator;
use crate::bridge::CrossContextBridge;
use crate::config::{BridgeSettings, ContainerConfig, ScopeConfig};
use crate::error::RegistryError;
use crate::store::PrincipalStoreFactory;

/// Normalize a context path: no trailing slash, root is `""`.
pub fn normalize_context_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// The hosting side: a set of application scopes sharing one bridge and one catalog.
pub struct Container {
    scopes: RwLock<HashMap<String, Arc<AppScope>>>,
    bridge: Arc<CrossContextBridge>,
    catalog: StrategyCatalog,
}

impl Container {
    pub fn new(bridge: BridgeSettings) -> Arc<Self> {
        Arc::new(Self {
            scopes: RwLock::new(HashMap::new()),
            bridge: Arc::new(CrossContextBridge::new(bridge)),
            catalog: StrategyCatalog::new(),
        })
    }

    pub fn from_config(cfg: &ContainerConfig) -> Arc<Self> {
        let container = Self::new(cfg.bridge.clone());
        for (path, scope) in &cfg.scopes {
            container.add_scope(path, scope.clone());
        }
        container
    }

    /// Resolver consulted before the ambient catalog.
    pub fn catalog(&self) -> &StrategyCatalog { &self.catalog }

    pub fn bridge(&self) -> &Arc<CrossContextBridge> { &self.bridge }

    /// Add or replace a scope.
    pub fn add_scope(self: &Arc<Self>, context_path: &str, config: ScopeConfig) -> Arc<AppScope> {
        let path = normalize_context_path(context_path);
        let scope = Arc::new(AppScope {
            context_path: path.clone(),
            config,
            attributes: AttributeMap::new(),
            bridge: self.bridge.clone(),
            container: Arc::downgrade(self),
            authenticator: RwLock::new(None),
            store_factory: RwLock::new(None),
        });
        debug!(target: "authflow::registry", context = %path, "scope added");
        self.scopes.write().insert(path, scope.clone());
        scope
    }

    pub fn scope(&self, context_path: &str) -> Option<Arc<AppScope>> {
        self.scopes.read().get(&normalize_context_path(context_path)).cloned()
    }

    pub fn context_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.scopes.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Scope owning `uri`: the longest context path that prefixes it.
    pub fn scope_for_uri(&self, uri: &str) -> Option<Arc<AppScope>> {
        self.scopes
            .read()
            .values()
            .filter(|s| crate::context::path_within(s.context_path(), uri).is_some())
            .max_by_key(|s| s.context_path().len())
            .cloned()
    }
}

/// One application: its configuration, application-wide attributes and the lazily
/// resolved strategy slots.
pub struct AppScope {
    context_path: String,
    config: ScopeConfig,
    attributes: AttributeMap,
    bridge: Arc<CrossContextBridge>,
    container: Weak<Container>,
    pub(super) authenticator: RwLock<Option<Arc<dyn Authenticator>>>,
    pub(super) store_factory: RwLock<Option<Arc<dyn PrincipalStoreFactory>>>,
}

impl AppScope {
    pub fn context_path(&self) -> &str { &self.context_path }
    pub fn config(&self) -> &ScopeConfig { &self.config }
    pub fn attributes(&self) -> AttributeMap { self.attributes.clone() }
    pub fn bridge(&self) -> &Arc<CrossContextBridge> { &self.bridge }

    pub fn is_cross_context(&self) -> bool { self.config.resolves_cross_context() }

    pub fn container(&self) -> Result<Arc<Container>, RegistryError> {
        self.container.upgrade().ok_or(RegistryError::ContainerGone)
    }

    pub fn registry(self: &Arc<Self>) -> Registry { Registry::new(self.clone()) }
}

impl std::fmt::Debug for AppScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppScope").field("context_path", &self.context_path).field("config", &self.config).finish()
    }
}
