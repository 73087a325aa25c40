use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::authenticator::{Authenticator, LogoutAuthenticator};
use crate::store::PrincipalStoreFactory;

pub type AuthenticatorFactory = Arc<dyn Fn() -> Arc<dyn Authenticator> + Send + Sync>;

/// Named strategy constructors, looked up by the names used in scope configuration.
#[derive(Default)]
pub struct StrategyCatalog {
    authenticators: RwLock<HashMap<String, AuthenticatorFactory>>,
    store_factories: RwLock<HashMap<String, Arc<dyn PrincipalStoreFactory>>>,
}

impl StrategyCatalog {
    pub fn new() -> Self { Self::default() }

    /// Register (or replace) a constructor under `name`.
    pub fn register_authenticator<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Authenticator> + Send + Sync + 'static,
    {
        self.authenticators.write().insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_store_factory(&self, name: &str, factory: Arc<dyn PrincipalStoreFactory>) {
        self.store_factories.write().insert(name.to_string(), factory);
    }

    /// Build a fresh authenticator. The constructor runs outside the catalog lock.
    pub fn authenticator(&self, name: &str) -> Option<Arc<dyn Authenticator>> {
        let factory = self.authenticators.read().get(name).cloned()?;
        Some(factory())
    }

    pub fn store_factory(&self, name: &str) -> Option<Arc<dyn PrincipalStoreFactory>> {
        self.store_factories.read().get(name).cloned()
    }

    pub fn contains_authenticator(&self, name: &str) -> bool { self.authenticators.read().contains_key(name) }

    pub fn authenticator_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.authenticators.read().keys().cloned().collect();
        names.sort();
        names
    }
}

// Process-wide fallback consulted after the container's own catalog.
static AMBIENT: Lazy<StrategyCatalog> = Lazy::new(|| {
    let c = StrategyCatalog::new();
    c.register_authenticator("logout", || Arc::new(LogoutAuthenticator::new()));
    c
});

pub fn ambient() -> &'static StrategyCatalog { &AMBIENT }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SessionStoreFactory;

    #[test]
    fn ambient_knows_logout() {
        assert!(ambient().contains_authenticator("logout"));
        assert!(ambient().authenticator("logout").is_some());
        assert!(ambient().authenticator("no-such-thing").is_none());
    }

    #[test]
    fn each_lookup_builds_a_new_instance() {
        let c = StrategyCatalog::new();
        c.register_authenticator("logout", || Arc::new(LogoutAuthenticator::new()));
        let a = c.authenticator("logout").unwrap();
        let b = c.authenticator("logout").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        c.register_store_factory("session", Arc::new(SessionStoreFactory));
        assert!(c.store_factory("session").is_some());
        assert_eq!(c.authenticator_names(), vec!["logout".to_string()]);
    }
}
