use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use super::catalog;
use super::scope::AppScope;
use crate::authenticator::{Authenticator, DelegatingAuthenticator};
use crate::context::AuthenticationContext;
use crate::error::{AuthResult, RegistryError};
use crate::store::{CrossContextStoreFactory, PrincipalStore, PrincipalStoreFactory, SessionStoreFactory};

thread_local! {
    // Per-thread store of the request in flight, keyed by context path.
    static TLS_STORES: RefCell<HashMap<String, Arc<dyn PrincipalStore>>> = RefCell::new(HashMap::new());
}

/// Resolution view over one application scope.
///
/// The authenticator and the store factory are resolved on first use and cached on the scope.
/// Reads take the shared lock; a miss takes the write lock and checks again before building.
pub struct Registry {
    scope: Arc<AppScope>,
}

impl Registry {
    pub fn new(scope: Arc<AppScope>) -> Self { Self { scope } }

    pub fn scope(&self) -> &Arc<AppScope> { &self.scope }

    pub fn is_cross_context(&self) -> bool { self.scope.is_cross_context() }

    /// The scope's authenticator, or `None` when nothing is configured or resolution failed.
    /// Failures are logged.
    pub fn authenticator(&self) -> Option<Arc<dyn Authenticator>> {
        match self.try_authenticator() {
            Ok(a) => a,
            Err(e) => {
                error!(target: "authflow::registry", context = self.scope.context_path(), error = %e, "authenticator resolution failed");
                None
            }
        }
    }

    pub fn try_authenticator(&self) -> Result<Option<Arc<dyn Authenticator>>, RegistryError> {
        if let Some(a) = self.scope.authenticator.read().as_ref() {
            return Ok(Some(a.clone()));
        }
        let cfg = self.scope.config();
        // The delegate's own slot is resolved before taking ours.
        let delegated = match (&cfg.authenticator, &cfg.delegate) {
            (None, Some(target)) => Some(self.resolve_delegate(target)?),
            _ => None,
        };

        let mut slot = self.scope.authenticator.write();
        if let Some(a) = slot.as_ref() {
            return Ok(Some(a.clone()));
        }
        let resolved = match (delegated, &cfg.authenticator) {
            (Some(d), _) => Some(d),
            (None, Some(name)) => Some(self.instantiate(name)?),
            (None, None) => None,
        };
        if let Some(a) = &resolved {
            *slot = Some(a.clone());
            debug!(target: "authflow::registry", context = self.scope.context_path(), "authenticator resolved");
        }
        Ok(resolved)
    }

    /// Replace the scope's authenticator.
    pub fn register_authenticator(&self, authenticator: Arc<dyn Authenticator>) {
        *self.scope.authenticator.write() = Some(authenticator);
    }

    pub fn register_store_factory(&self, factory: Arc<dyn PrincipalStoreFactory>) {
        *self.scope.store_factory.write() = Some(factory);
    }

    fn instantiate(&self, name: &str) -> Result<Arc<dyn Authenticator>, RegistryError> {
        let container = self.scope.container()?;
        container
            .catalog()
            .authenticator(name)
            .or_else(|| catalog::ambient().authenticator(name))
            .ok_or_else(|| RegistryError::UnknownAuthenticator(name.to_string()))
    }

    /// Wrap the authenticator owned by `target`. Delegation does not chain: the target must
    /// own an authenticator itself.
    fn resolve_delegate(&self, target: &str) -> Result<Arc<dyn Authenticator>, RegistryError> {
        let container = self.scope.container()?;
        let other = container.scope(target).ok_or_else(|| RegistryError::MissingScope(target.to_string()))?;
        if Arc::ptr_eq(&other, &self.scope) || !other.config().is_delegate {
            return Err(RegistryError::NotADelegate(target.to_string()));
        }
        let cached = other.authenticator.read().clone();
        let inner = match cached {
            Some(a) => a,
            None => match &other.config().authenticator {
                Some(_) => other
                    .registry()
                    .try_authenticator()?
                    .ok_or_else(|| RegistryError::NotADelegate(target.to_string()))?,
                None => return Err(RegistryError::NotADelegate(target.to_string())),
            },
        };
        Ok(Arc::new(DelegatingAuthenticator::new(&other, inner)))
    }

    pub fn store_factory(&self) -> Result<Arc<dyn PrincipalStoreFactory>, RegistryError> {
        if let Some(f) = self.scope.store_factory.read().as_ref() {
            return Ok(f.clone());
        }
        let mut slot = self.scope.store_factory.write();
        if let Some(f) = slot.as_ref() {
            return Ok(f.clone());
        }
        let factory: Arc<dyn PrincipalStoreFactory> = match &self.scope.config().principal_store_factory {
            Some(name) => {
                let container = self.scope.container()?;
                container
                    .catalog()
                    .store_factory(name)
                    .or_else(|| catalog::ambient().store_factory(name))
                    .ok_or_else(|| RegistryError::UnknownStoreFactory(name.clone()))?
            }
            None if self.is_cross_context() => Arc::new(CrossContextStoreFactory),
            None => Arc::new(SessionStoreFactory),
        };
        *slot = Some(factory.clone());
        Ok(factory)
    }

    /// Build the request's store and bind it to the calling thread.
    pub fn create_principal_store(&self, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Arc<dyn PrincipalStore>> {
        let store = self.store_factory()?.create(ctx)?;
        let key = self.scope.context_path().to_string();
        TLS_STORES.with(|m| m.borrow_mut().insert(key, store.clone()));
        Ok(store)
    }

    /// Store bound to this thread by the last `create_principal_store` for this scope.
    pub fn principal_store(&self) -> Option<Arc<dyn PrincipalStore>> {
        TLS_STORES.with(|m| m.borrow().get(self.scope.context_path()).cloned())
    }

    pub fn release_principal_store(&self) {
        TLS_STORES.with(|m| {
            m.borrow_mut().remove(self.scope.context_path());
        });
    }
}
