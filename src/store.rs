//! Principal persistence.
//!
//! A store holds at most one principal for the caller. The session variant keeps it in the
//! session of the scope it was created for; the cross-context variant keeps it in the bridge
//! correlation so every scope sharing the token sees it. Stores are bound lazily through the
//! context, so an anonymous pass never mints a session.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::attributes::AttributeMap;
use crate::context::AuthenticationContext;
use crate::error::AuthResult;
use crate::principal::Principal;

pub const PRINCIPAL_KEY: &str = "authflow.principal";

pub trait PrincipalStore: Send + Sync {
    /// Replace the stored principal.
    fn store(&self, ctx: &mut AuthenticationContext<'_>, principal: &Principal) -> AuthResult<()>;
    fn fetch(&self, ctx: &mut AuthenticationContext<'_>) -> Option<Principal>;
    fn invalidate(&self, ctx: &mut AuthenticationContext<'_>);
}

/// Builds the per-request store. Resolved once per scope and cached by the registry.
pub trait PrincipalStoreFactory: Send + Sync {
    fn create(&self, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Arc<dyn PrincipalStore>>;
}

fn read_principal(map: &AttributeMap) -> Option<Principal> {
    // get_as logs and drops values of the wrong shape
    map.get_as::<Principal>(PRINCIPAL_KEY)
}

/// Session-bound store for one application scope.
#[derive(Debug, Clone)]
pub struct SessionPrincipalStore {
    context_path: String,
}

impl SessionPrincipalStore {
    pub fn new(context_path: impl Into<String>) -> Self { Self { context_path: context_path.into() } }
}

impl PrincipalStore for SessionPrincipalStore {
    fn store(&self, ctx: &mut AuthenticationContext<'_>, principal: &Principal) -> AuthResult<()> {
        if let Some(session) = ctx.session_for(&self.context_path, true) {
            session.put(PRINCIPAL_KEY, principal)?;
        }
        Ok(())
    }

    fn fetch(&self, ctx: &mut AuthenticationContext<'_>) -> Option<Principal> {
        read_principal(&ctx.session_for(&self.context_path, false)?)
    }

    fn invalidate(&self, ctx: &mut AuthenticationContext<'_>) {
        if let Some(session) = ctx.session_for(&self.context_path, false) {
            session.remove(PRINCIPAL_KEY);
        }
    }
}

/// Store kept in the caller's bridge correlation.
#[derive(Debug, Clone, Default)]
pub struct CrossContextPrincipalStore;

impl PrincipalStore for CrossContextPrincipalStore {
    fn store(&self, ctx: &mut AuthenticationContext<'_>, principal: &Principal) -> AuthResult<()> {
        if let Some(c) = ctx.correlation(true) {
            c.attributes().put(PRINCIPAL_KEY, principal)?;
        }
        Ok(())
    }

    fn fetch(&self, ctx: &mut AuthenticationContext<'_>) -> Option<Principal> {
        read_principal(&ctx.correlation(false)?.attributes())
    }

    fn invalidate(&self, ctx: &mut AuthenticationContext<'_>) {
        if let Some(c) = ctx.correlation(false) {
            c.attributes().remove(PRINCIPAL_KEY);
        }
    }
}

/// A plain in-process slot, independent of the request.
#[derive(Debug, Default)]
pub struct MemoryPrincipalStore {
    slot: Mutex<Option<Principal>>,
}

impl MemoryPrincipalStore {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self) -> Option<Principal> { self.slot.lock().clone() }
}

impl PrincipalStore for MemoryPrincipalStore {
    fn store(&self, _ctx: &mut AuthenticationContext<'_>, principal: &Principal) -> AuthResult<()> {
        *self.slot.lock() = Some(principal.clone());
        Ok(())
    }

    fn fetch(&self, _ctx: &mut AuthenticationContext<'_>) -> Option<Principal> { self.get() }

    fn invalidate(&self, _ctx: &mut AuthenticationContext<'_>) { *self.slot.lock() = None; }
}

/// Default factory: session store bound to the origin scope.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionStoreFactory;

impl PrincipalStoreFactory for SessionStoreFactory {
    fn create(&self, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Arc<dyn PrincipalStore>> {
        Ok(Arc::new(SessionPrincipalStore::new(ctx.origin_context_path())))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CrossContextStoreFactory;

impl PrincipalStoreFactory for CrossContextStoreFactory {
    fn create(&self, _ctx: &mut AuthenticationContext<'_>) -> AuthResult<Arc<dyn PrincipalStore>> {
        Ok(Arc::new(CrossContextPrincipalStore))
    }
}

/// Hands out one shared [`MemoryPrincipalStore`] to every request.
#[derive(Debug, Default, Clone)]
pub struct SharedMemoryStoreFactory {
    store: Arc<MemoryPrincipalStore>,
}

impl SharedMemoryStoreFactory {
    pub fn new(store: Arc<MemoryPrincipalStore>) -> Self { Self { store } }
}

impl PrincipalStoreFactory for SharedMemoryStoreFactory {
    fn create(&self, _ctx: &mut AuthenticationContext<'_>) -> AuthResult<Arc<dyn PrincipalStore>> {
        Ok(self.store.clone())
    }
}
