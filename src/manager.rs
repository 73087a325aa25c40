use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::context::AuthenticationContext;
use crate::error::{AuthError, AuthResult};
use crate::principal::Principal;
use crate::saved_request::{SavedRequest, SavedRequestTracker};
use crate::store::PrincipalStore;

/// Capability object handed to strategies for one orchestration pass.
///
/// Wraps the request's principal store and the saved-request tracker. `register` is the only
/// way a strategy establishes identity; the orchestrator reads the registered principal back
/// once a strategy reports success.
pub struct AuthenticationManager {
    store: Arc<dyn PrincipalStore>,
    saved: SavedRequestTracker,
    registered: Mutex<Option<Principal>>,
}

impl AuthenticationManager {
    pub fn new(store: Arc<dyn PrincipalStore>) -> Self {
        Self { store, saved: SavedRequestTracker, registered: Mutex::new(None) }
    }

    pub fn store(&self) -> &Arc<dyn PrincipalStore> { &self.store }

    /// Persist `principal` and record it as this pass's identity.
    pub fn register(&self, ctx: &mut AuthenticationContext<'_>, principal: Principal) -> AuthResult<()> {
        self.store.store(ctx, &principal)?;
        info!(target: "authflow::manager", principal = %principal, context = ctx.origin_context_path(), "principal registered");
        *self.registered.lock() = Some(principal);
        Ok(())
    }

    /// Record an already-stored principal as this pass's identity.
    pub(crate) fn adopt(&self, principal: Principal) {
        *self.registered.lock() = Some(principal);
    }

    pub(crate) fn invalidate(&self, ctx: &mut AuthenticationContext<'_>) {
        self.store.invalidate(ctx);
        *self.registered.lock() = None;
    }

    pub fn registered(&self) -> Option<Principal> { self.registered.lock().clone() }

    pub fn current_principal(&self, ctx: &mut AuthenticationContext<'_>) -> Option<Principal> {
        self.store.fetch(ctx)
    }

    pub fn has_request(&self, ctx: &mut AuthenticationContext<'_>) -> bool { self.saved.has_request(ctx) }

    pub fn save_request(&self, ctx: &mut AuthenticationContext<'_>) -> AuthResult<()> { self.saved.save_request(ctx) }

    pub fn save_request_path(&self, ctx: &mut AuthenticationContext<'_>, path: &str) -> AuthResult<()> {
        self.saved.save_request_path(ctx, path)
    }

    pub fn path_for_request(&self, ctx: &mut AuthenticationContext<'_>) -> Option<String> {
        self.saved.path_for_request(ctx)
    }

    pub fn matches_request(&self, ctx: &mut AuthenticationContext<'_>) -> bool { self.saved.matches_request(ctx) }

    pub fn add_query_string(&self, ctx: &mut AuthenticationContext<'_>, fragment: &str) {
        self.saved.add_query_string(ctx, fragment)
    }

    pub fn restore_request(&self, ctx: &mut AuthenticationContext<'_>) -> Option<SavedRequest> {
        self.saved.restore_request(ctx)
    }

    pub fn clear_request(&self, ctx: &mut AuthenticationContext<'_>) { self.saved.clear_request(ctx) }

    /// Redirect to the saved request, in the context it was saved from.
    pub fn redirect_to_request(&self, ctx: &mut AuthenticationContext<'_>) -> AuthResult<()> {
        let saved = self.saved.load(ctx).ok_or(AuthError::NoSavedRequest)?;
        let target = format!("{}{}", saved.context_path, saved.path_with_query());
        debug!(target: "authflow::manager", %target, "redirect to saved request");
        ctx.set_forwarded(true);
        ctx.exchange_mut().redirect(&target)
    }

    /// Send the caller to `path` within the current scope. Absolute URLs pass through.
    pub fn forward(&self, ctx: &mut AuthenticationContext<'_>, path: &str) -> AuthResult<()> {
        let target = if is_absolute_url(path) { path.to_string() } else { format!("{}{}", ctx.context_path(), path) };
        self.forward_to(ctx, &target)
    }

    /// Send the caller to an already complete location.
    pub fn forward_to(&self, ctx: &mut AuthenticationContext<'_>, location: &str) -> AuthResult<()> {
        debug!(target: "authflow::manager", location, "forward");
        ctx.set_forwarded(true);
        ctx.exchange_mut().redirect(location)
    }
}

fn is_absolute_url(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BridgeSettings, ScopeConfig};
    use crate::exchange::MemoryExchange;
    use crate::registry::Container;
    use crate::session::SessionRegistry;
    use crate::store::MemoryPrincipalStore;

    #[test]
    fn register_stores_before_reporting() {
        let container = Container::new(BridgeSettings::default());
        let scope = container.add_scope("/app", ScopeConfig::default());
        let store = Arc::new(MemoryPrincipalStore::new());
        let m = AuthenticationManager::new(store.clone());
        let mut ex = MemoryExchange::new("/app/x", SessionRegistry::default());
        let mut ctx = AuthenticationContext::new(&mut ex, scope, true).unwrap();

        m.register(&mut ctx, Principal::with_groups("alice", &["user"])).unwrap();
        assert_eq!(store.get().unwrap().name(), "alice");
        assert_eq!(m.registered().unwrap().name(), "alice");
        assert_eq!(m.current_principal(&mut ctx).unwrap().name(), "alice");
        m.invalidate(&mut ctx);
        assert!(m.registered().is_none());
        assert!(store.get().is_none());
    }

    #[test]
    fn forward_prefixes_context_unless_absolute() {
        let container = Container::new(BridgeSettings::default());
        let scope = container.add_scope("/app", ScopeConfig::default());
        let m = AuthenticationManager::new(Arc::new(MemoryPrincipalStore::new()));
        let mut ex = MemoryExchange::new("/app/x", SessionRegistry::default());
        {
            let mut ctx = AuthenticationContext::new(&mut ex, scope.clone(), true).unwrap();
            m.forward(&mut ctx, "/login").unwrap();
            assert!(ctx.forwarded());
        }
        assert_eq!(ex.location(), Some("/app/login"));

        let mut ex = MemoryExchange::new("/app/x", SessionRegistry::default());
        {
            let mut ctx = AuthenticationContext::new(&mut ex, scope, true).unwrap();
            m.forward(&mut ctx, "HTTPS://idp.example/auth").unwrap();
        }
        assert_eq!(ex.location(), Some("HTTPS://idp.example/auth"));
    }

    #[test]
    fn redirect_to_request_needs_saved_state() {
        let container = Container::new(BridgeSettings::default());
        let scope = container.add_scope("/app", ScopeConfig::default());
        let m = AuthenticationManager::new(Arc::new(MemoryPrincipalStore::new()));
        let mut ex = MemoryExchange::new("/app/secret?x=1", SessionRegistry::default());
        {
            let mut ctx = AuthenticationContext::new(&mut ex, scope, true).unwrap();
            assert!(matches!(m.redirect_to_request(&mut ctx), Err(AuthError::NoSavedRequest)));
            m.save_request(&mut ctx).unwrap();
            m.add_query_string(&mut ctx, "lang=en");
            m.redirect_to_request(&mut ctx).unwrap();
        }
        assert_eq!(ex.location(), Some("/app/secret?x=1&lang=en"));
    }
}
