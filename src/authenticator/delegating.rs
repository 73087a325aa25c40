use std::sync::{Arc, Weak};

use super::{Authenticator, ManageAction, Status};
use crate::context::AuthenticationContext;
use crate::error::{AuthError, AuthResult, RegistryError};
use crate::manager::AuthenticationManager;
use crate::registry::AppScope;

/// Runs another scope's authenticator with session and application lookups rebound to that
/// scope.
pub struct DelegatingAuthenticator {
    target: Weak<AppScope>,
    context_path: String,
    inner: Arc<dyn Authenticator>,
}

impl DelegatingAuthenticator {
    pub fn new(target: &Arc<AppScope>, inner: Arc<dyn Authenticator>) -> Self {
        Self { target: Arc::downgrade(target), context_path: target.context_path().to_string(), inner }
    }

    pub fn target_context_path(&self) -> &str { &self.context_path }

    fn target(&self) -> AuthResult<Arc<AppScope>> {
        self.target.upgrade().ok_or_else(|| AuthError::from(RegistryError::MissingScope(self.context_path.clone())))
    }
}

impl Authenticator for DelegatingAuthenticator {
    fn begin(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<()> {
        let scope = self.target()?;
        ctx.within_scope(scope, |c| self.inner.begin(manager, c))
    }

    fn finish(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<()> {
        let scope = self.target()?;
        ctx.within_scope(scope, |c| self.inner.finish(manager, c))
    }

    fn abort(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>, error: &AuthError) {
        match self.target() {
            Ok(scope) => ctx.within_scope(scope, |c| self.inner.abort(manager, c, error)),
            Err(_) => self.inner.abort(manager, ctx, error),
        }
    }

    fn try_authenticate(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        let scope = self.target()?;
        ctx.within_scope(scope, |c| self.inner.try_authenticate(manager, c))
    }

    fn authenticate(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        let scope = self.target()?;
        ctx.within_scope(scope, |c| self.inner.authenticate(manager, c))
    }

    fn manage(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<ManageAction> {
        let scope = self.target()?;
        ctx.within_scope(scope, |c| self.inner.manage(manager, c))
    }
}
