use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::{Authenticator, ManageAction, Status};
use crate::context::AuthenticationContext;
use crate::error::{AuthError, AuthResult};
use crate::manager::AuthenticationManager;

type ChildFactory = Box<dyn Fn() -> Vec<Arc<dyn Authenticator>> + Send + Sync>;

/// Ordered fan-out: the first child with something to say wins.
///
/// Children are either given up front or built by a factory on first use. The factory runs at
/// most once even under concurrent first calls.
pub struct CompositeAuthenticator {
    children: OnceCell<Vec<Arc<dyn Authenticator>>>,
    factory: Option<ChildFactory>,
}

impl CompositeAuthenticator {
    pub fn new(children: Vec<Arc<dyn Authenticator>>) -> Self {
        Self { children: OnceCell::with_value(children), factory: None }
    }

    pub fn lazy<F>(factory: F) -> Self
    where
        F: Fn() -> Vec<Arc<dyn Authenticator>> + Send + Sync + 'static,
    {
        Self { children: OnceCell::new(), factory: Some(Box::new(factory)) }
    }

    pub fn children(&self) -> &[Arc<dyn Authenticator>] {
        self.children.get_or_init(|| match &self.factory {
            Some(f) => {
                let built = f();
                tracing::debug!(target: "authflow::composite", count = built.len(), "children built");
                built
            }
            None => Vec::new(),
        })
    }
}

impl Authenticator for CompositeAuthenticator {
    fn begin(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<()> {
        for child in self.children() {
            child.begin(manager, ctx)?;
        }
        Ok(())
    }

    fn finish(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<()> {
        for child in self.children() {
            child.finish(manager, ctx)?;
        }
        Ok(())
    }

    fn abort(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>, error: &AuthError) {
        for child in self.children() {
            child.abort(manager, ctx, error);
        }
    }

    fn try_authenticate(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        for child in self.children() {
            let s = child.try_authenticate(manager, ctx)?;
            if s != Status::None {
                return Ok(s);
            }
        }
        Ok(Status::None)
    }

    fn authenticate(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        for child in self.children() {
            let s = child.authenticate(manager, ctx)?;
            if s != Status::None {
                return Ok(s);
            }
        }
        Ok(Status::None)
    }

    fn manage(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<ManageAction> {
        for child in self.children() {
            let a = child.manage(manager, ctx)?;
            if a != ManageAction::None {
                return Ok(a);
            }
        }
        Ok(ManageAction::None)
    }
}
