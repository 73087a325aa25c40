//! One orchestration pass per request.
//!
//! ```text
//! begin ─▶ principal stored? ── yes ─▶ manage ── None ──────────────────────┐
//!                 │                     │ Clear: invalidate                 │
//!                 │                     │   forwarded ─▶ Detoured           │
//!                 ▼ no                  ▼                                   ▼
//!          try_authenticate ── Success ─────────────────────────────▶ authorize ─▶ finish
//!                 │ Continue ─▶ Detoured      Failure ─▶ Rejected(401) ─▶ finish
//!                 ▼ None
//!          mandatory? ── no ─▶ Authorized(None) ─▶ finish
//!                 ▼ yes
//!          authenticate ── Success ─▶ authorize   Continue ─▶ Detoured   else ─▶ Rejected(401)
//! ```
//!
//! Errors and panics from any lifecycle call route to `abort` once and then propagate.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::authenticator::{Authenticator, ManageAction, Status};
use crate::authorizer::{AllowAll, Authorizer};
use crate::context::AuthenticationContext;
use crate::error::{AuthError, AuthResult, StatusHint};
use crate::exchange::HttpExchange;
use crate::manager::AuthenticationManager;
use crate::principal::Principal;
use crate::registry::AppScope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Authorized(Option<Principal>),
    Rejected(StatusHint),
    /// A strategy already wrote the response.
    Detoured,
}

enum Decision {
    Terminal(Outcome),
    Detour,
}

pub struct Orchestrator {
    scope: Arc<AppScope>,
    authorizer: Arc<dyn Authorizer>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn guarded<T>(f: impl FnOnce() -> AuthResult<T>) -> AuthResult<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|p| Err(AuthError::Panicked(panic_message(p))))
}

fn fail_closed(mandatory: bool) -> Outcome {
    if mandatory { Outcome::Rejected(StatusHint::Forbidden) } else { Outcome::Authorized(None) }
}

impl Orchestrator {
    pub fn new(scope: Arc<AppScope>) -> Self {
        Self { scope, authorizer: Arc::new(AllowAll) }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn scope(&self) -> &Arc<AppScope> { &self.scope }

    pub fn handle(&self, exchange: &mut dyn HttpExchange, mandatory: bool) -> AuthResult<Outcome> {
        let registry = self.scope.registry();
        let mut ctx = AuthenticationContext::new(exchange, self.scope.clone(), mandatory)?;

        let Some(authenticator) = registry.authenticator() else {
            debug!(target: "authflow::orchestrator", context = self.scope.context_path(), mandatory, "no authenticator, failing closed");
            return Ok(fail_closed(mandatory));
        };
        let store = match registry.create_principal_store(&mut ctx) {
            Ok(s) => s,
            Err(e) => {
                error!(target: "authflow::orchestrator", context = self.scope.context_path(), error = %e, "principal store unavailable");
                return Ok(fail_closed(mandatory));
            }
        };
        let manager = AuthenticationManager::new(store);
        let result = self.run(authenticator.as_ref(), &manager, &mut ctx);
        registry.release_principal_store();
        result
    }

    fn run(&self, a: &dyn Authenticator, m: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Outcome> {
        let decision = guarded(|| self.drive(a, m, ctx));
        match decision {
            Ok(Decision::Detour) => {
                debug!(target: "authflow::orchestrator", path = ctx.request_path(), "detoured");
                Ok(Outcome::Detoured)
            }
            Ok(Decision::Terminal(outcome)) => {
                guarded(|| a.finish(m, ctx))?;
                debug!(target: "authflow::orchestrator", path = ctx.request_path(), outcome = ?outcome, "finished");
                Ok(outcome)
            }
            Err(e) => {
                warn!(target: "authflow::orchestrator", path = ctx.request_path(), error = %e, "aborting");
                let cleanup = catch_unwind(AssertUnwindSafe(|| a.abort(m, ctx, &e)));
                if let Err(p) = cleanup {
                    error!(target: "authflow::orchestrator", panic = %panic_message(p), "abort panicked");
                }
                Err(e)
            }
        }
    }

    fn drive(&self, a: &dyn Authenticator, m: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Decision> {
        a.begin(m, ctx)?;

        let mut principal = None;
        if let Some(existing) = m.current_principal(ctx) {
            match a.manage(m, ctx)? {
                ManageAction::None => {
                    m.adopt(existing.clone());
                    principal = Some(existing);
                }
                ManageAction::Clear => {
                    m.invalidate(ctx);
                    debug!(target: "authflow::orchestrator", principal = %existing, "principal cleared");
                    if ctx.forwarded() {
                        return Ok(Decision::Detour);
                    }
                }
            }
        }

        let principal = match principal {
            Some(p) => p,
            None => match a.try_authenticate(m, ctx)? {
                Status::Success => Self::registered(m)?,
                Status::Continue => return Ok(Decision::Detour),
                Status::Failure => return Ok(Decision::Terminal(Outcome::Rejected(StatusHint::Unauthorized))),
                Status::None if !ctx.mandatory() => return Ok(Decision::Terminal(Outcome::Authorized(None))),
                Status::None => match a.authenticate(m, ctx)? {
                    Status::Success => Self::registered(m)?,
                    Status::Continue => return Ok(Decision::Detour),
                    Status::Failure | Status::None => {
                        return Ok(Decision::Terminal(Outcome::Rejected(StatusHint::Unauthorized)))
                    }
                },
            },
        };

        if self.authorizer.authorize(Some(&principal), ctx) {
            Ok(Decision::Terminal(Outcome::Authorized(Some(principal))))
        } else {
            debug!(target: "authflow::orchestrator", principal = %principal, path = ctx.request_path(), "authorization denied");
            Ok(Decision::Terminal(Outcome::Rejected(StatusHint::Forbidden)))
        }
    }

    fn registered(m: &AuthenticationManager) -> AuthResult<Principal> {
        m.registered()
            .ok_or_else(|| AuthError::strategy("unregistered_principal", "strategy reported success without registering a principal"))
    }
}
