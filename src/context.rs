//! Per-request view handed to strategies.
//!
//! The context wraps the transport exchange and exposes the four attribute scopes:
//! request, session, application and authentication. The authentication scope is bound to the
//! scope the request arrived on ("origin"). It aliases the origin session, or the bridge
//! correlation when that scope runs in cross-context mode. Session and application lookups
//! follow the *current* scope, which [`AuthenticationContext::within_scope`] can rebind.

use std::sync::Arc;

use crate::attributes::AttributeMap;
use crate::bridge::Correlation;
use crate::error::{AuthError, AuthResult};
use crate::exchange::{Certificate, HttpExchange};
use crate::registry::AppScope;

pub struct AuthenticationContext<'a> {
    exchange: &'a mut dyn HttpExchange,
    origin: Arc<AppScope>,
    scope: Arc<AppScope>,
    request_path: String,
    mandatory: bool,
    forwarded: bool,
}

/// Split a request URI into the part below `context_path`. The root context is `""`.
pub(crate) fn path_within(context_path: &str, uri: &str) -> Option<String> {
    let rest = uri.strip_prefix(context_path)?;
    if rest.is_empty() {
        return Some("/".to_string());
    }
    if rest.starts_with('/') { Some(rest.to_string()) } else { None }
}

impl<'a> AuthenticationContext<'a> {
    pub fn new(exchange: &'a mut dyn HttpExchange, scope: Arc<AppScope>, mandatory: bool) -> AuthResult<Self> {
        let request_path = path_within(scope.context_path(), exchange.request_uri()).ok_or_else(|| {
            AuthError::MalformedRequest(format!(
                "'{}' is outside context '{}'",
                exchange.request_uri(),
                scope.context_path()
            ))
        })?;
        Ok(Self { exchange, origin: scope.clone(), scope, request_path, mandatory, forwarded: false })
    }

    /// Path below the context path, always starting with `/`.
    pub fn request_path(&self) -> &str { &self.request_path }

    /// Context path of the scope currently in effect.
    pub fn context_path(&self) -> &str { self.scope.context_path() }

    /// Context path of the scope the request arrived on.
    pub fn origin_context_path(&self) -> &str { self.origin.context_path() }

    pub fn scope(&self) -> &Arc<AppScope> { &self.scope }
    pub fn origin(&self) -> &Arc<AppScope> { &self.origin }

    pub fn mandatory(&self) -> bool { self.mandatory }
    pub fn forwarded(&self) -> bool { self.forwarded }
    pub fn set_forwarded(&mut self, forwarded: bool) { self.forwarded = forwarded; }

    pub fn query_string(&self) -> Option<&str> { self.exchange.query_string() }
    pub fn parameter(&self, name: &str) -> Option<String> { self.exchange.parameter(name) }
    pub fn parameters(&self) -> Vec<(String, String)> { self.exchange.parameters() }
    pub fn header(&self, name: &str) -> Option<String> { self.exchange.header(name) }
    pub fn cookie(&self, name: &str) -> Option<String> { self.exchange.cookie(name) }
    pub fn client_certificates(&self) -> Option<Vec<Certificate>> { self.exchange.client_certificates() }

    pub fn exchange_mut(&mut self) -> &mut dyn HttpExchange { &mut *self.exchange }

    pub fn request(&self) -> AttributeMap { self.exchange.attributes() }

    pub fn application(&self) -> AttributeMap { self.scope.attributes() }

    pub fn session(&mut self, create: bool) -> Option<AttributeMap> {
        let path = self.scope.context_path().to_string();
        self.exchange.session(&path, create)
    }

    /// Session map of an arbitrary scope, regardless of the scope in effect.
    pub fn session_for(&mut self, context_path: &str, create: bool) -> Option<AttributeMap> {
        self.exchange.session(context_path, create)
    }

    /// The caller's bridge correlation, issuing one when `create` is set.
    pub fn correlation(&mut self, create: bool) -> Option<Arc<Correlation>> {
        let bridge = self.origin.bridge().clone();
        bridge.resolve(&mut *self.exchange, create)
    }

    /// Map reserved for cross-request bookkeeping (saved requests, pending logins).
    pub fn authentication(&mut self, create: bool) -> Option<AttributeMap> {
        if self.origin.is_cross_context() {
            self.correlation(create).map(|c| c.attributes())
        } else {
            let path = self.origin.context_path().to_string();
            self.exchange.session(&path, create)
        }
    }

    /// Run `f` with scope lookups rebound to `scope`, restoring the previous scope afterwards.
    /// The previous scope is restored even when `f` unwinds.
    pub fn within_scope<R>(&mut self, scope: Arc<AppScope>, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.scope, scope);
        let guard = ScopeRestore { ctx: self, previous: Some(previous) };
        f(&mut *guard.ctx)
    }
}

struct ScopeRestore<'g, 'a> {
    ctx: &'g mut AuthenticationContext<'a>,
    previous: Option<Arc<AppScope>>,
}

impl Drop for ScopeRestore<'_, '_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.ctx.scope = previous;
        }
    }
}
