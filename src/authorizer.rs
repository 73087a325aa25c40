//! Authorization seam used between authentication and `finish`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::context::AuthenticationContext;
use crate::principal::Principal;

pub trait Authorizer: Send + Sync {
    fn authorize(&self, principal: Option<&Principal>, ctx: &AuthenticationContext<'_>) -> bool;
}

/// Accepts everything; the host runs its own check afterwards.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _principal: Option<&Principal>, _ctx: &AuthenticationContext<'_>) -> bool { true }
}

/// What a route needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "groups")]
pub enum Access {
    /// Anonymous access allowed.
    Public,
    Authenticated,
    /// Authenticated and member of at least one of the groups.
    AnyGroup(BTreeSet<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub prefix: String,
    pub access: Access,
}

impl RouteRule {
    /// `/` only matches itself; other prefixes match on a segment boundary.
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return path == "/";
        }
        let p = self.prefix.trim_end_matches('/');
        path == p || path.strip_prefix(p).is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Ordered path rules relative to the scope's context path. The first matching rule wins;
/// unmatched paths need authentication when `require_auth_by_default` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutePolicy {
    #[serde(default)]
    pub rules: Vec<RouteRule>,
    #[serde(default)]
    pub require_auth_by_default: bool,
}

impl RoutePolicy {
    pub fn new(require_auth_by_default: bool) -> Self {
        Self { rules: Vec::new(), require_auth_by_default }
    }

    pub fn public(mut self, prefix: &str) -> Self {
        self.rules.push(RouteRule { prefix: prefix.to_string(), access: Access::Public });
        self
    }

    pub fn authenticated(mut self, prefix: &str) -> Self {
        self.rules.push(RouteRule { prefix: prefix.to_string(), access: Access::Authenticated });
        self
    }

    pub fn any_group(mut self, prefix: &str, groups: &[&str]) -> Self {
        let set = groups.iter().map(|g| g.to_string()).collect();
        self.rules.push(RouteRule { prefix: prefix.to_string(), access: Access::AnyGroup(set) });
        self
    }

    pub fn resolve(&self, path: &str) -> Access {
        match self.rules.iter().find(|r| r.matches(path)) {
            Some(r) => r.access.clone(),
            None if self.require_auth_by_default => Access::Authenticated,
            None => Access::Public,
        }
    }

    pub fn is_mandatory(&self, path: &str) -> bool { self.resolve(path) != Access::Public }

    pub fn permits(&self, path: &str, principal: Option<&Principal>) -> bool {
        match self.resolve(path) {
            Access::Public => true,
            Access::Authenticated => principal.is_some(),
            Access::AnyGroup(groups) => principal.is_some_and(|p| groups.iter().any(|g| p.has_group(g))),
        }
    }
}

impl Authorizer for RoutePolicy {
    fn authorize(&self, principal: Option<&Principal>, ctx: &AuthenticationContext<'_>) -> bool {
        self.permits(ctx.request_path(), principal)
    }
}
