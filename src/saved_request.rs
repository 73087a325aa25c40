//! Saved-request bookkeeping across a login detour.
//!
//! The saved request lives in the authentication-scoped map under four keys: context, path,
//! query, and the list of appended query fragments. It is present exactly while a detour is
//! outstanding.

use serde::{Deserialize, Serialize};

use crate::context::AuthenticationContext;
use crate::error::AuthResult;

pub const KEY_CONTEXT: &str = "authflow.saved.context";
pub const KEY_PATH: &str = "authflow.saved.path";
pub const KEY_QUERY: &str = "authflow.saved.query";
pub const KEY_APPENDED: &str = "authflow.saved.appended";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRequest {
    pub context_path: String,
    pub path: String,
    pub query: Option<String>,
    pub appended: Vec<String>,
}

impl SavedRequest {
    /// `path?query&frag1&frag2`, omitting the `?` when there is nothing to append.
    pub fn path_with_query(&self) -> String {
        let parts: Vec<&str> = self
            .query
            .iter()
            .map(String::as_str)
            .chain(self.appended.iter().map(String::as_str))
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, parts.join("&"))
        }
    }
}

/// Stateless accessor over the authentication-scoped map.
#[derive(Debug, Default, Clone, Copy)]
pub struct SavedRequestTracker;

impl SavedRequestTracker {
    pub fn has_request(&self, ctx: &mut AuthenticationContext<'_>) -> bool {
        ctx.authentication(false).is_some_and(|m| m.contains_key(KEY_PATH))
    }

    /// Record the current request (origin context, path and query).
    pub fn save_request(&self, ctx: &mut AuthenticationContext<'_>) -> AuthResult<()> {
        let path = ctx.request_path().to_string();
        let query = ctx.query_string().filter(|q| !q.is_empty()).map(str::to_string);
        self.save(ctx, path, query)
    }

    /// Record an explicit landing path with no query.
    pub fn save_request_path(&self, ctx: &mut AuthenticationContext<'_>, path: &str) -> AuthResult<()> {
        self.save(ctx, path.to_string(), None)
    }

    fn save(&self, ctx: &mut AuthenticationContext<'_>, path: String, query: Option<String>) -> AuthResult<()> {
        let context = ctx.origin_context_path().to_string();
        let Some(map) = ctx.authentication(true) else {
            tracing::debug!(target: "authflow::saved_request", path = %path, "no authentication scope, request not saved");
            return Ok(());
        };
        map.put(KEY_CONTEXT, &context)?;
        map.put(KEY_PATH, &path)?;
        match query {
            Some(q) => map.put(KEY_QUERY, &q)?,
            None => {
                map.remove(KEY_QUERY);
            }
        }
        map.remove(KEY_APPENDED);
        tracing::debug!(target: "authflow::saved_request", context = %context, path = %path, "request saved");
        Ok(())
    }

    /// Current saved request, if any. Without a recorded context path the state is treated
    /// as absent.
    pub fn load(&self, ctx: &mut AuthenticationContext<'_>) -> Option<SavedRequest> {
        let map = ctx.authentication(false)?;
        let path = map.get_str(KEY_PATH)?;
        let context_path = map.get_str(KEY_CONTEXT)?;
        Some(SavedRequest {
            context_path,
            path,
            query: map.get_str(KEY_QUERY).filter(|q| !q.is_empty()),
            appended: map.get_as::<Vec<String>>(KEY_APPENDED).unwrap_or_default(),
        })
    }

    pub fn path_for_request(&self, ctx: &mut AuthenticationContext<'_>) -> Option<String> {
        self.load(ctx).map(|r| r.path_with_query())
    }

    pub fn context_for_request(&self, ctx: &mut AuthenticationContext<'_>) -> Option<String> {
        self.load(ctx).map(|r| r.context_path)
    }

    /// True only when both the saved path and the saved context equal the current request's.
    pub fn matches_request(&self, ctx: &mut AuthenticationContext<'_>) -> bool {
        match self.load(ctx) {
            Some(saved) => saved.path == ctx.request_path() && saved.context_path == ctx.origin_context_path(),
            None => false,
        }
    }

    /// Append a query fragment to the saved request. No-op when nothing is saved.
    pub fn add_query_string(&self, ctx: &mut AuthenticationContext<'_>, fragment: &str) {
        if fragment.is_empty() || !self.has_request(ctx) {
            return;
        }
        if let Some(map) = ctx.authentication(false) {
            map.push_to_list(KEY_APPENDED, fragment);
        }
    }

    /// Take the saved request when it matches the current request.
    pub fn restore_request(&self, ctx: &mut AuthenticationContext<'_>) -> Option<SavedRequest> {
        if !self.matches_request(ctx) {
            return None;
        }
        let saved = self.load(ctx);
        self.clear_request(ctx);
        saved
    }

    pub fn clear_request(&self, ctx: &mut AuthenticationContext<'_>) {
        if let Some(map) = ctx.authentication(false) {
            for key in [KEY_CONTEXT, KEY_PATH, KEY_QUERY, KEY_APPENDED] {
                map.remove(key);
            }
        }
    }
}
