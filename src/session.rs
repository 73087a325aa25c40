use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;

use crate::attributes::AttributeMap;
use crate::error::{AuthError, AuthResult};

pub type SessionId = String;

pub const SESSION_COOKIE: &str = "AUTHFLOW_SESSION";

/// Issues between two opportunistic sweeps of expired sessions.
pub const DEFAULT_SWEEP_EVERY: u64 = 100;

/// 128-bit random token, base64url without padding. Fails when the OS entropy source does.
pub fn gen_token() -> AuthResult<String> {
    token_from(getrandom::getrandom)
}

fn token_from(fill: impl FnOnce(&mut [u8]) -> Result<(), getrandom::Error>) -> AuthResult<String> {
    let mut buf = [0u8; 16];
    fill(&mut buf).map_err(|e| {
        tracing::error!(target: "authflow::session", error = %e, "entropy source unavailable");
        AuthError::Entropy(e.to_string())
    })?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

#[derive(Debug)]
struct SessionEntry {
    /// One attribute map per application scope (context path).
    scopes: HashMap<String, AttributeMap>,
    expires_at: Instant,
}

/// In-process session table used by hosting adapters that have no session layer of their own.
/// Each session id carries a separate attribute map per application scope. Expired sessions
/// are dropped on lookup and by a sweep that runs every `sweep_every` issues.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    issued: Arc<AtomicU64>,
    pub ttl: Duration,
    pub sweep_every: u64,
}

impl Default for SessionRegistry {
    fn default() -> Self { Self::with_ttl(Duration::from_secs(30 * 60)) }
}

impl SessionRegistry {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            issued: Arc::new(AtomicU64::new(0)),
            ttl,
            sweep_every: DEFAULT_SWEEP_EVERY,
        }
    }

    pub fn with_sweep_every(mut self, every: u64) -> Self {
        self.sweep_every = every.max(1);
        self
    }

    pub fn issue(&self) -> AuthResult<SessionId> {
        let sid = gen_token()?;
        let now = Instant::now();
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        let mut w = self.sessions.write();
        if n % self.sweep_every.max(1) == 0 {
            let before = w.len();
            w.retain(|_, e| e.expires_at > now);
            let removed = before - w.len();
            if removed > 0 {
                tracing::debug!(target: "authflow::session", removed, "session sweep");
            }
        }
        w.insert(sid.clone(), SessionEntry { scopes: HashMap::new(), expires_at: now + self.ttl });
        tracing::debug!(target: "authflow::session", ttl_secs = self.ttl.as_secs(), "session.issue");
        Ok(sid)
    }

    /// Attribute map of `scope` inside session `sid`. Expired or unknown sessions read as absent;
    /// with `create` the scope map is created inside a live session.
    pub fn lookup(&self, sid: &str, scope: &str, create: bool) -> Option<AttributeMap> {
        let now = Instant::now();
        let mut w = self.sessions.write();
        let alive = w.get(sid).is_some_and(|e| e.expires_at > now);
        if !alive {
            w.remove(sid);
            return None;
        }
        let ttl = self.ttl;
        let entry = w.get_mut(sid)?;
        entry.expires_at = now + ttl;
        if create {
            Some(entry.scopes.entry(scope.to_string()).or_default().clone())
        } else {
            entry.scopes.get(scope).cloned()
        }
    }

    pub fn contains(&self, sid: &str) -> bool {
        self.sessions.read().get(sid).is_some_and(|e| e.expires_at > Instant::now())
    }

    pub fn invalidate(&self, sid: &str) -> bool { self.sessions.write().remove(sid).is_some() }

    pub fn len(&self) -> usize { self.sessions.read().len() }

    pub fn is_empty(&self) -> bool { self.sessions.read().is_empty() }

    /// Remove expired sessions. Returns number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut w = self.sessions.write();
        let before = w.len();
        w.retain(|_, e| e.expires_at > now);
        before - w.len()
    }
}
