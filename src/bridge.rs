//! Cross-context identity bridge.
//!
//! Independent application scopes see the same caller through a correlation token kept in a
//! dedicated cookie. The token keys a shared attribute map held in a process-wide table.
//! The table is a TTL cache with a capacity bound: every access slides the entry's expiry,
//! and an opportunistic sweep runs every `sweep_every` accesses. The sweep uses `try_write`
//! and is skipped under contention, so cleanup is eventual rather than immediate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use crate::attributes::AttributeMap;
use crate::config::BridgeSettings;
use crate::exchange::{Cookie, HttpExchange};
use crate::session::gen_token;

pub const CORRELATION_COOKIE: &str = "AUTHFLOW_XCTX";
const IN_REQUEST_KEY: &str = "authflow.bridge.token";

/// Attributes shared by every scope that presents the same correlation token.
#[derive(Debug)]
pub struct Correlation {
    token: String,
    attributes: AttributeMap,
}

impl Correlation {
    pub fn token(&self) -> &str { &self.token }
    pub fn attributes(&self) -> AttributeMap { self.attributes.clone() }
}

struct Entry {
    correlation: Arc<Correlation>,
    expires_at: Instant,
    /// Logical access clock used for least-recently-used eviction.
    last_access: u64,
}

pub struct CrossContextBridge {
    settings: BridgeSettings,
    entries: RwLock<HashMap<String, Entry>>,
    clock: AtomicU64,
    accesses: AtomicU64,
}

impl Default for CrossContextBridge {
    fn default() -> Self { Self::new(BridgeSettings::default()) }
}

impl CrossContextBridge {
    pub fn new(settings: BridgeSettings) -> Self {
        Self { settings, entries: RwLock::new(HashMap::new()), clock: AtomicU64::new(0), accesses: AtomicU64::new(0) }
    }

    pub fn settings(&self) -> &BridgeSettings { &self.settings }

    fn ttl(&self) -> Duration { Duration::from_secs(self.settings.ttl_secs) }

    /// Resolve the caller's correlation.
    ///
    /// The first resolution in a request is memoized in the request attributes so later
    /// lookups (for instance from a delegated scope) agree on the token. Without a cookie a
    /// fresh token is issued, but only when `create` is set.
    pub fn resolve(&self, exchange: &mut dyn HttpExchange, create: bool) -> Option<Arc<Correlation>> {
        let request_attrs = exchange.attributes();
        let token = match request_attrs.get_str(IN_REQUEST_KEY).or_else(|| exchange.cookie(CORRELATION_COOKIE)) {
            Some(t) => t,
            None if create => {
                let t = gen_token().ok()?;
                exchange.add_cookie(Cookie::session(CORRELATION_COOKIE, &t));
                debug!(target: "authflow::bridge", "issued correlation cookie");
                t
            }
            None => return None,
        };
        let found = self.lookup(&token, create);
        if found.is_some() {
            request_attrs.put_value(IN_REQUEST_KEY, serde_json::Value::String(token));
        }
        self.note_access();
        found
    }

    /// Look up a token directly, sliding its expiry. With `create` a missing or expired entry
    /// is replaced by a fresh one under the same token.
    pub fn lookup(&self, token: &str, create: bool) -> Option<Arc<Correlation>> {
        let now = Instant::now();
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);
        let ttl = self.ttl();
        let mut w = self.entries.write();
        if let Some(entry) = w.get_mut(token) {
            if entry.expires_at > now {
                entry.expires_at = now + ttl;
                entry.last_access = tick;
                return Some(entry.correlation.clone());
            }
            w.remove(token);
        }
        if !create {
            return None;
        }
        let correlation = Arc::new(Correlation { token: token.to_string(), attributes: AttributeMap::new() });
        w.insert(token.to_string(), Entry { correlation: correlation.clone(), expires_at: now + ttl, last_access: tick });
        let over = w.len().saturating_sub(self.settings.capacity);
        if over > 0 {
            evict_oldest(&mut w, over);
        }
        Some(correlation)
    }

    fn note_access(&self) {
        let every = self.settings.sweep_every.max(1);
        let n = self.accesses.fetch_add(1, Ordering::Relaxed) + 1;
        if n % every == 0 {
            if let Some(removed) = self.try_sweep() {
                if removed > 0 {
                    debug!(target: "authflow::bridge", removed, "correlation sweep");
                }
            }
        }
    }

    /// Non-blocking sweep; `None` when the table was busy.
    pub fn try_sweep(&self) -> Option<usize> {
        let mut w = self.entries.try_write()?;
        Some(sweep_locked(&mut w, self.settings.capacity))
    }

    /// Remove expired entries and trim to capacity. Returns number removed.
    pub fn sweep(&self) -> usize {
        let mut w = self.entries.write();
        sweep_locked(&mut w, self.settings.capacity)
    }

    pub fn len(&self) -> usize { self.entries.read().len() }

    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }
}

fn sweep_locked(w: &mut HashMap<String, Entry>, capacity: usize) -> usize {
    let now = Instant::now();
    let before = w.len();
    w.retain(|_, e| e.expires_at > now);
    let over = w.len().saturating_sub(capacity);
    if over > 0 {
        evict_oldest(w, over);
    }
    before - w.len()
}

fn evict_oldest(w: &mut HashMap<String, Entry>, count: usize) {
    let mut by_age: Vec<(u64, String)> = w.iter().map(|(k, e)| (e.last_access, k.clone())).collect();
    by_age.sort_unstable();
    for (_, k) in by_age.into_iter().take(count) {
        w.remove(&k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MemoryExchange;
    use crate::session::SessionRegistry;
    use serde_json::json;

    fn settings(ttl_secs: u64, capacity: usize, sweep_every: u64) -> BridgeSettings {
        BridgeSettings { ttl_secs, capacity, sweep_every }
    }

    #[test]
    fn resolve_issues_cookie_and_memoizes_in_request() {
        let bridge = CrossContextBridge::default();
        let mut ex = MemoryExchange::new("/app/", SessionRegistry::default());
        assert!(bridge.resolve(&mut ex, false).is_none());
        assert!(ex.set_cookies().is_empty());

        let c1 = bridge.resolve(&mut ex, true).unwrap();
        let c2 = bridge.resolve(&mut ex, true).unwrap();
        assert!(Arc::ptr_eq(&c1, &c2));
        assert_eq!(ex.set_cookies().len(), 1);
        assert_eq!(ex.set_cookie_value(CORRELATION_COOKIE), Some(c1.token()));
    }

    #[test]
    fn same_cookie_shares_attributes_across_requests() {
        let bridge = CrossContextBridge::default();
        let reg = SessionRegistry::default();
        let mut first = MemoryExchange::new("/app/", reg.clone());
        let c = bridge.resolve(&mut first, true).unwrap();
        c.attributes().put_value("k", json!("v"));

        let mut second = MemoryExchange::new("/shop/", reg).with_cookie(CORRELATION_COOKIE, c.token());
        let again = bridge.resolve(&mut second, false).unwrap();
        assert_eq!(again.attributes().get_str("k").as_deref(), Some("v"));
        assert!(second.set_cookies().is_empty());
    }

    #[test]
    fn expired_entries_are_recreated_empty() {
        let bridge = CrossContextBridge::new(settings(0, 10, 100));
        let c = bridge.lookup("tok", true).unwrap();
        c.attributes().put_value("k", json!(1));
        assert!(bridge.lookup("tok", false).is_none());
        let fresh = bridge.lookup("tok", true).unwrap();
        assert!(fresh.attributes().is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let bridge = CrossContextBridge::new(settings(600, 2, 1000));
        bridge.lookup("a", true);
        bridge.lookup("b", true);
        bridge.lookup("a", false);
        bridge.lookup("c", true);
        assert_eq!(bridge.len(), 2);
        assert!(bridge.lookup("a", false).is_some());
        assert!(bridge.lookup("b", false).is_none());
    }

    #[test]
    fn periodic_sweep_prunes_expired() {
        let bridge = CrossContextBridge::new(settings(0, 100, 2));
        for t in ["x", "y", "z"] {
            bridge.lookup(t, true);
        }
        assert_eq!(bridge.len(), 3);
        let mut ex = MemoryExchange::new("/", SessionRegistry::default());
        bridge.resolve(&mut ex, false);
        bridge.resolve(&mut ex, false);
        assert_eq!(bridge.len(), 0);
        assert_eq!(bridge.sweep(), 0);
    }
}
