//! Shared key/value maps backing the request, session, application and authentication scopes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::AuthResult;

/// A cheaply clonable handle to one attribute scope. Clones share the same map.
#[derive(Clone, Default)]
pub struct AttributeMap {
    inner: Arc<RwLock<HashMap<String, JsonValue>>>,
}

impl AttributeMap {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, key: &str) -> Option<JsonValue> { self.inner.read().get(key).cloned() }

    /// Decode a value into `T`. A value of the wrong shape reads as absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let v = self.get(key)?;
        match serde_json::from_value(v) {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!(target: "authflow::attributes", key, error = %e, "attribute has unexpected shape");
                None
            }
        }
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.inner.read().get(key).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn put<T: Serialize>(&self, key: impl Into<String>, value: &T) -> AuthResult<()> {
        let v = serde_json::to_value(value)?;
        self.put_value(key, v);
        Ok(())
    }

    pub fn put_value(&self, key: impl Into<String>, value: JsonValue) {
        self.inner.write().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<JsonValue> { self.inner.write().remove(key) }

    pub fn contains_key(&self, key: &str) -> bool { self.inner.read().contains_key(key) }

    /// Append a string to the JSON array stored under `key`, creating it when missing.
    /// A non-array value under the key is replaced.
    pub fn push_to_list(&self, key: &str, item: &str) {
        let mut w = self.inner.write();
        let slot = w.entry(key.to_string()).or_insert_with(|| JsonValue::Array(Vec::new()));
        match slot {
            JsonValue::Array(items) => items.push(JsonValue::String(item.to_string())),
            other => *other = JsonValue::Array(vec![JsonValue::String(item.to_string())]),
        }
    }

    pub fn keys(&self) -> Vec<String> { self.inner.read().keys().cloned().collect() }
    pub fn len(&self) -> usize { self.inner.read().len() }
    pub fn is_empty(&self) -> bool { self.inner.read().is_empty() }
    pub fn clear(&self) { self.inner.write().clear(); }

    /// True when both handles point at the same underlying map.
    pub fn same_map(&self, other: &AttributeMap) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }
}

impl std::fmt::Debug for AttributeMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys = self.keys();
        keys.sort();
        f.debug_struct("AttributeMap").field("keys", &keys).finish()
    }
}
