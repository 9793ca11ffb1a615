//! Response cache keyed by method and parameters.
//!
//! Entries expire on read; nothing is evicted. Only successful results are
//! ever stored.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    value: Value,
    stored_at: Instant,
}

/// TTL cache of successful JSON-RPC results.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    /// A zero `ttl` disables the cache: `get` never hits.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if !self.is_enabled() {
            return None;
        }
        self.entries()
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    pub fn put(&self, key: String, value: Value) {
        if !self.is_enabled() {
            return;
        }
        self.entries().insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Build the cache key for a call.
///
/// Parameters are written with object keys sorted, so equal parameter
/// objects produce the same key whatever order the client sent them in.
pub fn cache_key(method: &str, params: Option<&Value>) -> String {
    let mut key = format!("{method}:");
    match params {
        Some(params) => write_canonical(params, &mut key),
        None => key.push_str("null"),
    }
    key
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(&map[k], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
