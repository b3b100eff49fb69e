//! Cache store interface and the in-process implementation.
//!
//! Entries are replaced wholesale and never patched, so a plain
//! last-writer-wins map is enough for concurrent access.

use super::CacheError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

/// Key-value store backing [`super::TranslationCache`].
///
/// Implementations may be networked; every call can fail with
/// [`CacheError::Unavailable`], which callers treat as a miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    /// Remove the entry for `key`. Removing a missing key is not an error.
    async fn forget(&self, key: &str) -> Result<(), CacheError>;
}

/// Stand-in lifetime for TTLs too large for the clock to represent.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-process TTL store.
///
/// Uses `tokio::time::Instant` so expiry follows the runtime clock, which
/// tests can pause and advance.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, live or expired.
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .get(key)
                    .is_some_and(|entry| entry.expires_at > Instant::now())
            })
            .unwrap_or(false)
    }

    fn poisoned() -> CacheError {
        CacheError::Unavailable("memory cache lock poisoned".to_string())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().map_err(|_| Self::poisoned())?;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it so the map does not grow with dead locales
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(MAX_TTL))
            .unwrap_or(now);
        let entry = Entry { value, expires_at };
        self.entries
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(key);
        Ok(())
    }
}
