//! Read-through cache for exports and the lookups that feed them.
//!
//! The cache store is an explicit handle ([`CacheStore`]) shared by the
//! export engine and the [`Invalidator`]; nothing here is global.
//!
//! Failure policy: a store that cannot be reached never fails a read. `get`
//! degrades to a miss and `put` is skipped, so the caller recomputes from the
//! database. Invalidation errors, on the other hand, are returned, because a
//! write that could not clear its entries leaves stale exports behind.
//!
//! There is no single-flight: concurrent misses on the same key each run the
//! producer. Producers are deterministic reads, so the duplicate work costs
//! time but never correctness. A value is stored only after its producer has
//! finished, so a cancelled or failed producer leaves the entry absent.
//!
//! Every key carries a generation that [`TranslationCache::invalidate`] bumps
//! before removing the entry. A producer whose key was invalidated while it
//! ran may have read pre-commit rows, so its result is returned to its own
//! caller but never left in the store.

pub mod invalidation;
pub mod metrics;
pub mod store;

pub use invalidation::Invalidator;
pub use metrics::{CacheMetrics, CacheReport};
pub use store::{CacheStore, MemoryCacheStore};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_PREFIX: &str = "translation_";

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Tunables for [`TranslationCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Lifetime of every entry
    pub ttl: Duration,
    /// Prepended to every cache key
    pub prefix: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct TranslationCache {
    store: Arc<dyn CacheStore>,
    settings: CacheSettings,
    metrics: Arc<CacheMetrics>,
    generations: Arc<Mutex<HashMap<String, u64>>>,
}

impl TranslationCache {
    pub fn new(store: Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        Self {
            store,
            settings,
            metrics: Arc::new(CacheMetrics::new()),
            generations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn generation(&self, key: &str) -> u64 {
        self.generations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    fn bump_generation(&self, key: &str) {
        let mut generations = self.generations.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *generations.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn ttl(&self) -> Duration {
        self.settings.ttl
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Nested export of one locale.
    pub fn export_key(&self, locale: &str) -> String {
        format!("{}export:{}", self.settings.prefix, locale)
    }

    /// Ordered list of all language codes.
    pub fn available_locales_key(&self) -> String {
        format!("{}available_locales", self.settings.prefix)
    }

    /// Numeric language id for a code.
    pub fn language_id_key(&self, locale: &str) -> String {
        format!("{}language_id:{}", self.settings.prefix, locale)
    }

    /// Read a live entry, treating an unreachable store or an undecodable
    /// value as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, computing directly");
                self.metrics.record_fallback();
                None
            }
        };

        let decoded = value.and_then(|value| match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        });

        if decoded.is_some() {
            debug!(key, "Cache hit");
            self.metrics.record_hit();
        } else {
            debug!(key, "Cache miss");
            self.metrics.record_miss();
        }
        decoded
    }

    /// Store `value` under `key` for `ttl`. Failures are logged, not returned.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Value is not cacheable, skipping");
                return;
            }
        };

        if let Err(e) = self.store.put(key, value, ttl).await {
            warn!(key, error = %e, "Cache write failed, result served uncached");
            self.metrics.record_fallback();
        }
    }

    /// Return the cached value for `key`, or run `producer`, cache its
    /// result for `ttl` and return it.
    ///
    /// Empty results are cached like any other. Producer errors are
    /// returned and nothing is stored.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(cached);
        }

        let generation = self.generation(key);
        let value = producer().await?;
        if self.generation(key) != generation {
            debug!(key, "Entry invalidated while computing, result not cached");
            return Ok(value);
        }

        self.put(key, &value, ttl).await;
        // An invalidation that landed between the check and the put has
        // already run its forget, so the entry has to go again
        if self.generation(key) != generation {
            debug!(key, "Entry invalidated during store, removing it");
            if let Err(e) = self.store.forget(key).await {
                warn!(key, error = %e, "Could not remove superseded cache entry");
            }
        }
        Ok(value)
    }

    /// Remove one entry.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        // Bump first so a producer that stores after this forget still sees the change
        self.bump_generation(key);
        self.store.forget(key).await?;
        self.metrics.record_invalidation();
        debug!(key, "Cache entry invalidated");
        Ok(())
    }

    /// Remove several entries. Every key is attempted; the first error is
    /// returned after the rest have been tried.
    pub async fn invalidate_many<I, K>(&self, keys: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.invalidate(key.as_ref()).await {
                warn!(key = key.as_ref(), error = %e, "Cache invalidation failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
