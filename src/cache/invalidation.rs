//! Decides which cache entries a write makes stale and clears them.
//!
//! Callers invoke these after their database commit and before responding.
//! A reader that loaded pre-commit rows and finishes after the invalidation
//! sees its key's generation change and does not leave its result cached, so
//! once the write is acknowledged the next read recomputes.

use super::{CacheError, TranslationCache};
use tracing::debug;

#[derive(Clone)]
pub struct Invalidator {
    cache: TranslationCache,
}

impl Invalidator {
    pub fn new(cache: TranslationCache) -> Self {
        Self { cache }
    }

    /// A translation was created (`old_locale = None`) or updated.
    ///
    /// Clears the new locale's export, plus the old one when the
    /// translation moved between languages.
    pub async fn on_translation_written(
        &self,
        old_locale: Option<&str>,
        new_locale: &str,
    ) -> Result<(), CacheError> {
        let mut keys = Vec::with_capacity(2);
        match old_locale {
            Some(old) => {
                keys.push(self.cache.export_key(old));
                if old != new_locale {
                    keys.push(self.cache.export_key(new_locale));
                }
            }
            None => keys.push(self.cache.export_key(new_locale)),
        }

        debug!(?old_locale, new_locale, "Invalidating exports after translation write");
        self.cache.invalidate_many(keys).await
    }

    pub async fn on_translation_deleted(&self, locale: &str) -> Result<(), CacheError> {
        debug!(locale, "Invalidating export after translation delete");
        self.cache.invalidate(&self.cache.export_key(locale)).await
    }

    /// A language was created, renamed or removed.
    pub async fn on_language_changed(&self, code: &str) -> Result<(), CacheError> {
        debug!(code, "Invalidating locale list and lookups after language change");
        self.cache
            .invalidate_many([
                self.cache.available_locales_key(),
                self.cache.language_id_key(code),
                self.cache.export_key(code),
            ])
            .await
    }

    /// Clear every entry derived from the given language codes.
    pub async fn invalidate_all(&self, codes: &[String]) -> Result<(), CacheError> {
        let mut keys = vec![self.cache.available_locales_key()];
        for code in codes {
            keys.push(self.cache.export_key(code));
            keys.push(self.cache.language_id_key(code));
        }
        self.cache.invalidate_many(keys).await
    }
}
