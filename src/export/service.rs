//! Locale export engine.
//!
//! Reads one locale's translations as a key-ordered stream, folds them into a
//! [`Tree`] and caches the result per locale. Unknown locales export as an
//! empty tree rather than an error; the write path is the strict side.

use super::tree::Tree;
use crate::cache::TranslationCache;
use crate::store::{StoreError, TranslationStore};
use futures::TryStreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Export of every known locale, keyed by language code.
pub type LocaleExports = BTreeMap<String, Tree>;

#[derive(Clone)]
pub struct ExportService {
    store: Arc<dyn TranslationStore>,
    cache: TranslationCache,
}

impl ExportService {
    pub fn new(store: Arc<dyn TranslationStore>, cache: TranslationCache) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    /// Nested tree for `locale`, served from cache when fresh.
    ///
    /// Unknown locales get an empty tree that is not cached, so arbitrary
    /// codes cannot fill the cache.
    pub async fn export_for_locale(&self, locale: &str) -> Result<Tree, ExportError> {
        let Some(language_id) = self.language_id(locale).await? else {
            debug!(locale, "Unknown locale, exporting empty tree");
            return Ok(Tree::new());
        };

        let key = self.cache.export_key(locale);
        self.cache
            .get_or_compute(&key, self.cache.ttl(), || {
                self.build_locale_tree(locale, language_id)
            })
            .await
    }

    /// Trees for every known locale.
    pub async fn export_all(&self) -> Result<LocaleExports, ExportError> {
        let locales = self.available_locales().await?;
        let mut exports = LocaleExports::new();
        for locale in locales {
            let tree = self.export_for_locale(&locale).await?;
            exports.insert(locale, tree);
        }
        Ok(exports)
    }

    /// All language codes, cached as one entry.
    pub async fn available_locales(&self) -> Result<Vec<String>, ExportError> {
        let key = self.cache.available_locales_key();
        self.cache
            .get_or_compute(&key, self.cache.ttl(), || async {
                self.store.language_codes().await.map_err(ExportError::from)
            })
            .await
    }

    /// Resolve a language code, caching only ids that exist.
    async fn language_id(&self, locale: &str) -> Result<Option<i64>, ExportError> {
        let key = self.cache.language_id_key(locale);
        if let Some(id) = self.cache.get::<i64>(&key).await {
            return Ok(Some(id));
        }

        let id = self.store.language_id(locale).await?;
        if let Some(id) = id {
            self.cache.put(&key, &id, self.cache.ttl()).await;
        }
        Ok(id)
    }

    async fn build_locale_tree(&self, locale: &str, language_id: i64) -> Result<Tree, ExportError> {
        let mut tree = Tree::new();
        let mut rows = self.store.stream_translations(language_id);
        let mut count = 0usize;
        while let Some(row) = rows.try_next().await? {
            tree.insert(&row.key, row.content);
            count += 1;
        }

        info!(locale, translations = count, "Built locale export");
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::FlakyCacheStore;
    use crate::cache::{CacheSettings, Invalidator, MemoryCacheStore};
    use crate::store::memory::MemoryStore;
    use crate::store::NewTranslation;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        cache_store: Arc<MemoryCacheStore>,
        exports: ExportService,
        invalidator: Invalidator,
    }

    fn fixture_with_ttl(ttl: Duration) -> Fixture {
        let store = Arc::new(MemoryStore::with_languages(&[
            ("en", "English"),
            ("fr", "French"),
        ]));
        let cache_store = Arc::new(MemoryCacheStore::new());
        let cache = TranslationCache::new(
            cache_store.clone(),
            CacheSettings {
                ttl,
                ..Default::default()
            },
        );
        Fixture {
            exports: ExportService::new(store.clone(), cache.clone()),
            invalidator: Invalidator::new(cache),
            store,
            cache_store,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_ttl(Duration::from_secs(3600))
    }

    async fn add(store: &MemoryStore, locale: &str, key: &str, content: &str) -> i64 {
        let language_id = store.language_id(locale).await.unwrap().unwrap();
        store
            .insert_translation(&NewTranslation {
                key: key.to_string(),
                content: content.to_string(),
                language_id,
                tag_ids: vec![],
            })
            .await
            .unwrap()
            .id
    }

    // ==================== Export Shape Tests ====================

    #[tokio::test]
    async fn test_export_for_locale_nests_keys() {
        let f = fixture();
        add(&f.store, "en", "home.title", "Welcome").await;
        add(&f.store, "en", "home.subtitle", "Hi").await;
        add(&f.store, "fr", "home.title", "Bienvenue").await;

        let tree = f.exports.export_for_locale("en").await.unwrap();

        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({"home": {"title": "Welcome", "subtitle": "Hi"}})
        );
    }

    #[tokio::test]
    async fn test_export_all_groups_by_locale() {
        let f = fixture();
        add(&f.store, "en", "greeting", "Hello").await;
        add(&f.store, "fr", "greeting", "Bonjour").await;

        let all = f.exports.export_all().await.unwrap();

        assert_eq!(
            serde_json::to_value(&all).unwrap(),
            json!({"en": {"greeting": "Hello"}, "fr": {"greeting": "Bonjour"}})
        );
    }

    #[tokio::test]
    async fn test_collision_follows_key_order() {
        let f = fixture();
        // Inserted out of order; the export reads "a.b" before "a.b.c"
        add(&f.store, "en", "a.b.c", "y").await;
        add(&f.store, "en", "a.b", "x").await;

        let tree = f.exports.export_for_locale("en").await.unwrap();
        assert_eq!(serde_json::to_value(&tree).unwrap(), json!({"a": {"b": {"c": "y"}}}));
    }

    // ==================== Unknown / Empty Locale Tests ====================

    #[tokio::test]
    async fn test_unknown_locale_exports_empty_without_reading_rows() {
        let f = fixture();

        let tree = f.exports.export_for_locale("de").await.unwrap();

        assert!(tree.is_empty());
        assert_eq!(f.store.export_reads(), 0);
    }

    #[tokio::test]
    async fn test_unknown_locale_id_is_not_cached() {
        let f = fixture();
        f.exports.export_for_locale("de").await.unwrap();

        let key = f.exports.cache().language_id_key("de");
        assert!(!f.cache_store.contains(&key));
    }

    #[tokio::test]
    async fn test_unknown_locales_leave_cache_empty() {
        let f = fixture();

        for i in 0..500 {
            let tree = f.exports.export_for_locale(&format!("zz{}", i)).await.unwrap();
            assert!(tree.is_empty());
        }

        assert!(f.cache_store.is_empty());
    }

    #[tokio::test]
    async fn test_locale_created_later_is_exported() {
        let f = fixture();
        assert!(f.exports.export_for_locale("es").await.unwrap().is_empty());

        f.store.add_language("es", "Spanish");
        add(&f.store, "es", "greeting", "Hola").await;

        let tree = f.exports.export_for_locale("es").await.unwrap();
        assert!(tree.get("greeting").is_some());
    }

    #[tokio::test]
    async fn test_empty_locale_is_cached() {
        let f = fixture();

        let first = f.exports.export_for_locale("fr").await.unwrap();
        let second = f.exports.export_for_locale("fr").await.unwrap();

        assert!(first.is_empty());
        assert!(second.is_empty());
        assert_eq!(f.store.export_reads(), 1);
    }

    // ==================== Caching Tests ====================

    #[tokio::test]
    async fn test_second_export_is_served_from_cache() {
        let f = fixture();
        add(&f.store, "en", "greeting", "Hello").await;

        f.exports.export_for_locale("en").await.unwrap();
        // A direct store write bypasses invalidation, so the cache still answers
        add(&f.store, "en", "farewell", "Bye").await;
        let tree = f.exports.export_for_locale("en").await.unwrap();

        assert_eq!(f.store.export_reads(), 1);
        assert!(tree.get("farewell").is_none());
    }

    #[tokio::test]
    async fn test_available_locales_are_cached() {
        let f = fixture();
        f.exports.export_all().await.unwrap();
        f.store.add_language("es", "Spanish");

        let locales = f.exports.available_locales().await.unwrap();
        assert_eq!(locales, vec!["en", "fr"]);

        f.invalidator.on_language_changed("es").await.unwrap();
        let locales = f.exports.available_locales().await.unwrap();
        assert_eq!(locales, vec!["en", "fr", "es"]);
    }

    #[tokio::test]
    async fn test_write_across_locales_recomputes_both() {
        let f = fixture();
        add(&f.store, "en", "greeting", "Hello").await;
        add(&f.store, "fr", "greeting", "Bonjour").await;
        f.exports.export_for_locale("en").await.unwrap();
        f.exports.export_for_locale("fr").await.unwrap();
        assert_eq!(f.store.export_reads(), 2);

        f.invalidator
            .on_translation_written(Some("en"), "fr")
            .await
            .unwrap();
        f.exports.export_for_locale("en").await.unwrap();
        f.exports.export_for_locale("fr").await.unwrap();

        assert_eq!(f.store.export_reads(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_recomputes() {
        let f = fixture_with_ttl(Duration::from_secs(1));
        add(&f.store, "en", "greeting", "Hello").await;

        f.exports.export_for_locale("en").await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        f.exports.export_for_locale("en").await.unwrap();

        assert_eq!(f.store.export_reads(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_cache_degrades_to_direct_export() {
        let store = Arc::new(MemoryStore::with_languages(&[("en", "English")]));
        add(&store, "en", "greeting", "Hello").await;
        let cache_store = Arc::new(FlakyCacheStore::default());
        cache_store.set_down(true);
        let exports = ExportService::new(
            store.clone(),
            TranslationCache::new(cache_store, CacheSettings::default()),
        );

        let first = exports.export_for_locale("en").await.unwrap();
        let second = exports.export_for_locale("en").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.export_reads(), 2);
    }
}
