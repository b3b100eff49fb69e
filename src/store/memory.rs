//! In-memory [`TranslationStore`].
//!
//! Mirrors the PostgreSQL semantics closely enough for the HTTP and export
//! tests: unique `(key, language)`, newest-first search, key-ordered export
//! stream. It also counts export reads so tests can tell a cache hit from a
//! recomputation.

use super::{
    Language, NewTranslation, Page, PageRequest, StoreError, StoreResult, Tag, Translation,
    TranslationChanges, TranslationFilter, TranslationPair, TranslationStore, UpdatedTranslation,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Substring match with the same case folding as `ILIKE`.
fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[derive(Debug, Clone)]
struct StoredTranslation {
    id: i64,
    key: String,
    content: String,
    language_id: i64,
    tag_ids: Vec<i64>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    languages: Vec<Language>,
    tags: Vec<Tag>,
    translations: BTreeMap<i64, StoredTranslation>,
    next_translation_id: i64,
}

impl Inner {
    fn language_code(&self, language_id: i64) -> String {
        self.languages
            .iter()
            .find(|lang| lang.id == language_id)
            .map(|lang| lang.code.clone())
            .unwrap_or_default()
    }

    fn hydrate(&self, stored: &StoredTranslation) -> Translation {
        let mut tags: Vec<String> = self
            .tags
            .iter()
            .filter(|tag| stored.tag_ids.contains(&tag.id))
            .map(|tag| tag.name.clone())
            .collect();
        tags.sort();

        Translation {
            id: stored.id,
            key: stored.key.clone(),
            content: stored.content.clone(),
            language_id: stored.language_id,
            locale: self.language_code(stored.language_id),
            tags,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }

    fn key_taken(&self, key: &str, language_id: i64, except: Option<i64>) -> bool {
        self.translations.values().any(|t| {
            t.key == key && t.language_id == language_id && Some(t.id) != except
        })
    }

    fn matches(&self, stored: &StoredTranslation, filter: &TranslationFilter) -> bool {
        if let Some(key) = &filter.key {
            if !contains_ignore_case(&stored.key, key) {
                return false;
            }
        }
        if let Some(locale) = &filter.locale {
            if &self.language_code(stored.language_id) != locale {
                return false;
            }
        }
        if let Some(content) = &filter.content {
            if !contains_ignore_case(&stored.content, content) {
                return false;
            }
        }
        if let Some(tag_id) = filter.tag_id {
            if !stored.tag_ids.contains(&tag_id) {
                return false;
            }
        }
        if let Some(tag_name) = &filter.tag_name {
            let has_tag = self
                .tags
                .iter()
                .any(|tag| stored.tag_ids.contains(&tag.id) && contains_ignore_case(&tag.name, tag_name));
            if !has_tag {
                return false;
            }
        }
        true
    }
}

/// Process-local translation store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    export_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with the given `(code, name)` languages.
    pub fn with_languages(languages: &[(&str, &str)]) -> Self {
        let store = Self::new();
        for (code, name) in languages {
            store.add_language(code, name);
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a panicked test holding the lock should not cascade into every other assertion
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a language and return its id.
    pub fn add_language(&self, code: &str, name: &str) -> i64 {
        let mut inner = self.lock();
        let id = inner.languages.len() as i64 + 1;
        inner.languages.push(Language {
            id,
            code: code.to_string(),
            name: name.to_string(),
        });
        id
    }

    /// Add a tag and return its id.
    pub fn add_tag(&self, name: &str) -> i64 {
        let mut inner = self.lock();
        let id = inner.tags.len() as i64 + 1;
        inner.tags.push(Tag {
            id,
            name: name.to_string(),
        });
        id
    }

    /// Number of times an export stream has been opened.
    pub fn export_reads(&self) -> usize {
        self.export_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationStore for MemoryStore {
    async fn language_id(&self, code: &str) -> StoreResult<Option<i64>> {
        Ok(self.find_language(code).await?.map(|lang| lang.id))
    }

    async fn find_language(&self, code: &str) -> StoreResult<Option<Language>> {
        Ok(self.lock().languages.iter().find(|lang| lang.code == code).cloned())
    }

    async fn language_codes(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock().languages.iter().map(|lang| lang.code.clone()).collect())
    }

    async fn find_tags(&self, names: &[String]) -> StoreResult<Vec<Tag>> {
        Ok(self
            .lock()
            .tags
            .iter()
            .filter(|tag| names.contains(&tag.name))
            .cloned()
            .collect())
    }

    async fn insert_translation(&self, new: &NewTranslation) -> StoreResult<Translation> {
        let mut inner = self.lock();
        if inner.key_taken(&new.key, new.language_id, None) {
            return Err(StoreError::Conflict(format!(
                "key '{}' already exists for this language",
                new.key
            )));
        }

        inner.next_translation_id += 1;
        let now = Utc::now();
        let stored = StoredTranslation {
            id: inner.next_translation_id,
            key: new.key.clone(),
            content: new.content.clone(),
            language_id: new.language_id,
            tag_ids: new.tag_ids.clone(),
            created_at: now,
            updated_at: now,
        };
        let translation = inner.hydrate(&stored);
        inner.translations.insert(stored.id, stored);
        Ok(translation)
    }

    async fn update_translation(
        &self,
        id: i64,
        changes: &TranslationChanges,
    ) -> StoreResult<Option<UpdatedTranslation>> {
        let mut inner = self.lock();
        let Some(current) = inner.translations.get(&id).cloned() else {
            return Ok(None);
        };

        let previous_locale = inner.language_code(current.language_id);
        let mut updated = current;
        if let Some(key) = &changes.key {
            updated.key = key.clone();
        }
        if let Some(content) = &changes.content {
            updated.content = content.clone();
        }
        if let Some(language_id) = changes.language_id {
            updated.language_id = language_id;
        }
        if let Some(tag_ids) = &changes.tag_ids {
            updated.tag_ids = tag_ids.clone();
        }

        if inner.key_taken(&updated.key, updated.language_id, Some(id)) {
            return Err(StoreError::Conflict(format!(
                "key '{}' already exists for this language",
                updated.key
            )));
        }

        updated.updated_at = Utc::now();
        let translation = inner.hydrate(&updated);
        inner.translations.insert(id, updated);
        Ok(Some(UpdatedTranslation {
            previous_locale,
            translation,
        }))
    }

    async fn find_translation(&self, id: i64) -> StoreResult<Option<Translation>> {
        let inner = self.lock();
        Ok(inner.translations.get(&id).map(|stored| inner.hydrate(stored)))
    }

    async fn delete_translation(&self, id: i64) -> StoreResult<Option<Translation>> {
        let mut inner = self.lock();
        let removed = inner.translations.remove(&id);
        Ok(removed.map(|stored| inner.hydrate(&stored)))
    }

    async fn search_translations(
        &self,
        filter: &TranslationFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Translation>> {
        let inner = self.lock();
        let mut matching: Vec<&StoredTranslation> = inner
            .translations
            .values()
            .filter(|stored| inner.matches(stored, filter))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .map(|stored| inner.hydrate(stored))
            .collect();

        Ok(Page {
            items,
            total,
            request: page,
        })
    }

    fn stream_translations(&self, language_id: i64) -> BoxStream<'_, StoreResult<TranslationPair>> {
        self.export_reads.fetch_add(1, Ordering::SeqCst);

        let mut pairs: Vec<TranslationPair> = self
            .lock()
            .translations
            .values()
            .filter(|stored| stored.language_id == language_id)
            .map(|stored| TranslationPair {
                key: stored.key.clone(),
                content: stored.content.clone(),
            })
            .collect();
        pairs.sort_by(|a, b| a.key.cmp(&b.key));

        stream::iter(pairs.into_iter().map(Ok)).boxed()
    }
}
