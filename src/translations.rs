//! Translation write path: validation, locale and tag resolution, persistence
//! and cache invalidation.
//!
//! Every write follows the same order: validate, resolve references, commit,
//! invalidate, respond. A failed resolution aborts before anything is stored
//! or invalidated.

use crate::cache::{CacheError, Invalidator};
use crate::store::{
    NewTranslation, Page, PageRequest, StoreError, Translation, TranslationChanges,
    TranslationFilter, TranslationStore, UpdatedTranslation,
};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::info;

pub const MAX_KEY_LEN: usize = 255;
pub const MAX_LOCALE_LEN: usize = 10;
pub const MAX_TAG_LEN: usize = 50;
pub const DEFAULT_PER_PAGE: u32 = 15;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("Language not found: {0}")]
    LocaleNotFound(String),

    #[error("Tag not found: {0}")]
    TagNotFound(String),

    #[error("Translation not found: {0}")]
    NotFound(i64),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The write committed but its cache entries could not be cleared.
    #[error("translation saved but cache invalidation failed: {0}")]
    Invalidation(#[from] CacheError),
}

pub type TranslationResult<T> = std::result::Result<T, TranslationError>;

/// Body of a create request. Fields are optional so missing ones surface as
/// validation errors rather than deserialization failures.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTranslation {
    pub key: Option<String>,
    pub locale: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Body of an update request; absent fields stay unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTranslation {
    pub key: Option<String>,
    pub locale: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Query string of the listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub key: Option<String>,
    pub locale: Option<String>,
    pub content: Option<String>,
    pub tag_id: Option<i64>,
    pub tag_name: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListQuery {
    pub fn into_parts(self) -> (TranslationFilter, PageRequest) {
        let page = PageRequest {
            page: self.page.unwrap_or(1).max(1),
            per_page: self
                .per_page
                .unwrap_or(DEFAULT_PER_PAGE)
                .clamp(1, MAX_PER_PAGE),
        };
        let filter = TranslationFilter {
            key: self.key.filter(|s| !s.is_empty()),
            locale: self.locale.filter(|s| !s.is_empty()),
            content: self.content.filter(|s| !s.is_empty()),
            tag_id: self.tag_id,
            tag_name: self.tag_name.filter(|s| !s.is_empty()),
        };
        (filter, page)
    }
}

fn key_pattern() -> &'static Regex {
    static KEY_PATTERN: OnceLock<Regex> = OnceLock::new();
    KEY_PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9_-]+(\.[a-z0-9_-]+)*$").expect("key pattern is a valid regex")
    })
}

/// Trim and lowercase a key, then require non-empty dot-separated segments.
pub fn normalize_key(raw: &str) -> TranslationResult<String> {
    let key = raw.trim().to_lowercase();
    if key.is_empty() {
        return Err(TranslationError::Validation("key is required".to_string()));
    }
    if key.chars().count() > MAX_KEY_LEN {
        return Err(TranslationError::Validation(format!(
            "key must not exceed {} characters",
            MAX_KEY_LEN
        )));
    }
    if !key_pattern().is_match(&key) {
        return Err(TranslationError::Validation(format!(
            "key '{}' must be dot-separated segments of letters, digits, '-' or '_'",
            key
        )));
    }
    Ok(key)
}

fn validate_locale(raw: &str) -> TranslationResult<String> {
    let locale = raw.trim();
    if locale.is_empty() {
        return Err(TranslationError::Validation("locale is required".to_string()));
    }
    if locale.chars().count() > MAX_LOCALE_LEN {
        return Err(TranslationError::Validation(format!(
            "locale must not exceed {} characters",
            MAX_LOCALE_LEN
        )));
    }
    Ok(locale.to_string())
}

fn validate_content(raw: String) -> TranslationResult<String> {
    if raw.trim().is_empty() {
        return Err(TranslationError::Validation("content is required".to_string()));
    }
    Ok(raw)
}

/// Trim, lowercase and dedupe tag names, enforcing the length limit.
pub fn normalize_tags(raw: &[String]) -> TranslationResult<Vec<String>> {
    let mut names: Vec<String> = Vec::with_capacity(raw.len());
    for name in raw {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(TranslationError::Validation("tag names must not be empty".to_string()));
        }
        if name.chars().count() > MAX_TAG_LEN {
            return Err(TranslationError::Validation(format!(
                "tag '{}' exceeds {} characters",
                name, MAX_TAG_LEN
            )));
        }
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names)
}

#[derive(Clone)]
pub struct TranslationService {
    store: Arc<dyn TranslationStore>,
    invalidator: Invalidator,
}

impl TranslationService {
    pub fn new(store: Arc<dyn TranslationStore>, invalidator: Invalidator) -> Self {
        Self { store, invalidator }
    }

    async fn resolve_locale(&self, locale: &str) -> TranslationResult<i64> {
        self.store
            .language_id(locale)
            .await?
            .ok_or_else(|| TranslationError::LocaleNotFound(locale.to_string()))
    }

    async fn resolve_tags(&self, names: &[String]) -> TranslationResult<Vec<i64>> {
        let tags = self.store.find_tags(names).await?;
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let tag = tags
                .iter()
                .find(|tag| &tag.name == name)
                .ok_or_else(|| TranslationError::TagNotFound(name.clone()))?;
            ids.push(tag.id);
        }
        Ok(ids)
    }

    pub async fn create(&self, request: CreateTranslation) -> TranslationResult<Translation> {
        let key = normalize_key(request.key.as_deref().unwrap_or_default())?;
        let locale = validate_locale(request.locale.as_deref().unwrap_or_default())?;
        let content = validate_content(request.content.unwrap_or_default())?;
        let tags = normalize_tags(&request.tags.unwrap_or_default())?;
        if tags.is_empty() {
            return Err(TranslationError::Validation("at least one tag is required".to_string()));
        }

        let tag_ids = self.resolve_tags(&tags).await?;
        let language_id = self.resolve_locale(&locale).await?;

        let translation = self
            .store
            .insert_translation(&NewTranslation {
                key,
                content,
                language_id,
                tag_ids,
            })
            .await?;

        self.invalidator
            .on_translation_written(None, &translation.locale)
            .await?;

        info!(id = translation.id, key = %translation.key, locale = %translation.locale, "Translation created");
        Ok(translation)
    }

    pub async fn update(&self, id: i64, request: UpdateTranslation) -> TranslationResult<Translation> {
        let key = request.key.as_deref().map(normalize_key).transpose()?;
        let locale = request.locale.as_deref().map(validate_locale).transpose()?;
        let content = request.content.map(validate_content).transpose()?;
        let tags = match request.tags {
            Some(tags) => normalize_tags(&tags)?,
            None => Vec::new(),
        };

        // An empty or absent tag list keeps the current associations
        let tag_ids = if tags.is_empty() {
            None
        } else {
            Some(self.resolve_tags(&tags).await?)
        };
        let language_id = match &locale {
            Some(locale) => Some(self.resolve_locale(locale).await?),
            None => None,
        };

        let changes = TranslationChanges {
            key,
            content,
            language_id,
            tag_ids,
        };
        let UpdatedTranslation {
            previous_locale,
            translation,
        } = self
            .store
            .update_translation(id, &changes)
            .await?
            .ok_or(TranslationError::NotFound(id))?;

        self.invalidator
            .on_translation_written(Some(&previous_locale), &translation.locale)
            .await?;

        info!(id, from = %previous_locale, to = %translation.locale, "Translation updated");
        Ok(translation)
    }

    pub async fn delete(&self, id: i64) -> TranslationResult<Translation> {
        let deleted = self
            .store
            .delete_translation(id)
            .await?
            .ok_or(TranslationError::NotFound(id))?;

        self.invalidator.on_translation_deleted(&deleted.locale).await?;

        info!(id, locale = %deleted.locale, "Translation deleted");
        Ok(deleted)
    }

    pub async fn find(&self, id: i64) -> TranslationResult<Translation> {
        self.store
            .find_translation(id)
            .await?
            .ok_or(TranslationError::NotFound(id))
    }

    pub async fn search(&self, query: ListQuery) -> TranslationResult<Page<Translation>> {
        let (filter, page) = query.into_parts();
        Ok(self.store.search_translations(&filter, page).await?)
    }
}
