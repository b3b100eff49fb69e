//! Storage collaborator used by the export engine and the write path.
//!
//! `db::Database` is the PostgreSQL implementation; [`memory::MemoryStore`]
//! keeps everything in process for tests and local experiments.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Whether retrying the same operation could succeed (network trouble,
    /// pool exhaustion, a server still starting up).
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Io(_))
            | StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            // 57P03: cannot_connect_now
            StoreError::Database(sqlx::Error::Database(db)) => db.code().as_deref() == Some("57P03"),
            _ => false,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Language {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// A persisted translation joined with its language code and tag names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Translation {
    pub id: i64,
    pub key: String,
    pub content: String,
    #[serde(skip)]
    pub language_id: i64,
    pub locale: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The two columns the export reads.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TranslationPair {
    pub key: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct NewTranslation {
    pub key: String,
    pub content: String,
    pub language_id: i64,
    pub tag_ids: Vec<i64>,
}

/// Field changes for an update. `None` leaves the column untouched;
/// `tag_ids: None` leaves the tag associations untouched.
#[derive(Debug, Clone, Default)]
pub struct TranslationChanges {
    pub key: Option<String>,
    pub content: Option<String>,
    pub language_id: Option<i64>,
    pub tag_ids: Option<Vec<i64>>,
}

/// Outcome of an update: the row as changed and the locale it had before,
/// read under the same row lock as the change.
#[derive(Debug, Clone)]
pub struct UpdatedTranslation {
    pub previous_locale: String,
    pub translation: Translation,
}

#[derive(Debug, Clone, Default)]
pub struct TranslationFilter {
    pub key: Option<String>,
    pub locale: Option<String>,
    pub content: Option<String>,
    pub tag_id: Option<i64>,
    pub tag_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub request: PageRequest,
}

impl<T> Page<T> {
    pub fn last_page(&self) -> u64 {
        let per_page = u64::from(self.request.per_page.max(1));
        self.total.div_ceil(per_page).max(1)
    }
}

#[async_trait]
pub trait TranslationStore: Send + Sync {
    /// Resolve a language code to its numeric id.
    async fn language_id(&self, code: &str) -> StoreResult<Option<i64>>;

    async fn find_language(&self, code: &str) -> StoreResult<Option<Language>>;

    /// All language codes, in creation order.
    async fn language_codes(&self) -> StoreResult<Vec<String>>;

    /// Tags whose name is in `names`. Unknown names are simply absent.
    async fn find_tags(&self, names: &[String]) -> StoreResult<Vec<Tag>>;

    /// Insert a translation and its tag associations in one transaction.
    /// Fails with [`StoreError::Conflict`] when `(key, language)` already exists.
    async fn insert_translation(&self, new: &NewTranslation) -> StoreResult<Translation>;

    async fn update_translation(
        &self,
        id: i64,
        changes: &TranslationChanges,
    ) -> StoreResult<Option<UpdatedTranslation>>;

    async fn find_translation(&self, id: i64) -> StoreResult<Option<Translation>>;

    /// Delete a translation, returning the row as it was.
    async fn delete_translation(&self, id: i64) -> StoreResult<Option<Translation>>;

    async fn search_translations(
        &self,
        filter: &TranslationFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Translation>>;

    /// Forward-only stream of one language's pairs, ordered by key ascending.
    fn stream_translations(&self, language_id: i64) -> BoxStream<'_, StoreResult<TranslationPair>>;
}
