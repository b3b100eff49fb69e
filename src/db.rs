use crate::store::{
    Language, NewTranslation, Page, PageRequest, StoreError, StoreResult, Tag, Translation,
    TranslationChanges, TranslationFilter, TranslationPair, TranslationStore, UpdatedTranslation,
};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, Postgres, QueryBuilder, Transaction};
use tracing::info;

/// Schema statements, applied in order. Each is idempotent.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS languages (
        id BIGSERIAL PRIMARY KEY,
        code VARCHAR(10) NOT NULL UNIQUE,
        name VARCHAR(255) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS tags (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(50) NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS translations (
        id BIGSERIAL PRIMARY KEY,
        key VARCHAR(255) NOT NULL,
        content TEXT NOT NULL,
        language_id BIGINT NOT NULL REFERENCES languages(id) ON DELETE CASCADE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (key, language_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_translations_language_key ON translations (language_id, key COLLATE \"C\")",
    "CREATE INDEX IF NOT EXISTS idx_translations_created_at ON translations (created_at DESC, id DESC)",
    "CREATE TABLE IF NOT EXISTS tag_translation (
        tag_id BIGINT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        translation_id BIGINT NOT NULL REFERENCES translations(id) ON DELETE CASCADE,
        PRIMARY KEY (tag_id, translation_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_tag_translation_translation ON tag_translation (translation_id)",
];

/// Translation row joined with its locale and tag names.
const SELECT_TRANSLATION: &str = "SELECT tr.id, tr.key, tr.content, tr.language_id, l.code AS locale,
        COALESCE(
            (SELECT ARRAY_AGG(tg.name ORDER BY tg.name)
             FROM tag_translation tt JOIN tags tg ON tg.id = tt.tag_id
             WHERE tt.translation_id = tr.id),
            '{}'::VARCHAR[]
        )::TEXT[] AS tags,
        tr.created_at, tr.updated_at
    FROM translations tr
    JOIN languages l ON l.id = tr.language_id";

fn map_write_error(e: sqlx::Error, key: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("key '{}' already exists for this language", key))
        }
        _ => StoreError::Database(e),
    }
}

/// PostgreSQL-backed translation store.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL and create tables
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply the schema
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema is up to date");
        Ok(())
    }

    /// Insert a language unless its code exists. Returns the language id.
    pub async fn ensure_language(&self, code: &str, name: &str) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO languages (code, name) VALUES ($1, $2)
             ON CONFLICT (code) DO UPDATE SET name = languages.name
             RETURNING id",
        )
        .bind(code)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Insert a tag unless its name exists. Returns the tag id.
    pub async fn ensure_tag(&self, name: &str) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO tags (name) VALUES ($1)
             ON CONFLICT (name) DO UPDATE SET name = tags.name
             RETURNING id",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Insert many translations in one transaction, skipping keys that already exist.
    /// Returns how many rows were inserted.
    pub async fn insert_batch(&self, rows: &[NewTranslation]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for row in rows {
            let id: Option<i64> = sqlx::query_scalar(
                "INSERT INTO translations (key, content, language_id) VALUES ($1, $2, $3)
                 ON CONFLICT (key, language_id) DO NOTHING
                 RETURNING id",
            )
            .bind(&row.key)
            .bind(&row.content)
            .bind(row.language_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(id) = id {
                attach_tags(&mut tx, id, &row.tag_ids).await?;
                inserted += 1;
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

async fn select_translation<'e, E>(executor: E, id: i64) -> StoreResult<Option<Translation>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("{} WHERE tr.id = $1", SELECT_TRANSLATION);
    let row = sqlx::query_as::<_, Translation>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row)
}

/// Lock a translation row for the rest of the transaction and return the
/// code of the language it currently belongs to.
async fn lock_translation(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
) -> StoreResult<Option<String>> {
    let locale = sqlx::query_scalar(
        "SELECT l.code FROM translations tr
         JOIN languages l ON l.id = tr.language_id
         WHERE tr.id = $1
         FOR UPDATE OF tr",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(locale)
}

async fn attach_tags(
    tx: &mut Transaction<'_, Postgres>,
    translation_id: i64,
    tag_ids: &[i64],
) -> StoreResult<()> {
    for tag_id in tag_ids {
        sqlx::query(
            "INSERT INTO tag_translation (tag_id, translation_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(tag_id)
        .bind(translation_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TranslationFilter) {
    builder.push(" WHERE TRUE");
    if let Some(key) = &filter.key {
        builder.push(" AND tr.key ILIKE ").push_bind(format!("%{}%", key));
    }
    if let Some(locale) = &filter.locale {
        builder.push(" AND l.code = ").push_bind(locale.clone());
    }
    if let Some(content) = &filter.content {
        builder.push(" AND tr.content ILIKE ").push_bind(format!("%{}%", content));
    }
    if let Some(tag_id) = filter.tag_id {
        builder
            .push(" AND EXISTS (SELECT 1 FROM tag_translation f WHERE f.translation_id = tr.id AND f.tag_id = ")
            .push_bind(tag_id)
            .push(")");
    }
    if let Some(tag_name) = &filter.tag_name {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM tag_translation f JOIN tags ft ON ft.id = f.tag_id \
                 WHERE f.translation_id = tr.id AND ft.name ILIKE ",
            )
            .push_bind(format!("%{}%", tag_name))
            .push(")");
    }
}

#[async_trait]
impl TranslationStore for Database {
    async fn language_id(&self, code: &str) -> StoreResult<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM languages WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn find_language(&self, code: &str) -> StoreResult<Option<Language>> {
        let language = sqlx::query_as::<_, Language>(
            "SELECT id, code, name FROM languages WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(language)
    }

    async fn language_codes(&self) -> StoreResult<Vec<String>> {
        let codes = sqlx::query_scalar("SELECT code FROM languages ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(codes)
    }

    async fn find_tags(&self, names: &[String]) -> StoreResult<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE name = ANY($1)")
            .bind(names)
            .fetch_all(&self.pool)
            .await?;
        Ok(tags)
    }

    async fn insert_translation(&self, new: &NewTranslation) -> StoreResult<Translation> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO translations (key, content, language_id) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&new.key)
        .bind(&new.content)
        .bind(new.language_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, &new.key))?;

        attach_tags(&mut tx, id, &new.tag_ids).await?;
        let translation = select_translation(&mut *tx, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("translation {} vanished after insert", id)))?;
        tx.commit().await?;

        Ok(translation)
    }

    async fn update_translation(
        &self,
        id: i64,
        changes: &TranslationChanges,
    ) -> StoreResult<Option<UpdatedTranslation>> {
        let mut tx = self.pool.begin().await?;

        let Some(previous_locale) = lock_translation(&mut tx, id).await? else {
            return Ok(None);
        };

        sqlx::query(
            "UPDATE translations SET
                key = COALESCE($2, key),
                content = COALESCE($3, content),
                language_id = COALESCE($4, language_id),
                updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(&changes.key)
        .bind(&changes.content)
        .bind(changes.language_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, changes.key.as_deref().unwrap_or_default()))?;

        if let Some(tag_ids) = &changes.tag_ids {
            sqlx::query("DELETE FROM tag_translation WHERE translation_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            attach_tags(&mut tx, id, tag_ids).await?;
        }

        let translation = select_translation(&mut *tx, id).await?;
        tx.commit().await?;

        Ok(translation.map(|translation| UpdatedTranslation {
            previous_locale,
            translation,
        }))
    }

    async fn find_translation(&self, id: i64) -> StoreResult<Option<Translation>> {
        select_translation(&self.pool, id).await
    }

    async fn delete_translation(&self, id: i64) -> StoreResult<Option<Translation>> {
        let mut tx = self.pool.begin().await?;

        if lock_translation(&mut tx, id).await?.is_none() {
            return Ok(None);
        }
        let existing = select_translation(&mut *tx, id).await?;

        sqlx::query("DELETE FROM translations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(existing)
    }

    async fn search_translations(
        &self,
        filter: &TranslationFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Translation>> {
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM translations tr JOIN languages l ON l.id = tr.language_id",
        );
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(SELECT_TRANSLATION);
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY tr.created_at DESC, tr.id DESC LIMIT ")
            .push_bind(i64::from(page.per_page))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = select
            .build_query_as::<Translation>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items,
            total: total.max(0) as u64,
            request: page,
        })
    }

    fn stream_translations(&self, language_id: i64) -> BoxStream<'_, StoreResult<TranslationPair>> {
        sqlx::query_as::<_, TranslationPair>(
            "SELECT key, content FROM translations WHERE language_id = $1 ORDER BY key COLLATE \"C\"",
        )
        .bind(language_id)
        .fetch(&self.pool)
        .map_err(StoreError::from)
        .boxed()
    }
}
