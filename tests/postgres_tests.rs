//! PostgreSQL integration tests for the `Database` store.
//!
//! These run against the database in TEST_DATABASE_URL and are skipped when
//! it is not set. Every test uses its own key prefix so runs can share one
//! database.

use futures::TryStreamExt;
use translation_hub::db::Database;
use translation_hub::store::{
    NewTranslation, PageRequest, StoreError, TranslationChanges, TranslationFilter,
    TranslationStore,
};

async fn postgres_or_skip() -> Option<Database> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("Skipping PostgreSQL test (TEST_DATABASE_URL not set)");
        return None;
    };
    Some(
        Database::connect(&url, 2)
            .await
            .expect("PostgreSQL test setup failed"),
    )
}

/// Unique key prefix per test run.
fn prefix(test: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("t{}_{}", nanos, test)
}

#[tokio::test]
async fn test_postgres_insert_find_delete() {
    let Some(db) = postgres_or_skip().await else {
        return;
    };
    let en = db.ensure_language("en", "English").await.unwrap();
    let web = db.ensure_tag("web").await.unwrap();
    let key = format!("{}.title", prefix("crud"));

    let created = db
        .insert_translation(&NewTranslation {
            key: key.clone(),
            content: "Welcome".to_string(),
            language_id: en,
            tag_ids: vec![web],
        })
        .await
        .unwrap();
    assert_eq!(created.locale, "en");
    assert_eq!(created.tags, vec!["web"]);

    let found = db.find_translation(created.id).await.unwrap().unwrap();
    assert_eq!(found.key, key);

    let deleted = db.delete_translation(created.id).await.unwrap();
    assert_eq!(deleted.map(|t| t.id), Some(created.id));
    assert!(db.find_translation(created.id).await.unwrap().is_none());
    assert!(db.delete_translation(created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_postgres_duplicate_key_conflicts() {
    let Some(db) = postgres_or_skip().await else {
        return;
    };
    let en = db.ensure_language("en", "English").await.unwrap();
    let new = NewTranslation {
        key: format!("{}.dup", prefix("conflict")),
        content: "x".to_string(),
        language_id: en,
        tag_ids: vec![],
    };

    db.insert_translation(&new).await.unwrap();
    let err = db.insert_translation(&new).await.unwrap_err();

    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn test_postgres_update_replaces_tags_and_moves_locale() {
    let Some(db) = postgres_or_skip().await else {
        return;
    };
    let en = db.ensure_language("en", "English").await.unwrap();
    let fr = db.ensure_language("fr", "French").await.unwrap();
    let web = db.ensure_tag("web").await.unwrap();
    let mobile = db.ensure_tag("mobile").await.unwrap();

    let created = db
        .insert_translation(&NewTranslation {
            key: format!("{}.greeting", prefix("update")),
            content: "Hello".to_string(),
            language_id: en,
            tag_ids: vec![web],
        })
        .await
        .unwrap();

    let updated = db
        .update_translation(
            created.id,
            &TranslationChanges {
                content: Some("Bonjour".to_string()),
                language_id: Some(fr),
                tag_ids: Some(vec![mobile]),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.previous_locale, "en");
    let updated = updated.translation;
    assert_eq!(updated.locale, "fr");
    assert_eq!(updated.content, "Bonjour");
    assert_eq!(updated.tags, vec!["mobile"]);
    assert_eq!(updated.key, created.key);
}

#[tokio::test]
async fn test_postgres_stream_is_key_ordered() {
    let Some(db) = postgres_or_skip().await else {
        return;
    };
    let es = db.ensure_language("es", "Spanish").await.unwrap();
    let base = prefix("stream");
    let keys = [
        format!("{}.b", base),
        format!("{}.a.c", base),
        format!("{}.a", base),
    ];
    let rows: Vec<NewTranslation> = keys
        .iter()
        .map(|key| NewTranslation {
            key: key.clone(),
            content: "x".to_string(),
            language_id: es,
            tag_ids: vec![],
        })
        .collect();
    assert_eq!(db.insert_batch(&rows).await.unwrap(), 3);
    // Re-inserting the same keys is a no-op
    assert_eq!(db.insert_batch(&rows).await.unwrap(), 0);

    let streamed: Vec<String> = db
        .stream_translations(es)
        .map_ok(|pair| pair.key)
        .try_filter(|key| futures::future::ready(key.starts_with(&base)))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(
        streamed,
        vec![
            format!("{}.a", base),
            format!("{}.a.c", base),
            format!("{}.b", base),
        ]
    );
}

#[tokio::test]
async fn test_postgres_search_filters_by_key_and_tag() {
    let Some(db) = postgres_or_skip().await else {
        return;
    };
    let en = db.ensure_language("en", "English").await.unwrap();
    let desktop = db.ensure_tag("desktop").await.unwrap();
    let base = prefix("search");
    for i in 0..3 {
        db.insert_translation(&NewTranslation {
            key: format!("{}.item_{}", base, i),
            content: format!("content {}", i),
            language_id: en,
            tag_ids: if i == 0 { vec![desktop] } else { vec![] },
        })
        .await
        .unwrap();
    }

    let page = db
        .search_translations(
            &TranslationFilter {
                key: Some(base.clone()),
                ..Default::default()
            },
            PageRequest { page: 1, per_page: 2 },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.last_page(), 2);

    let tagged = db
        .search_translations(
            &TranslationFilter {
                key: Some(base.clone()),
                tag_id: Some(desktop),
                ..Default::default()
            },
            PageRequest { page: 1, per_page: 15 },
        )
        .await
        .unwrap();
    assert_eq!(tagged.total, 1);
    assert_eq!(tagged.items[0].key, format!("{}.item_0", base));
}
