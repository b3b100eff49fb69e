//! Seed binary - fills the database with generated translations for load testing
//!
//! Usage:
//!   cargo run --bin seed                 # 1000 translations for "en"
//!   cargo run --bin seed -- 100000 fr    # 100000 translations for "fr"
//!
//! Required environment variables:
//! - DATABASE_URL
//!
//! Rows are inserted in transactions of 1000. Keys are deterministic, so
//! re-running with the same count skips rows that already exist. The
//! server's export cache is not touched; flush it with DELETE /export/cache
//! or wait for the TTL.

use anyhow::{bail, Context, Result};
use tracing::info;
use translation_hub::config::Config;
use translation_hub::db::Database;
use translation_hub::retry::{with_retry_if, RetryConfig};
use translation_hub::store::{NewTranslation, StoreError, TranslationStore};

const BATCH_SIZE: usize = 1000;
const DEFAULT_COUNT: usize = 1000;
const DEFAULT_LOCALE: &str = "en";

const LANGUAGES: &[(&str, &str)] = &[("en", "English"), ("fr", "French"), ("es", "Spanish")];
const TAGS: &[&str] = &["mobile", "desktop", "web"];

const SECTIONS: &[&str] = &[
    "home",
    "about",
    "news",
    "contact",
    "footer",
    "gallery",
    "search",
    "forms",
    "errors",
    "navigation",
];

/// Dotted key for row `i`: section, subsection, then a unique leaf.
fn seed_key(i: usize) -> String {
    let n = SECTIONS.len();
    format!("{}.{}.item_{}", SECTIONS[i % n], SECTIONS[(i / n) % n], i)
}

fn seed_content(i: usize, locale: &str) -> String {
    format!("Sample text {} ({})", i, locale)
}

fn parse_args(args: &[String]) -> Result<(usize, String)> {
    let count = match args.first() {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("count must be a positive integer, got '{}'", raw))?,
        None => DEFAULT_COUNT,
    };
    let locale = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| DEFAULT_LOCALE.to_string());
    Ok((count, locale))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_hub=info".parse()?)
                .add_directive("seed=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (count, locale) = parse_args(&args)?;
    let config = Config::from_env()?;

    let db = with_retry_if(
        &RetryConfig::database_connect(),
        "Database connect",
        || Database::connect(&config.database_url, config.database_max_connections),
        StoreError::is_transient,
    )
    .await?;

    for (code, name) in LANGUAGES {
        db.ensure_language(code, name).await?;
    }
    let mut tag_ids = Vec::with_capacity(TAGS.len());
    for name in TAGS {
        tag_ids.push(db.ensure_tag(name).await?);
    }

    let Some(language) = db.find_language(&locale).await? else {
        bail!("Unknown locale '{}', expected one of en, fr, es or an existing language", locale);
    };

    let batches = count.div_ceil(BATCH_SIZE);
    info!("Seeding {} translations for '{}' in {} batches of {}", count, locale, batches, BATCH_SIZE);

    let mut inserted = 0u64;
    for batch in 0..batches {
        let start = batch * BATCH_SIZE;
        let end = (start + BATCH_SIZE).min(count);
        let rows: Vec<NewTranslation> = (start..end)
            .map(|i| NewTranslation {
                key: seed_key(i),
                content: seed_content(i, &locale),
                language_id: language.id,
                tag_ids: vec![tag_ids[i % tag_ids.len()]],
            })
            .collect();

        inserted += db.insert_batch(&rows).await?;
        info!("Batch {}/{} done", batch + 1, batches);
    }

    info!(
        "Seeding completed: {} inserted, {} already present",
        inserted,
        count as u64 - inserted
    );
    Ok(())
}
