//! HTTP surface: translation CRUD, locale exports and cache management.

mod error;
mod handlers;

pub use error::{ApiError, ApiResult, ErrorResponse};

use crate::cache::{CacheSettings, CacheStore, Invalidator, TranslationCache};
use crate::export::ExportService;
use crate::security::authorize_bearer;
use crate::store::TranslationStore;
use crate::translations::TranslationService;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TranslationStore>,
    pub exports: ExportService,
    pub translations: TranslationService,
    pub invalidator: Invalidator,
    /// Bearer token required on everything but `/health`; `None` disables the check.
    pub api_key: Option<Arc<str>>,
    pub export_timeout: Duration,
}

impl AppState {
    /// Wire the services over one storage handle and one cache store.
    pub fn new(
        store: Arc<dyn TranslationStore>,
        cache_store: Arc<dyn CacheStore>,
        settings: CacheSettings,
    ) -> Self {
        let cache = TranslationCache::new(cache_store, settings);
        let invalidator = Invalidator::new(cache.clone());
        Self {
            exports: ExportService::new(store.clone(), cache),
            translations: TranslationService::new(store.clone(), invalidator.clone()),
            invalidator,
            store,
            api_key: None,
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.map(Arc::from);
        self
    }

    pub fn with_export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout = timeout;
        self
    }
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.api_key {
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        if !authorize_bearer(header, expected) {
            warn!(path = %request.uri().path(), "Rejected request with missing or invalid API key");
            return Err(ApiError::Unauthorized("missing or invalid API key".to_string()));
        }
    }
    Ok(next.run(request).await)
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let guarded = Router::new()
        .route(
            "/translations",
            get(handlers::list_translations).post(handlers::create_translation),
        )
        .route(
            "/translations/:id",
            get(handlers::show_translation)
                .put(handlers::update_translation)
                .delete(handlers::delete_translation),
        )
        .route("/export/translations", get(handlers::export_all))
        .route("/export/translations/:locale", get(handlers::export_locale))
        .route("/export/cache", delete(handlers::flush_export_cache))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        // Unauthenticated so health checks work without the key
        .route("/health", get(handlers::health))
        .merge(guarded)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
