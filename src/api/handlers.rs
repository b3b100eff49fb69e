//! Request handlers.

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::cache::CacheReport;
use crate::store::{Page, Translation};
use crate::translations::{CreateTranslation, ListQuery, UpdateTranslation};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::future::Future;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cache: CacheReport,
}

/// Single resource wrapper.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub last_page: u64,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub data: Vec<Translation>,
    pub meta: PageMeta,
}

impl From<Page<Translation>> for ListResponse {
    fn from(page: Page<Translation>) -> Self {
        let meta = PageMeta {
            current_page: page.request.page,
            per_page: page.request.per_page,
            total: page.total,
            last_page: page.last_page(),
        };
        Self {
            data: page.items,
            meta,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExportMeta {
    pub processing_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse<T> {
    pub data: T,
    pub meta: ExportMeta,
}

#[derive(Debug, Serialize)]
pub struct FlushResponse {
    pub message: String,
    pub locales: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        cache: state.exports.cache().metrics().report(),
    })
}

/// GET /translations
pub async fn list_translations(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<ListResponse>> {
    let Query(query) = query?;
    let page = state.translations.search(query).await?;
    Ok(Json(page.into()))
}

/// POST /translations
pub async fn create_translation(
    State(state): State<AppState>,
    request: Result<Json<CreateTranslation>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DataResponse<Translation>>)> {
    let Json(request) = request?;
    let translation = state.translations.create(request).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: translation })))
}

/// GET /translations/:id
pub async fn show_translation(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<DataResponse<Translation>>> {
    let Path(id) = id?;
    let translation = state.translations.find(id).await?;
    Ok(Json(DataResponse { data: translation }))
}

/// PUT /translations/:id
pub async fn update_translation(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    request: Result<Json<UpdateTranslation>, JsonRejection>,
) -> ApiResult<Json<DataResponse<Translation>>> {
    let Path(id) = id?;
    let Json(request) = request?;
    let translation = state.translations.update(id, request).await?;
    Ok(Json(DataResponse { data: translation }))
}

/// DELETE /translations/:id
pub async fn delete_translation(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Path(id) = id?;
    state.translations.delete(id).await?;
    Ok(Json(MessageResponse {
        message: "Translation deleted successfully".to_string(),
    }))
}

/// Run an export under the configured deadline and time it.
///
/// A deadline hit drops the export future before anything is cached.
async fn timed_export<T, Fut>(state: &AppState, export: Fut) -> ApiResult<Json<ExportResponse<T>>>
where
    Fut: Future<Output = Result<T, crate::export::ExportError>>,
{
    let started = Instant::now();
    let data = tokio::time::timeout(state.export_timeout, export)
        .await
        .map_err(|_| {
            warn!(timeout = ?state.export_timeout, "Export exceeded its deadline");
            ApiError::Timeout(state.export_timeout)
        })??;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    Ok(Json(ExportResponse {
        data,
        meta: ExportMeta {
            processing_time_ms: (elapsed_ms * 100.0).round() / 100.0,
        },
    }))
}

/// GET /export/translations/:locale
pub async fn export_locale(
    State(state): State<AppState>,
    Path(locale): Path<String>,
) -> ApiResult<Json<ExportResponse<crate::export::Tree>>> {
    timed_export(&state, state.exports.export_for_locale(&locale)).await
}

/// GET /export/translations
pub async fn export_all(
    State(state): State<AppState>,
) -> ApiResult<Json<ExportResponse<crate::export::LocaleExports>>> {
    timed_export(&state, state.exports.export_all()).await
}

/// DELETE /export/cache
pub async fn flush_export_cache(State(state): State<AppState>) -> ApiResult<Json<FlushResponse>> {
    // Read codes from storage so locales missing from a stale cached list are cleared too
    let codes = state.store.language_codes().await?;
    state.invalidator.invalidate_all(&codes).await?;

    info!(locales = codes.len(), "Export cache flushed");
    Ok(Json(FlushResponse {
        message: "Export cache cleared".to_string(),
        locales: codes.len(),
    }))
}
