//! Search HTTP API.
//!
//! Serves the matcher over a published manifest. The index is loaded
//! lazily on the first search and kept in an [`IndexCache`]; `POST /reload`
//! picks up a newer build without restarting.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (version and cache status) |
//! | `GET`  | `/search?q=&product=&limit=` | Run a query, returns `{total, items}` |
//! | `POST` | `/reload` | Refetch the index |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "index_unavailable", "message": "..." } }
//! ```
//!
//! Error codes: `index_unavailable` (503), `malformed_index` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a static search page
//! on another origin can call the API.

use axum::{
    extract::{Query as QueryParams, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use coa_search_core::search::Query;

use crate::config::Config;
use crate::error::IndexError;
use crate::index_cache::{fetcher_for, CacheStatus, IndexCache};
use crate::search::SearchResponse;

#[derive(Clone)]
struct AppState {
    cache: Arc<IndexCache>,
    default_limit: Option<usize>,
}

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let location = config.index_location();
    let cache = Arc::new(IndexCache::new(fetcher_for(&location)));

    // A missing index at startup is not fatal; searches report it.
    if let Err(e) = cache.ensure_loaded().await {
        tracing::warn!(error = %e, "index not loaded at startup");
    }

    let app = router(cache, config.query.default_limit);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!(
        "Search API listening on http://{} (index: {})",
        config.server.bind, location
    );
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(cache: Arc<IndexCache>, default_limit: Option<usize>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", get(handle_search))
        .route("/reload", post(handle_reload))
        .layer(cors)
        .with_state(AppState {
            cache,
            default_limit,
        })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        let status = match err {
            IndexError::Unreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            IndexError::Malformed { .. } => StatusCode::BAD_GATEWAY,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    index: &'static str,
    records: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let index = match state.cache.status() {
        CacheStatus::Empty => "empty",
        CacheStatus::Loading => "loading",
        CacheStatus::Ready => "ready",
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        index,
        records: state
            .cache
            .snapshot()
            .map(|loaded| loaded.records.len())
            .unwrap_or(0),
    })
}

// ============ GET /search ============

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    product: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let mut query = Query::new(params.q);
    if let Some(product) = params.product {
        query = query.with_product(product);
    }

    let hits = state.cache.search(&query).await?;
    Ok(Json(SearchResponse::new(
        hits,
        params.limit.or(state.default_limit),
    )))
}

// ============ POST /reload ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReloadResponse {
    generated_at: String,
    total: usize,
}

async fn handle_reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let loaded = state.cache.reload().await?;
    tracing::info!(total = loaded.index.total, "index reloaded");
    Ok(Json(ReloadResponse {
        generated_at: loaded.index.generated_at.clone(),
        total: loaded.index.total,
    }))
}
