use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use keyseek_core::{Engine, EngineError, Keyword, SearchOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub sentence: Option<String>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub keywords: Vec<Keyword>,
    pub results: Vec<SearchResult>,
}

#[derive(Serialize)]
pub struct SearchResult {
    pub content: String,
    /// Normalized score.
    pub norm: f64,
}

impl From<SearchOutcome> for SearchResponse {
    fn from(outcome: SearchOutcome) -> Self {
        let results = outcome
            .hits
            .into_iter()
            .map(|h| SearchResult { content: h.content, norm: h.score })
            .collect();
        Self { keywords: outcome.keywords, results }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

#[derive(Debug)]
pub enum ApiError {
    InvalidRequest(String),
    Engine(EngineError),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self { ApiError::Engine(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Engine(e) => {
                tracing::error!(error = %e, "engine failure");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::Internal(m) => {
                tracing::error!(error = %m, "handler failure");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, no_cache(), Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn no_cache() -> [(header::HeaderName, &'static str); 1] {
    [(header::CACHE_CONTROL, "no-cache")]
}

pub fn build_app(engine: Arc<Engine>) -> Router {
    let app_state = AppState { engine };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let sentence = params
        .sentence
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("missing `sentence` query parameter".into()))?;

    // the read lock may wait behind a rebuild
    let engine = state.engine.clone();
    let outcome = tokio::task::spawn_blocking(move || engine.search(&sentence))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok((no_cache(), Json(SearchResponse::from(outcome))))
}
