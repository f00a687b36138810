use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::json_store::CatalogStore;
use crate::media_handlers::{
    create_media, delete_media, export_pdf, get_media, list_medias, update_media, upload_poster,
};
use crate::pdf::PosterFetcher;
use crate::review_handlers::{
    create_review, delete_review, get_review, list_reviews, update_review,
};
use crate::s3_uploader::PosterStore;
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    handler::HandlerWithoutStateExt,
    http::{header, HeaderValue},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CatalogStore>,
    pub posters: Arc<dyn PosterStore>,
    pub poster_fetcher: PosterFetcher,
    /// Identity stamped onto each request context
    pub default_user: String,
    /// Origins allowed to call the API (empty = any)
    pub allowed_origins: Arc<Vec<String>>,
}

/// Per-request context handed to handlers through request extensions
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub user: String,
}

impl RequestContext {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user: user.into(),
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let static_files =
        ServeDir::new(&config.public_dir).not_found_service(route_not_found.into_service());

    let router = Router::new()
        .route("/health", get(health_check))
        .route("/medias", post(create_media).get(list_medias))
        .route(
            "/medias/:id",
            get(get_media).put(update_media).delete(delete_media),
        )
        .route("/medias/:id/poster", post(upload_poster))
        .route("/medias/:id/pdf", get(export_pdf))
        .route("/medias/:id/reviews", post(create_review).get(list_reviews))
        .route(
            "/medias/:id/reviews/:review_id",
            get(get_review).put(update_review).delete(delete_review),
        )
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes));

    let router = if config.cors_enabled {
        router
            .layer(middleware::from_fn_with_state(state.clone(), enforce_origin))
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(config))
    } else {
        router.layer(TraceLayer::new_for_http())
    };

    // Outermost, so rejected origins still carry a request id
    router
        .layer(middleware::from_fn_with_state(state.clone(), attach_context))
        .with_state(state)
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(parse_origins(&config.cors_origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Header values for the configured origins. Entries that are not valid
/// header values are logged and left out.
fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect()
}

/// Stamp a fresh [`RequestContext`] onto the request
async fn attach_context(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let ctx = RequestContext::new(state.default_user.clone());
    let request_id = ctx.request_id;

    req.extensions_mut().insert(ctx);
    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// Reject cross-origin requests from origins outside the allow list.
/// Requests without an `Origin` header (curl, same-origin) pass.
async fn enforce_origin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(origin) = req.headers().get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        if !state.allowed_origins.is_empty() && !state.allowed_origins.iter().any(|o| o == origin) {
            return Err(ApiError::OriginNotAllowed(origin.to_string()));
        }
    }

    Ok(next.run(req).await)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "catalog-service"
    }))
}

async fn route_not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}

/// Start the catalog API server
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting catalog API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_context_ids_are_unique() {
        let a = RequestContext::new("tester");
        let b = RequestContext::new("tester");

        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.user, "tester");
    }

    #[test]
    fn test_parse_origins_skips_invalid_entries() {
        let origins = vec![
            "http://localhost:3000".to_string(),
            "http://bad\norigin".to_string(),
            "https://catalog.example".to_string(),
        ];

        let parsed = parse_origins(&origins);

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], "http://localhost:3000");
        assert_eq!(parsed[1], "https://catalog.example");
    }
}
