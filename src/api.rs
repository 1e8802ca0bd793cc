//! HTTP API Server for personalized feeds
//!
//! Every feed, preference and interaction endpoint authenticates the caller
//! first. Bodies are read as raw bytes so that an empty body can mean "use
//! the defaults" and a malformed one surfaces as a 500 carrying the parser's
//! message.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::Authenticator;
use crate::config::ApiConfig;
use crate::error::Result;
use crate::feed::interactions::{record_interaction, FeedInteraction, InteractionRequest};
use crate::feed::preferences::{resolve_preferences, update_preferences, PreferencesUpdate};
use crate::feed::{FeedEngine, FeedRequest, FeedResponse, FeedStore, UserPreferences};

/// Shared application state
pub struct AppState<S> {
    pub engine: FeedEngine<S>,
    pub auth: Authenticator,
}

impl<S: FeedStore> AppState<S> {
    pub fn new(engine: FeedEngine<S>, auth: Authenticator) -> Self {
        Self { engine, auth }
    }

    fn store(&self) -> &S {
        self.engine.store().as_ref()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// Build the application router
pub fn router<S: FeedStore>(state: Arc<AppState<S>>, config: &ApiConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check::<S>))
        // Feed endpoints
        .route(
            "/functions/v1/generate-personalized-feed",
            post(generate_feed::<S>),
        )
        .route("/api/v1/feed", post(generate_feed::<S>))
        // User preferences
        .route(
            "/api/v1/preferences",
            get(get_preferences::<S>).put(put_preferences::<S>),
        )
        // Interaction tracking
        .route("/api/v1/interactions", post(post_interaction::<S>))
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn start_server<S: FeedStore>(
    state: Arc<AppState<S>>,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state, config);

    let addr = format!("{}:{}", config.host, config.port);
    info!("🚀 Starting feed API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}

/// Parse a JSON body; an empty body yields the type's default
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}

/// Health check endpoint
async fn health_check<S: FeedStore>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let (status, code, database) = match state.store().health_check().await {
        Ok(()) => ("healthy", StatusCode::OK, "connected"),
        Err(e) => {
            warn!("Health check failed: {}", e);
            ("degraded", StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: database.to_string(),
        }),
    )
}

/// Generate a personalized feed page for the caller
async fn generate_feed<S: FeedStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<FeedResponse>> {
    let user = state.auth.authenticate(&headers).await?;
    let request: FeedRequest = parse_body(&body)?;

    let response = state.engine.generate(user.id, &request).await?;
    Ok(Json(response))
}

/// Get the caller's preferences, creating defaults on first use
async fn get_preferences<S: FeedStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<UserPreferences>> {
    let user = state.auth.authenticate(&headers).await?;
    Ok(Json(resolve_preferences(state.store(), user.id).await))
}

/// Partially update the caller's preferences
async fn put_preferences<S: FeedStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UserPreferences>> {
    let user = state.auth.authenticate(&headers).await?;
    let update: PreferencesUpdate = parse_body(&body)?;

    let prefs = update_preferences(state.store(), user.id, update).await?;
    Ok(Json(prefs))
}

/// Record a feed interaction
async fn post_interaction<S: FeedStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<FeedInteraction>)> {
    let user = state.auth.authenticate(&headers).await?;
    let request: InteractionRequest = serde_json::from_slice(&body)?;

    let interaction = record_interaction(state.store(), user.id, request).await?;
    Ok((StatusCode::CREATED, Json(interaction)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_means_defaults() {
        let req: FeedRequest = parse_body(b"").unwrap();
        assert!(req.limit.is_none());
        let req: FeedRequest = parse_body(b"  \n").unwrap();
        assert!(req.session_id.is_none());
    }

    #[test]
    fn test_malformed_body_is_json_error() {
        let err = parse_body::<FeedRequest>(b"{not json").unwrap_err();
        assert!(matches!(err, crate::error::Error::Json(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
