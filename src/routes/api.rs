use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{api, transcription};
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router
///
/// Exposes the OpenAI-compatible audio endpoints plus health and model
/// listing. CORS is permissive so browser clients can call the server
/// directly.
pub fn create_api_router() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::health_check))
        .route("/v1/models", get(api::list_models))
        .route(
            "/v1/audio/transcriptions",
            post(transcription::create_transcription),
        )
        .route(
            "/v1/audio/translations",
            post(transcription::create_translation),
        )
        .layer(DefaultBodyLimit::max(transcription::MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
