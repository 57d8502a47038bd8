//! HTTP surface
//!
//! - `POST /mongodb`: the database proxy
//! - `GET|PUT /settings/{user_id}`: per-user connection settings
//! - `GET /health`: liveness
//!
//! CORS is wide open. When an API key is configured, proxy and settings
//! routes require `Authorization: Bearer <key>`; the key is shared by all
//! callers and says nothing about which end user is calling.

use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::{header, HeaderName, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use agentdesk_client::{ConnectionSettings, DataEnvelope, ErrorEnvelope, ProxyRequest};

use crate::proxy::{self, DocumentConnector, ProxyError};
use crate::settings::SettingsStore;

#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<dyn DocumentConnector>,
    pub settings: Arc<dyn SettingsStore>,
    pub api_key: Option<Arc<str>>,
    pub default_mongodb_uri: Option<Arc<str>>,
}

impl AppState {
    pub fn new(connector: Arc<dyn DocumentConnector>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            connector,
            settings,
            api_key: None,
            default_mongodb_uri: None,
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.map(Arc::from);
        self
    }

    pub fn with_default_mongodb_uri(mut self, uri: Option<String>) -> Self {
        self.default_mongodb_uri = uri.map(Arc::from);
        self
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn error_response(status: StatusCode, error: String, details: Option<String>) -> Response {
    (status, Json(ErrorEnvelope { error, details })).into_response()
}

async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(key) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == key);

    if authorized {
        next.run(request).await
    } else {
        warn!("Rejected unauthenticated request to {}", request.uri().path());
        error_response(StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None)
    }
}

/// The body is parsed by hand so that malformed JSON gets the same 400
/// envelope as every other proxy failure.
async fn proxy_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let outcome = match serde_json::from_slice::<ProxyRequest>(&body) {
        Ok(request) => {
            proxy::execute(
                state.connector.as_ref(),
                &request,
                state.default_mongodb_uri.as_deref(),
            )
            .await
        }
        Err(e) => Err(ProxyError::from(e)),
    };

    match outcome {
        Ok(data) => (StatusCode::OK, Json(DataEnvelope { data })).into_response(),
        Err(e) => {
            error!("MongoDB error: {}", e);
            error_response(StatusCode::BAD_REQUEST, e.to_string(), Some(format!("{:?}", e)))
        }
    }
}

async fn get_settings(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    match state.settings.load(&user_id).await {
        Ok(settings) => Json(DataEnvelope { data: settings }).into_response(),
        Err(e) => {
            error!("Error loading settings for {}: {}", user_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), None)
        }
    }
}

async fn put_settings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(settings): Json<ConnectionSettings>,
) -> Response {
    match state.settings.save(&user_id, &settings).await {
        Ok(()) => Json(DataEnvelope { data: settings }).into_response(),
        Err(e) => {
            error!("Error saving settings for {}: {}", user_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), None)
        }
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/mongodb", post(proxy_handler))
        .route("/settings/{user_id}", get(get_settings).put(put_settings))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
