pub mod auth;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod websocket;
pub mod ws;

use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::SessionSettings;
use db::DocumentStore;
use docs::ApiDoc;
use routes::create_api_routes;
use websocket::websocket_handler;
use ws::HubHandle;

/// Shared state handed to every HTTP and WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub store: Arc<dyn DocumentStore>,
    pub settings: Arc<SessionSettings>,
    pub auth_jwt_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(hub: HubHandle, store: Arc<dyn DocumentStore>, settings: SessionSettings, auth_jwt_secret: Option<String>) -> Self {
        Self {
            hub,
            store,
            settings: Arc::new(settings),
            auth_jwt_secret: auth_jwt_secret.map(Arc::from),
        }
    }
}

/// Build the HTTP application: WebSocket endpoint, API routes and Swagger UI
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let cors = if cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = cors_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let api_routes = create_api_routes(state.clone());

    Router::new()
        .route("/ws", get(websocket_handler))
        .nest("/api", api_routes)
        .with_state(state)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
