use colabri_sync::config::Config;
use colabri_sync::db::{DocumentStore, MemoryDocumentStore, PgDocumentStore};
use colabri_sync::ws::{spawn_reaper, HubHandle};
use colabri_sync::{build_router, AppState};
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration before logging so LOG_LEVEL can shape the filter
    let loaded = Config::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter().into()))
        .init();

    info!("Starting {}...", config.service_name);

    if let Err(e) = &loaded {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
    }

    if config.auth_jwt_secret.is_none() {
        warn!("No JWT secret configured - every WebSocket handshake will be rejected");
    }

    // Initialize the document store
    let store: Arc<dyn DocumentStore> = match &config.db_url {
        Some(db_url) => match PgDocumentStore::connect(db_url).await {
            Ok(db) => {
                if let Err(e) = db.ensure_schema().await {
                    error!("Failed to prepare database schema: {}", e);
                }
                info!("Database initialized successfully");
                Arc::new(db)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Falling back to the in-memory document store");
                Arc::new(MemoryDocumentStore::new())
            }
        },
        None => {
            warn!("No database URL configured - using the in-memory document store");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    let settings = config.session_settings();
    let hub = HubHandle::spawn();
    let _reaper = spawn_reaper(hub.clone(), settings.reap_interval, settings.idle_timeout);

    let state = AppState::new(hub, store, settings, config.auth_jwt_secret.clone());
    if config.is_development() && config.cors_origins.is_none() {
        info!("Development mode: CORS is permissive");
    }
    let app = build_router(state, &config.cors_origin_list());

    let listener = match tokio::net::TcpListener::bind(config.server_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.server_address(), e);
            std::process::exit(1);
        }
    };

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}
