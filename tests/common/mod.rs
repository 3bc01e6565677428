#![allow(dead_code)]

use colabri_sync::config::SessionSettings;
use colabri_sync::db::MemoryDocumentStore;
use colabri_sync::ws::HubHandle;
use colabri_sync::{build_router, AppState};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

pub const SECRET: &str = "integration-secret";

pub fn token(sub: &str, name: &str, roles: &[&str], token_type: &str) -> String {
    let claims = json!({
        "sub": sub,
        "name": name,
        "roles": roles,
        "type": token_type,
        "exp": chrono::Utc::now().timestamp() + 600,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

pub fn user_token(sub: &str, name: &str) -> String {
    token(sub, name, &[], "user")
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub store: Arc<MemoryDocumentStore>,
}

pub async fn seeded_store() -> Arc<MemoryDocumentStore> {
    let store = Arc::new(MemoryDocumentStore::new());
    store.insert("note-1", "alice", "", 1).await;
    store.grant("note-1", "bob").await;
    store
}

pub fn state_for(store: Arc<MemoryDocumentStore>) -> AppState {
    state_with(store, SessionSettings::default())
}

pub fn state_with(store: Arc<MemoryDocumentStore>, settings: SessionSettings) -> AppState {
    AppState::new(HubHandle::spawn(), store, settings, Some(SECRET.to_string()))
}

pub async fn start_server() -> TestServer {
    start_server_with(SessionSettings::default()).await
}

pub async fn start_server_with(settings: SessionSettings) -> TestServer {
    let store = seeded_store().await;
    let state = state_with(store.clone(), settings);
    let app = build_router(state.clone(), &[]);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, state, store }
}

pub fn data_of(message: &Value) -> &Value {
    &message["data"]
}
