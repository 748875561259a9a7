mod error;
mod rest;
mod types;
mod websocket;

pub use error::{ApiError, ApiResult};
pub use types::*;
pub use websocket::websocket_handler;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::assemble::Assembler;
use crate::events::EventBus;
use crate::ingest::Ingestor;
use crate::registry::TransferRegistry;
use crate::staging::ChunkStaging;
use crate::store::Store;

/// Shared application state handed to every HTTP/WebSocket handler.
pub struct AppState {
    pub store: Arc<Store>,
    pub staging: Arc<ChunkStaging>,
    pub events: Arc<EventBus>,
    pub ingestor: Ingestor,
    pub assembler: Assembler,
    pub registry: TransferRegistry,
}

impl AppState {
    pub fn new(store: Arc<Store>, staging: Arc<ChunkStaging>, events: Arc<EventBus>) -> Self {
        Self {
            ingestor: Ingestor::new(store.clone(), staging.clone(), events.clone()),
            assembler: Assembler::new(store.clone(), staging.clone(), events.clone()),
            registry: TransferRegistry::new(store.clone()),
            store,
            staging,
            events,
        }
    }
}

/// Create a complete API server: the REST routes plus the `/ws` event
/// stream upgrade, under a permissive CORS layer.
pub fn create_api_server(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_router = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state.clone());

    Router::new()
        .merge(rest::router(state))
        .merge(ws_router)
        .layer(cors)
}
