//! HTTP surface: the single subscription route.

mod ws;

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::registry::ConnectionRegistry;

pub use ws::ws_handler;

/// Shared app state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub config: Arc<Config>,
    /// Cancelled on process shutdown; every socket task watches it.
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    // Origins are not checked.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(&state.config.ws_path, get(ws_handler))
        .layer(cors)
        .with_state(state)
}
