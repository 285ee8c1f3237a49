mod auth;
pub mod routes;

use std::net::SocketAddr;

use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use common::TradingMode;
use engine::EngineHandle;
use monitor::AlertStore;
use portfolio::TradeStore;

/// Shared application state injected into every route handler.
///
/// Read paths consume the snapshots published by the trading loop and the
/// SQLite stores; the only write path into the loop is the command channel
/// behind [`EngineHandle`].
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub trade_store: TradeStore,
    pub alert_store: AlertStore,
    pub trading_mode: TradingMode,
    pub dashboard_token: String,
    pub initial_balance: f64,
}

/// Build the full application router. Split out of `serve` so tests can
/// drive it with `tower::ServiceExt::oneshot`.
pub fn router(state: AppState) -> Router {
    let protected = routes::api_router()
        .merge(routes::engine_router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(protected)
        .merge(routes::health_router())
        .with_state(state)
        .layer(cors)
}

/// Build and run the Axum API server.
pub async fn serve(state: AppState, port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(state);

    info!(%addr, "Dashboard API listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind dashboard port");
    axum::serve(listener, app)
        .await
        .expect("dashboard server failed");
}
