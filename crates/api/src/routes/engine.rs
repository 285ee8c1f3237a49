use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use tracing::info;

use common::EngineCommand;

use crate::AppState;

/// Engine control: the one write path from the dashboard into the trading
/// loop, carried over the command channel.
pub fn engine_router() -> Router<AppState> {
    Router::new()
        .route("/api/engine/start", post(start_engine))
        .route("/api/engine/stop", post(stop_engine))
}

async fn start_engine(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    info!("start requested via dashboard");
    state.engine.send(EngineCommand::Start).await;
    (StatusCode::ACCEPTED, Json(json!({"status": "starting"})))
}

async fn stop_engine(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    info!("stop requested via dashboard");
    state.engine.send(EngineCommand::Stop).await;
    (StatusCode::ACCEPTED, Json(json!({"status": "stopping"})))
}
