use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use common::AlertKind;
use monitor::AlertFilter;
use portfolio::TradeFilter;

use crate::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/portfolio", get(get_portfolio))
        .route("/api/trades", get(get_trades))
        .route("/api/performance", get(get_performance))
        .route("/api/signals", get(get_signals))
        .route("/api/alerts", get(get_alerts))
        .route("/api/alerts/:id/read", post(mark_alert_read))
}

// ─── Portfolio ────────────────────────────────────────────────────────────────

/// Latest snapshot as published by the trading loop.
async fn get_portfolio(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.engine.snapshot().await;
    Json(json!(snapshot))
}

// ─── Trades ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TradesQuery {
    page: Option<i64>,
    limit: Option<i64>,
    symbol: Option<String>,
}

async fn get_trades(
    State(state): State<AppState>,
    Query(q): Query<TradesQuery>,
) -> Json<Value> {
    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(50).clamp(1, 200);

    let filter = TradeFilter {
        symbol: q.symbol.clone(),
        limit,
        offset: (page - 1) * limit,
        ..TradeFilter::default()
    };

    let trades = state.trade_store.list(&filter).await.unwrap_or_else(|e| {
        warn!(error = %e, "trade query failed");
        Vec::new()
    });
    let total = state
        .trade_store
        .count(q.symbol.as_deref())
        .await
        .unwrap_or(0);

    Json(json!({
        "trades": trades,
        "total": total,
        "page": page,
        "limit": limit,
    }))
}

// ─── Performance ──────────────────────────────────────────────────────────────

/// Equity curve, win rate and max drawdown folded over closing trades.
async fn get_performance(State(state): State<AppState>) -> Json<Value> {
    let pnls = state.trade_store.realized_pnls().await.unwrap_or_else(|e| {
        warn!(error = %e, "performance query failed");
        Vec::new()
    });

    if pnls.is_empty() {
        return Json(json!({
            "equity_curve": [],
            "win_rate": 0.0,
            "total_pnl_usd": 0.0,
            "trade_count": 0,
            "max_drawdown_pct": 0.0,
        }));
    }

    let mut equity = state.initial_balance;
    let mut peak = equity;
    let mut max_dd = 0.0f64;
    let mut wins = 0usize;
    let mut curve: Vec<Value> = Vec::new();

    for (timestamp, pnl) in &pnls {
        equity += pnl;
        if equity > peak {
            peak = equity;
        }
        let dd = (peak - equity) / peak;
        if dd > max_dd {
            max_dd = dd;
        }
        if *pnl > 0.0 {
            wins += 1;
        }
        curve.push(json!({ "timestamp": timestamp, "value": equity }));
    }

    let win_rate = wins as f64 / pnls.len() as f64;
    let total_pnl: f64 = pnls.iter().map(|(_, pnl)| pnl).sum();

    Json(json!({
        "equity_curve": curve,
        "win_rate": win_rate,
        "total_pnl_usd": total_pnl,
        "trade_count": pnls.len(),
        "max_drawdown_pct": max_dd,
    }))
}

// ─── Signals ──────────────────────────────────────────────────────────────────

/// Latest per-symbol signal states as published by the trading loop.
async fn get_signals(State(state): State<AppState>) -> Json<Value> {
    let signals = state.engine.signals().await;
    Json(json!({ "signals": signals }))
}

// ─── Alerts ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct AlertsQuery {
    page: Option<i64>,
    limit: Option<i64>,
    symbol: Option<String>,
    kind: Option<String>,
    unread: Option<bool>,
}

async fn get_alerts(
    State(state): State<AppState>,
    Query(q): Query<AlertsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let kind = match q.kind.as_deref() {
        None => None,
        Some(raw) => Some(parse_kind(raw).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("unknown alert kind '{raw}'")})),
            )
        })?),
    };

    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(50).clamp(1, 200);
    let filter = AlertFilter {
        symbol: q.symbol,
        kind,
        unread_only: q.unread.unwrap_or(false),
        limit,
        offset: (page - 1) * limit,
        ..AlertFilter::default()
    };

    let alerts = state.alert_store.list(&filter).await.unwrap_or_else(|e| {
        warn!(error = %e, "alert query failed");
        Vec::new()
    });
    let rows: Vec<Value> = alerts
        .into_iter()
        .map(|(alert, read)| {
            let mut value = json!(alert);
            value["read"] = json!(read);
            value
        })
        .collect();

    Ok(Json(json!({ "alerts": rows, "page": page, "limit": limit })))
}

async fn mark_alert_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.alert_store.mark_read(&id).await {
        Ok(true) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no such alert"})),
        ),
        Err(e) => {
            warn!(error = %e, "mark-read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "storage error"})),
            )
        }
    }
}

fn parse_kind(raw: &str) -> Option<AlertKind> {
    match raw {
        "signal_change" => Some(AlertKind::SignalChange),
        "trade_executed" => Some(AlertKind::TradeExecuted),
        "stop_loss_hit" => Some(AlertKind::StopLossHit),
        "take_profit_hit" => Some(AlertKind::TakeProfitHit),
        "win_rate_warning" => Some(AlertKind::WinRateWarning),
        "high_win_streak" => Some(AlertKind::HighWinStreak),
        _ => None,
    }
}
